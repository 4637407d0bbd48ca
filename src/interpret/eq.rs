//! Structural equality derived from the schema.
//!
//! Unlike `Value`'s own `PartialEq`, struct equality only looks at declared
//! fields and newtypes compare their base representation.
use std::sync::Arc;

use indexmap::IndexMap;

use crate::derive::{Deferred, Interpreter, InterpreterId};
use crate::schema::{Comparator, Newtype, Node, Primitive, Refinement};
use crate::value::{Either, Value};

pub trait Equal: Send + Sync {
    fn equals(&self, a: &Value, b: &Value) -> bool;
}

pub type Equality = Arc<dyn Equal>;

#[derive(Debug, Clone, Copy, Default)]
pub struct EqInterpreter;

struct Structural;

impl Equal for Structural {
    fn equals(&self, a: &Value, b: &Value) -> bool {
        a == b
    }
}

struct StructEq {
    fields: Vec<(String, Equality)>,
}

impl Equal for StructEq {
    fn equals(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Record(_), Value::Record(_)) => {
                self.fields.iter().all(|(k, eq)| eq.equals(a.get(k), b.get(k)))
            }
            _ => a == b,
        }
    }
}

struct AllOf {
    members: Vec<Equality>,
}

impl Equal for AllOf {
    fn equals(&self, a: &Value, b: &Value) -> bool {
        self.members.iter().all(|m| m.equals(a, b))
    }
}

struct TaggedUnionEq {
    tag: String,
    members: IndexMap<String, Equality>,
}

impl Equal for TaggedUnionEq {
    fn equals(&self, a: &Value, b: &Value) -> bool {
        let (ta, tb) = (a.get(&self.tag), b.get(&self.tag));
        if ta != tb {
            return false;
        }
        match ta.as_str().and_then(|t| self.members.get(t)) {
            Some(member) => member.equals(a, b),
            None => a == b,
        }
    }
}

struct RecordEq {
    value: Equality,
}

impl Equal for RecordEq {
    fn equals(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Record(x), Value::Record(y)) => {
                x.len() == y.len()
                    && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| self.value.equals(v, w)))
            }
            _ => a == b,
        }
    }
}

struct SeqEq {
    item: Equality,
}

impl Equal for SeqEq {
    fn equals(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Array(x), Value::Array(y)) | (Value::Set(x), Value::Set(y)) => {
                x.len() == y.len() && x.iter().zip(y).all(|(v, w)| self.item.equals(v, w))
            }
            _ => a == b,
        }
    }
}

struct OptionalEq {
    inner: Equality,
}

impl Equal for OptionalEq {
    fn equals(&self, a: &Value, b: &Value) -> bool {
        match (a.is_undefined(), b.is_undefined()) {
            (true, true) => true,
            (false, false) => self.inner.equals(a, b),
            _ => false,
        }
    }
}

/// Shared by nullable and option: both decode to `Value::Option`.
struct MaybeEq {
    inner: Equality,
}

impl Equal for MaybeEq {
    fn equals(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Option(None), Value::Option(None)) => true,
            (Value::Option(Some(x)), Value::Option(Some(y))) => self.inner.equals(x, y),
            (Value::Option(_), Value::Option(_)) => false,
            _ => a == b,
        }
    }
}

struct EitherEq {
    left: Equality,
    right: Equality,
}

impl Equal for EitherEq {
    fn equals(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Either(Either::Left(x)), Value::Either(Either::Left(y))) => self.left.equals(x, y),
            (Value::Either(Either::Right(x)), Value::Either(Either::Right(y))) => self.right.equals(x, y),
            (Value::Either(_), Value::Either(_)) => false,
            _ => a == b,
        }
    }
}

struct LazyEq {
    target: Deferred<EqInterpreter>,
}

impl Equal for LazyEq {
    fn equals(&self, a: &Value, b: &Value) -> bool {
        self.target.force().equals(a, b)
    }
}

struct NewtypeEq {
    inner: Equality,
    newtype: Newtype,
}

impl Equal for NewtypeEq {
    fn equals(&self, a: &Value, b: &Value) -> bool {
        let mapping = &self.newtype.mapping;
        self.inner.equals(&mapping.reverse_get(a), &mapping.reverse_get(b))
    }
}

/// Identical references are equal without looking inside.
struct SameRef(Equality);

impl Equal for SameRef {
    fn equals(&self, a: &Value, b: &Value) -> bool {
        std::ptr::eq(a, b) || self.0.equals(a, b)
    }
}

fn wrap(eq: impl Equal + 'static) -> Equality {
    Arc::new(SameRef(Arc::new(eq)))
}

impl Interpreter for EqInterpreter {
    type Behavior = Equality;
    const ID: InterpreterId = InterpreterId::Eq;

    fn primitive(&self, _node: &Node, _primitive: &Primitive) -> Equality {
        // numbers compare through OrderedFloat, so NaN equals NaN
        Arc::new(Structural)
    }

    fn struct_(&self, _node: &Node, required: Vec<(String, Equality)>, partial: Vec<(String, Equality)>) -> Equality {
        wrap(StructEq { fields: required.into_iter().chain(partial).collect() })
    }

    fn intersection(&self, _node: &Node, members: Vec<Equality>) -> Equality {
        wrap(AllOf { members })
    }

    fn tagged_union(&self, _node: &Node, tag: &str, members: Vec<(String, Equality)>) -> Equality {
        wrap(TaggedUnionEq { tag: tag.to_string(), members: members.into_iter().collect() })
    }

    fn record(&self, _node: &Node, value: Equality) -> Equality {
        wrap(RecordEq { value })
    }

    fn set(&self, _node: &Node, item: Equality, _order: &Comparator) -> Equality {
        // decoded sets are sorted, so pairwise comparison is order-insensitive
        wrap(SeqEq { item })
    }

    fn array(&self, _node: &Node, item: Equality, _non_empty: bool) -> Equality {
        wrap(SeqEq { item })
    }

    fn optional(&self, _node: &Node, inner: Equality) -> Equality {
        Arc::new(OptionalEq { inner })
    }

    fn nullable(&self, _node: &Node, inner: Equality) -> Equality {
        Arc::new(MaybeEq { inner })
    }

    fn either(&self, _node: &Node, left: Equality, right: Equality) -> Equality {
        Arc::new(EitherEq { left, right })
    }

    fn option(&self, _node: &Node, inner: Equality) -> Equality {
        Arc::new(MaybeEq { inner })
    }

    fn recursive(&self, _node: &Node, target: Deferred<Self>) -> Equality {
        Arc::new(LazyEq { target })
    }

    fn refined(&self, _node: &Node, inner: Equality, _refinement: &Refinement) -> Equality {
        inner
    }

    fn newtype(&self, _node: &Node, inner: Equality, newtype: &Newtype) -> Equality {
        Arc::new(NewtypeEq { inner, newtype: newtype.clone() })
    }

    fn unknown(&self, _node: &Node) -> Equality {
        Arc::new(Structural)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::derive::derive;
    use crate::schema::*;

    fn eq(schema: &crate::Schema, a: &Value, b: &Value) -> bool {
        derive(schema, &EqInterpreter).equals(a, b)
    }

    #[test]
    fn structs_ignore_undeclared_fields() {
        let s = struct_([("a", number())]);
        let a = Value::record([("a", Value::number(1.0)), ("x", Value::from("left"))]);
        let b = Value::record([("a", Value::number(1.0)), ("x", Value::from("right"))]);
        assert!(eq(&s, &a, &b));
        let c = Value::record([("a", Value::number(2.0))]);
        assert!(!eq(&s, &a, &c));
    }

    #[test]
    fn tagged_unions_compare_tags_first() {
        let u = tagged_union(
            "_tag",
            [
                ("A", struct_([("_tag", string_literal("A")), ("v", number())])),
                ("B", struct_([("_tag", string_literal("B")), ("v", number())])),
            ],
        );
        let a = Value::record([("_tag", Value::from("A")), ("v", Value::number(1.0))]);
        let b = Value::record([("_tag", Value::from("B")), ("v", Value::number(1.0))]);
        assert!(!eq(&u, &a, &b));
        assert!(eq(&u, &a, &a.clone()));
    }

    #[test]
    fn records_need_the_same_keys() {
        let r = record(number());
        let a = Value::record([("x", Value::number(1.0))]);
        let b = Value::record([("x", Value::number(1.0)), ("y", Value::number(2.0))]);
        assert!(!eq(&r, &a, &b));
        assert!(!eq(&r, &b, &a));
    }

    #[test]
    fn options_compare_discriminants() {
        let o = option(number());
        assert!(eq(&o, &Value::none(), &Value::none()));
        assert!(!eq(&o, &Value::none(), &Value::some(Value::number(0.0))));
        let o = optional(number());
        assert!(eq(&o, &Value::Undefined, &Value::Undefined));
        assert!(!eq(&o, &Value::Undefined, &Value::number(0.0)));
    }

    #[test]
    fn overridden_element_equality_is_used_by_containers() {
        let case_insensitive = Config::new().with::<EqInterpreter, _>(|_, _, _| {
            struct Ci;
            impl Equal for Ci {
                fn equals(&self, a: &Value, b: &Value) -> bool {
                    match (a.as_str(), b.as_str()) {
                        (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
                        _ => a == b,
                    }
                }
            }
            Arc::new(Ci) as Equality
        });
        let s = array(string().with_config(case_insensitive));
        let a = Value::Array(vec![Value::from("Hello")]);
        let b = Value::Array(vec![Value::from("hELLO")]);
        assert!(eq(&s, &a, &b));
    }

    #[test]
    fn recursive_equality() {
        let tree = recursive("Tree", |this| struct_([("v", number()), ("kids", array(this))]));
        let leaf = |v: f64| Value::record([("v", Value::number(v)), ("kids", Value::Array(vec![]))]);
        let t1 = Value::record([("v", Value::number(0.0)), ("kids", Value::Array(vec![leaf(1.0)]))]);
        let t2 = Value::record([("v", Value::number(0.0)), ("kids", Value::Array(vec![leaf(2.0)]))]);
        assert!(eq(&tree, &t1, &t1.clone()));
        assert!(!eq(&tree, &t1, &t2));
    }
}
