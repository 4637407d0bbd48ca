//! Shape signatures.
//!
//! A [`Signature`] is a canonical, order-insensitive rendering of a schema's
//! structure. Two schemas with the same signature describe the same values;
//! diagnostic names and config slots do not contribute. A recursive node
//! unfolds its definition once; self handles inside that definition contribute
//! the name only, so signatures stay finite.
use std::fmt;
use std::sync::Arc;

use crate::derive::{Deferred, Interpreter, InterpreterId};
use crate::schema::{Comparator, Kind, Literal, Newtype, Node, Primitive, Refinement};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(Arc<str>);

impl Signature {
    fn new(s: impl Into<Arc<str>>) -> Self {
        Signature(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HashInterpreter;

fn literal(lit: &Literal) -> String {
    lit.to_json().to_string()
}

impl Interpreter for HashInterpreter {
    type Behavior = Signature;
    const ID: InterpreterId = InterpreterId::Hash;

    fn primitive(&self, _node: &Node, primitive: &Primitive) -> Signature {
        let s = match primitive {
            Primitive::String => "string".to_string(),
            Primitive::Number => "number".to_string(),
            Primitive::Boolean => "boolean".to_string(),
            Primitive::Date => "Date".to_string(),
            Primitive::Uuid => "UUID".to_string(),
            Primitive::BigInt => "bigint".to_string(),
            Primitive::Literal(lit) => literal(lit),
            Primitive::OneOf(values) => {
                let mut quoted: Vec<String> = values.iter().map(|v| format!("{v:?}")).collect();
                quoted.sort();
                quoted.join(" | ")
            }
        };
        Signature::new(s)
    }

    fn struct_(&self, _node: &Node, required: Vec<(String, Signature)>, partial: Vec<(String, Signature)>) -> Signature {
        let mut fields: Vec<String> = required
            .iter()
            .map(|(k, s)| format!("{k}: {s}"))
            .chain(partial.iter().map(|(k, s)| format!("{k}?: {s}")))
            .collect();
        fields.sort();
        if fields.is_empty() {
            return Signature::new("{}");
        }
        Signature::new(format!("{{ {} }}", fields.join("; ")))
    }

    fn intersection(&self, _node: &Node, members: Vec<Signature>) -> Signature {
        // member order decides merge precedence, so it is kept
        let parts: Vec<&str> = members.iter().map(Signature::as_str).collect();
        Signature::new(format!("({})", parts.join(" & ")))
    }

    fn tagged_union(&self, _node: &Node, tag: &str, members: Vec<(String, Signature)>) -> Signature {
        let mut parts: Vec<String> = members.iter().map(|(k, s)| format!("{k}:{s}")).collect();
        parts.sort();
        Signature::new(format!("Union<{tag}>({})", parts.join(" | ")))
    }

    fn record(&self, _node: &Node, value: Signature) -> Signature {
        Signature::new(format!("Record<string, {value}>"))
    }

    fn set(&self, _node: &Node, item: Signature, _order: &Comparator) -> Signature {
        Signature::new(format!("Set<{item}>"))
    }

    fn array(&self, _node: &Node, item: Signature, non_empty: bool) -> Signature {
        if non_empty {
            Signature::new(format!("NonEmptyArray<{item}>"))
        } else {
            Signature::new(format!("Array<{item}>"))
        }
    }

    fn optional(&self, _node: &Node, inner: Signature) -> Signature {
        Signature::new(format!("{inner} | undefined"))
    }

    fn nullable(&self, _node: &Node, inner: Signature) -> Signature {
        Signature::new(format!("{inner} | null"))
    }

    fn either(&self, _node: &Node, left: Signature, right: Signature) -> Signature {
        Signature::new(format!("Either<{left}, {right}>"))
    }

    fn option(&self, _node: &Node, inner: Signature) -> Signature {
        Signature::new(format!("Option<{inner}>"))
    }

    fn recursive(&self, node: &Node, target: Deferred<Self>) -> Signature {
        match node.kind() {
            // the definition reaches this node only through self handles
            Kind::Recursive(_) => Signature::new(format!("Recursive<{}>({})", node.name(), target.force())),
            _ => Signature::new(format!("Recursive<{}>", node.name())),
        }
    }

    fn refined(&self, _node: &Node, inner: Signature, refinement: &Refinement) -> Signature {
        let label = if refinement.narrows { "Refined" } else { "Constrained" };
        Signature::new(format!("{label}<{}>({inner})", refinement.name))
    }

    fn newtype(&self, _node: &Node, inner: Signature, newtype: &Newtype) -> Signature {
        Signature::new(format!("Newtype<{}>({inner})", newtype.name))
    }

    fn unknown(&self, _node: &Node) -> Signature {
        Signature::new("unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::derive;
    use crate::schema::*;

    fn sig(s: &crate::Schema) -> String {
        derive(s, &HashInterpreter).to_string()
    }

    #[test]
    fn field_order_does_not_matter() {
        let a = struct_([("x", number()), ("y", string())]);
        let b = struct_([("y", string()), ("x", number())]);
        assert_eq!(sig(&a), sig(&b));
        assert_eq!(sig(&a), "{ x: number; y: string }");
    }

    #[test]
    fn names_do_not_matter_but_shape_does() {
        let a = string().named("Email");
        assert_eq!(sig(&a), sig(&string()));
        assert_ne!(sig(&partial([("a", number())])), sig(&struct_([("a", number())])));
        assert_ne!(sig(&array(number())), sig(&non_empty_array(number())));
    }

    #[test]
    fn literal_sets_are_sorted() {
        assert_eq!(sig(&one_of_literals(["b", "a"])), "\"a\" | \"b\"");
        assert_eq!(sig(&number_literal(3.0)), "3");
    }

    #[test]
    fn recursive_signature_is_finite() {
        let list = recursive("List", |this| partial([("next", this)]));
        assert_eq!(sig(&list), "Recursive<List>({ next?: Recursive<List> })");
        let Kind::Recursive(r) = list.kind() else { unreachable!() };
        assert_eq!(sig(r.resolve()), "{ next?: Recursive<List> }");
    }

    #[test]
    fn recursive_signature_reflects_the_definition() {
        let branches = recursive("Tree", |this| struct_([("kids", array(this))]));
        let chain = recursive("Tree", |this| both_struct([("label", string())], [("next", this)]));
        assert_ne!(sig(&branches), sig(&chain));
        let again = recursive("Tree", |this| struct_([("kids", array(this))]));
        assert_eq!(sig(&branches), sig(&again));
    }

    #[test]
    fn refinements_are_labelled() {
        let pos = refined(number(), "Positive", |v| v.as_f64().is_some_and(|n| n > 0.0));
        let int = constrained(number(), "Int", |v| v.as_f64().is_some_and(|n| n.fract() == 0.0));
        assert_eq!(sig(&pos), "Refined<Positive>(number)");
        assert_eq!(sig(&int), "Constrained<Int>(number)");
    }
}
