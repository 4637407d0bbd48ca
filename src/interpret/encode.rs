//! Encode interpreter: typed [`Value`] back to transport JSON.
//!
//! Encoding is total. It assumes the value satisfies the schema; on values
//! that do not, encoders fall back to [`Value::to_json`] rather than fail.
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value as Json, json};

use crate::derive::{Deferred, Interpreter, InterpreterId};
use crate::interpret::merge_all;
use crate::schema::{Comparator, Newtype, Node, Primitive, Refinement};
use crate::value::{Either, Value};

pub trait Encode: Send + Sync {
    /// `None` means undefined: the enclosing struct omits the key.
    fn encode(&self, value: &Value) -> Option<Json>;

    /// True when this encoder is exactly [`Value::to_json`]. Composite encoders
    /// whose children are all identity collapse to a single identity encoder.
    fn is_identity(&self) -> bool {
        false
    }
}

pub type Encoder = Arc<dyn Encode>;

#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeInterpreter;

struct Identity;

impl Encode for Identity {
    fn encode(&self, value: &Value) -> Option<Json> {
        if value.is_undefined() { None } else { Some(value.to_json()) }
    }

    fn is_identity(&self) -> bool {
        true
    }
}

fn identity() -> Encoder {
    Arc::new(Identity)
}

struct StructEncoder {
    fields: Vec<(String, Encoder)>,
}

impl Encode for StructEncoder {
    fn encode(&self, value: &Value) -> Option<Json> {
        let Value::Record(_) = value else {
            return Identity.encode(value);
        };
        let mut out = Map::new();
        for (key, encoder) in &self.fields {
            if let Some(json) = encoder.encode(value.get(key)) {
                out.insert(key.clone(), json);
            }
        }
        Some(Json::Object(out))
    }
}

struct IntersectionEncoder {
    members: Vec<Encoder>,
}

impl Encode for IntersectionEncoder {
    fn encode(&self, value: &Value) -> Option<Json> {
        let base = value.to_json();
        let parts: Vec<Json> = self.members.iter().filter_map(|m| m.encode(value)).collect();
        merge_all(Some(&base), parts)
    }
}

struct TaggedUnionEncoder {
    tag: String,
    members: IndexMap<String, Encoder>,
}

impl Encode for TaggedUnionEncoder {
    fn encode(&self, value: &Value) -> Option<Json> {
        match value.get(&self.tag).as_str().and_then(|t| self.members.get(t)) {
            Some(member) => member.encode(value),
            None => Identity.encode(value),
        }
    }
}

struct RecordEncoder {
    value: Encoder,
}

impl Encode for RecordEncoder {
    fn encode(&self, value: &Value) -> Option<Json> {
        let Value::Record(fields) = value else {
            return Identity.encode(value);
        };
        let out = fields
            .iter()
            .filter_map(|(k, v)| self.value.encode(v).map(|json| (k.clone(), json)))
            .collect();
        Some(Json::Object(out))
    }
}

/// Arrays and sets share a transport form.
struct SeqEncoder {
    item: Encoder,
}

impl Encode for SeqEncoder {
    fn encode(&self, value: &Value) -> Option<Json> {
        match value {
            Value::Array(xs) | Value::Set(xs) => Some(Json::Array(
                xs.iter().map(|x| self.item.encode(x).unwrap_or(Json::Null)).collect(),
            )),
            other => Identity.encode(other),
        }
    }
}

struct OptionalEncoder {
    inner: Encoder,
}

impl Encode for OptionalEncoder {
    fn encode(&self, value: &Value) -> Option<Json> {
        if value.is_undefined() { None } else { self.inner.encode(value) }
    }
}

struct NullableEncoder {
    inner: Encoder,
}

impl Encode for NullableEncoder {
    fn encode(&self, value: &Value) -> Option<Json> {
        match value {
            Value::Option(None) => Some(Json::Null),
            Value::Option(Some(v)) => self.inner.encode(v),
            other => self.inner.encode(other),
        }
    }
}

struct EitherEncoder {
    left: Encoder,
    right: Encoder,
}

impl Encode for EitherEncoder {
    fn encode(&self, value: &Value) -> Option<Json> {
        match value {
            Value::Either(Either::Left(v)) => Some(json!({ "_tag": "Left", "left": self.left.encode(v) })),
            Value::Either(Either::Right(v)) => Some(json!({ "_tag": "Right", "right": self.right.encode(v) })),
            other => Identity.encode(other),
        }
    }
}

struct OptionEncoder {
    inner: Encoder,
}

impl Encode for OptionEncoder {
    fn encode(&self, value: &Value) -> Option<Json> {
        match value {
            Value::Option(None) => Some(json!({ "_tag": "None" })),
            Value::Option(Some(v)) => Some(json!({ "_tag": "Some", "value": self.inner.encode(v) })),
            other => Identity.encode(other),
        }
    }
}

struct LazyEncoder {
    target: Deferred<EncodeInterpreter>,
}

impl Encode for LazyEncoder {
    fn encode(&self, value: &Value) -> Option<Json> {
        self.target.force().encode(value)
    }
}

struct NewtypeEncoder {
    inner: Encoder,
    newtype: Newtype,
}

impl Encode for NewtypeEncoder {
    fn encode(&self, value: &Value) -> Option<Json> {
        self.inner.encode(&self.newtype.mapping.reverse_get(value))
    }
}

fn all_identity<'a>(encoders: impl IntoIterator<Item = &'a Encoder>) -> bool {
    encoders.into_iter().all(|e| e.is_identity())
}

impl Interpreter for EncodeInterpreter {
    type Behavior = Encoder;
    const ID: InterpreterId = InterpreterId::Encoder;

    fn primitive(&self, _node: &Node, _primitive: &Primitive) -> Encoder {
        // dates and bigints already have their transport form in `Value::to_json`
        identity()
    }

    fn struct_(&self, _node: &Node, required: Vec<(String, Encoder)>, partial: Vec<(String, Encoder)>) -> Encoder {
        let fields: Vec<(String, Encoder)> = required.into_iter().chain(partial).collect();
        if all_identity(fields.iter().map(|(_, e)| e)) {
            return identity();
        }
        Arc::new(StructEncoder { fields })
    }

    fn intersection(&self, _node: &Node, members: Vec<Encoder>) -> Encoder {
        if all_identity(&members) {
            return identity();
        }
        Arc::new(IntersectionEncoder { members })
    }

    fn tagged_union(&self, _node: &Node, tag: &str, members: Vec<(String, Encoder)>) -> Encoder {
        if all_identity(members.iter().map(|(_, e)| e)) {
            return identity();
        }
        Arc::new(TaggedUnionEncoder { tag: tag.to_string(), members: members.into_iter().collect() })
    }

    fn record(&self, _node: &Node, value: Encoder) -> Encoder {
        if value.is_identity() { value } else { Arc::new(RecordEncoder { value }) }
    }

    fn set(&self, _node: &Node, item: Encoder, _order: &Comparator) -> Encoder {
        if item.is_identity() { item } else { Arc::new(SeqEncoder { item }) }
    }

    fn array(&self, _node: &Node, item: Encoder, _non_empty: bool) -> Encoder {
        if item.is_identity() { item } else { Arc::new(SeqEncoder { item }) }
    }

    fn optional(&self, _node: &Node, inner: Encoder) -> Encoder {
        if inner.is_identity() { inner } else { Arc::new(OptionalEncoder { inner }) }
    }

    fn nullable(&self, _node: &Node, inner: Encoder) -> Encoder {
        if inner.is_identity() { inner } else { Arc::new(NullableEncoder { inner }) }
    }

    fn either(&self, _node: &Node, left: Encoder, right: Encoder) -> Encoder {
        Arc::new(EitherEncoder { left, right })
    }

    fn option(&self, _node: &Node, inner: Encoder) -> Encoder {
        Arc::new(OptionEncoder { inner })
    }

    fn recursive(&self, _node: &Node, target: Deferred<Self>) -> Encoder {
        Arc::new(LazyEncoder { target })
    }

    fn refined(&self, _node: &Node, inner: Encoder, _refinement: &Refinement) -> Encoder {
        inner
    }

    fn newtype(&self, _node: &Node, inner: Encoder, newtype: &Newtype) -> Encoder {
        Arc::new(NewtypeEncoder { inner, newtype: newtype.clone() })
    }

    fn unknown(&self, _node: &Node) -> Encoder {
        identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::derive;
    use crate::schema::*;
    use chrono::{TimeZone, Utc};

    fn enc(schema: &crate::Schema, value: &Value) -> Option<Json> {
        derive(schema, &EncodeInterpreter).encode(value)
    }

    #[test]
    fn plain_structs_collapse_to_identity() {
        let s = struct_([("a", string()), ("b", array(number()))]);
        assert!(derive(&s, &EncodeInterpreter).is_identity());
        let v = Value::record([("a", Value::from("x")), ("b", Value::Array(vec![Value::number(1.0)]))]);
        assert_eq!(enc(&s, &v), Some(json!({"a": "x", "b": [1]})));
    }

    #[test]
    fn primitives_use_transport_form() {
        let d = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(enc(&date(), &Value::Date(d)), Some(json!("2024-01-02T03:04:05.000Z")));
        assert_eq!(enc(&bigint(), &Value::BigInt(7)), Some(json!("7")));
    }

    #[test]
    fn option_and_either_are_tagged() {
        let s = struct_([("o", option(number())), ("e", either(string(), number()))]);
        assert!(!derive(&s, &EncodeInterpreter).is_identity());
        let v = Value::record([("o", Value::none()), ("e", Value::left(Value::from("err")))]);
        assert_eq!(
            enc(&s, &v),
            Some(json!({"o": {"_tag": "None"}, "e": {"_tag": "Left", "left": "err"}}))
        );
        assert_eq!(
            enc(&option(number()), &Value::some(Value::number(2.0))),
            Some(json!({"_tag": "Some", "value": 2}))
        );
    }

    #[test]
    fn optional_fields_are_omitted() {
        let s = both_struct([("o", option(number()))], [("p", option(number()))]);
        let v = Value::record([("o", Value::none())]);
        assert_eq!(enc(&s, &v), Some(json!({"o": {"_tag": "None"}})));
    }

    #[test]
    fn newtypes_reverse_map() {
        let upper = iso_newtype(
            "Upper",
            string(),
            Iso::new(
                |v| Value::String(v.as_str().unwrap_or_default().to_uppercase()),
                |v| Value::String(v.as_str().unwrap_or_default().to_lowercase()),
            ),
        );
        assert_eq!(enc(&upper, &Value::from("ABC")), Some(json!("abc")));
    }

    #[test]
    fn intersections_merge_member_output() {
        let s = intersection([struct_([("a", option(number()))]), struct_([("b", string())])]);
        let v = Value::record([("a", Value::none()), ("b", Value::from("x"))]);
        assert_eq!(enc(&s, &v), Some(json!({"a": {"_tag": "None"}, "b": "x"})));
        // the rewriting member declared last
        let s = intersection([struct_([("b", string())]), struct_([("a", option(number()))])]);
        let v = Value::record([("a", Value::some(Value::number(2.0))), ("b", Value::from("x"))]);
        assert_eq!(enc(&s, &v), Some(json!({"a": {"_tag": "Some", "value": 2}, "b": "x"})));
    }
}
