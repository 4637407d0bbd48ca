//! Built-in interpreters.
//!
//! Each submodule defines one behavior family and its [`Interpreter`] impl:
//!
//! | interpreter | behavior |
//! |---|---|
//! | [`decode::DecodeInterpreter`] | validate untrusted JSON into a [`Value`](crate::Value) |
//! | [`encode::EncodeInterpreter`] | total `Value` → JSON |
//! | [`eq::EqInterpreter`] | structural equality |
//! | [`hash::HashInterpreter`] | stable signature of the schema's shape |
//! | [`arbitrary::ArbitraryInterpreter`] | example values for property tests |
//!
//! [`Interpreter`]: crate::derive::Interpreter
pub mod arbitrary;
pub mod decode;
pub mod encode;
pub mod eq;
pub mod hash;

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::value::Value;

/// Something intersection members can produce and be merged field by field.
pub(crate) trait Mergeable: Sized + PartialEq {
    /// `Err(self)` when not record-shaped.
    fn into_fields(self) -> Result<IndexMap<String, Self>, Self>;
    fn from_fields(fields: IndexMap<String, Self>) -> Self;
    /// Transport form, compared against the merge base.
    fn transport(&self) -> Json;
}

impl Mergeable for Value {
    fn into_fields(self) -> Result<IndexMap<String, Self>, Self> {
        match self {
            Value::Record(m) => Ok(m),
            // opaque members keep every key they accepted
            Value::Unknown(Json::Object(m)) => Ok(m.into_iter().map(|(k, v)| (k, Value::Unknown(v))).collect()),
            other => Err(other),
        }
    }

    fn from_fields(fields: IndexMap<String, Self>) -> Self {
        Value::Record(fields)
    }

    fn transport(&self) -> Json {
        self.to_json()
    }
}

impl Mergeable for Json {
    fn into_fields(self) -> Result<IndexMap<String, Self>, Self> {
        match self {
            Json::Object(m) => Ok(m.into_iter().collect()),
            other => Err(other),
        }
    }

    fn from_fields(fields: IndexMap<String, Self>) -> Self {
        Json::Object(fields.into_iter().collect())
    }

    fn transport(&self) -> Json {
        self.clone()
    }
}

/// Merge per-member results of an intersection over `base`, the transport
/// value every member saw (the decode input, or the encoded value).
///
/// - all parts identical: that part, unchanged
/// - no record-shaped part: the last part
/// - otherwise: record parts folded left to right; a key is taken from a part
///   when it is new, or when that part changed it relative to `base`
///
/// This is last-write-wins per field, not a deep merge. A member that passes
/// a field through untouched never overwrites another member's rewrite of it.
/// Without a record-shaped base every later part wins.
pub(crate) fn merge_all<T: Mergeable>(base: Option<&Json>, parts: Vec<T>) -> Option<T> {
    let all_equal = parts.windows(2).all(|w| w[0] == w[1]);
    if all_equal {
        return parts.into_iter().next();
    }
    let base = base.and_then(Json::as_object);
    let mut acc: Option<IndexMap<String, T>> = None;
    let mut last_scalar = None;
    for part in parts {
        match part.into_fields() {
            Ok(fields) => {
                let acc = acc.get_or_insert_with(IndexMap::new);
                for (k, v) in fields {
                    let changed = match base {
                        Some(base) => base.get(&k) != Some(&v.transport()),
                        None => true,
                    };
                    if !acc.contains_key(&k) || changed {
                        acc.insert(k, v);
                    }
                }
            }
            Err(scalar) => last_scalar = Some(scalar),
        }
    }
    match acc {
        Some(fields) => Some(T::from_fields(fields)),
        None => last_scalar,
    }
}
