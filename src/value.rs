//! Typed values produced by decoding and consumed by encoding.
//!
//! The transport side is always `serde_json::Value`; this is the other side of
//! the codec. It is deliberately closed: every schema node decodes into one of
//! these variants.
use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Absence. Struct assembly drops fields holding this.
    Undefined,
    Bool(bool),
    Number(OrderedFloat<f64>),
    BigInt(i128),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    /// Sorted and deduplicated by the owning node's comparator.
    Set(Vec<Value>),
    Record(IndexMap<String, Value>),
    Option(Option<Box<Value>>),
    Either(Either),
    /// Opaque payload, passed through untouched.
    Unknown(Json),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Either {
    Left(Box<Value>),
    Right(Box<Value>),
}

impl Value {
    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn number(n: f64) -> Self {
        Value::Number(OrderedFloat(n))
    }

    pub fn some(v: Value) -> Self {
        Value::Option(Some(Box::new(v)))
    }

    pub fn none() -> Self {
        Value::Option(None)
    }

    pub fn left(v: Value) -> Self {
        Value::Either(Either::Left(Box::new(v)))
    }

    pub fn right(v: Value) -> Self {
        Value::Either(Either::Right(Box::new(v)))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(n.0),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Record(m) => Some(m),
            _ => None,
        }
    }

    /// Field lookup on records; anything else (or a missing key) reads as undefined.
    pub fn get(&self, key: &str) -> &Value {
        static UNDEFINED: Value = Value::Undefined;
        match self {
            Value::Record(m) => m.get(key).unwrap_or(&UNDEFINED),
            _ => &UNDEFINED,
        }
    }

    /// Plain structural conversion to transport form. This is what encoders use
    /// when every node below them is an identity encoder.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Undefined => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => json_num_pref_i64(n.0),
            Value::BigInt(i) => Json::String(i.to_string()),
            Value::String(s) => Json::String(s.clone()),
            Value::Date(d) => Json::String(format_date(d)),
            Value::Array(xs) | Value::Set(xs) => Json::Array(xs.iter().map(Value::to_json).collect()),
            Value::Record(m) => Json::Object(
                m.iter()
                    .filter(|(_, v)| !v.is_undefined())
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Option(None) => Json::Null,
            Value::Option(Some(v)) => v.to_json(),
            Value::Either(Either::Left(v)) | Value::Either(Either::Right(v)) => v.to_json(),
            Value::Unknown(j) => j.clone(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Undefined => 0,
            Value::Option(None) => 1,
            Value::Bool(_) => 2,
            Value::Number(_) => 3,
            Value::BigInt(_) => 4,
            Value::String(_) => 5,
            Value::Date(_) => 6,
            Value::Array(_) => 7,
            Value::Set(_) => 8,
            Value::Record(_) => 9,
            Value::Option(Some(_)) => 10,
            Value::Either(_) => 11,
            Value::Unknown(_) => 12,
        }
    }
}

/// Total structural order over values, used as the default set comparator.
///
/// Values of different variants order by variant; records compare by their
/// entries in key order; opaque payloads compare by their serialized text.
pub fn natural_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x.cmp(y),
        (Value::BigInt(x), Value::BigInt(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) | (Value::Set(x), Value::Set(y)) => cmp_seq(x, y),
        (Value::Record(x), Value::Record(y)) => {
            let mut xs: Vec<_> = x.iter().collect();
            let mut ys: Vec<_> = y.iter().collect();
            xs.sort_by(|l, r| l.0.cmp(r.0));
            ys.sort_by(|l, r| l.0.cmp(r.0));
            for ((kx, vx), (ky, vy)) in xs.iter().zip(ys.iter()) {
                let ord = kx.cmp(ky).then_with(|| natural_cmp(vx, vy));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xs.len().cmp(&ys.len())
        }
        (Value::Option(Some(x)), Value::Option(Some(y))) => natural_cmp(x, y),
        (Value::Either(x), Value::Either(y)) => match (x, y) {
            (Either::Left(l), Either::Left(r)) | (Either::Right(l), Either::Right(r)) => natural_cmp(l, r),
            (Either::Left(_), Either::Right(_)) => Ordering::Less,
            (Either::Right(_), Either::Left(_)) => Ordering::Greater,
        },
        (Value::Unknown(x), Value::Unknown(y)) => x.to_string().cmp(&y.to_string()),
        _ => a.rank().cmp(&b.rank()),
    }
}

fn cmp_seq(xs: &[Value], ys: &[Value]) -> Ordering {
    for (x, y) in xs.iter().zip(ys.iter()) {
        let ord = natural_cmp(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    xs.len().cmp(&ys.len())
}

pub(crate) fn format_date(d: &DateTime<Utc>) -> String {
    d.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// Helper: prefer emitting integers when exact
pub(crate) fn json_num_pref_i64(n: f64) -> Json {
    if n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        Json::from(n as i64)
    } else {
        // non-finite numbers have no JSON form
        serde_json::Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(xs: Vec<Value>) -> Self {
        Value::Array(xs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integral_numbers_encode_as_integers() {
        assert_eq!(Value::number(3.0).to_json(), json!(3));
        assert_eq!(Value::number(2.5).to_json(), json!(2.5));
        assert_eq!(Value::number(f64::NAN).to_json(), Json::Null);
    }

    #[test]
    fn numbers_past_i64_stay_floats() {
        let two_pow_63 = 9_223_372_036_854_775_808.0;
        assert_eq!(Value::number(two_pow_63).to_json(), json!(two_pow_63));
        assert_eq!(Value::number(-two_pow_63).to_json(), json!(i64::MIN));
    }

    #[test]
    fn records_drop_undefined_fields() {
        let v = Value::record([("a", Value::from("x")), ("b", Value::Undefined)]);
        assert_eq!(v.to_json(), json!({"a": "x"}));
        assert!(v.get("b").is_undefined());
        assert!(v.get("missing").is_undefined());
    }

    #[test]
    fn natural_order_is_by_variant_then_content() {
        assert_eq!(natural_cmp(&Value::from(1.0), &Value::from(2.0)), Ordering::Less);
        assert_eq!(natural_cmp(&Value::from("b"), &Value::from("a")), Ordering::Greater);
        assert_eq!(natural_cmp(&Value::from(true), &Value::from("a")), Ordering::Less);
        let a = Value::record([("k", Value::from(1.0))]);
        let b = Value::record([("k", Value::from(1.0))]);
        assert_eq!(natural_cmp(&a, &b), Ordering::Equal);
    }
}
