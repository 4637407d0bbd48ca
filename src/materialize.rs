//! A schema bound to every built-in interpreter.
use serde_json::Value as Json;
use tracing::debug;

use crate::derive::derive;
use crate::error::DecodeError;
use crate::interpret::arbitrary::{ArbitraryInterpreter, Examples, GenerateOptions, Generator};
use crate::interpret::decode::{Context, DecodeInterpreter, DecodeOptions, Decoder};
use crate::interpret::encode::{EncodeInterpreter, Encoder};
use crate::interpret::eq::{EqInterpreter, Equality};
use crate::interpret::hash::{HashInterpreter, Signature};
use crate::schema::Schema;
use crate::value::Value;

/// Behaviors are derived eagerly, once, and shared with every other schema
/// that embeds the same nodes.
#[derive(Clone)]
pub struct Materialized {
    schema: Schema,
    decoder: Decoder,
    encoder: Encoder,
    eq: Equality,
    signature: Signature,
    generator: Generator,
}

impl Materialized {
    pub fn new(schema: &Schema) -> Self {
        Self {
            schema: schema.clone(),
            decoder: derive(schema, &DecodeInterpreter),
            encoder: derive(schema, &EncodeInterpreter),
            eq: derive(schema, &EqInterpreter),
            signature: derive(schema, &HashInterpreter),
            generator: derive(schema, &ArbitraryInterpreter),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Decode in lenient mode: undeclared keys are dropped, not reported.
    pub fn decode(&self, input: &Json) -> Result<Value, DecodeError> {
        self.decode_with(input, DecodeOptions::default())
    }

    pub fn decode_with(&self, input: &Json, options: DecodeOptions) -> Result<Value, DecodeError> {
        let mut ctx = Context::new(options);
        self.decoder.validate(Some(input), &mut ctx).map_err(|errors| {
            debug!(schema = self.schema.name(), errors = errors.len(), "decode failed");
            DecodeError::new(errors)
        })
    }

    /// Total. A value with no transport form (undefined) encodes as `null`.
    pub fn encode(&self, value: &Value) -> Json {
        self.encoder.encode(value).unwrap_or(Json::Null)
    }

    pub fn equals(&self, a: &Value, b: &Value) -> bool {
        self.eq.equals(a, b)
    }

    /// Stable shape signature; see [`Signature`].
    pub fn hash(&self) -> &str {
        self.signature.as_str()
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn generate(&self) -> Examples {
        self.generate_with(GenerateOptions::default())
    }

    pub fn generate_with(&self, options: GenerateOptions) -> Examples {
        Examples::from_parts(self.schema.clone(), self.generator.clone(), options)
    }
}

impl std::fmt::Debug for Materialized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Materialized")
            .field("schema", &self.schema)
            .field("signature", &self.signature)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::*;

    #[test]
    fn decode_encode_round_trip() {
        let m = struct_([("when", date()), ("big", bigint()), ("o", option(string()))]).materialize();
        let input = json!({"when": "2024-05-06T07:08:09.010Z", "big": "123456789012345678901234567890", "o": {"_tag": "None"}});
        let v = m.decode(&input).unwrap();
        assert_eq!(v.get("big"), &Value::BigInt(123456789012345678901234567890));
        assert_eq!(m.encode(&v), input);
        assert!(m.equals(&v, &v));
    }

    #[test]
    fn decode_errors_are_collected() {
        let m = struct_([("a", number()), ("b", number())]).materialize();
        let err = m.decode(&json!({"a": "x", "b": "y"})).unwrap_err();
        assert_eq!(err.len(), 2);
    }

    #[test]
    fn materializing_twice_shares_behaviors() {
        let s = struct_([("a", number())]);
        let a = s.materialize();
        let b = s.materialize();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash(), "{ a: number }");
        let mut xs = a.generate();
        let mut ys = b.generate();
        assert_eq!(xs.next(), ys.next());
    }
}
