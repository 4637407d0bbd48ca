//! Composable runtime schemas for JSON.
//!
//! Build a [`Schema`] once from the builder functions re-exported here, then
//! derive behaviors from it: decoding untrusted JSON with accumulated,
//! path-qualified errors, encoding typed [`Value`]s back to JSON, structural
//! equality, shape signatures and seeded example generation. Each behavior is
//! derived bottom-up at most once per node and cached on the node.
//!
//! ```
//! use json_shapes::*;
//! use serde_json::json;
//!
//! let person = both_struct(
//!     [("name", string()), ("age", number())],
//!     [("email", nullable(string()))],
//! );
//! let m = person.materialize();
//! let v = m.decode(&json!({"name": "Ada", "age": 36})).unwrap();
//! assert_eq!(m.encode(&v), json!({"name": "Ada", "age": 36}));
//!
//! let err = m.decode(&json!({"name": 1, "age": "x"})).unwrap_err();
//! assert_eq!(err.len(), 2);
//! ```
//!
//! Per-node overrides go through [`Config`] slots; new behavior families
//! implement [`Interpreter`].
pub mod config;
pub mod derive;
pub mod error;
pub mod inference;
pub mod interpret;
pub mod lower;
pub mod materialize;
pub mod recursive;
pub mod schema;
pub mod value;

pub use config::Config;
pub use derive::{Deferred, Interpreter, InterpreterId, derive};
pub use error::{DecodeError, ErrorKind, KeyPath, Segment, Validation, ValidationError};
pub use interpret::arbitrary::{Examples, GenerateOptions};
pub use interpret::decode::DecodeOptions;
pub use interpret::hash::Signature;
pub use materialize::Materialized;
pub use schema::{
    Comparator, Iso, Kind, Literal, Node, NodeId, Prism, Primitive, Schema, array, bigint, boolean, boolean_literal,
    both_struct, constrained, date, either, intersection, iso_newtype, mutable, non_empty_array, nullable, number,
    number_literal, one_of_literals, option, optional, partial, prism_newtype, record, recursive, refined, set,
    string, string_literal, struct_, tagged_union, unknown, uuid,
};
pub use value::{Either, Value};
