//! Decode interpreter: untrusted JSON in, typed [`Value`] or every error out.
//!
//! Decoders see `Option<&Json>`, where `None` is an absent key (undefined).
//! Composite decoders run all children and concatenate their errors instead of
//! stopping at the first one.
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use ordered_float::OrderedFloat;
use regex::Regex;
use serde_json::Value as Json;

use crate::derive::{Deferred, Interpreter, InterpreterId};
use crate::error::{ErrorKind, KeyPath, Segment, Validation, ValidationError, zip};
use crate::interpret::merge_all;
use crate::schema::{Comparator, Literal, Newtype, Node, Primitive, Refinement};
use crate::value::{Either, Value};

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("static regex")
});

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Reject keys not declared by the struct being decoded.
    pub exact: bool,
}

impl DecodeOptions {
    pub fn exact() -> Self {
        Self { exact: true }
    }
}

/// Decode state threaded through one `decode` call.
pub struct Context {
    path: KeyPath,
    options: DecodeOptions,
    /// Set by an intersection so its members skip the excess-key check; the
    /// intersection runs it once over all members' keys.
    defer_excess: bool,
}

impl Context {
    pub fn new(options: DecodeOptions) -> Self {
        Self { path: KeyPath::default(), options, defer_excess: false }
    }

    pub fn options(&self) -> DecodeOptions {
        self.options
    }

    pub fn path(&self) -> &KeyPath {
        &self.path
    }

    /// A one-element error list at the current path.
    pub fn fail(&self, kind: ErrorKind, message: impl Into<String>) -> Vec<ValidationError> {
        vec![ValidationError { path: self.path.to_string(), message: message.into(), kind }]
    }

    fn at<T>(&mut self, segment: Segment, f: impl FnOnce(&mut Self) -> T) -> T {
        self.path.push(segment);
        let deferred = std::mem::replace(&mut self.defer_excess, false);
        let out = f(self);
        self.defer_excess = deferred;
        self.path.pop();
        out
    }

    fn take_excess_check(&mut self) -> bool {
        let deferred = std::mem::replace(&mut self.defer_excess, false);
        self.options.exact && !deferred
    }
}

pub trait Decode: Send + Sync {
    fn validate(&self, input: Option<&Json>, ctx: &mut Context) -> Validation<Value>;

    /// Keys a record-shaped decoder accepts in `input`, for excess-key checks.
    /// `None` when the set is open.
    fn declared_keys(&self, _input: Option<&Json>) -> Option<Vec<String>> {
        None
    }
}

pub type Decoder = Arc<dyn Decode>;

#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeInterpreter;

// ————————————————————————————————————————————————————————————————————————————
// HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// Short description of what was found, for error messages.
pub fn describe(input: Option<&Json>) -> String {
    match input {
        None => "undefined".to_string(),
        Some(Json::Null) => "null".to_string(),
        Some(Json::Bool(b)) => format!("boolean {b}"),
        Some(Json::Number(n)) => format!("number {n}"),
        Some(Json::String(s)) if s.chars().count() > 40 => {
            let head: String = s.chars().take(40).collect();
            format!("string \"{head}…\"")
        }
        Some(Json::String(s)) => format!("string {s:?}"),
        Some(Json::Array(xs)) => format!("array of length {}", xs.len()),
        Some(Json::Object(_)) => "object".to_string(),
    }
}

fn mismatch(ctx: &Context, expected: &str, input: Option<&Json>) -> Vec<ValidationError> {
    ctx.fail(ErrorKind::InvalidType, format!("expected {expected}, found {}", describe(input)))
}

/// Wrap a decoder with an extra check on its output. Meant for decoder
/// override slots, e.g. a number field that must also be positive.
pub fn with_check(
    decoder: Decoder,
    message: impl Into<String>,
    check: impl Fn(&Value) -> bool + Send + Sync + 'static,
) -> Decoder {
    Arc::new(Checked { inner: decoder, message: message.into(), check: Box::new(check) })
}

struct Checked {
    inner: Decoder,
    message: String,
    check: Box<dyn Fn(&Value) -> bool + Send + Sync>,
}

impl Decode for Checked {
    fn validate(&self, input: Option<&Json>, ctx: &mut Context) -> Validation<Value> {
        let value = self.inner.validate(input, ctx)?;
        if (self.check)(&value) { Ok(value) } else { Err(ctx.fail(ErrorKind::Custom, self.message.clone())) }
    }

    fn declared_keys(&self, input: Option<&Json>) -> Option<Vec<String>> {
        self.inner.declared_keys(input)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// PRIMITIVES
// ————————————————————————————————————————————————————————————————————————————

struct PrimitiveDecoder {
    name: String,
    primitive: Primitive,
}

impl Decode for PrimitiveDecoder {
    fn validate(&self, input: Option<&Json>, ctx: &mut Context) -> Validation<Value> {
        match (&self.primitive, input) {
            (Primitive::String, Some(Json::String(s))) => Ok(Value::String(s.clone())),
            (Primitive::Number, Some(Json::Number(n))) => match n.as_f64() {
                Some(f) => Ok(Value::Number(OrderedFloat(f))),
                None => Err(mismatch(ctx, &self.name, input)),
            },
            (Primitive::Boolean, Some(Json::Bool(b))) => Ok(Value::Bool(*b)),
            (Primitive::Date, Some(Json::String(s))) => match DateTime::parse_from_rfc3339(s) {
                Ok(d) => Ok(Value::Date(d.with_timezone(&Utc))),
                Err(e) => Err(ctx.fail(ErrorKind::InvalidType, format!("expected an RFC 3339 date, found {s:?} ({e})"))),
            },
            (Primitive::Uuid, Some(Json::String(s))) if UUID_RE.is_match(s) => Ok(Value::String(s.clone())),
            (Primitive::BigInt, Some(Json::String(s))) => match s.parse::<i128>() {
                Ok(i) => Ok(Value::BigInt(i)),
                Err(_) => Err(ctx.fail(ErrorKind::InvalidType, format!("expected an integer string, found {s:?}"))),
            },
            (Primitive::Literal(lit), Some(json)) => {
                if literal_matches(lit, json) {
                    Ok(lit.to_value())
                } else {
                    Err(ctx.fail(ErrorKind::InvalidLiteral, format!("expected {}, found {}", self.name, describe(input))))
                }
            }
            (Primitive::OneOf(options), Some(Json::String(s))) => {
                if options.iter().any(|o| o == s) {
                    Ok(Value::String(s.clone()))
                } else {
                    Err(ctx.fail(ErrorKind::InvalidLiteral, format!("expected {}, found {s:?}", self.name)))
                }
            }
            _ => Err(mismatch(ctx, &self.name, input)),
        }
    }
}

fn literal_matches(lit: &Literal, json: &Json) -> bool {
    match (lit, json) {
        (Literal::String(a), Json::String(b)) => a == b,
        (Literal::Number(a), Json::Number(b)) => b.as_f64() == Some(a.0),
        (Literal::Bool(a), Json::Bool(b)) => a == b,
        _ => false,
    }
}

// ————————————————————————————————————————————————————————————————————————————
// RECORD-SHAPED
// ————————————————————————————————————————————————————————————————————————————

struct StructDecoder {
    name: String,
    required: Vec<(String, Decoder)>,
    partial: Vec<(String, Decoder)>,
}

impl Decode for StructDecoder {
    fn validate(&self, input: Option<&Json>, ctx: &mut Context) -> Validation<Value> {
        let check_excess = ctx.take_excess_check();
        let Some(Json::Object(obj)) = input else {
            return Err(mismatch(ctx, &self.name, input));
        };
        let mut out = IndexMap::new();
        let mut errors = Vec::new();

        for (key, decoder) in &self.required {
            let field = obj.get(key);
            let result = ctx.at(Segment::Key(key.clone()), |ctx| match decoder.validate(field, ctx) {
                Err(_) if field.is_none() => {
                    Err(ctx.fail(ErrorKind::MissingProperty, format!("missing required property `{key}`")))
                }
                other => other,
            });
            collect_field(key, result, &mut out, &mut errors);
        }
        for (key, decoder) in &self.partial {
            let Some(field) = obj.get(key) else { continue };
            let result = ctx.at(Segment::Key(key.clone()), |ctx| decoder.validate(Some(field), ctx));
            collect_field(key, result, &mut out, &mut errors);
        }
        if check_excess {
            let declared: HashSet<&str> = self.required.iter().chain(self.partial.iter()).map(|(k, _)| k.as_str()).collect();
            errors.extend(excess_keys(ctx, obj, &declared, &self.name));
        }

        if errors.is_empty() { Ok(Value::Record(out)) } else { Err(errors) }
    }

    fn declared_keys(&self, _input: Option<&Json>) -> Option<Vec<String>> {
        Some(self.required.iter().chain(self.partial.iter()).map(|(k, _)| k.clone()).collect())
    }
}

fn collect_field(
    key: &str,
    result: Validation<Value>,
    out: &mut IndexMap<String, Value>,
    errors: &mut Vec<ValidationError>,
) {
    match result {
        Ok(Value::Undefined) => {}
        Ok(v) => {
            out.insert(key.to_string(), v);
        }
        Err(e) => errors.extend(e),
    }
}

fn excess_keys(
    ctx: &mut Context,
    obj: &serde_json::Map<String, Json>,
    declared: &HashSet<&str>,
    owner: &str,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for key in obj.keys().filter(|k| !declared.contains(k.as_str())) {
        ctx.at(Segment::Key(key.clone()), |ctx| {
            errors.extend(ctx.fail(ErrorKind::ExcessProperty, format!("excess property `{key}` is not declared by {owner}")));
        });
    }
    errors
}

struct IntersectionDecoder {
    members: Vec<Decoder>,
}

impl Decode for IntersectionDecoder {
    fn validate(&self, input: Option<&Json>, ctx: &mut Context) -> Validation<Value> {
        let check_excess = ctx.take_excess_check();
        let mut acc: Validation<Vec<Value>> = Ok(Vec::with_capacity(self.members.len()));
        for member in &self.members {
            ctx.defer_excess = true;
            let result = member.validate(input, ctx);
            ctx.defer_excess = false;
            acc = zip(acc, result).map(|(mut xs, x)| {
                xs.push(x);
                xs
            });
        }
        let mut excess = Vec::new();
        if check_excess {
            if let (Some(Json::Object(obj)), Some(keys)) = (input, self.declared_keys(input)) {
                let declared: HashSet<&str> = keys.iter().map(String::as_str).collect();
                excess = excess_keys(ctx, obj, &declared, "any intersection member");
            }
        }
        match acc {
            Ok(parts) if excess.is_empty() => Ok(merge_all(input, parts).unwrap_or(Value::Undefined)),
            Ok(_) => Err(excess),
            Err(mut errors) => {
                errors.extend(excess);
                Err(errors)
            }
        }
    }

    fn declared_keys(&self, input: Option<&Json>) -> Option<Vec<String>> {
        let mut keys: Vec<String> = Vec::new();
        for member in &self.members {
            for key in member.declared_keys(input)? {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        Some(keys)
    }
}

struct TaggedUnionDecoder {
    name: String,
    tag: String,
    members: IndexMap<String, Decoder>,
}

impl Decode for TaggedUnionDecoder {
    fn validate(&self, input: Option<&Json>, ctx: &mut Context) -> Validation<Value> {
        let Some(Json::Object(obj)) = input else {
            return Err(mismatch(ctx, &self.name, input));
        };
        let Some(tag_value) = obj.get(&self.tag) else {
            return Err(ctx.fail(ErrorKind::MissingDiscriminant, format!("missing discriminant `{}`", self.tag)));
        };
        match tag_value.as_str().and_then(|t| self.members.get(t)) {
            // the member re-validates the discriminant itself
            Some(member) => member.validate(input, ctx),
            None => {
                let known = self.members.keys().map(|k| format!("{k:?}")).collect::<Vec<_>>().join(", ");
                let found = describe(Some(tag_value));
                Err(ctx.at(Segment::Key(self.tag.clone()), |ctx| {
                    ctx.fail(ErrorKind::UnknownTag, format!("unknown tag {found}, expected one of {known}"))
                }))
            }
        }
    }

    /// Keys of the member the input's tag selects, or of every member when
    /// the tag matches none.
    fn declared_keys(&self, input: Option<&Json>) -> Option<Vec<String>> {
        let tag = input.and_then(|json| json.get(&self.tag)).and_then(Json::as_str);
        if let Some(member) = tag.and_then(|t| self.members.get(t)) {
            return member.declared_keys(input);
        }
        let mut keys = vec![self.tag.clone()];
        for member in self.members.values() {
            for key in member.declared_keys(input)? {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        Some(keys)
    }
}

struct RecordDecoder {
    name: String,
    value: Decoder,
}

impl Decode for RecordDecoder {
    fn validate(&self, input: Option<&Json>, ctx: &mut Context) -> Validation<Value> {
        ctx.take_excess_check();
        let Some(Json::Object(obj)) = input else {
            return Err(mismatch(ctx, &self.name, input));
        };
        let mut out = IndexMap::new();
        let mut errors = Vec::new();
        for (key, field) in obj {
            let result = ctx.at(Segment::Key(key.clone()), |ctx| self.value.validate(Some(field), ctx));
            collect_field(key, result, &mut out, &mut errors);
        }
        if errors.is_empty() { Ok(Value::Record(out)) } else { Err(errors) }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SEQUENCES
// ————————————————————————————————————————————————————————————————————————————

fn validate_items(item: &Decoder, xs: &[Json], ctx: &mut Context) -> Validation<Vec<Value>> {
    let mut out = Vec::with_capacity(xs.len());
    let mut errors = Vec::new();
    for (ix, x) in xs.iter().enumerate() {
        match ctx.at(Segment::Index(ix), |ctx| item.validate(Some(x), ctx)) {
            Ok(v) => out.push(v),
            Err(e) => errors.extend(e),
        }
    }
    if errors.is_empty() { Ok(out) } else { Err(errors) }
}

struct ArrayDecoder {
    name: String,
    item: Decoder,
    non_empty: bool,
}

impl Decode for ArrayDecoder {
    fn validate(&self, input: Option<&Json>, ctx: &mut Context) -> Validation<Value> {
        ctx.take_excess_check();
        let Some(Json::Array(xs)) = input else {
            return Err(mismatch(ctx, &self.name, input));
        };
        if self.non_empty && xs.is_empty() {
            return Err(ctx.fail(ErrorKind::EmptyArray, format!("expected {}, found an empty array", self.name)));
        }
        validate_items(&self.item, xs, ctx).map(Value::Array)
    }
}

struct SetDecoder {
    name: String,
    item: Decoder,
    order: Comparator,
}

impl Decode for SetDecoder {
    fn validate(&self, input: Option<&Json>, ctx: &mut Context) -> Validation<Value> {
        ctx.take_excess_check();
        let Some(Json::Array(xs)) = input else {
            return Err(mismatch(ctx, &self.name, input));
        };
        let mut items = validate_items(&self.item, xs, ctx)?;
        items.sort_by(|a, b| self.order.compare(a, b));
        items.dedup_by(|a, b| self.order.compare(a, b).is_eq());
        Ok(Value::Set(items))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// WRAPPERS
// ————————————————————————————————————————————————————————————————————————————

struct OptionalDecoder {
    inner: Decoder,
}

impl Decode for OptionalDecoder {
    fn validate(&self, input: Option<&Json>, ctx: &mut Context) -> Validation<Value> {
        match input {
            None => Ok(Value::Undefined),
            Some(_) => self.inner.validate(input, ctx),
        }
    }

    fn declared_keys(&self, input: Option<&Json>) -> Option<Vec<String>> {
        self.inner.declared_keys(input)
    }
}

struct NullableDecoder {
    name: String,
    inner: Decoder,
}

impl Decode for NullableDecoder {
    fn validate(&self, input: Option<&Json>, ctx: &mut Context) -> Validation<Value> {
        match input {
            Some(Json::Null) => Ok(Value::none()),
            None => Err(mismatch(ctx, &self.name, input)),
            Some(_) => self.inner.validate(input, ctx).map(Value::some),
        }
    }

    fn declared_keys(&self, input: Option<&Json>) -> Option<Vec<String>> {
        self.inner.declared_keys(input)
    }
}

/// Shared shape of `{"_tag": .., <field>: ..}` transport objects.
fn tagged_field<'a>(
    name: &str,
    input: Option<&'a Json>,
    ctx: &Context,
    cases: &[(&str, Option<&str>)],
) -> Validation<(usize, Option<&'a Json>)> {
    let Some(Json::Object(obj)) = input else {
        return Err(mismatch(ctx, name, input));
    };
    let tag = obj.get("_tag").and_then(Json::as_str);
    match cases.iter().position(|(case, _)| Some(*case) == tag) {
        Some(ix) => Ok((ix, cases[ix].1.and_then(|field| obj.get(field)))),
        None => {
            let known = cases.iter().map(|(c, _)| format!("{c:?}")).collect::<Vec<_>>().join(", ");
            Err(ctx.fail(
                ErrorKind::UnknownTag,
                format!("expected {name} with `_tag` one of {known}, found {}", describe(obj.get("_tag"))),
            ))
        }
    }
}

struct EitherDecoder {
    name: String,
    left: Decoder,
    right: Decoder,
}

impl Decode for EitherDecoder {
    fn validate(&self, input: Option<&Json>, ctx: &mut Context) -> Validation<Value> {
        ctx.take_excess_check();
        let (case, field) = tagged_field(&self.name, input, ctx, &[("Left", Some("left")), ("Right", Some("right"))])?;
        if case == 0 {
            let v = ctx.at(Segment::Key("left".into()), |ctx| self.left.validate(field, ctx))?;
            Ok(Value::Either(Either::Left(Box::new(v))))
        } else {
            let v = ctx.at(Segment::Key("right".into()), |ctx| self.right.validate(field, ctx))?;
            Ok(Value::Either(Either::Right(Box::new(v))))
        }
    }
}

struct OptionDecoder {
    name: String,
    inner: Decoder,
}

impl Decode for OptionDecoder {
    fn validate(&self, input: Option<&Json>, ctx: &mut Context) -> Validation<Value> {
        ctx.take_excess_check();
        let (case, field) = tagged_field(&self.name, input, ctx, &[("None", None), ("Some", Some("value"))])?;
        if case == 0 {
            return Ok(Value::none());
        }
        let v = ctx.at(Segment::Key("value".into()), |ctx| self.inner.validate(field, ctx))?;
        Ok(Value::some(v))
    }
}

/// Delegates to the recursive definition, deriving it on first call.
struct LazyDecoder {
    target: Deferred<DecodeInterpreter>,
}

impl Decode for LazyDecoder {
    fn validate(&self, input: Option<&Json>, ctx: &mut Context) -> Validation<Value> {
        self.target.force().validate(input, ctx)
    }

    fn declared_keys(&self, input: Option<&Json>) -> Option<Vec<String>> {
        self.target.force().declared_keys(input)
    }
}

struct RefinedDecoder {
    inner: Decoder,
    refinement: Refinement,
}

impl Decode for RefinedDecoder {
    fn validate(&self, input: Option<&Json>, ctx: &mut Context) -> Validation<Value> {
        let value = self.inner.validate(input, ctx)?;
        if self.refinement.test(&value) {
            Ok(value)
        } else {
            Err(ctx.fail(
                ErrorKind::RefinementFailed,
                format!("value does not satisfy refinement `{}`", self.refinement.name),
            ))
        }
    }

    fn declared_keys(&self, input: Option<&Json>) -> Option<Vec<String>> {
        self.inner.declared_keys(input)
    }
}

struct NewtypeDecoder {
    inner: Decoder,
    newtype: Newtype,
}

impl Decode for NewtypeDecoder {
    fn validate(&self, input: Option<&Json>, ctx: &mut Context) -> Validation<Value> {
        let base = self.inner.validate(input, ctx)?;
        match self.newtype.mapping.get(base) {
            Some(value) => Ok(value),
            None => Err(ctx.fail(
                ErrorKind::PrismMismatch,
                format!("value does not match newtype `{}`", self.newtype.name),
            )),
        }
    }

    fn declared_keys(&self, input: Option<&Json>) -> Option<Vec<String>> {
        self.inner.declared_keys(input)
    }
}

struct UnknownDecoder;

impl Decode for UnknownDecoder {
    fn validate(&self, input: Option<&Json>, ctx: &mut Context) -> Validation<Value> {
        ctx.take_excess_check();
        match input {
            Some(json @ Json::Object(_)) => Ok(Value::Unknown(json.clone())),
            _ => Err(mismatch(ctx, "an object", input)),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERPRETER
// ————————————————————————————————————————————————————————————————————————————

impl Interpreter for DecodeInterpreter {
    type Behavior = Decoder;
    const ID: InterpreterId = InterpreterId::Decoder;

    fn primitive(&self, node: &Node, primitive: &Primitive) -> Decoder {
        Arc::new(PrimitiveDecoder { name: node.name().to_string(), primitive: primitive.clone() })
    }

    fn struct_(&self, node: &Node, required: Vec<(String, Decoder)>, partial: Vec<(String, Decoder)>) -> Decoder {
        Arc::new(StructDecoder { name: node.name().to_string(), required, partial })
    }

    fn intersection(&self, _node: &Node, members: Vec<Decoder>) -> Decoder {
        Arc::new(IntersectionDecoder { members })
    }

    fn tagged_union(&self, node: &Node, tag: &str, members: Vec<(String, Decoder)>) -> Decoder {
        Arc::new(TaggedUnionDecoder {
            name: node.name().to_string(),
            tag: tag.to_string(),
            members: members.into_iter().collect(),
        })
    }

    fn record(&self, node: &Node, value: Decoder) -> Decoder {
        Arc::new(RecordDecoder { name: node.name().to_string(), value })
    }

    fn set(&self, node: &Node, item: Decoder, order: &Comparator) -> Decoder {
        Arc::new(SetDecoder { name: node.name().to_string(), item, order: order.clone() })
    }

    fn array(&self, node: &Node, item: Decoder, non_empty: bool) -> Decoder {
        Arc::new(ArrayDecoder { name: node.name().to_string(), item, non_empty })
    }

    fn optional(&self, _node: &Node, inner: Decoder) -> Decoder {
        Arc::new(OptionalDecoder { inner })
    }

    fn nullable(&self, node: &Node, inner: Decoder) -> Decoder {
        Arc::new(NullableDecoder { name: node.name().to_string(), inner })
    }

    fn either(&self, node: &Node, left: Decoder, right: Decoder) -> Decoder {
        Arc::new(EitherDecoder { name: node.name().to_string(), left, right })
    }

    fn option(&self, node: &Node, inner: Decoder) -> Decoder {
        Arc::new(OptionDecoder { name: node.name().to_string(), inner })
    }

    fn recursive(&self, _node: &Node, target: Deferred<Self>) -> Decoder {
        Arc::new(LazyDecoder { target })
    }

    fn refined(&self, _node: &Node, inner: Decoder, refinement: &Refinement) -> Decoder {
        Arc::new(RefinedDecoder { inner, refinement: refinement.clone() })
    }

    fn newtype(&self, _node: &Node, inner: Decoder, newtype: &Newtype) -> Decoder {
        Arc::new(NewtypeDecoder { inner, newtype: newtype.clone() })
    }

    fn unknown(&self, _node: &Node) -> Decoder {
        Arc::new(UnknownDecoder)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::derive::derive;
    use crate::schema::*;
    use serde_json::json;

    fn run(schema: &crate::Schema, input: Json) -> Validation<Value> {
        let decoder = derive(schema, &DecodeInterpreter);
        decoder.validate(Some(&input), &mut Context::new(DecodeOptions::default()))
    }

    fn run_exact(schema: &crate::Schema, input: Json) -> Validation<Value> {
        let decoder = derive(schema, &DecodeInterpreter);
        decoder.validate(Some(&input), &mut Context::new(DecodeOptions::exact()))
    }

    #[test]
    fn primitives() {
        assert_eq!(run(&string(), json!("x")).unwrap(), Value::from("x"));
        assert_eq!(run(&number(), json!(1.5)).unwrap(), Value::number(1.5));
        assert_eq!(run(&boolean(), json!(true)).unwrap(), Value::Bool(true));
        assert_eq!(run(&bigint(), json!("-12345678901234567890")).unwrap(), Value::BigInt(-12345678901234567890));
        assert!(run(&bigint(), json!(12)).is_err());
        assert!(run(&uuid(), json!("9f0e3e2c-1b2a-4c3d-8e4f-5a6b7c8d9e0f")).is_ok());
        assert!(run(&uuid(), json!("not-a-uuid")).is_err());
        let errs = run(&number(), json!("x")).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].message, "expected number, found string \"x\"");
    }

    #[test]
    fn dates_normalize_to_utc() {
        let v = run(&date(), json!("2024-03-01T12:00:00+02:00")).unwrap();
        let Value::Date(d) = v else { panic!("date expected") };
        assert_eq!(d.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        let errs = run(&date(), json!("yesterday")).unwrap_err();
        assert_eq!(errs[0].kind, ErrorKind::InvalidType);
    }

    #[test]
    fn literals() {
        assert!(run(&string_literal("Foo"), json!("Foo")).is_ok());
        let errs = run(&string_literal("Foo"), json!("Bar")).unwrap_err();
        assert_eq!(errs[0].kind, ErrorKind::InvalidLiteral);
        assert!(run(&number_literal(2.0), json!(2)).is_ok());
        assert!(run(&boolean_literal(false), json!(true)).is_err());
        assert!(run(&one_of_literals(["a", "b"]), json!("b")).is_ok());
        assert!(run(&one_of_literals(["a", "b"]), json!("c")).is_err());
    }

    #[test]
    fn struct_errors_accumulate_with_paths() {
        let s = struct_([("a", number()), ("b", number())]);
        let errs = run(&s, json!({"a": "x", "b": "y"})).unwrap_err();
        assert_eq!(errs.len(), 2);
        assert_eq!(errs[0].path, "a");
        assert_eq!(errs[1].path, "b");
    }

    #[test]
    fn nested_paths() {
        let address = struct_([("street", string())]);
        let s = struct_([("address", array(address))]);
        let errs = run(&s, json!({"address": [{"street": "a"}, {"street": "b"}, {"street": 3}]})).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].path, "address[2].street");
    }

    #[test]
    fn missing_required_keys() {
        let s = struct_([("a", string()), ("b", optional(string()))]);
        let errs = run(&s, json!({})).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ErrorKind::MissingProperty);
        assert_eq!(errs[0].path, "a");
        let v = run(&s, json!({"a": "x"})).unwrap();
        assert_eq!(v, Value::record([("a", Value::from("x"))]));
    }

    #[test]
    fn partial_fields_are_omitted_when_absent() {
        let s = both_struct([("id", string())], [("note", string())]);
        let v = run(&s, json!({"id": "x"})).unwrap();
        assert!(v.as_record().unwrap().get("note").is_none());
        let errs = run(&s, json!({"id": "x", "note": null})).unwrap_err();
        assert_eq!(errs[0].path, "note");
    }

    #[test]
    fn undeclared_keys_are_stripped_or_rejected() {
        let s = struct_([("a", string())]);
        let v = run(&s, json!({"a": "x", "b": 1, "c": 2})).unwrap();
        assert_eq!(v.as_record().unwrap().len(), 1);
        let errs = run_exact(&s, json!({"a": "x", "b": 1, "c": 2})).unwrap_err();
        assert_eq!(errs.len(), 2);
        assert!(errs.iter().all(|e| e.kind == ErrorKind::ExcessProperty));
        assert_eq!(errs[0].path, "b");
    }

    #[test]
    fn exact_intersection_checks_union_of_keys() {
        let s = intersection([struct_([("a", string())]), partial([("b", string())])]);
        assert!(run_exact(&s, json!({"a": "x", "b": "y"})).is_ok());
        let errs = run_exact(&s, json!({"a": "x", "z": 1})).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].path, "z");
    }

    #[test]
    fn exact_mode_reaches_nested_structs() {
        let inner = struct_([("x", number())]);
        let s = intersection([struct_([("inner", inner)]), struct_([("b", string())])]);
        let errs = run_exact(&s, json!({"inner": {"x": 1, "y": 2}, "b": "b"})).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].path, "inner.y");
    }

    #[test]
    fn exact_intersection_with_tagged_union() {
        let a = struct_([("_tag", string_literal("A")), ("a", optional(number()))]);
        let b = struct_([("_tag", string_literal("B")), ("b", number())]);
        let s = intersection([tagged_union("_tag", [("A", a), ("B", b)]), struct_([("x", number())])]);
        assert!(run_exact(&s, json!({"_tag": "A", "x": 1})).is_ok());
        let errs = run_exact(&s, json!({"_tag": "A", "x": 1, "bogus": true})).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ErrorKind::ExcessProperty);
        assert_eq!(errs[0].path, "bogus");
        // keys of the other member do not count for this tag
        let errs = run_exact(&s, json!({"_tag": "A", "x": 1, "b": 2})).unwrap_err();
        assert_eq!(errs[0].path, "b");
    }

    #[test]
    fn intersection_with_unknown_keeps_extra_keys() {
        let s = intersection([struct_([("a", string())]), unknown()]);
        let v = run(&s, json!({"a": "x", "extra": 1})).unwrap();
        assert_eq!(v.get("a"), &Value::from("x"));
        assert_eq!(v.get("extra"), &Value::Unknown(json!(1)));
        let encoded = derive(&s, &crate::interpret::encode::EncodeInterpreter).encode(&v);
        assert_eq!(encoded, Some(json!({"a": "x", "extra": 1})));
    }

    #[test]
    fn intersection_keeps_rewritten_fields() {
        let s = intersection([struct_([("a", option(number()))]), struct_([("b", string())])]);
        let v = run(&s, json!({"a": {"_tag": "None"}, "b": "x"})).unwrap();
        assert_eq!(v, Value::record([("a", Value::none()), ("b", Value::from("x"))]));
    }

    #[test]
    fn tagged_union_dispatch() {
        let foo = struct_([("_tag", string_literal("Foo")), ("a", string())]);
        let bar = struct_([("_tag", string_literal("Bar")), ("b", number())]);
        let u = tagged_union("_tag", [("Foo", foo), ("Bar", bar)]);
        assert!(run(&u, json!({"_tag": "Bar", "b": 1})).is_ok());
        let errs = run(&u, json!({"_tag": "Bar", "b": "x"})).unwrap_err();
        assert_eq!(errs[0].path, "b");
        let errs = run(&u, json!({"_tag": "Unknown"})).unwrap_err();
        assert_eq!(errs[0].kind, ErrorKind::UnknownTag);
        assert!(errs[0].message.contains("\"Foo\"") && errs[0].message.contains("\"Bar\""));
        let errs = run(&u, json!({"a": "x"})).unwrap_err();
        assert_eq!(errs[0].kind, ErrorKind::MissingDiscriminant);
    }

    #[test]
    fn sets_collapse_duplicates() {
        let s = set(number(), Comparator::natural());
        let v = run(&s, json!([3, 1, 3, 2, 1])).unwrap();
        assert_eq!(v, Value::Set(vec![Value::number(1.0), Value::number(2.0), Value::number(3.0)]));
    }

    #[test]
    fn non_empty_arrays() {
        let errs = run(&non_empty_array(string()), json!([])).unwrap_err();
        assert_eq!(errs[0].kind, ErrorKind::EmptyArray);
        assert!(run(&non_empty_array(string()), json!(["a"])).is_ok());
    }

    #[test]
    fn records_decode_every_value() {
        let errs = run(&record(number()), json!({"a": 1, "b": "x", "c": "y"})).unwrap_err();
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn nullable_and_option_and_either() {
        assert_eq!(run(&nullable(string()), json!(null)).unwrap(), Value::none());
        assert_eq!(run(&nullable(string()), json!("a")).unwrap(), Value::some(Value::from("a")));
        assert_eq!(run(&option(number()), json!({"_tag": "None"})).unwrap(), Value::none());
        assert_eq!(
            run(&option(number()), json!({"_tag": "Some", "value": 1})).unwrap(),
            Value::some(Value::number(1.0))
        );
        let errs = run(&option(number()), json!({"_tag": "Some", "value": "x"})).unwrap_err();
        assert_eq!(errs[0].path, "value");
        let e = either(string(), number());
        assert_eq!(run(&e, json!({"_tag": "Right", "right": 2})).unwrap(), Value::right(Value::number(2.0)));
        assert!(run(&e, json!({"_tag": "Middle"})).is_err());
    }

    #[test]
    fn refinements_and_prisms() {
        let positive = refined(number(), "Positive", |v| v.as_f64().is_some_and(|n| n > 0.0));
        assert!(run(&positive, json!(1)).is_ok());
        let errs = run(&positive, json!(-1)).unwrap_err();
        assert_eq!(errs[0].kind, ErrorKind::RefinementFailed);
        assert!(errs[0].message.contains("Positive"));

        let even = prism_newtype(
            "Even",
            number(),
            Prism::new(
                |v| v.as_f64().filter(|n| n % 2.0 == 0.0).map(|n| Value::BigInt(n as i128)),
                |v| match v {
                    Value::BigInt(i) => Value::number(*i as f64),
                    other => other.clone(),
                },
            ),
        );
        assert_eq!(run(&even, json!(4)).unwrap(), Value::BigInt(4));
        assert_eq!(run(&even, json!(3)).unwrap_err()[0].kind, ErrorKind::PrismMismatch);
    }

    #[test]
    fn unknown_accepts_any_object() {
        assert_eq!(run(&unknown(), json!({"x": [1]})).unwrap(), Value::Unknown(json!({"x": [1]})));
        assert!(run(&unknown(), json!([1])).is_err());
    }

    #[test]
    fn decoder_override_runs_last() {
        let cfg = Config::new().with::<DecodeInterpreter, _>(|decoder, _, _| {
            with_check(decoder, "must be at most 10", |v| v.as_f64().is_some_and(|n| n <= 10.0))
        });
        let s = struct_([("n", number().with_config(cfg))]);
        assert!(run(&s, json!({"n": 3})).is_ok());
        let errs = run(&s, json!({"n": 11})).unwrap_err();
        assert_eq!(errs[0].kind, ErrorKind::Custom);
        assert_eq!(errs[0].path, "n");
        // the default decoder still runs first
        assert_eq!(run(&s, json!({"n": "x"})).unwrap_err()[0].kind, ErrorKind::InvalidType);
    }
}
