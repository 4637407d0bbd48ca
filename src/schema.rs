//! Schema node model and the builder surface.
//!
//! A [`Schema`] is a shared handle to an immutable [`Node`]. Nodes form a tree
//! (a graph, once recursion is involved) of a closed set of kinds. The only
//! interior mutability is the per-node derivation cache and the write-once cell
//! inside recursive nodes.
use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use ordered_float::OrderedFloat;

use crate::config::Config;
use crate::derive::DerivationCache;
use crate::materialize::Materialized;
use crate::recursive::{self, Recursive, SelfRef};
use crate::value::{natural_cmp, Value};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Process-unique node identity, assigned at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        NodeId(NEXT.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared handle to a schema node. Cloning is cheap and keeps identity, which
/// is what the derivation cache keys on.
#[derive(Clone)]
pub struct Schema(Arc<Node>);

pub struct Node {
    id: NodeId,
    name: String,
    kind: Kind,
    config: Config,
    cache: DerivationCache,
}

pub enum Kind {
    Primitive(Primitive),
    /// Required, partial, or both; see [`StructShape`].
    Struct(StructShape),
    Intersection(Vec<Schema>),
    TaggedUnion(TaggedUnion),
    /// String-keyed map with a uniform value type.
    Record(Schema),
    Set(Schema, Comparator),
    Array { item: Schema, non_empty: bool },
    Optional(Schema),
    Nullable(Schema),
    Mutable(Schema),
    Either(Schema, Schema),
    Option(Schema),
    Recursive(Recursive),
    /// Back edge to an enclosing recursive node; handed to the recursive thunk.
    SelfRef(SelfRef),
    Refined(Schema, Refinement),
    Newtype(Schema, Newtype),
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    String,
    Number,
    Boolean,
    Date,
    Uuid,
    BigInt,
    Literal(Literal),
    OneOf(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(OrderedFloat<f64>),
    Bool(bool),
}

impl Literal {
    pub fn to_value(&self) -> Value {
        match self {
            Literal::String(s) => Value::String(s.clone()),
            Literal::Number(n) => Value::Number(*n),
            Literal::Bool(b) => Value::Bool(*b),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.to_value().to_json()
    }
}

/// Field layout of a struct node. A key listed in both maps is required; the
/// partial entry is dropped at construction.
#[derive(Clone, Default)]
pub struct StructShape {
    pub required: IndexMap<String, Schema>,
    pub partial: IndexMap<String, Schema>,
}

impl StructShape {
    pub fn declared_keys(&self) -> impl Iterator<Item = &str> {
        self.required.keys().chain(self.partial.keys()).map(String::as_str)
    }
}

#[derive(Clone)]
pub struct TaggedUnion {
    pub tag: String,
    pub members: IndexMap<String, Schema>,
}

/// Ordering used by set nodes to sort and collapse duplicates.
#[derive(Clone)]
pub struct Comparator(Arc<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>);

impl Comparator {
    pub fn new(f: impl Fn(&Value, &Value) -> Ordering + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Structural order over values; see [`natural_cmp`].
    pub fn natural() -> Self {
        Self::new(natural_cmp)
    }

    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        (self.0)(a, b)
    }
}

#[derive(Clone)]
pub struct Refinement {
    pub name: String,
    /// `refined` narrows the value type, `constrained` does not. Runtime
    /// behavior is the same; the flag only shows up in signatures.
    pub narrows: bool,
    predicate: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
}

impl Refinement {
    pub fn test(&self, value: &Value) -> bool {
        (self.predicate)(value)
    }
}

#[derive(Clone)]
pub struct Newtype {
    pub name: String,
    pub mapping: Mapping,
}

#[derive(Clone)]
pub enum Mapping {
    Iso(Iso),
    Prism(Prism),
}

/// Total mapping in both directions.
#[derive(Clone)]
pub struct Iso {
    get: Arc<dyn Fn(Value) -> Value + Send + Sync>,
    reverse_get: Arc<dyn Fn(&Value) -> Value + Send + Sync>,
}

impl Iso {
    pub fn new(
        get: impl Fn(Value) -> Value + Send + Sync + 'static,
        reverse_get: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self { get: Arc::new(get), reverse_get: Arc::new(reverse_get) }
    }

    pub fn get(&self, base: Value) -> Value {
        (self.get)(base)
    }

    pub fn reverse_get(&self, value: &Value) -> Value {
        (self.reverse_get)(value)
    }
}

/// Mapping that may reject base values on the way in.
#[derive(Clone)]
pub struct Prism {
    get_option: Arc<dyn Fn(Value) -> Option<Value> + Send + Sync>,
    reverse_get: Arc<dyn Fn(&Value) -> Value + Send + Sync>,
}

impl Prism {
    pub fn new(
        get_option: impl Fn(Value) -> Option<Value> + Send + Sync + 'static,
        reverse_get: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self { get_option: Arc::new(get_option), reverse_get: Arc::new(reverse_get) }
    }

    pub fn get_option(&self, base: Value) -> Option<Value> {
        (self.get_option)(base)
    }

    pub fn reverse_get(&self, value: &Value) -> Value {
        (self.reverse_get)(value)
    }
}

impl Mapping {
    pub fn reverse_get(&self, value: &Value) -> Value {
        match self {
            Mapping::Iso(iso) => iso.reverse_get(value),
            Mapping::Prism(prism) => prism.reverse_get(value),
        }
    }

    /// `None` when a prism rejects the base value.
    pub fn get(&self, base: Value) -> Option<Value> {
        match self {
            Mapping::Iso(iso) => Some(iso.get(base)),
            Mapping::Prism(prism) => prism.get_option(base),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// NODE & HANDLE
// ————————————————————————————————————————————————————————————————————————————

impl Node {
    pub(crate) fn new(name: String, kind: Kind, config: Config) -> Self {
        Self { id: NodeId::next(), name, kind, config, cache: DerivationCache::default() }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Diagnostic name; never used for identity.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn cache(&self) -> &DerivationCache {
        &self.cache
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind.label())
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Deref for Schema {
    type Target = Node;
    fn deref(&self) -> &Node {
        &self.0
    }
}

impl Schema {
    pub(crate) fn new(name: String, kind: Kind) -> Self {
        Schema(Arc::new(Node::new(name, kind, Config::default())))
    }

    pub(crate) fn from_arc(node: Arc<Node>) -> Self {
        Schema(node)
    }

    pub(crate) fn downgrade(&self) -> Weak<Node> {
        Arc::downgrade(&self.0)
    }

    /// Same node, not merely an equal-looking one.
    pub fn ptr_eq(&self, other: &Schema) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Rebuild this node under a new diagnostic name. The result is a new node.
    pub fn named(self, name: impl Into<String>) -> Self {
        let config = self.config.clone();
        self.respawn(name.into(), config)
    }

    /// Rebuild this node with `config` merged over its existing slots. The
    /// result is a new node, so nothing derived from the old one is reused.
    pub fn with_config(self, config: Config) -> Self {
        let merged = self.config.clone().merge(config);
        let name = self.name.clone();
        self.respawn(name, merged)
    }

    /// Bind this schema to every built-in interpreter.
    pub fn materialize(&self) -> Materialized {
        Materialized::new(self)
    }

    fn respawn(&self, name: String, config: Config) -> Schema {
        match &self.kind {
            Kind::Recursive(r) => recursive::build(name, config, r.thunk()),
            kind => Schema(Arc::new(Node::new(name, kind.shallow_clone(), config))),
        }
    }
}

impl Kind {
    pub fn label(&self) -> &'static str {
        match self {
            Kind::Primitive(_) => "primitive",
            Kind::Struct(_) => "struct",
            Kind::Intersection(_) => "intersection",
            Kind::TaggedUnion(_) => "tagged_union",
            Kind::Record(_) => "record",
            Kind::Set(..) => "set",
            Kind::Array { non_empty: false, .. } => "array",
            Kind::Array { non_empty: true, .. } => "non_empty_array",
            Kind::Optional(_) => "optional",
            Kind::Nullable(_) => "nullable",
            Kind::Mutable(_) => "mutable",
            Kind::Either(..) => "either",
            Kind::Option(_) => "option",
            Kind::Recursive(_) => "recursive",
            Kind::SelfRef(_) => "self_ref",
            Kind::Refined(..) => "refined",
            Kind::Newtype(..) => "newtype",
            Kind::Unknown => "unknown",
        }
    }

    // Recursive nodes are rebuilt through `recursive::build` instead.
    fn shallow_clone(&self) -> Kind {
        match self {
            Kind::Primitive(p) => Kind::Primitive(p.clone()),
            Kind::Struct(s) => Kind::Struct(s.clone()),
            Kind::Intersection(xs) => Kind::Intersection(xs.clone()),
            Kind::TaggedUnion(u) => Kind::TaggedUnion(u.clone()),
            Kind::Record(v) => Kind::Record(v.clone()),
            Kind::Set(item, order) => Kind::Set(item.clone(), order.clone()),
            Kind::Array { item, non_empty } => Kind::Array { item: item.clone(), non_empty: *non_empty },
            Kind::Optional(x) => Kind::Optional(x.clone()),
            Kind::Nullable(x) => Kind::Nullable(x.clone()),
            Kind::Mutable(x) => Kind::Mutable(x.clone()),
            Kind::Either(l, r) => Kind::Either(l.clone(), r.clone()),
            Kind::Option(x) => Kind::Option(x.clone()),
            Kind::Recursive(_) => unreachable!("recursive nodes are rebuilt from their thunk"),
            Kind::SelfRef(r) => Kind::SelfRef(r.clone()),
            Kind::Refined(x, r) => Kind::Refined(x.clone(), r.clone()),
            Kind::Newtype(x, n) => Kind::Newtype(x.clone(), n.clone()),
            Kind::Unknown => Kind::Unknown,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// BUILDERS
// ————————————————————————————————————————————————————————————————————————————

fn primitive(name: &str, p: Primitive) -> Schema {
    Schema::new(name.to_string(), Kind::Primitive(p))
}

pub fn string() -> Schema {
    primitive("string", Primitive::String)
}

pub fn number() -> Schema {
    primitive("number", Primitive::Number)
}

pub fn boolean() -> Schema {
    primitive("boolean", Primitive::Boolean)
}

/// RFC 3339 string on the wire, `Value::Date` in memory.
pub fn date() -> Schema {
    primitive("Date", Primitive::Date)
}

/// Hyphenated UUID string.
pub fn uuid() -> Schema {
    primitive("UUID", Primitive::Uuid)
}

/// Base-10 integer string on the wire, `Value::BigInt` in memory.
pub fn bigint() -> Schema {
    primitive("bigint", Primitive::BigInt)
}

pub fn string_literal(v: impl Into<String>) -> Schema {
    let lit = Literal::String(v.into());
    Schema::new(lit.to_json().to_string(), Kind::Primitive(Primitive::Literal(lit)))
}

pub fn number_literal(v: f64) -> Schema {
    let lit = Literal::Number(OrderedFloat(v));
    Schema::new(lit.to_json().to_string(), Kind::Primitive(Primitive::Literal(lit)))
}

pub fn boolean_literal(v: bool) -> Schema {
    let lit = Literal::Bool(v);
    Schema::new(lit.to_json().to_string(), Kind::Primitive(Primitive::Literal(lit)))
}

/// String enum. Duplicates are dropped, first occurrence wins.
///
/// # Panics
///
/// If `values` is empty.
pub fn one_of_literals<I, S>(values: I) -> Schema
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for v in values {
        let v = v.into();
        if !out.contains(&v) {
            out.push(v);
        }
    }
    assert!(!out.is_empty(), "one_of_literals needs at least one literal");
    let name = out.iter().map(|s| format!("{s:?}")).collect::<Vec<_>>().join(" | ");
    Schema::new(name, Kind::Primitive(Primitive::OneOf(out)))
}

pub fn array(item: Schema) -> Schema {
    let name = format!("Array<{}>", item.name());
    Schema::new(name, Kind::Array { item, non_empty: false })
}

pub fn non_empty_array(item: Schema) -> Schema {
    let name = format!("NonEmptyArray<{}>", item.name());
    Schema::new(name, Kind::Array { item, non_empty: true })
}

pub fn record(value: Schema) -> Schema {
    let name = format!("Record<string, {}>", value.name());
    Schema::new(name, Kind::Record(value))
}

pub fn set(item: Schema, order: Comparator) -> Schema {
    let name = format!("Set<{}>", item.name());
    Schema::new(name, Kind::Set(item, order))
}

pub fn nullable(inner: Schema) -> Schema {
    let name = format!("{} | null", inner.name());
    Schema::new(name, Kind::Nullable(inner))
}

pub fn optional(inner: Schema) -> Schema {
    let name = format!("{} | undefined", inner.name());
    Schema::new(name, Kind::Optional(inner))
}

pub fn mutable(inner: Schema) -> Schema {
    let name = inner.name().to_string();
    Schema::new(name, Kind::Mutable(inner))
}

pub fn either(left: Schema, right: Schema) -> Schema {
    let name = format!("Either<{}, {}>", left.name(), right.name());
    Schema::new(name, Kind::Either(left, right))
}

pub fn option(inner: Schema) -> Schema {
    let name = format!("Option<{}>", inner.name());
    Schema::new(name, Kind::Option(inner))
}

fn collect_fields<K, I>(fields: I) -> IndexMap<String, Schema>
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Schema)>,
{
    fields.into_iter().map(|(k, s)| (k.into(), s)).collect()
}

fn struct_name(shape: &StructShape) -> String {
    let fields = shape
        .required
        .iter()
        .map(|(k, s)| format!("{k}: {}", s.name()))
        .chain(shape.partial.iter().map(|(k, s)| format!("{k}?: {}", s.name())))
        .collect::<Vec<_>>();
    if fields.is_empty() { "{}".to_string() } else { format!("{{ {} }}", fields.join(", ")) }
}

/// Struct whose every field is required.
pub fn struct_<K, I>(fields: I) -> Schema
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Schema)>,
{
    both_struct(collect_fields(fields), IndexMap::<String, Schema>::new())
}

/// Struct whose every field may be absent.
pub fn partial<K, I>(fields: I) -> Schema
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Schema)>,
{
    both_struct(IndexMap::<String, Schema>::new(), collect_fields(fields))
}

pub fn both_struct<K1, I1, K2, I2>(required: I1, partial: I2) -> Schema
where
    K1: Into<String>,
    I1: IntoIterator<Item = (K1, Schema)>,
    K2: Into<String>,
    I2: IntoIterator<Item = (K2, Schema)>,
{
    let required = collect_fields(required);
    let partial = collect_fields(partial)
        .into_iter()
        .filter(|(k, _)| !required.contains_key(k))
        .collect();
    let shape = StructShape { required, partial };
    Schema::new(struct_name(&shape), Kind::Struct(shape))
}

/// # Panics
///
/// With fewer than two members.
pub fn intersection(members: impl IntoIterator<Item = Schema>) -> Schema {
    let members: Vec<Schema> = members.into_iter().collect();
    assert!(members.len() >= 2, "intersection needs at least two members, got {}", members.len());
    let name = format!("({})", members.iter().map(|m| m.name()).collect::<Vec<_>>().join(" & "));
    Schema::new(name, Kind::Intersection(members))
}

/// Union of record-shaped members discriminated by the `tag` field. Keys of
/// `members` are the discriminant values.
///
/// # Panics
///
/// With no members.
pub fn tagged_union<K, I>(tag: impl Into<String>, members: I) -> Schema
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Schema)>,
{
    let members = collect_fields(members);
    assert!(!members.is_empty(), "tagged union needs at least one member");
    let name = format!("({})", members.values().map(|m| m.name()).collect::<Vec<_>>().join(" | "));
    Schema::new(name, Kind::TaggedUnion(TaggedUnion { tag: tag.into(), members }))
}

/// Self-referential schema. `f` receives a handle to the node being defined
/// and runs once, on first use.
pub fn recursive<F>(name: impl Into<String>, f: F) -> Schema
where
    F: Fn(Schema) -> Schema + Send + Sync + 'static,
{
    recursive::build(name.into(), Config::default(), Arc::new(f))
}

fn refinement(
    inner: Schema,
    name: String,
    narrows: bool,
    predicate: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
) -> Schema {
    let refinement = Refinement { name: name.clone(), narrows, predicate };
    Schema::new(name, Kind::Refined(inner, refinement))
}

pub fn refined(
    inner: Schema,
    name: impl Into<String>,
    predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
) -> Schema {
    refinement(inner, name.into(), true, Arc::new(predicate))
}

pub fn constrained(
    inner: Schema,
    name: impl Into<String>,
    predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
) -> Schema {
    refinement(inner, name.into(), false, Arc::new(predicate))
}

pub fn iso_newtype(name: impl Into<String>, inner: Schema, iso: Iso) -> Schema {
    let name = name.into();
    Schema::new(name.clone(), Kind::Newtype(inner, Newtype { name, mapping: Mapping::Iso(iso) }))
}

pub fn prism_newtype(name: impl Into<String>, inner: Schema, prism: Prism) -> Schema {
    let name = name.into();
    Schema::new(name.clone(), Kind::Newtype(inner, Newtype { name, mapping: Mapping::Prism(prism) }))
}

/// Any JSON object, kept as-is.
pub fn unknown() -> Schema {
    Schema::new("UnknownRecord".to_string(), Kind::Unknown)
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
