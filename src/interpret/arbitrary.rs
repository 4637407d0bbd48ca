//! Example-value generation for property tests.
//!
//! Generators draw from a seeded [`StdRng`], so a seed reproduces a run. Depth
//! grows only when a recursive boundary is crossed; once it reaches
//! [`GenerateOptions::max_depth`] every container picks its smallest shape so
//! recursion terminates.
use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde_json::{Map, Value as Json};

use crate::derive::{Deferred, Interpreter, InterpreterId, derive};
use crate::interpret::merge_all;
use crate::schema::{Comparator, Mapping, Newtype, Node, Primitive, Refinement, Schema};
use crate::value::Value;

/// Attempts before a refinement or prism gives up.
const MAX_RETRIES: usize = 100;

/// Largest generated timestamp: 2100-01-01T00:00:00Z.
const MAX_MILLIS: i64 = 4_102_444_800_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    pub seed: u64,
    /// Recursive boundaries crossed before generation bottoms out.
    pub max_depth: usize,
    /// Upper bound on array, set and record sizes.
    pub max_len: usize,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self { seed: 0, max_depth: 4, max_len: 4 }
    }
}

/// Generation state threaded through every generator.
#[derive(Clone)]
pub struct Gen {
    rng: StdRng,
    depth: usize,
    options: GenerateOptions,
}

impl Gen {
    pub fn new(options: GenerateOptions) -> Self {
        Self { rng: StdRng::seed_from_u64(options.seed), depth: 0, options }
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True once the depth budget is spent.
    pub fn exhausted(&self) -> bool {
        self.depth >= self.options.max_depth
    }

    fn len(&mut self, min: usize) -> usize {
        if self.exhausted() {
            return min;
        }
        let max = self.options.max_len.max(min);
        self.rng.gen_range(min..=max)
    }

    fn word(&mut self, min: usize, max: usize) -> String {
        let n = self.rng.gen_range(min..=max);
        (&mut self.rng).sample_iter(Alphanumeric).take(n).map(char::from).collect()
    }

    /// About one time in four.
    fn skip(&mut self) -> bool {
        self.exhausted() || self.rng.gen_bool(0.25)
    }
}

pub trait Arbitrary: Send + Sync {
    fn generate(&self, g: &mut Gen) -> Value;

    /// False when generating with the depth budget spent may still cross a
    /// recursive boundary. Unions and eithers use it to pick a base case.
    fn terminates(&self) -> bool {
        true
    }
}

pub type Generator = Arc<dyn Arbitrary>;

#[derive(Debug, Clone, Copy, Default)]
pub struct ArbitraryInterpreter;

// ————————————————————————————————————————————————————————————————————————————
// GENERATORS
// ————————————————————————————————————————————————————————————————————————————

struct PrimitiveGen(Primitive);

fn uuid_v4(g: &mut Gen) -> String {
    let hi = g.rng.next_u64();
    let lo = g.rng.next_u64();
    format!(
        "{:08x}-{:04x}-4{:03x}-{:x}{:03x}-{:012x}",
        hi >> 32,
        (hi >> 16) & 0xffff,
        hi & 0x0fff,
        0x8 | ((lo >> 62) & 0x3),
        (lo >> 48) & 0x0fff,
        lo & 0xffff_ffff_ffff,
    )
}

impl Arbitrary for PrimitiveGen {
    fn generate(&self, g: &mut Gen) -> Value {
        match &self.0 {
            Primitive::String => Value::String(g.word(0, 12)),
            Primitive::Number => {
                if g.rng.gen_bool(0.5) {
                    Value::number(g.rng.gen_range(-1000..=1000) as f64)
                } else {
                    // two decimal places keep the JSON round trip exact
                    Value::number(g.rng.gen_range(-1_000_000i64..=1_000_000) as f64 / 100.0)
                }
            }
            Primitive::Boolean => Value::Bool(g.rng.gen_bool(0.5)),
            Primitive::Date => {
                let millis = g.rng.gen_range(0..=MAX_MILLIS);
                Value::Date(chrono::DateTime::from_timestamp_millis(millis).unwrap_or_default())
            }
            Primitive::Uuid => Value::String(uuid_v4(g)),
            Primitive::BigInt => {
                let bound = 10i128.pow(30);
                Value::BigInt(g.rng.gen_range(-bound..=bound))
            }
            Primitive::Literal(lit) => lit.to_value(),
            Primitive::OneOf(values) => {
                let i = g.rng.gen_range(0..values.len());
                Value::String(values[i].clone())
            }
        }
    }
}

struct StructGen {
    required: Vec<(String, Generator)>,
    partial: Vec<(String, Generator)>,
}

impl Arbitrary for StructGen {
    fn generate(&self, g: &mut Gen) -> Value {
        let mut fields = indexmap::IndexMap::new();
        for (k, field) in &self.required {
            let v = field.generate(g);
            if !v.is_undefined() {
                fields.insert(k.clone(), v);
            }
        }
        for (k, field) in &self.partial {
            if g.exhausted() || !g.rng.gen_bool(0.5) {
                continue;
            }
            let v = field.generate(g);
            if !v.is_undefined() {
                fields.insert(k.clone(), v);
            }
        }
        Value::Record(fields)
    }

    fn terminates(&self) -> bool {
        // partial fields are skipped once depth runs out
        self.required.iter().all(|(_, f)| f.terminates())
    }
}

struct IntersectionGen {
    members: Vec<Generator>,
}

impl Arbitrary for IntersectionGen {
    fn generate(&self, g: &mut Gen) -> Value {
        let mut parts: Vec<Value> = self.members.iter().map(|m| m.generate(g)).collect();
        // opaque parts first, so typed members win any shared key
        parts.sort_by_key(|p| !matches!(p, Value::Unknown(_)));
        merge_all(None, parts).unwrap_or(Value::Undefined)
    }

    fn terminates(&self) -> bool {
        self.members.iter().all(|m| m.terminates())
    }
}

struct OneOfGen {
    members: Vec<Generator>,
    /// First member that terminates on its own, if any.
    base_case: Option<usize>,
}

impl OneOfGen {
    fn new(members: Vec<Generator>) -> Self {
        let base_case = members.iter().position(|m| m.terminates());
        Self { members, base_case }
    }
}

impl Arbitrary for OneOfGen {
    fn generate(&self, g: &mut Gen) -> Value {
        let i = if g.exhausted() {
            self.base_case.unwrap_or(0)
        } else {
            g.rng.gen_range(0..self.members.len())
        };
        self.members[i].generate(g)
    }

    fn terminates(&self) -> bool {
        self.base_case.is_some()
    }
}

struct RecordGen {
    value: Generator,
}

impl Arbitrary for RecordGen {
    fn generate(&self, g: &mut Gen) -> Value {
        let n = g.len(0);
        let mut fields = indexmap::IndexMap::new();
        for _ in 0..n {
            let key = g.word(1, 8);
            let v = self.value.generate(g);
            if !v.is_undefined() {
                fields.insert(key, v);
            }
        }
        Value::Record(fields)
    }
}

struct ArrayGen {
    item: Generator,
    non_empty: bool,
}

impl Arbitrary for ArrayGen {
    fn generate(&self, g: &mut Gen) -> Value {
        let n = g.len(usize::from(self.non_empty));
        Value::Array((0..n).map(|_| self.item.generate(g)).collect())
    }

    fn terminates(&self) -> bool {
        !self.non_empty || self.item.terminates()
    }
}

struct SetGen {
    item: Generator,
    order: Comparator,
}

impl Arbitrary for SetGen {
    fn generate(&self, g: &mut Gen) -> Value {
        let n = g.len(0);
        let mut items: Vec<Value> = (0..n).map(|_| self.item.generate(g)).collect();
        items.sort_by(|a, b| self.order.compare(a, b));
        items.dedup_by(|a, b| self.order.compare(a, b).is_eq());
        Value::Set(items)
    }
}

struct OptionalGen {
    inner: Generator,
}

impl Arbitrary for OptionalGen {
    fn generate(&self, g: &mut Gen) -> Value {
        if g.skip() { Value::Undefined } else { self.inner.generate(g) }
    }
}

/// Nullable and option share `Value::Option` as their typed form.
struct MaybeGen {
    inner: Generator,
}

impl Arbitrary for MaybeGen {
    fn generate(&self, g: &mut Gen) -> Value {
        if g.skip() { Value::none() } else { Value::some(self.inner.generate(g)) }
    }
}

struct EitherGen {
    left: Generator,
    right: Generator,
}

impl Arbitrary for EitherGen {
    fn generate(&self, g: &mut Gen) -> Value {
        let left = if g.exhausted() && self.left.terminates() != self.right.terminates() {
            self.left.terminates()
        } else {
            g.rng.gen_bool(0.5)
        };
        if left { Value::left(self.left.generate(g)) } else { Value::right(self.right.generate(g)) }
    }

    fn terminates(&self) -> bool {
        self.left.terminates() || self.right.terminates()
    }
}

struct LazyGen {
    target: Deferred<ArbitraryInterpreter>,
}

impl Arbitrary for LazyGen {
    fn generate(&self, g: &mut Gen) -> Value {
        let generator = self.target.force();
        g.depth += 1;
        let v = generator.generate(g);
        g.depth -= 1;
        v
    }

    fn terminates(&self) -> bool {
        false
    }
}

struct RefinedGen {
    inner: Generator,
    refinement: Refinement,
}

impl Arbitrary for RefinedGen {
    fn generate(&self, g: &mut Gen) -> Value {
        for _ in 0..MAX_RETRIES {
            let v = self.inner.generate(g);
            if self.refinement.test(&v) {
                return v;
            }
        }
        panic!(
            "no value satisfying `{}` after {MAX_RETRIES} attempts; install an arbitrary override on that node",
            self.refinement.name
        );
    }

    fn terminates(&self) -> bool {
        self.inner.terminates()
    }
}

struct NewtypeGen {
    inner: Generator,
    newtype: Newtype,
}

impl Arbitrary for NewtypeGen {
    fn generate(&self, g: &mut Gen) -> Value {
        let attempts = match self.newtype.mapping {
            Mapping::Iso(_) => 1,
            Mapping::Prism(_) => MAX_RETRIES,
        };
        for _ in 0..attempts {
            if let Some(v) = self.newtype.mapping.get(self.inner.generate(g)) {
                return v;
            }
        }
        panic!(
            "no base value accepted by newtype `{}` after {attempts} attempts; install an arbitrary override on that node",
            self.newtype.name
        );
    }

    fn terminates(&self) -> bool {
        self.inner.terminates()
    }
}

struct UnknownGen;

impl Arbitrary for UnknownGen {
    fn generate(&self, g: &mut Gen) -> Value {
        let n = g.len(0).min(2);
        let mut object = Map::new();
        for _ in 0..n {
            let key = g.word(1, 6);
            object.insert(key, Json::from(g.rng.gen_range(-100i64..=100)));
        }
        Value::Unknown(Json::Object(object))
    }
}

impl Interpreter for ArbitraryInterpreter {
    type Behavior = Generator;
    const ID: InterpreterId = InterpreterId::Arbitrary;

    fn primitive(&self, _node: &Node, primitive: &Primitive) -> Generator {
        Arc::new(PrimitiveGen(primitive.clone()))
    }

    fn struct_(&self, _node: &Node, required: Vec<(String, Generator)>, partial: Vec<(String, Generator)>) -> Generator {
        Arc::new(StructGen { required, partial })
    }

    fn intersection(&self, _node: &Node, members: Vec<Generator>) -> Generator {
        Arc::new(IntersectionGen { members })
    }

    fn tagged_union(&self, _node: &Node, _tag: &str, members: Vec<(String, Generator)>) -> Generator {
        Arc::new(OneOfGen::new(members.into_iter().map(|(_, m)| m).collect()))
    }

    fn record(&self, _node: &Node, value: Generator) -> Generator {
        Arc::new(RecordGen { value })
    }

    fn set(&self, _node: &Node, item: Generator, order: &Comparator) -> Generator {
        Arc::new(SetGen { item, order: order.clone() })
    }

    fn array(&self, _node: &Node, item: Generator, non_empty: bool) -> Generator {
        Arc::new(ArrayGen { item, non_empty })
    }

    fn optional(&self, _node: &Node, inner: Generator) -> Generator {
        Arc::new(OptionalGen { inner })
    }

    fn nullable(&self, _node: &Node, inner: Generator) -> Generator {
        Arc::new(MaybeGen { inner })
    }

    fn either(&self, _node: &Node, left: Generator, right: Generator) -> Generator {
        Arc::new(EitherGen { left, right })
    }

    fn option(&self, _node: &Node, inner: Generator) -> Generator {
        Arc::new(MaybeGen { inner })
    }

    fn recursive(&self, _node: &Node, target: Deferred<Self>) -> Generator {
        Arc::new(LazyGen { target })
    }

    fn refined(&self, _node: &Node, inner: Generator, refinement: &Refinement) -> Generator {
        Arc::new(RefinedGen { inner, refinement: refinement.clone() })
    }

    fn newtype(&self, _node: &Node, inner: Generator, newtype: &Newtype) -> Generator {
        Arc::new(NewtypeGen { inner, newtype: newtype.clone() })
    }

    fn unknown(&self, _node: &Node) -> Generator {
        Arc::new(UnknownGen)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// EXAMPLE STREAM
// ————————————————————————————————————————————————————————————————————————————

/// Endless, restartable stream of generated values.
///
/// Keeps the schema alive for as long as the stream exists, so recursive
/// generators can always reach their target.
#[derive(Clone)]
pub struct Examples {
    schema: Schema,
    generator: Generator,
    state: Gen,
}

impl Examples {
    pub fn new(schema: &Schema, options: GenerateOptions) -> Self {
        Self::from_parts(schema.clone(), derive(schema, &ArbitraryInterpreter), options)
    }

    pub(crate) fn from_parts(schema: Schema, generator: Generator, options: GenerateOptions) -> Self {
        Self { schema, generator, state: Gen::new(options) }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Rewind to the first value of the seeded sequence.
    pub fn restart(&mut self) {
        self.state = Gen::new(self.state.options);
    }
}

impl Iterator for Examples {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        Some(self.generator.generate(&mut self.state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::*;

    fn examples(schema: &Schema) -> Examples {
        Examples::new(schema, GenerateOptions::default())
    }

    #[test]
    fn same_seed_same_values() {
        let s = struct_([("a", string()), ("b", array(number())), ("d", date())]);
        let first: Vec<Value> = examples(&s).take(10).collect();
        let again: Vec<Value> = examples(&s).take(10).collect();
        assert_eq!(first, again);
        let mut stream = examples(&s);
        let _ = stream.by_ref().take(3).count();
        stream.restart();
        assert_eq!(stream.take(10).collect::<Vec<_>>(), first);
    }

    #[test]
    fn recursion_terminates() {
        let tree = recursive("Tree", |this| struct_([("v", number()), ("kids", array(this))]));
        for v in examples(&tree).take(50) {
            assert!(v.as_record().is_some());
        }
        let list = recursive("List", |this| partial([("next", this)]));
        assert_eq!(examples(&list).take(50).count(), 50);
    }

    #[test]
    fn unions_bottom_out_on_a_terminating_member() {
        let list = recursive("List", |this| {
            tagged_union(
                "_tag",
                [
                    ("Cons", struct_([("_tag", string_literal("Cons")), ("head", number()), ("tail", this)])),
                    ("Nil", struct_([("_tag", string_literal("Nil"))])),
                ],
            )
        });
        for v in examples(&list).take(20) {
            let mut cursor = &v;
            let mut length = 0;
            while cursor.get("_tag") == &Value::from("Cons") {
                cursor = cursor.get("tail");
                length += 1;
            }
            assert_eq!(cursor.get("_tag"), &Value::from("Nil"));
            assert!(length <= GenerateOptions::default().max_depth);
        }
        let nested = recursive("Nested", |this| either(struct_([("inner", this)]), number()));
        assert_eq!(examples(&nested).take(20).count(), 20);
    }

    #[test]
    fn exhausted_containers_are_minimal() {
        let opts = GenerateOptions { max_depth: 0, ..GenerateOptions::default() };
        let s = both_struct(
            [("xs", array(number())), ("ne", non_empty_array(number())), ("n", nullable(string()))],
            [("p", string())],
        );
        let v = Examples::new(&s, opts).next().unwrap();
        assert_eq!(v.get("xs"), &Value::Array(vec![]));
        assert!(matches!(v.get("ne"), Value::Array(items) if items.len() == 1));
        assert_eq!(v.get("n"), &Value::none());
        assert!(v.get("p").is_undefined());
    }

    #[test]
    fn refinements_retry_until_satisfied() {
        let even = refined(number(), "Even", |v| v.as_f64().is_some_and(|n| n % 2.0 == 0.0));
        for v in examples(&even).take(20) {
            assert_eq!(v.as_f64().unwrap() % 2.0, 0.0);
        }
    }

    #[test]
    #[should_panic(expected = "Impossible")]
    fn unsatisfiable_refinements_panic() {
        let never = refined(number(), "Impossible", |_| false);
        examples(&never).next();
    }

    #[test]
    fn sets_are_sorted_and_unique() {
        let s = set(boolean(), Comparator::natural());
        for v in examples(&s).take(20) {
            let Value::Set(items) = v else { panic!("set expected") };
            assert!(items.len() <= 2);
            assert!(items.windows(2).all(|w| w[0] != w[1]));
        }
    }
}
