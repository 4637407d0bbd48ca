//! Interpreter trait and memoized, bottom-up derivation.
//!
//! An interpreter maps each node kind, given the already-derived behaviors of
//! the node's children, to one behavior. [`derive`] walks children before
//! parents and stores the result on the node, keyed by interpreter id, so each
//! (node, interpreter) pair is computed at most once. Recursive nodes rely on
//! this: their behavior is a lazy delegate that looks the target up in the
//! cache on every call.
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use once_cell::sync::OnceCell;
use tracing::trace;

use crate::schema::{Comparator, Kind, Newtype, Node, Primitive, Refinement, Schema};

// ————————————————————————————————————————————————————————————————————————————
// INTERPRETER IDS
// ————————————————————————————————————————————————————————————————————————————

/// Stable interpreter identity. Doubles as the key of per-node config slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterpreterId {
    Decoder,
    Encoder,
    Eq,
    Hash,
    Arbitrary,
    /// Interpreters defined outside this crate.
    Custom(&'static str),
}

impl InterpreterId {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterpreterId::Decoder => "decoder",
            InterpreterId::Encoder => "encoder",
            InterpreterId::Eq => "eq",
            InterpreterId::Hash => "hash",
            InterpreterId::Arbitrary => "arbitrary",
            InterpreterId::Custom(name) => name,
        }
    }
}

impl fmt::Display for InterpreterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERPRETER TRAIT
// ————————————————————————————————————————————————————————————————————————————

/// One behavior family. Implementations must be stateless in the sense that
/// two instances of the same type derive the same behavior: the cache keys on
/// [`Interpreter::ID`], not on the instance.
pub trait Interpreter: Clone + Send + Sync + 'static {
    type Behavior: Clone + Send + Sync + 'static;

    const ID: InterpreterId;

    fn primitive(&self, node: &Node, primitive: &Primitive) -> Self::Behavior;

    fn struct_(
        &self,
        node: &Node,
        required: Vec<(String, Self::Behavior)>,
        partial: Vec<(String, Self::Behavior)>,
    ) -> Self::Behavior;

    fn intersection(&self, node: &Node, members: Vec<Self::Behavior>) -> Self::Behavior;

    fn tagged_union(&self, node: &Node, tag: &str, members: Vec<(String, Self::Behavior)>) -> Self::Behavior;

    fn record(&self, node: &Node, value: Self::Behavior) -> Self::Behavior;

    fn set(&self, node: &Node, item: Self::Behavior, order: &Comparator) -> Self::Behavior;

    fn array(&self, node: &Node, item: Self::Behavior, non_empty: bool) -> Self::Behavior;

    fn optional(&self, node: &Node, inner: Self::Behavior) -> Self::Behavior;

    fn nullable(&self, node: &Node, inner: Self::Behavior) -> Self::Behavior;

    fn mutable(&self, _node: &Node, inner: Self::Behavior) -> Self::Behavior {
        inner
    }

    fn either(&self, node: &Node, left: Self::Behavior, right: Self::Behavior) -> Self::Behavior;

    fn option(&self, node: &Node, inner: Self::Behavior) -> Self::Behavior;

    /// Called for recursive nodes and their self handles. For a self handle
    /// `target` must not be forced here, only from inside the returned
    /// behavior. A recursive node may force its own definition, which reaches
    /// the node again only through self handles.
    fn recursive(&self, node: &Node, target: Deferred<Self>) -> Self::Behavior;

    fn refined(&self, node: &Node, inner: Self::Behavior, refinement: &Refinement) -> Self::Behavior;

    fn newtype(&self, node: &Node, inner: Self::Behavior, newtype: &Newtype) -> Self::Behavior;

    fn unknown(&self, node: &Node) -> Self::Behavior;
}

// ————————————————————————————————————————————————————————————————————————————
// CACHE
// ————————————————————————————————————————————————————————————————————————————

type Erased = Arc<dyn Any + Send + Sync>;

/// Insert-once map from interpreter id to derived behavior, owned by a node.
/// Concurrent first use of the same slot blocks until one derivation wins.
#[derive(Default)]
pub(crate) struct DerivationCache {
    slots: Mutex<HashMap<InterpreterId, Arc<OnceCell<Erased>>>>,
}

impl DerivationCache {
    fn slot(&self, id: InterpreterId) -> Arc<OnceCell<Erased>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(id).or_default().clone()
    }

    #[cfg(test)]
    pub(crate) fn is_derived(&self, id: InterpreterId) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(&id).is_some_and(|cell| cell.get().is_some())
    }
}

/// Derive (or fetch) the behavior of `schema` under `interpreter`.
///
/// # Panics
///
/// If two interpreter types share one [`InterpreterId`].
pub fn derive<I: Interpreter>(schema: &Schema, interpreter: &I) -> I::Behavior {
    let slot = schema.cache().slot(I::ID);
    let erased = slot.get_or_init(|| {
        trace!(node = %schema.id(), name = schema.name(), interpreter = %I::ID, "deriving behavior");
        let derived = dispatch(schema, interpreter);
        let derived = schema.config().apply(interpreter, schema, derived);
        Arc::new(derived) as Erased
    });
    match erased.downcast_ref::<I::Behavior>() {
        Some(behavior) => behavior.clone(),
        None => panic!("interpreter id `{}` is claimed by more than one interpreter type", I::ID),
    }
}

fn derive_all<I: Interpreter>(fields: &indexmap::IndexMap<String, Schema>, interpreter: &I) -> Vec<(String, I::Behavior)> {
    fields.iter().map(|(k, s)| (k.clone(), derive(s, interpreter))).collect()
}

fn dispatch<I: Interpreter>(schema: &Schema, interpreter: &I) -> I::Behavior {
    let node: &Node = schema;
    match node.kind() {
        Kind::Primitive(p) => interpreter.primitive(node, p),
        Kind::Struct(shape) => {
            let required = derive_all(&shape.required, interpreter);
            let partial = derive_all(&shape.partial, interpreter);
            interpreter.struct_(node, required, partial)
        }
        Kind::Intersection(members) => {
            let members = members.iter().map(|m| derive(m, interpreter)).collect();
            interpreter.intersection(node, members)
        }
        Kind::TaggedUnion(u) => {
            let members = derive_all(&u.members, interpreter);
            interpreter.tagged_union(node, &u.tag, members)
        }
        Kind::Record(value) => interpreter.record(node, derive(value, interpreter)),
        Kind::Set(item, order) => interpreter.set(node, derive(item, interpreter), order),
        Kind::Array { item, non_empty } => interpreter.array(node, derive(item, interpreter), *non_empty),
        Kind::Optional(inner) => interpreter.optional(node, derive(inner, interpreter)),
        Kind::Nullable(inner) => interpreter.nullable(node, derive(inner, interpreter)),
        Kind::Mutable(inner) => interpreter.mutable(node, derive(inner, interpreter)),
        Kind::Either(l, r) => interpreter.either(node, derive(l, interpreter), derive(r, interpreter)),
        Kind::Option(inner) => interpreter.option(node, derive(inner, interpreter)),
        Kind::Recursive(_) => {
            let target = Deferred::new(schema.downgrade(), interpreter.clone());
            interpreter.recursive(node, target)
        }
        Kind::SelfRef(r) => {
            let target = Deferred::new(r.target_weak(), interpreter.clone());
            interpreter.recursive(node, target)
        }
        Kind::Refined(inner, refinement) => interpreter.refined(node, derive(inner, interpreter), refinement),
        Kind::Newtype(inner, newtype) => interpreter.newtype(node, derive(inner, interpreter), newtype),
        Kind::Unknown => interpreter.unknown(node),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DEFERRED TARGETS
// ————————————————————————————————————————————————————————————————————————————

/// Not-yet-derived behavior of a recursive node's definition.
///
/// Holds the recursive node weakly and resolves through the node caches on
/// every [`Deferred::force`], so behaviors never own the node they refer back
/// to.
pub struct Deferred<I: Interpreter> {
    target: Weak<Node>,
    interpreter: I,
}

impl<I: Interpreter> Clone for Deferred<I> {
    fn clone(&self) -> Self {
        Self { target: self.target.clone(), interpreter: self.interpreter.clone() }
    }
}

impl<I: Interpreter> Deferred<I> {
    fn new(target: Weak<Node>, interpreter: I) -> Self {
        Self { target, interpreter }
    }

    /// Resolve the recursive definition (running its thunk if needed) and
    /// derive it.
    ///
    /// # Panics
    ///
    /// If the recursive schema has been dropped while behaviors derived from
    /// it are still in use.
    pub fn force(&self) -> I::Behavior {
        let Some(node) = self.target.upgrade() else {
            panic!("recursive schema dropped while a behavior derived from it is still in use");
        };
        let Kind::Recursive(r) = node.kind() else {
            unreachable!("deferred targets always point at recursive nodes");
        };
        derive(r.resolve(), &self.interpreter)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::config::Config;
    use crate::schema::*;

    /// Counts derivations per node kind; behavior is the subtree's node count.
    #[derive(Clone)]
    struct Size;

    thread_local! {
        static PRIMITIVES: Cell<usize> = const { Cell::new(0) };
    }

    impl Interpreter for Size {
        type Behavior = usize;
        const ID: InterpreterId = InterpreterId::Custom("size");

        fn primitive(&self, _: &Node, _: &Primitive) -> usize {
            PRIMITIVES.with(|n| n.set(n.get() + 1));
            1
        }
        fn struct_(&self, _: &Node, r: Vec<(String, usize)>, p: Vec<(String, usize)>) -> usize {
            1 + r.iter().chain(p.iter()).map(|(_, n)| n).sum::<usize>()
        }
        fn intersection(&self, _: &Node, m: Vec<usize>) -> usize {
            1 + m.iter().sum::<usize>()
        }
        fn tagged_union(&self, _: &Node, _: &str, m: Vec<(String, usize)>) -> usize {
            1 + m.iter().map(|(_, n)| n).sum::<usize>()
        }
        fn record(&self, _: &Node, v: usize) -> usize {
            1 + v
        }
        fn set(&self, _: &Node, v: usize, _: &Comparator) -> usize {
            1 + v
        }
        fn array(&self, _: &Node, v: usize, _: bool) -> usize {
            1 + v
        }
        fn optional(&self, _: &Node, v: usize) -> usize {
            1 + v
        }
        fn nullable(&self, _: &Node, v: usize) -> usize {
            1 + v
        }
        fn either(&self, _: &Node, l: usize, r: usize) -> usize {
            1 + l + r
        }
        fn option(&self, _: &Node, v: usize) -> usize {
            1 + v
        }
        fn recursive(&self, _: &Node, _: Deferred<Self>) -> usize {
            1
        }
        fn refined(&self, _: &Node, v: usize, _: &Refinement) -> usize {
            1 + v
        }
        fn newtype(&self, _: &Node, v: usize, _: &Newtype) -> usize {
            1 + v
        }
        fn unknown(&self, _: &Node) -> usize {
            1
        }
    }

    #[test]
    fn shared_subtrees_derive_once() {
        let shared = string();
        let s = struct_([("a", shared.clone()), ("b", shared.clone()), ("c", array(shared.clone()))]);
        let before = PRIMITIVES.with(Cell::get);
        assert_eq!(derive(&s, &Size), 5);
        assert_eq!(derive(&s, &Size), 5);
        assert_eq!(PRIMITIVES.with(Cell::get) - before, 1);
        assert!(shared.cache().is_derived(InterpreterId::Custom("size")));
        assert!(!shared.cache().is_derived(InterpreterId::Decoder));
    }

    #[test]
    fn overrides_run_after_the_default() {
        let cfg = Config::new().with::<Size, _>(|n, _, node| {
            assert_eq!(node.name(), "number");
            n * 100
        });
        let s = struct_([("n", number().with_config(cfg))]);
        assert_eq!(derive(&s, &Size), 101);
    }

    #[test]
    fn deriving_a_recursive_node_does_not_force_it() {
        let tree = recursive("Tree", |this| struct_([("children", array(this))]));
        assert_eq!(derive(&tree, &Size), 1);
        let Kind::Recursive(r) = tree.kind() else { panic!("recursive expected") };
        assert!(!r.is_resolved());
        let inner = r.resolve();
        assert_eq!(derive(inner, &Size), 3);
    }
}
