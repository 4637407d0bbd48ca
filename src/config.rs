//! Per-node, per-interpreter override slots.
//!
//! A slot holds a transform `(derived, interpreter, node) -> derived` that runs
//! after the default behavior for that node has been derived. A missing slot is
//! the identity transform.
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::derive::{Interpreter, InterpreterId};
use crate::schema::Node;

type Override<I> = dyn Fn(<I as Interpreter>::Behavior, &I, &Node) -> <I as Interpreter>::Behavior + Send + Sync;

struct Slot<I: Interpreter>(Arc<Override<I>>);

#[derive(Clone, Default)]
pub struct Config {
    slots: HashMap<InterpreterId, Arc<dyn Any + Send + Sync>>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the override for interpreter `I`, replacing any previous one.
    pub fn with<I, F>(mut self, f: F) -> Self
    where
        I: Interpreter,
        F: Fn(I::Behavior, &I, &Node) -> I::Behavior + Send + Sync + 'static,
    {
        let slot: Slot<I> = Slot(Arc::new(f));
        self.slots.insert(I::ID, Arc::new(slot));
        self
    }

    pub fn contains(&self, id: InterpreterId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots of `other` win.
    pub(crate) fn merge(mut self, other: Config) -> Self {
        self.slots.extend(other.slots);
        self
    }

    pub(crate) fn apply<I: Interpreter>(&self, interpreter: &I, node: &Node, derived: I::Behavior) -> I::Behavior {
        let Some(slot) = self.slots.get(&I::ID) else {
            return derived;
        };
        match slot.downcast_ref::<Slot<I>>() {
            Some(Slot(f)) => f(derived, interpreter, node),
            None => {
                warn!(node = %node.id(), interpreter = %I::ID, "override registered for a different interpreter type; ignoring");
                derived
            }
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.slots.keys()).finish()
    }
}
