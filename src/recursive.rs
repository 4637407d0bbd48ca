//! Self-referential schemas.
//!
//! A recursive node owns a thunk `self -> Schema` and a write-once cell for its
//! result. The thunk receives a [`SelfRef`] handle that points back at the
//! recursive node weakly, so the schema graph never holds a strong cycle. The
//! thunk runs on first use, never at construction.
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, ThreadId};

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::config::Config;
use crate::schema::{Kind, Node, Schema};

pub(crate) type Thunk = Arc<dyn Fn(Schema) -> Schema + Send + Sync>;

pub struct Recursive {
    thunk: Thunk,
    this: Weak<Node>,
    inner: OnceCell<Schema>,
    /// Thread currently running the thunk, used to catch re-entrant forcing.
    forcing: Mutex<Option<ThreadId>>,
}

#[derive(Clone)]
pub struct SelfRef {
    target: Weak<Node>,
}

pub(crate) fn build(name: String, config: Config, thunk: Thunk) -> Schema {
    let node = Arc::new_cyclic(|this: &Weak<Node>| {
        let kind = Kind::Recursive(Recursive {
            thunk,
            this: this.clone(),
            inner: OnceCell::new(),
            forcing: Mutex::new(None),
        });
        Node::new(name, kind, config)
    });
    Schema::from_arc(node)
}

impl Recursive {
    pub(crate) fn thunk(&self) -> Thunk {
        self.thunk.clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.get().is_some()
    }

    /// The schema this node stands for, running the thunk on first call.
    /// Other threads racing the first call block until it completes.
    ///
    /// # Panics
    ///
    /// If called from inside this node's own thunk, or if the thunk returns
    /// its own self handle unchanged.
    pub fn resolve(&self) -> &Schema {
        if let Some(inner) = self.inner.get() {
            return inner;
        }
        let me = thread::current().id();
        let reentrant = *self.lock_forcing() == Some(me);
        if reentrant {
            panic!("recursive schema `{}` was forced during its own construction", self.name());
        }
        self.inner.get_or_init(|| {
            *self.lock_forcing() = Some(me);
            debug!(name = %self.name(), "resolving recursive schema");
            let handle = Schema::new(
                self.name(),
                Kind::SelfRef(SelfRef { target: self.this.clone() }),
            );
            let inner = (self.thunk)(handle);
            if let Kind::SelfRef(r) = inner.kind() {
                if r.target.ptr_eq(&self.this) {
                    panic!("recursive schema `{}` is defined as itself", self.name());
                }
            }
            *self.lock_forcing() = None;
            inner
        })
    }

    fn name(&self) -> String {
        self.this.upgrade().map(|n| n.name().to_string()).unwrap_or_default()
    }

    fn lock_forcing(&self) -> std::sync::MutexGuard<'_, Option<ThreadId>> {
        self.forcing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SelfRef {
    pub(crate) fn target_weak(&self) -> Weak<Node> {
        self.target.clone()
    }

    /// The recursive node this handle refers to.
    ///
    /// # Panics
    ///
    /// If that node has been dropped.
    pub fn target(&self) -> Schema {
        match self.target.upgrade() {
            Some(node) => Schema::from_arc(node),
            None => panic!("self reference outlived its recursive schema"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::schema::*;

    #[test]
    fn thunk_runs_once_and_lazily() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let list = recursive("List", move |this| {
            seen.fetch_add(1, Ordering::SeqCst);
            partial([("next", this)])
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let Kind::Recursive(r) = list.kind() else { panic!("recursive expected") };
        let a = r.resolve().clone();
        let b = r.resolve().clone();
        assert!(a.ptr_eq(&b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn self_handle_points_back() {
        let list = recursive("List", |this| partial([("next", this)]));
        let Kind::Recursive(r) = list.kind() else { panic!("recursive expected") };
        let Kind::Struct(shape) = r.resolve().kind() else { panic!("struct expected") };
        let Kind::SelfRef(handle) = shape.partial["next"].kind() else { panic!("self ref expected") };
        assert!(handle.target().ptr_eq(&list));
        assert_eq!(shape.partial["next"].name(), "List");
    }

    #[test]
    #[should_panic(expected = "forced during its own construction")]
    fn forcing_inside_the_thunk_is_fatal() {
        let bad = recursive("Bad", |this| {
            let Kind::SelfRef(handle) = this.kind() else { unreachable!() };
            let target = handle.target();
            let Kind::Recursive(r) = target.kind() else { unreachable!() };
            r.resolve().clone()
        });
        let Kind::Recursive(r) = bad.kind() else { unreachable!() };
        r.resolve();
    }

    #[test]
    fn dropping_the_schema_frees_the_cycle() {
        let list = recursive("List", |this| partial([("next", this)]));
        let Kind::Recursive(r) = list.kind() else { unreachable!() };
        r.resolve();
        let weak = list.downgrade();
        drop(list);
        assert!(weak.upgrade().is_none());
    }
}
