//! Observable Cell (Ref)
//!
//! A `Ref` is a single-slot reactive value. Reads go through one private dep
//! (cells are not keyed in the object graph); writes compare against the
//! stored raw value and stay silent when nothing actually changed.
//!
//! The cell keeps two forms of its value: the raw one it was given, used for
//! the no-change comparison, and a wrapped form where container values come
//! back tracked so reads get deep reactivity.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::value::Value;

use super::dep::Dep;
use super::runtime::Runtime;

struct RefInner {
    rt: Runtime,
    dep: Arc<Dep>,
    raw: RwLock<Value>,
    wrapped: RwLock<Value>,
}

/// A single-slot observable value.
#[derive(Clone)]
pub struct Ref {
    inner: Arc<RefInner>,
}

impl Ref {
    pub(crate) fn create(rt: Runtime, value: Value) -> Ref {
        // ref-of-ref is the same ref
        if let Value::Cell(existing) = value {
            return existing;
        }
        let wrapped = rt.wrap(value.clone());
        Ref {
            inner: Arc::new(RefInner {
                rt,
                dep: Dep::new(),
                raw: RwLock::new(value),
                wrapped: RwLock::new(wrapped),
            }),
        }
    }

    /// Read the value, recording a dependency on the cell. Container values
    /// come back tracked.
    pub fn get(&self) -> Value {
        self.inner.rt.track_dep(&self.inner.dep);
        self.inner.wrapped.read().clone()
    }

    /// Read the value without recording a dependency.
    pub fn get_untracked(&self) -> Value {
        self.inner.wrapped.read().clone()
    }

    /// Write the value. Same-value writes (containers by identity, NaN equal
    /// to NaN) notify nobody.
    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        {
            let raw = self.inner.raw.read();
            if value.same(&raw) {
                return;
            }
        }
        *self.inner.wrapped.write() = self.inner.rt.wrap(value.clone());
        *self.inner.raw.write() = value;
        self.inner.rt.notify_dep(&self.inner.dep);
    }

    /// Write a value derived from the current one.
    pub fn update(&self, f: impl FnOnce(&Value) -> Value) {
        let next = {
            let raw = self.inner.raw.read();
            f(&raw)
        };
        self.set(next);
    }

    /// Reference identity of the cell itself.
    pub fn ptr_eq(&self, other: &Ref) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("value", &*self.inner.raw.read())
            .finish()
    }
}
