//! Cached Derived Value (Computed)
//!
//! A `Computed` owns an internal effect whose body is the user's getter. The
//! effect's scheduler never re-runs the getter: when a dependency changes it
//! only flips the dirty flag and notifies the computed's own subscribers.
//! The cost of recomputation is paid on the next read, not on write.
//!
//! The dirty-flip notifies only on the clean-to-dirty transition, so several
//! invalidations between reads produce one downstream notification and one
//! recomputation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ReactiveError;
use crate::value::Value;

use super::dep::Dep;
use super::effect::Effect;
use super::runtime::Runtime;

pub(crate) type SetterFn = Box<dyn Fn(Value) + Send + Sync>;

struct ComputedInner {
    rt: Runtime,
    dep: Arc<Dep>,
    dirty: Arc<AtomicBool>,
    cached: RwLock<Value>,
    effect: Effect,
    setter: Option<SetterFn>,
}

/// A lazily-evaluated, cached derived value.
#[derive(Clone)]
pub struct Computed {
    inner: Arc<ComputedInner>,
}

impl Computed {
    pub(crate) fn create(
        rt: Runtime,
        getter: Box<dyn Fn() -> Value + Send + Sync>,
        setter: Option<SetterFn>,
    ) -> Computed {
        let dep = Dep::new();
        let dirty = Arc::new(AtomicBool::new(true));

        let sched_rt = rt.clone();
        let sched_dep = Arc::clone(&dep);
        let sched_dirty = Arc::clone(&dirty);
        // The getter is never invoked here; the effect stays lazy until the
        // first read.
        let effect = Effect::create(
            rt.clone(),
            getter,
            Some(Box::new(move || {
                if !sched_dirty.swap(true, Ordering::SeqCst) {
                    sched_rt.notify_dep(&sched_dep);
                }
            })),
        );

        Computed {
            inner: Arc::new(ComputedInner {
                rt,
                dep,
                dirty,
                cached: RwLock::new(Value::Null),
                effect,
                setter,
            }),
        }
    }

    /// Read the derived value, recomputing first if a dependency changed
    /// since the last read.
    pub fn get(&self) -> Value {
        self.inner.rt.track_dep(&self.inner.dep);
        if self.inner.dirty.load(Ordering::SeqCst) {
            let value = self.inner.effect.run();
            *self.inner.cached.write() = value;
            self.inner.dirty.store(false, Ordering::SeqCst);
        }
        self.inner.cached.read().clone()
    }

    /// Write through the user setter; without one this warns and ignores
    /// the write.
    pub fn set(&self, value: impl Into<Value>) {
        if let Err(err) = self.try_set(value) {
            tracing::warn!(%err, "write to computed value ignored");
        }
    }

    /// Strict variant of [`Computed::set`].
    pub fn try_set(&self, value: impl Into<Value>) -> Result<(), ReactiveError> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value.into());
                Ok(())
            }
            None => Err(ReactiveError::ReadOnlyComputed),
        }
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("dirty", &self.is_dirty())
            .field("writable", &self.inner.setter.is_some())
            .finish()
    }
}
