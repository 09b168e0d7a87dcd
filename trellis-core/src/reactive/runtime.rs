//! Reactive Runtime
//!
//! The runtime is the engine instance that owns the four shared resources:
//! the identity registry (one wrapper per raw container), the dependency
//! graph, the tracking context (which effect is currently running, and
//! whether tracking is enabled), and the scheduler queue.
//!
//! There are no process-wide singletons: construct as many runtimes as you
//! like and they are fully isolated. The handle is cheaply cloneable; every
//! wrapper, cell, computed, and effect holds one.
//!
//! # How a change propagates
//!
//! 1. An effect runs with itself pushed on the tracking stack.
//! 2. Reads inside the body call [`Runtime::track`] / `track_dep`, which
//!    subscribe the effect to the slot that was read.
//! 3. A later write calls [`Runtime::trigger`], which assembles the union of
//!    subscriber sets for the written key plus the shape-specific synthetic
//!    key, snapshots it, and notifies every subscriber except the effect
//!    that is currently running (self-notification is suppressed so an
//!    effect that both reads and writes one slot cannot recurse forever).
//!
//! # Locking
//!
//! No engine lock is ever held while user code (bodies, getters, schedulers,
//! jobs) runs; subscriber sets are snapshotted first and locks released.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::value::{Container, NodeId, Value};

use super::cell::Ref;
use super::computed::Computed;
use super::dep::{change_keys, ChangeKind, Dep, DepGraph, DepKey};
use super::effect::{Effect, EffectId};
use super::scheduler::JobQueue;
use super::tracked::Tracked;

/// The tracking context: the stack of running effects and the global
/// enable/disable flag used to suppress tracking during internal mutation.
struct TrackingContext {
    stack: Vec<Effect>,
    enabled: bool,
}

pub(crate) struct RuntimeInner {
    registry: Mutex<HashMap<NodeId, Weak<super::tracked::TrackedInner>>>,
    graph: Mutex<DepGraph>,
    context: Mutex<TrackingContext>,
    pub(crate) queue: Mutex<JobQueue>,
}

/// A reactivity engine instance.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Arc<RuntimeInner>,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                registry: Mutex::new(HashMap::new()),
                graph: Mutex::new(DepGraph::new()),
                context: Mutex::new(TrackingContext {
                    stack: Vec::new(),
                    enabled: true,
                }),
                queue: Mutex::new(JobQueue::new()),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Identity registry
    // ------------------------------------------------------------------

    /// Wrap a value for tracking.
    ///
    /// Containers come back as `Value::Tracked`; scalars, cells, and values
    /// that are already tracked pass through unchanged. Wrapping the same
    /// container twice returns the identical wrapper.
    pub fn wrap(&self, value: impl Into<Value>) -> Value {
        let value = value.into();
        match value.container() {
            Some(container) => Value::Tracked(self.wrap_container(container)),
            None => value,
        }
    }

    pub(crate) fn wrap_container(&self, container: Container) -> Tracked {
        let mut registry = self.inner.registry.lock();
        if let Some(existing) = registry.get(&container.id()).and_then(Weak::upgrade) {
            return Tracked::from_inner(existing);
        }
        let tracked = Tracked::construct(self.clone(), container.clone());
        registry.insert(container.id(), tracked.downgrade());
        // Dead wrapper entries are dropped opportunistically, never swept.
        if registry.len() % 64 == 0 {
            registry.retain(|_, weak| weak.strong_count() > 0);
        }
        tracked
    }

    // ------------------------------------------------------------------
    // Tracking context
    // ------------------------------------------------------------------

    /// Push an effect as the current tracking-context entry. The returned
    /// guard restores the previous entry on drop, panic included.
    pub(crate) fn enter(&self, effect: Effect) -> ContextGuard {
        self.inner.context.lock().stack.push(effect);
        ContextGuard { rt: self.clone() }
    }

    /// The running effect, but only if tracking is enabled.
    fn current_if_tracking(&self) -> Option<Effect> {
        let context = self.inner.context.lock();
        if !context.enabled {
            return None;
        }
        context.stack.last().cloned()
    }

    pub(crate) fn current_effect_id(&self) -> Option<EffectId> {
        self.inner.context.lock().stack.last().map(Effect::id)
    }

    /// Check whether reads would currently be recorded.
    pub fn is_tracking(&self) -> bool {
        let context = self.inner.context.lock();
        context.enabled && !context.stack.is_empty()
    }

    /// Globally suppress dependency tracking.
    ///
    /// Used internally around bulk list mutation; exposed for callers doing
    /// their own internal mutation that must not create spurious
    /// subscriptions.
    pub fn pause_tracking(&self) {
        self.inner.context.lock().enabled = false;
    }

    /// Re-enable dependency tracking after [`Runtime::pause_tracking`].
    pub fn enable_tracking(&self) {
        self.inner.context.lock().enabled = true;
    }

    /// Run `f` with tracking paused, restoring the previous state after.
    pub fn untracked<T>(&self, f: impl FnOnce() -> T) -> T {
        let _pause = self.pause_scoped();
        f()
    }

    pub(crate) fn pause_scoped(&self) -> PauseGuard {
        let mut context = self.inner.context.lock();
        let prev = context.enabled;
        context.enabled = false;
        PauseGuard {
            rt: self.clone(),
            prev,
        }
    }

    // ------------------------------------------------------------------
    // Dependency graph
    // ------------------------------------------------------------------

    /// Record that the current effect read `(target, key)`. No-op when no
    /// effect is running or tracking is paused.
    pub(crate) fn track(&self, target: &Container, key: DepKey) {
        let Some(effect) = self.current_if_tracking() else {
            return;
        };
        let dep = self.inner.graph.lock().dep_for(target, key);
        if dep.subscribe(&effect) {
            effect.record_dep(&dep);
        }
    }

    /// Notify subscribers of a change on `(target, key)`.
    pub(crate) fn trigger(&self, target: &Container, kind: ChangeKind, key: Option<DepKey>) {
        self.trigger_keys(target, change_keys(target, kind, key));
    }

    /// Notify the union of subscribers for an explicit set of keys, as one
    /// deduplicated batch.
    pub(crate) fn trigger_keys(
        &self,
        target: &Container,
        keys: impl IntoIterator<Item = DepKey>,
    ) {
        let keys: SmallVec<[DepKey; 2]> = keys.into_iter().collect();
        let deps = self.inner.graph.lock().existing(target.id(), &keys);
        if deps.is_empty() {
            // Nothing ever read this slot; a normal outcome.
            return;
        }
        tracing::trace!(node = target.id().raw(), keys = keys.len(), "trigger");
        self.notify_deps(&deps);
    }

    /// Subscribe the current effect to a standalone dep (cells, computed).
    pub(crate) fn track_dep(&self, dep: &Arc<Dep>) {
        let Some(effect) = self.current_if_tracking() else {
            return;
        };
        if dep.subscribe(&effect) {
            effect.record_dep(dep);
        }
    }

    /// Notify a standalone dep's subscribers.
    pub(crate) fn notify_dep(&self, dep: &Arc<Dep>) {
        self.notify_deps(std::slice::from_ref(dep));
    }

    fn notify_deps(&self, deps: &[Arc<Dep>]) {
        // Snapshot first: the sets may be mutated by the effects we run.
        let mut seen: SmallVec<[EffectId; 8]> = SmallVec::new();
        let mut batch: SmallVec<[Effect; 8]> = SmallVec::new();
        for dep in deps {
            for effect in dep.snapshot() {
                if !seen.contains(&effect.id()) {
                    seen.push(effect.id());
                    batch.push(effect);
                }
            }
        }
        let current = self.current_effect_id();
        for effect in batch {
            if Some(effect.id()) == current {
                continue;
            }
            effect.notify();
        }
    }

    // ------------------------------------------------------------------
    // Constructors for the reactive primitives
    // ------------------------------------------------------------------

    /// Create an effect and run it once immediately to capture its initial
    /// dependency set.
    pub fn effect(&self, body: impl Fn() + Send + Sync + 'static) -> Effect {
        let effect = Effect::create(
            self.clone(),
            Box::new(move || {
                body();
                Value::Null
            }),
            None,
        );
        effect.run();
        effect
    }

    /// Create an effect with a custom scheduling strategy: when a dependency
    /// changes, `scheduler` is invoked instead of re-running the body.
    pub fn effect_with_scheduler(
        &self,
        body: impl Fn() + Send + Sync + 'static,
        scheduler: impl Fn() + Send + Sync + 'static,
    ) -> Effect {
        let effect = Effect::create(
            self.clone(),
            Box::new(move || {
                body();
                Value::Null
            }),
            Some(Box::new(scheduler)),
        );
        effect.run();
        effect
    }

    /// Create an effect whose re-runs go through the batching scheduler:
    /// notifications enqueue its job, and [`Runtime::flush_jobs`] coalesces
    /// them into one re-run per flush.
    pub fn effect_deferred(&self, body: impl Fn() + Send + Sync + 'static) -> Effect {
        let effect = Effect::create_deferred(
            self.clone(),
            Box::new(move || {
                body();
                Value::Null
            }),
        );
        effect.run();
        effect
    }

    /// Create an observable cell. Idempotent: passing a `Value::Cell` returns
    /// that cell.
    pub fn new_ref(&self, value: impl Into<Value>) -> Ref {
        Ref::create(self.clone(), value.into())
    }

    /// Create a lazily-cached derived value from a getter. The result is
    /// read-only: writes warn and are ignored.
    pub fn computed(
        &self,
        getter: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Computed {
        Computed::create(self.clone(), Box::new(getter), None)
    }

    /// Create a derived value with a custom setter, for two-way sugar over
    /// other reactive state.
    pub fn computed_with_setter(
        &self,
        getter: impl Fn() -> Value + Send + Sync + 'static,
        setter: impl Fn(Value) + Send + Sync + 'static,
    ) -> Computed {
        Computed::create(self.clone(), Box::new(getter), Some(Box::new(setter)))
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("tracking", &self.is_tracking())
            .finish()
    }
}

/// Guard that pops the tracking-context entry when dropped, keeping the
/// stack correct even when an effect body panics.
pub(crate) struct ContextGuard {
    rt: Runtime,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.rt.inner.context.lock().stack.pop();
    }
}

/// Guard restoring the previous tracking-enabled state.
pub(crate) struct PauseGuard {
    rt: Runtime,
    prev: bool,
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        self.rt.inner.context.lock().enabled = self.prev;
    }
}
