//! Effect Implementation
//!
//! An Effect is a reusable unit of work whose dependencies are discovered by
//! what it reads while running. When a tracked slot it read is written, the
//! effect is notified: its scheduler is invoked if it has one, otherwise it
//! re-runs directly.
//!
//! # Dependency lifecycle
//!
//! Every run rebuilds the dependency set from scratch: the effect first
//! unsubscribes from everything it joined last run, then executes its body
//! with itself pushed on the runtime's tracking stack. Branches inside the
//! body may change which slots are read, so stale subscriptions must not
//! survive a re-run.
//!
//! # Context integrity
//!
//! The tracking stack entry is popped by a drop guard, so a panicking body
//! propagates to the caller with the previous context correctly restored.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use crate::value::Value;

use super::dep::Dep;
use super::runtime::Runtime;
use super::scheduler::Job;

/// Unique identifier for an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

impl EffectId {
    /// Generate a new unique effect ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) type BodyFn = Box<dyn Fn() -> Value + Send + Sync>;
pub(crate) type SchedulerFn = Box<dyn Fn() + Send + Sync>;

pub(crate) struct EffectInner {
    id: EffectId,
    rt: Runtime,
    body: BodyFn,
    scheduler: Option<SchedulerFn>,
    /// Deps this effect currently populates; cleared and rebuilt each run.
    deps: Mutex<Vec<Weak<Dep>>>,
    disposed: AtomicBool,
    run_count: AtomicU64,
    job: OnceLock<Job>,
}

/// A tracked computation.
///
/// Created through [`Runtime::effect`] and friends; the handle is cheaply
/// cloneable and calling [`Effect::run`] outside a notification re-executes
/// the body under full tracking.
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    pub(crate) fn create(rt: Runtime, body: BodyFn, scheduler: Option<SchedulerFn>) -> Effect {
        Effect {
            inner: Arc::new(EffectInner {
                id: EffectId::new(),
                rt,
                body,
                scheduler,
                deps: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
                run_count: AtomicU64::new(0),
                job: OnceLock::new(),
            }),
        }
    }

    /// Create an effect whose scheduler enqueues its own re-run job, so
    /// notifications coalesce through the batching scheduler instead of
    /// running inline.
    pub(crate) fn create_deferred(rt: Runtime, body: BodyFn) -> Effect {
        let sched_rt = rt.clone();
        let inner = Arc::new_cyclic(|weak: &Weak<EffectInner>| {
            let weak = weak.clone();
            EffectInner {
                id: EffectId::new(),
                rt,
                body,
                scheduler: Some(Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        sched_rt.queue_job(Effect { inner }.job());
                    }
                })),
                deps: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
                run_count: AtomicU64::new(0),
                job: OnceLock::new(),
            }
        });
        Effect { inner }
    }

    pub(crate) fn from_inner(inner: Arc<EffectInner>) -> Effect {
        Effect { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<EffectInner> {
        Arc::downgrade(&self.inner)
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    /// Re-execute the body under full tracking and return its result.
    ///
    /// Previous subscriptions are dropped first; the tracking context is
    /// restored on exit even if the body panics.
    pub fn run(&self) -> Value {
        if self.is_disposed() {
            return Value::Null;
        }
        self.cleanup();
        let _ctx = self.inner.rt.enter(self.clone());
        let result = (self.inner.body)();
        self.inner.run_count.fetch_add(1, Ordering::Relaxed);
        result
    }

    /// Deliver a change notification: scheduler if present, else re-run.
    pub(crate) fn notify(&self) {
        if self.is_disposed() {
            return;
        }
        match &self.inner.scheduler {
            Some(scheduler) => scheduler(),
            None => {
                self.run();
            }
        }
    }

    /// Record a dep this effect has joined, for cleanup before the next run.
    pub(crate) fn record_dep(&self, dep: &Arc<Dep>) {
        self.inner.deps.lock().push(Arc::downgrade(dep));
    }

    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.inner.deps.lock());
        for dep in deps {
            if let Some(dep) = dep.upgrade() {
                dep.unsubscribe(self.inner.id);
            }
        }
    }

    /// The effect's re-run job, with a stable identity so repeated enqueues
    /// of the same effect dedup within a flush.
    pub fn job(&self) -> Job {
        self.inner
            .job
            .get_or_init(|| {
                let weak = Arc::downgrade(&self.inner);
                Job::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        Effect { inner }.run();
                    }
                })
            })
            .clone()
    }

    /// Dispose of the effect. A disposed effect never re-runs; its graph
    /// entries are pruned lazily, not swept.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> u64 {
        self.inner.run_count.load(Ordering::Relaxed)
    }

    /// Number of deps currently subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.lock().len()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
