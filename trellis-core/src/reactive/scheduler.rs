//! Batching Scheduler
//!
//! The scheduler coalesces re-invocation requests within a turn: enqueuing
//! the same job any number of times before a flush runs it once per flush,
//! in enqueue order. The host drives the microtask-equivalent boundary by
//! calling [`Runtime::flush_jobs`] at the end of its turn.
//!
//! Each flush pass is bounded by the queue length captured at its start:
//! jobs enqueued re-entrantly while the pass runs land beyond that bound
//! and execute in a fresh next pass, never in the pass already underway.
//! The flags are cleared in guard scope, so a panicking job propagates with
//! the flags reset and the unexecuted remainder still queued. Passes that
//! keep re-enqueuing each other hit a recursion limit, warn, and drop the
//! queue.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::ReactiveError;

use super::runtime::Runtime;

/// Upper bound on snapshot-drain passes per flush before giving up.
const MAX_FLUSH_PASSES: usize = 100;

/// Unique identity of a job, preserved across clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

impl JobId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A schedulable unit of work.
///
/// Clones share the original's identity, which is what the queue dedups on.
#[derive(Clone)]
pub struct Job {
    id: JobId,
    run: Arc<dyn Fn() + Send + Sync>,
}

impl Job {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Job {
        Job {
            id: JobId::new(),
            run: Arc::new(f),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub(crate) fn invoke(&self) {
        (self.run)();
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("id", &self.id).finish()
    }
}

/// The pending queue plus the flag pair controlling flush scheduling.
pub(crate) struct JobQueue {
    jobs: VecDeque<Job>,
    flush_pending: bool,
    flushing: bool,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self {
            jobs: VecDeque::new(),
            flush_pending: false,
            flushing: false,
        }
    }
}

impl Runtime {
    /// Enqueue a job for the next flush. Jobs already pending (by identity)
    /// are not enqueued again.
    pub fn queue_job(&self, job: Job) {
        let mut queue = self.inner.queue.lock();
        if !queue.jobs.iter().any(|pending| pending.id == job.id) {
            queue.jobs.push_back(job);
        }
        if !queue.flush_pending && !queue.flushing {
            queue.flush_pending = true;
        }
    }

    /// Whether a flush has been scheduled and not yet run.
    pub fn is_flush_pending(&self) -> bool {
        self.inner.queue.lock().flush_pending
    }

    /// Run all pending jobs. Returns the number of jobs executed.
    ///
    /// Re-entrant enqueues are processed as fresh passes; on overflow the
    /// queue is dropped with a warning. A panicking job propagates with the
    /// flags reset and any unexecuted jobs still queued.
    pub fn flush_jobs(&self) -> usize {
        match self.try_flush_jobs() {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(%err, "dropping scheduler queue");
                0
            }
        }
    }

    /// Strict variant of [`Runtime::flush_jobs`]: reports overflow instead
    /// of logging it.
    pub fn try_flush_jobs(&self) -> Result<usize, ReactiveError> {
        let mut executed = 0;
        for _pass in 0..MAX_FLUSH_PASSES {
            let pass_len = {
                let mut queue = self.inner.queue.lock();
                queue.flush_pending = false;
                if queue.jobs.is_empty() {
                    return Ok(executed);
                }
                queue.flushing = true;
                queue.jobs.len()
            };
            tracing::trace!(jobs = pass_len, "flush pass");
            let guard = FlushGuard { rt: self.clone() };
            // Jobs are popped one at a time so a panic leaves the rest of
            // the queue intact for a later flush.
            for _ in 0..pass_len {
                let job = self.inner.queue.lock().jobs.pop_front();
                let Some(job) = job else {
                    break;
                };
                job.invoke();
                executed += 1;
            }
            drop(guard);
        }
        // Still re-enqueuing after the pass limit: drop everything.
        let mut queue = self.inner.queue.lock();
        queue.jobs.clear();
        queue.flush_pending = false;
        Err(ReactiveError::FlushOverflow(MAX_FLUSH_PASSES))
    }
}

/// Resets the flushing flag even when a job panics.
struct FlushGuard {
    rt: Runtime,
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        self.rt.inner.queue.lock().flushing = false;
    }
}
