//! Error types.
//!
//! The engine's error taxonomy is deliberately narrow: misuse is logged and
//! ignored on the lenient paths, and "nothing to notify" is a normal outcome
//! rather than an error. The strict `try_*` variants surface these cases.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A write was attempted on a computed value that has no setter.
    #[error("computed value is read-only")]
    ReadOnlyComputed,

    /// Scheduled jobs kept re-enqueuing each other past the flush pass limit.
    #[error("scheduler flush did not settle after {0} passes")]
    FlushOverflow(usize),
}
