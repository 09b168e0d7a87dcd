//! Fine-Grained Reactivity
//!
//! The primitives compose around one [`Runtime`]:
//!
//! - [`Tracked`] wraps a plain map or list so reads record dependencies and
//!   writes notify the effects that read the changed slot.
//! - [`Ref`] is a single-slot observable cell.
//! - [`Computed`] is a lazily-evaluated, cached derived value.
//! - [`Effect`] is the unit of reactive computation the other three notify.
//! - [`Job`] and the runtime's queue coalesce deferred re-runs per flush.
//!
//! Propagation is synchronous by default; deferred effects opt into the
//! batching scheduler.

mod cell;
mod computed;
mod dep;
mod effect;
mod runtime;
mod scheduler;
mod tracked;

pub use cell::Ref;
pub use computed::Computed;
pub use effect::{Effect, EffectId};
pub use runtime::Runtime;
pub use scheduler::{Job, JobId};
pub use tracked::Tracked;
