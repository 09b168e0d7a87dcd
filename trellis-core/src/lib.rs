//! # trellis-core
//!
//! A fine-grained reactive state runtime: wrap plain data, read it inside
//! effects, and writes re-run exactly the effects that read the slots that
//! changed.
//!
//! ```
//! use trellis_core::{Runtime, Value};
//! use std::sync::atomic::{AtomicI64, Ordering};
//! use std::sync::Arc;
//!
//! let rt = Runtime::new();
//! let state = rt.wrap(Value::map_of([("count", 0)]));
//! let state = state.as_tracked().unwrap().clone();
//!
//! let seen = Arc::new(AtomicI64::new(-1));
//! let seen_clone = seen.clone();
//! let watched = state.clone();
//! let _effect = rt.effect(move || {
//!     let count = watched.get("count").as_i64().unwrap();
//!     seen_clone.store(count, Ordering::SeqCst);
//! });
//! assert_eq!(seen.load(Ordering::SeqCst), 0);
//!
//! state.set("count", 1);
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```
//!
//! The engine is an explicit [`Runtime`] instance with no process-wide
//! state; independent runtimes never observe each other. All handles are
//! `Send + Sync` and cheap to clone.

pub mod error;
pub mod reactive;
pub mod value;

pub use error::ReactiveError;
pub use reactive::{Computed, Effect, EffectId, Job, JobId, Ref, Runtime, Tracked};
pub use value::{Key, NodeId, Value};
