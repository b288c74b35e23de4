//! Batched synchronization of wildcard ("fuzzy") watches.
//!
//! A client watching `namespace>>group*@@service*` first receives every
//! matched service in `InitNotify` batches. Each acknowledged batch is
//! recorded in a [`crate::task::BatchTaskCounter`] shared by the sync; once
//! all batches are in, a single `FinishInitNotify` is sent. Later service
//! changes reach the watcher as `DiffSyncNotify` tasks. Every failed
//! delivery is re-enqueued under the same key.

mod execute_task;
mod notifier;
mod pattern;
mod sync_task;

pub use execute_task::*;
pub use notifier::*;
pub use pattern::*;
pub use sync_task::*;
