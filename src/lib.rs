//! Change-notification fan-out for a service registry.
//!
//! Registry changes are debounced per key by a [`task::DelayTaskEngine`]
//! and then pushed to subscribed clients. Service pushes live in [`push`],
//! batched wildcard-watch syncs in [`fuzzy_watch`], and request/reply
//! correlation for deliveries in [`remote`].

mod config;
mod errors;
mod metrics;
mod model;
pub mod fuzzy_watch;
pub mod push;
pub mod remote;
pub mod task;
mod utils;

pub use config::*;
pub use errors::*;
pub use metrics::*;
pub use model::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
