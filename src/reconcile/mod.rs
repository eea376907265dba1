//! The three per-kind reconcilers (C3, C4, C5) and their pure helpers.
//!
//! Each kind gets its own module with a `reconcile` and `on_error` function
//! matching the `kube::runtime::Controller` signature; `crate::manager`
//! wires them to their `Api`/`Controller` pairs under leader election.

pub mod agent;
pub mod autoscaler;
pub mod cluster;
pub mod selection;
pub mod task;

use std::time::Duration;

/// Default backoff applied to errored reconciles, shared across kinds (§5:
/// "per-call deadline ≤ 30s default"; this is the requeue-after on failure,
/// not the call deadline itself).
pub const ERROR_REQUEUE: Duration = Duration::from_secs(5);
