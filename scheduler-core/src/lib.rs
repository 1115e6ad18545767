//! Decision core for a minimal pluggable workload scheduler.
//!
//! The only entry point is [`schedule`]: given a [`Snapshot`] of the
//! cluster's nodes and pods, it returns the [`Plan`] of binds and evictions
//! that should be applied this tick. Everything in this crate is pure — no
//! I/O, no clock reads beyond what the caller puts in the snapshot, no
//! background tasks. Talking to an actual cluster is the driver's job.

pub mod engine;
pub mod models;

pub use engine::schedule;
pub use models::{
    Action, Group, Node, Plan, Pod, PodId, PodPhase, Snapshot, GROUP_NAME_ANNOTATION,
    MIN_AVAILABLE_ANNOTATION, group_pods,
};
