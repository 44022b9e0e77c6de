//! # lbsim-core
//!
//! Concurrency and dispatch engine of the load-balancer simulator.
//!
//! ### Key Submodules:
//! - `worker`: simulated backend with bounded admission and fixed slots
//! - `strategy`: pluggable worker selection with completion feedback
//! - `balancer`: pool ownership, routing and drop accounting
//! - `sampler`: periodic utilization snapshots
//!
//! Everything runs on tokio; slots simulate service time with timer sleeps,
//! so a paused test clock replays whole scenarios deterministically.

pub mod balancer;
pub mod error;
pub mod request;
pub mod sampler;
pub mod strategy;
pub mod worker;

pub mod prelude {
    pub use crate::balancer::Balancer;
    pub use crate::error::SimulationError;
    pub use crate::request::{CompletionEvent, Request};
    pub use crate::sampler::{SnapshotSink, StdoutSink, TracingSink, UtilizationSnapshot};
    pub use crate::strategy::{
        EwmaStrategy, LeastUtilized, RoundRobin, SelectionStrategy, WeightedRoundRobin,
    };
    pub use crate::worker::{Worker, WorkerId, WorkerIdSequence};
}

pub use error::SimulationError;
