//! Request and completion event types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::worker::WorkerId;

/// A single unit of simulated work.
///
/// `start_time` and `end_time` are stamped by the worker that accepts the
/// request; everything else is fixed when the trace is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Position among the successfully loaded trace records.
    pub id: u64,
    /// Timestamp recorded in the trace.
    pub original_start_time: DateTime<Utc>,
    /// Simulated processing time.
    pub service_latency: Duration,
    /// When a worker admitted the request.
    pub start_time: Option<Instant>,
    /// When the worker slot finished processing it.
    pub end_time: Option<Instant>,
    /// Worker that admitted the request.
    pub assigned_worker: Option<WorkerId>,
}

impl Request {
    pub fn new(id: u64, original_start_time: DateTime<Utc>, service_latency: Duration) -> Self {
        Self {
            id,
            original_start_time,
            service_latency,
            start_time: None,
            end_time: None,
            assigned_worker: None,
        }
    }

    /// Admission-to-completion time, once both ends are stamped.
    pub fn elapsed(&self) -> Option<Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }
}

/// A finished request together with its worker's utilization, sampled right
/// after the slot was released.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    pub request: Request,
    pub utilization: f64,
}

impl CompletionEvent {
    pub fn worker(&self) -> Option<WorkerId> {
        self.request.assigned_worker
    }
}
