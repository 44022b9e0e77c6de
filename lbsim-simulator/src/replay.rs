//! Replay module.
//!
//! Plays a loaded [`Trace`] into a balancer, reproducing the recorded spacing
//! between arrivals. Requests with the same recorded timestamp go out
//! back-to-back. The replayer never tries to catch up: a slow `send` simply
//! stretches the playback.

use std::time::Duration;

use chrono::{DateTime, Utc};
use lbsim_core::balancer::Balancer;
use lbsim_core::request::Request;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

use crate::trace::Trace;

/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplaySummary {
    /// Requests handed to the balancer (admitted or dropped).
    pub sent: usize,
    /// Wall time the pass took.
    pub elapsed: Duration,
}

pub struct TraceReplayer {
    requests: Vec<Request>,
    time_scale: f64,
}

impl TraceReplayer {
    pub fn new(trace: Trace) -> Self {
        Self {
            requests: trace.into_requests(),
            time_scale: 1.0,
        }
    }

    /// Divide every gap by `scale`; `2.0` plays twice as fast. Non-positive or
    /// non-finite values are ignored.
    pub fn with_time_scale(mut self, scale: f64) -> Self {
        if scale.is_finite() && scale > 0.0 {
            self.time_scale = scale;
        } else {
            warn!(scale, "Ignoring invalid replay time scale");
        }
        self
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Sends every request to `balancer`, sleeping between distinct recorded
    /// timestamps.
    #[instrument(skip_all, fields(requests = self.requests.len(), time_scale = self.time_scale))]
    pub async fn run(self, balancer: &Balancer) -> ReplaySummary {
        let started = Instant::now();
        let total = self.requests.len();
        let mut previous: Option<DateTime<Utc>> = None;
        let mut sent = 0;

        info!("Replay started");
        for request in self.requests {
            let recorded = request.original_start_time;
            if let Some(previous) = previous.filter(|previous| *previous != recorded) {
                let gap = arrival_gap(previous, recorded, self.time_scale);
                if !gap.is_zero() {
                    sleep(gap).await;
                }
            }
            previous = Some(recorded);

            balancer.send(request);
            sent += 1;
            if sent % 10_000 == 0 {
                debug!(sent, total, dropped = balancer.dropped(), "Replay progress");
            }
        }

        let summary = ReplaySummary {
            sent,
            elapsed: started.elapsed(),
        };
        info!(
            sent,
            dropped = balancer.dropped(),
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "Replay finished"
        );
        summary
    }
}

/// Real time to wait between two recorded arrivals. Out-of-order timestamps
/// give zero.
pub fn arrival_gap(previous: DateTime<Utc>, current: DateTime<Utc>, time_scale: f64) -> Duration {
    let recorded = (current - previous).to_std().unwrap_or_default();
    if time_scale == 1.0 {
        return recorded;
    }
    Duration::try_from_secs_f64(recorded.as_secs_f64() / time_scale).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tracing_test::traced_test;

    fn at(secs: i64, millis: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
            + chrono::Duration::seconds(secs)
            + chrono::Duration::milliseconds(millis)
    }

    #[test]
    fn gap_matches_recorded_spacing() {
        assert_eq!(arrival_gap(at(0, 0), at(2, 0), 1.0), Duration::from_secs(2));
        assert_eq!(
            arrival_gap(at(0, 0), at(0, 250), 1.0),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn gap_is_compressed_by_time_scale() {
        assert_eq!(
            arrival_gap(at(0, 0), at(10, 0), 10.0),
            Duration::from_secs(1)
        );
        assert_eq!(
            arrival_gap(at(0, 0), at(1, 0), 0.5),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn out_of_order_gap_is_zero() {
        assert_eq!(arrival_gap(at(5, 0), at(3, 0), 1.0), Duration::ZERO);
    }

    #[traced_test]
    #[test]
    fn invalid_time_scale_is_ignored() {
        let replayer = TraceReplayer::new(Trace::default()).with_time_scale(0.0);
        assert_eq!(replayer.time_scale(), 1.0);
        let replayer = replayer.with_time_scale(f64::NAN);
        assert_eq!(replayer.time_scale(), 1.0);
        let replayer = replayer.with_time_scale(4.0);
        assert_eq!(replayer.time_scale(), 4.0);
        assert!(replayer.is_empty());
        assert!(logs_contain("Ignoring invalid replay time scale"));
    }
}
