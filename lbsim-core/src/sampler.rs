//! Periodic utilization sampler.
//!
//! Runs on its own timer, independent of the request path. Each tick reads
//! every worker's [`LoadGauge`] and hands a [`UtilizationSnapshot`] to a
//! [`SnapshotSink`]. Reads are not coordinated with slot activity, so a
//! snapshot may be slightly stale.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::worker::{LoadGauge, WorkerId};

/// Utilization of every worker at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct UtilizationSnapshot {
    pub taken_at: DateTime<Utc>,
    pub readings: Vec<(WorkerId, f64)>,
}

impl UtilizationSnapshot {
    pub fn capture(gauges: &[Arc<LoadGauge>]) -> Self {
        Self {
            taken_at: Utc::now(),
            readings: gauges
                .iter()
                .map(|gauge| (gauge.id(), gauge.utilization()))
                .collect(),
        }
    }
}

/// Status line: timestamp, then `<id>=<utilization>` per worker.
impl fmt::Display for UtilizationSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.taken_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
        )?;
        for (id, utilization) in &self.readings {
            write!(f, " {id}={utilization:.6}")?;
        }
        Ok(())
    }
}

/// Destination for sampler output.
pub trait SnapshotSink: Send + 'static {
    fn emit(&mut self, snapshot: UtilizationSnapshot);
}

/// Prints each status line on stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl SnapshotSink for StdoutSink {
    fn emit(&mut self, snapshot: UtilizationSnapshot) {
        println!("{snapshot}");
    }
}

/// Logs each status line at info level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl SnapshotSink for TracingSink {
    fn emit(&mut self, snapshot: UtilizationSnapshot) {
        info!(target: "lbsim::utilization", "{snapshot}");
    }
}

impl SnapshotSink for Box<dyn SnapshotSink> {
    fn emit(&mut self, snapshot: UtilizationSnapshot) {
        (**self).emit(snapshot)
    }
}

impl SnapshotSink for mpsc::UnboundedSender<UtilizationSnapshot> {
    fn emit(&mut self, snapshot: UtilizationSnapshot) {
        // Receiver gone means nobody is listening any more.
        let _ = self.send(snapshot);
    }
}

/// Handle on a running sampler task.
pub struct UtilizationSampler {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<u64>,
}

impl UtilizationSampler {
    /// Starts sampling. The first snapshot is taken one `period` after spawn.
    pub fn spawn<S: SnapshotSink>(gauges: Vec<Arc<LoadGauge>>, period: Duration, sink: S) -> Self {
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(run(gauges, period, sink, stopped));
        Self {
            stop: Some(stop),
            task,
        }
    }

    /// Signals the loop and waits for it to exit. Returns the number of
    /// snapshots emitted.
    pub async fn stop(mut self) -> u64 {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match self.task.await {
            Ok(ticks) => ticks,
            Err(e) => {
                warn!("Utilization sampler failed: {e}");
                0
            }
        }
    }
}

async fn run<S: SnapshotSink>(
    gauges: Vec<Arc<LoadGauge>>,
    period: Duration,
    mut sink: S,
    mut stopped: oneshot::Receiver<()>,
) -> u64 {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut emitted = 0;

    debug!(workers = gauges.len(), ?period, "Utilization sampler started");
    loop {
        tokio::select! {
            // A dropped handle also ends the loop.
            _ = &mut stopped => break,
            _ = ticker.tick() => {
                sink.emit(UtilizationSnapshot::capture(&gauges));
                emitted += 1;
            }
        }
    }
    debug!(emitted, "Utilization sampler stopped");
    emitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_line_lists_every_worker() {
        let snapshot = UtilizationSnapshot {
            taken_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 5).unwrap(),
            readings: vec![(WorkerId(1), 0.375), (WorkerId(2), 1.25)],
        };
        assert_eq!(
            snapshot.to_string(),
            "2024-03-01T12:00:05.000000000Z 1=0.375000 2=1.250000"
        );
    }

    #[test]
    fn empty_pool_renders_timestamp_only() {
        let snapshot = UtilizationSnapshot {
            taken_at: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            readings: Vec::new(),
        };
        assert_eq!(snapshot.to_string(), "2024-03-01T00:00:00.000000000Z");
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_fixed_cadence_and_stops() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sampler = UtilizationSampler::spawn(Vec::new(), Duration::from_secs(1), tx);

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let emitted = sampler.stop().await;
        assert_eq!(emitted, 3);

        let mut received = 0;
        while rx.recv().await.is_some() {
            received += 1;
        }
        assert_eq!(received, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_first_tick_emits_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sampler = UtilizationSampler::spawn(Vec::new(), Duration::from_secs(1), tx);
        assert_eq!(sampler.stop().await, 0);
        assert!(rx.recv().await.is_none());
    }
}
