//! Load balancer: owns the worker pool and the selection strategy.
//!
//! Lifecycle:
//! 1. [`Balancer::start`] builds the pool, starts every worker, the response
//!    collector and the utilization sampler.
//! 2. [`Balancer::send`] routes requests; a refused admission is counted as a
//!    drop and never retried.
//! 3. [`Balancer::stop`] drains the workers one by one, closes the response
//!    channel, waits for the collector and stops the sampler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lbsim_config::{LbSimConfig, WorkerConfig};
use lbsim_telemetry::MetricsRecorder;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::SimulationError;
use crate::request::{CompletionEvent, Request};
use crate::sampler::{SnapshotSink, StdoutSink, UtilizationSampler};
use crate::strategy::{self, SelectionStrategy};
use crate::worker::{Worker, WorkerIdSequence};

type SharedStrategy = Arc<Mutex<Box<dyn SelectionStrategy>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    Stopped,
}

pub struct Balancer {
    pool_size: usize,
    worker_config: WorkerConfig,
    sample_period: Duration,
    strategy: SharedStrategy,
    strategy_name: String,
    workers: Vec<Worker>,
    responses: Option<mpsc::UnboundedSender<CompletionEvent>>,
    collector: Option<JoinHandle<()>>,
    sampler: Option<UtilizationSampler>,
    sink: Option<Box<dyn SnapshotSink>>,
    dropped: AtomicU64,
    completed: Arc<AtomicU64>,
    metrics: Arc<MetricsRecorder>,
    state: State,
}

impl Balancer {
    /// Creates an idle balancer. Status lines go to stdout every second unless
    /// overridden with [`Balancer::with_sample_period`] and
    /// [`Balancer::with_snapshot_sink`].
    pub fn new(
        pool_size: usize,
        worker_config: WorkerConfig,
        strategy: Box<dyn SelectionStrategy>,
    ) -> Self {
        let strategy_name = strategy.name().to_string();
        Self {
            pool_size,
            worker_config,
            sample_period: Duration::from_secs(1),
            strategy: Arc::new(Mutex::new(strategy)),
            strategy_name,
            workers: Vec::new(),
            responses: None,
            collector: None,
            sampler: None,
            sink: None,
            dropped: AtomicU64::new(0),
            completed: Arc::new(AtomicU64::new(0)),
            metrics: Arc::new(MetricsRecorder::new()),
            state: State::Idle,
        }
    }

    /// Balancer sized and configured from the top-level configuration.
    pub fn from_config(config: &LbSimConfig) -> Self {
        Self::new(
            config.balancer.pool_size,
            config.worker,
            strategy::from_config(&config.balancer),
        )
        .with_sample_period(config.sampler.interval())
    }

    pub fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period;
        self
    }

    pub fn with_snapshot_sink(mut self, sink: impl SnapshotSink) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    /// Requests refused admission so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Acquire)
    }

    /// Completion events forwarded to the strategy so far.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    /// Builds and starts the pool, the collector and the sampler.
    #[instrument(skip(self), fields(pool_size = self.pool_size, strategy = %self.strategy_name))]
    pub fn start(&mut self) -> Result<(), SimulationError> {
        if self.state != State::Idle {
            return Err(SimulationError::AlreadyStarted);
        }

        let (responses, completions) = mpsc::unbounded_channel();
        let mut ids = WorkerIdSequence::new();
        self.workers = (0..self.pool_size)
            .map(|_| Worker::new(ids.next_id(), &self.worker_config, responses.clone()))
            .collect();
        for worker in &mut self.workers {
            worker.start()?;
        }
        self.responses = Some(responses);

        self.collector = Some(tokio::spawn(collect_responses(
            completions,
            Arc::clone(&self.strategy),
            Arc::clone(&self.metrics),
            Arc::clone(&self.completed),
        )));

        let gauges = self.workers.iter().map(Worker::gauge).collect();
        let sink = self
            .sink
            .take()
            .unwrap_or_else(|| Box::new(StdoutSink) as Box<dyn SnapshotSink>);
        self.sampler = Some(UtilizationSampler::spawn(gauges, self.sample_period, sink));

        self.state = State::Running;
        info!(
            concurrency = self.worker_config.concurrency,
            queue_capacity = self.worker_config.queue_capacity,
            "Balancer started"
        );
        Ok(())
    }

    /// Routes one request. Never blocks; a refused admission increments the
    /// drop counter and discards the request.
    pub fn send(&self, request: Request) {
        let request_id = request.id;
        let chosen = self.strategy.lock().select(&self.workers);

        let admitted = match chosen.and_then(|index| self.workers.get(index)) {
            Some(worker) => {
                let admitted = worker.try_send(request);
                trace!(request_id, worker = %worker.id(), admitted, "Request routed");
                admitted
            }
            None => {
                warn!(request_id, ?chosen, "No worker available for request");
                false
            }
        };

        if admitted {
            self.metrics.inc_dispatched();
        } else {
            self.dropped.fetch_add(1, Ordering::AcqRel);
            self.metrics.inc_dropped();
        }
    }

    /// Drains every worker, then shuts down the collector and the sampler.
    /// Calling it again, or on a balancer that never started, does nothing.
    #[instrument(skip(self), fields(strategy = %self.strategy_name))]
    pub async fn stop(&mut self) -> Result<(), SimulationError> {
        if self.state != State::Running {
            return Ok(());
        }
        self.state = State::Stopped;

        let mut failure = None;
        for worker in &mut self.workers {
            if let Err(e) = worker.stop().await {
                failure.get_or_insert(e);
            }
        }

        // Workers are drained, nothing can publish any more.
        self.responses = None;
        if let Some(collector) = self.collector.take() {
            if let Err(e) = collector.await {
                failure.get_or_insert(SimulationError::from(e));
            }
        }

        if let Some(sampler) = self.sampler.take() {
            let snapshots = sampler.stop().await;
            debug!(snapshots, "Sampler stopped");
        }

        info!(
            completed = self.completed(),
            dropped = self.dropped(),
            "Balancer stopped"
        );
        failure.map_or(Ok(()), Err)
    }
}

async fn collect_responses(
    mut completions: mpsc::UnboundedReceiver<CompletionEvent>,
    strategy: SharedStrategy,
    metrics: Arc<MetricsRecorder>,
    completed: Arc<AtomicU64>,
) {
    while let Some(event) = completions.recv().await {
        if let Some(elapsed) = event.request.elapsed() {
            metrics.record_completion(elapsed);
        }
        strategy.lock().process_response(&event);
        completed.fetch_add(1, Ordering::AcqRel);
    }
    debug!("Response channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::UtilizationSnapshot;
    use crate::strategy::RoundRobin;
    use crate::worker::WorkerId;
    use chrono::Utc;

    /// Round robin that keeps every completion it is handed.
    struct Recording {
        inner: RoundRobin,
        events: Arc<Mutex<Vec<CompletionEvent>>>,
    }

    impl SelectionStrategy for Recording {
        fn select(&mut self, workers: &[Worker]) -> Option<usize> {
            self.inner.select(workers)
        }

        fn process_response(&mut self, event: &CompletionEvent) {
            self.events.lock().push(event.clone());
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn recording_balancer(
        pool_size: usize,
        concurrency: usize,
        queue_capacity: usize,
    ) -> (Balancer, Arc<Mutex<Vec<CompletionEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let strategy = Recording {
            inner: RoundRobin::new(),
            events: Arc::clone(&events),
        };
        let (snapshots, _) = mpsc::unbounded_channel::<UtilizationSnapshot>();
        let balancer = Balancer::new(
            pool_size,
            WorkerConfig {
                concurrency,
                queue_capacity,
            },
            Box::new(strategy),
        )
        .with_snapshot_sink(snapshots);
        (balancer, events)
    }

    fn request(id: u64, latency_ms: u64) -> Request {
        Request::new(id, Utc::now(), Duration::from_millis(latency_ms))
    }

    #[tokio::test(start_paused = true)]
    async fn start_assigns_unique_sequential_ids() {
        let (mut balancer, _) = recording_balancer(4, 1, 1);
        assert!(balancer.workers().is_empty());
        balancer.start().unwrap();
        let ids: Vec<_> = balancer.workers().iter().map(Worker::id).collect();
        assert_eq!(ids, vec![WorkerId(1), WorkerId(2), WorkerId(3), WorkerId(4)]);
        balancer.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn drop_counter_tracks_refused_admissions_only() {
        let (mut balancer, events) = recording_balancer(1, 1, 1);
        balancer.start().unwrap();

        // One slot, one queue place, slots not yet polled: only the first fits.
        balancer.send(request(0, 100));
        assert_eq!(balancer.dropped(), 0);
        balancer.send(request(1, 100));
        assert_eq!(balancer.dropped(), 1);
        balancer.send(request(2, 100));
        assert_eq!(balancer.dropped(), 2);

        balancer.stop().await.unwrap();
        assert_eq!(balancer.dropped(), 2);
        assert_eq!(balancer.completed(), 1);
        assert_eq!(events.lock().len(), 1);
        assert_eq!(balancer.metrics().dispatched.get(), 1.0);
        assert_eq!(balancer.metrics().dropped.get(), 2.0);
    }

    #[tokio::test]
    async fn send_before_start_counts_as_drop() {
        let (balancer, _) = recording_balancer(2, 1, 1);
        balancer.send(request(0, 1));
        assert_eq!(balancer.dropped(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_fails_and_stop_is_idempotent() {
        let (mut balancer, _) = recording_balancer(2, 1, 1);
        balancer.stop().await.unwrap();
        balancer.start().unwrap();
        assert!(matches!(
            balancer.start(),
            Err(SimulationError::AlreadyStarted)
        ));
        balancer.stop().await.unwrap();
        balancer.stop().await.unwrap();
        assert!(!balancer.is_running());
        assert!(matches!(
            balancer.start(),
            Err(SimulationError::AlreadyStarted)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_completes_every_admitted_request() {
        let (mut balancer, events) = recording_balancer(3, 2, 4);
        balancer.start().unwrap();

        let sent = 30u64;
        for id in 0..sent {
            balancer.send(request(id, 50 + (id % 7) * 100));
        }
        let admitted = sent - balancer.dropped();
        assert!(admitted > 0);

        balancer.stop().await.unwrap();
        let recorded = events.lock().len() as u64;
        assert_eq!(recorded, admitted);
        for event in events.lock().iter() {
            let r = &event.request;
            let (start, end) = (r.start_time.unwrap(), r.end_time.unwrap());
            assert!(end > start);
            assert!(end - start >= r.service_latency);
            assert!(r.assigned_worker.is_some());
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(events.lock().len() as u64, recorded);
    }

    #[tokio::test(start_paused = true)]
    async fn round_robin_spreads_across_pool() {
        let (mut balancer, events) = recording_balancer(3, 1, 10);
        balancer.start().unwrap();
        for id in 0..6 {
            balancer.send(request(id, 10));
        }
        balancer.stop().await.unwrap();

        let mut by_request: Vec<(u64, u32)> = events
            .lock()
            .iter()
            .map(|e| (e.request.id, e.request.assigned_worker.unwrap().0))
            .collect();
        by_request.sort();
        let workers: Vec<u32> = by_request.into_iter().map(|(_, w)| w).collect();
        assert_eq!(workers, vec![2, 3, 1, 2, 3, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn sampler_reports_every_worker() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut balancer = Balancer::new(2, WorkerConfig::default(), Box::new(RoundRobin::new()))
            .with_sample_period(Duration::from_millis(500))
            .with_snapshot_sink(tx);
        balancer.start().unwrap();
        balancer.send(request(0, 2_000));
        tokio::time::sleep(Duration::from_millis(600)).await;
        balancer.stop().await.unwrap();

        let snapshot = rx.recv().await.expect("one tick before stop");
        assert_eq!(snapshot.readings.len(), 2);
        assert_eq!(snapshot.readings[0].0, WorkerId(1));
        // Round robin sent the request to the second worker: 1 of 16 slots.
        assert_eq!(snapshot.readings[1], (WorkerId(2), 1.0 / 16.0));
    }
}
