//! Simulated backend worker.
//!
//! A worker owns a bounded admission queue and a fixed number of slots. Each
//! slot pulls one request at a time, sleeps for the request's service latency
//! and reports the completion on the pool-wide response channel.
//!
//! Load is tracked with two atomic counters (`in_flight`, `queued`) kept in a
//! [`LoadGauge`] that the sampler can hold without touching the worker itself.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lbsim_config::WorkerConfig;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, instrument, trace};

use crate::error::SimulationError;
use crate::request::{CompletionEvent, Request};

/// Identity of a worker within one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u32);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out worker ids for one pool, starting at 1.
#[derive(Debug)]
pub struct WorkerIdSequence {
    next: u32,
}

impl WorkerIdSequence {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u32) -> Self {
        Self { next: first }
    }

    pub fn next_id(&mut self) -> WorkerId {
        let id = WorkerId(self.next);
        self.next += 1;
        id
    }
}

impl Default for WorkerIdSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// `(in_flight + queued) / concurrency`. Not clamped: values above 1.0 mean
/// requests are waiting for a slot.
#[inline]
pub fn utilization(in_flight: usize, queued: usize, concurrency: usize) -> f64 {
    (in_flight + queued) as f64 / concurrency as f64
}

/// Live load counters of one worker.
#[derive(Debug)]
pub struct LoadGauge {
    id: WorkerId,
    concurrency: usize,
    in_flight: AtomicUsize,
    queued: AtomicUsize,
}

impl LoadGauge {
    fn new(id: WorkerId, concurrency: usize) -> Self {
        Self {
            id,
            concurrency,
            in_flight: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    #[inline]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    #[inline]
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Point-in-time utilization. Reads are not a consistent snapshot of both
    /// counters.
    #[inline]
    pub fn utilization(&self) -> f64 {
        utilization(self.in_flight(), self.queued(), self.concurrency)
    }

    // A slot took a request off the queue. Raise in_flight first so the sum
    // never dips while the request changes hands.
    fn begin(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.queued.fetch_sub(1, Ordering::AcqRel);
    }

    fn finish(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// One simulated backend process.
pub struct Worker {
    gauge: Arc<LoadGauge>,
    queue_capacity: usize,
    responses: Option<mpsc::UnboundedSender<CompletionEvent>>,
    admission: Option<mpsc::Sender<Request>>,
    slots: Vec<JoinHandle<()>>,
}

impl Worker {
    /// Builds an idle worker. Nothing runs until [`Worker::start`].
    pub fn new(
        id: WorkerId,
        config: &WorkerConfig,
        responses: mpsc::UnboundedSender<CompletionEvent>,
    ) -> Self {
        Self {
            gauge: Arc::new(LoadGauge::new(id, config.concurrency.max(1))),
            queue_capacity: config.queue_capacity.max(1),
            responses: Some(responses),
            admission: None,
            slots: Vec::new(),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.gauge.id
    }

    pub fn concurrency(&self) -> usize {
        self.gauge.concurrency
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn in_flight(&self) -> usize {
        self.gauge.in_flight()
    }

    pub fn queued(&self) -> usize {
        self.gauge.queued()
    }

    pub fn utilization(&self) -> f64 {
        self.gauge.utilization()
    }

    /// Shared handle on the load counters, for readers outside the pool.
    pub fn gauge(&self) -> Arc<LoadGauge> {
        Arc::clone(&self.gauge)
    }

    /// Whether the worker currently accepts requests.
    pub fn is_accepting(&self) -> bool {
        self.admission.is_some()
    }

    /// Allocates the admission queue and spawns one task per slot.
    ///
    /// A worker can be started once; the response channel handle is handed to
    /// the slots and released when they exit.
    #[instrument(skip(self), fields(worker = %self.id()))]
    pub fn start(&mut self) -> Result<(), SimulationError> {
        let responses = self
            .responses
            .take()
            .ok_or(SimulationError::WorkerAlreadyStarted(self.id()))?;

        let (admission, queue) = mpsc::channel(self.queue_capacity);
        let queue = Arc::new(Mutex::new(queue));

        self.slots = (0..self.gauge.concurrency)
            .map(|slot| {
                tokio::spawn(run_slot(
                    slot,
                    Arc::clone(&queue),
                    Arc::clone(&self.gauge),
                    responses.clone(),
                ))
            })
            .collect();
        self.admission = Some(admission);

        debug!(
            slots = self.gauge.concurrency,
            queue_capacity = self.queue_capacity,
            "Worker started"
        );
        Ok(())
    }

    /// Non-blocking admission. Returns `false` if the queue is full or the
    /// worker is not accepting requests; the request is discarded in that case.
    pub fn try_send(&self, mut request: Request) -> bool {
        let Some(admission) = &self.admission else {
            return false;
        };

        request.start_time = Some(Instant::now());
        request.assigned_worker = Some(self.id());

        // Count before the request becomes visible to a slot.
        self.gauge.queued.fetch_add(1, Ordering::AcqRel);
        match admission.try_send(request) {
            Ok(()) => true,
            Err(e) => {
                self.gauge.queued.fetch_sub(1, Ordering::AcqRel);
                trace!(worker = %self.id(), "Admission refused: {e}");
                false
            }
        }
    }

    /// Closes the admission queue and waits for every queued and in-flight
    /// request to finish. A second call returns immediately.
    #[instrument(skip(self), fields(worker = %self.id()))]
    pub async fn stop(&mut self) -> Result<(), SimulationError> {
        let was_accepting = self.admission.take().is_some();
        // Never started: release the response handle so the channel can close.
        self.responses = None;
        if !was_accepting && self.slots.is_empty() {
            return Ok(());
        }

        let mut failure = None;
        for slot in self.slots.drain(..) {
            if let Err(e) = slot.await {
                error!("Worker slot failed: {e}");
                failure.get_or_insert(SimulationError::from(e));
            }
        }
        debug!("Worker drained");
        failure.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id())
            .field("concurrency", &self.concurrency())
            .field("queue_capacity", &self.queue_capacity)
            .field("in_flight", &self.in_flight())
            .field("queued", &self.queued())
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

async fn run_slot(
    slot: usize,
    queue: Arc<Mutex<mpsc::Receiver<Request>>>,
    gauge: Arc<LoadGauge>,
    responses: mpsc::UnboundedSender<CompletionEvent>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(mut request) = next else {
            break;
        };

        gauge.begin();
        sleep(request.service_latency).await;
        request.end_time = Some(Instant::now());
        gauge.finish();

        let event = CompletionEvent {
            request,
            utilization: gauge.utilization(),
        };
        if responses.send(event).is_err() {
            debug!(worker = %gauge.id, slot, "Response channel closed; completion discarded");
        }
    }
    trace!(worker = %gauge.id, slot, "Slot exited");
}
