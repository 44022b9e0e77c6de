//! ## lbsim-telemetry::metrics
//! **Prometheus counters for dispatch outcomes**

use std::time::Duration;

use prometheus::{Counter, Histogram, HistogramOpts, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: prometheus::Registry,
    pub dispatched: prometheus::Counter,
    pub dropped: prometheus::Counter,
    pub completed: prometheus::Counter,
    pub service_latency: prometheus::Histogram,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let registry = Registry::new();
        let dispatched = Counter::new(
            "lbsim_requests_dispatched_total",
            "Requests admitted to a worker queue",
        )
        .expect("static counter definition");
        let dropped = Counter::new(
            "lbsim_requests_dropped_total",
            "Requests rejected by a full worker queue",
        )
        .expect("static counter definition");
        let completed = Counter::new(
            "lbsim_requests_completed_total",
            "Requests finished by a worker slot",
        )
        .expect("static counter definition");

        let service_latency = Histogram::with_opts(
            HistogramOpts::new(
                "lbsim_service_latency_seconds",
                "Time from admission to completion",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 60.0]),
        )
        .expect("static histogram definition");

        for collector in [
            Box::new(dispatched.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(dropped.clone()),
            Box::new(completed.clone()),
            Box::new(service_latency.clone()),
        ] {
            registry
                .register(collector)
                .expect("metric names are unique within a fresh registry");
        }

        Self {
            registry,
            dispatched,
            dropped,
            completed,
            service_latency,
        }
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub fn inc_dispatched(&self) {
        self.dispatched.inc();
    }

    pub fn inc_dropped(&self) {
        self.dropped.inc();
    }

    pub fn record_completion(&self, elapsed: Duration) {
        self.completed.inc();
        self.service_latency.observe(elapsed.as_secs_f64());
    }
}
