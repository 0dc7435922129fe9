// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

pub use server::start_metrics_server;

// ============================================================================
// Bridge Metrics
// ============================================================================
//
// Counters for every stage of a dispatch plus sink latency. Scraped via
// GET /metrics when a metrics port is configured.
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub events_received: IntCounterVec,
    pub events_forwarded: IntCounterVec,
    pub events_failed: IntCounterVec,
    pub events_ignored: IntCounter,
    pub sink_duration: HistogramVec,

    pub dead_letters: IntCounter,
    pub reconnects: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events_received = IntCounterVec::new(
            Opts::new("bridge_events_received_total", "Events received from the bus"),
            &["channel"],
        )?;
        registry.register(Box::new(events_received.clone()))?;

        let events_forwarded = IntCounterVec::new(
            Opts::new("bridge_events_forwarded_total", "Events written to the target store"),
            &["direction"],
        )?;
        registry.register(Box::new(events_forwarded.clone()))?;

        let events_failed = IntCounterVec::new(
            Opts::new("bridge_events_failed_total", "Events dropped because of an error"),
            &["direction", "reason"],
        )?;
        registry.register(Box::new(events_failed.clone()))?;

        let events_ignored = IntCounter::new(
            "bridge_events_ignored_total",
            "Events received on an unrecognized channel",
        )?;
        registry.register(Box::new(events_ignored.clone()))?;

        let sink_duration = HistogramVec::new(
            HistogramOpts::new("bridge_sink_duration_seconds", "Sink call duration including retries")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
            &["direction"],
        )?;
        registry.register(Box::new(sink_duration.clone()))?;

        let dead_letters = IntCounter::new(
            "bridge_dead_letters_total",
            "Events pushed to the dead letter queue",
        )?;
        registry.register(Box::new(dead_letters.clone()))?;

        let reconnects = IntCounter::new(
            "bridge_reconnects_total",
            "Bus reconnect attempts",
        )?;
        registry.register(Box::new(reconnects.clone()))?;

        Ok(Self {
            registry,
            events_received,
            events_forwarded,
            events_failed,
            events_ignored,
            sink_duration,
            dead_letters,
            reconnects,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_received(&self, channel: &str) {
        self.events_received.with_label_values(&[channel]).inc();
    }

    pub fn record_outcome(&self, direction: &str, duration_secs: f64, failure_reason: Option<&str>) {
        match failure_reason {
            None => self.events_forwarded.with_label_values(&[direction]).inc(),
            Some(reason) => self.events_failed.with_label_values(&[direction, reason]).inc(),
        }
        self.sink_duration.with_label_values(&[direction]).observe(duration_secs);
    }

    pub fn record_malformed(&self, direction: &str) {
        self.events_failed.with_label_values(&[direction, "malformed"]).inc();
    }
}
