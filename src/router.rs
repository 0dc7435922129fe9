use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::codec;
use crate::config::BridgeConfig;
use crate::errors::{BridgeError, SinkError};
use crate::mapping::FieldMapper;
use crate::messaging::{DeadLetter, DeadLetterSink};
use crate::metrics::Metrics;
use crate::models::{ChannelEvent, Direction, GenericRecord};
use crate::sinks::{DocumentSink, RelationalSink};
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

// ============================================================================
// Channel Router
// ============================================================================
//
// Consumes one event at a time and dispatches it inline:
//
//   bus -> route by channel -> decode -> map -> sink (retry, timeout)
//
// Event n+1 is not read from the stream until the sink call for event n has
// returned. Per-event failures are logged and swallowed here; only the end
// of the subscription stream leaves `run`.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub document_channel: String,
    pub relational_channel: String,
    pub sink_timeout: Duration,
    pub retry: RetryConfig,
    pub log_payload_limit: usize,
}

impl From<&BridgeConfig> for RouterConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            document_channel: config.document_channel.clone(),
            relational_channel: config.relational_channel.clone(),
            sink_timeout: config.sink_timeout(),
            retry: config.sink_retry(),
            log_payload_limit: config.log_payload_limit,
        }
    }
}

/// What happened to a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Forwarded,
    Ignored,
    Malformed,
    Failed,
}

pub struct ChannelRouter {
    config: RouterConfig,
    mapper: FieldMapper,
    relational: Arc<dyn RelationalSink>,
    document: Arc<dyn DocumentSink>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    metrics: Option<Arc<Metrics>>,
}

impl ChannelRouter {
    pub fn new(
        config: RouterConfig,
        relational: Arc<dyn RelationalSink>,
        document: Arc<dyn DocumentSink>,
    ) -> Self {
        Self {
            config,
            mapper: FieldMapper::default(),
            relational,
            document,
            dead_letters: None,
            metrics: None,
        }
    }

    pub fn with_dead_letters(mut self, dead_letters: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(dead_letters);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Channels the subscription must be bound to.
    pub fn channels(&self) -> Vec<String> {
        vec![
            self.config.document_channel.clone(),
            self.config.relational_channel.clone(),
        ]
    }

    pub fn route(&self, channel: &str) -> Option<Direction> {
        if channel == self.config.document_channel {
            Some(Direction::DocumentToRelational)
        } else if channel == self.config.relational_channel {
            Some(Direction::RelationalToDocument)
        } else {
            None
        }
    }

    /// Consume events until the stream ends, which always means the bus
    /// connection was lost.
    pub async fn run<S>(&self, mut events: S) -> BridgeError
    where
        S: Stream<Item = ChannelEvent> + Unpin,
    {
        while let Some(event) = events.next().await {
            self.dispatch(event).await;
        }

        BridgeError::Connection("subscription stream closed".to_string())
    }

    pub async fn dispatch(&self, event: ChannelEvent) -> DispatchOutcome {
        let payload = codec::truncate_payload(&event.raw_body, self.config.log_payload_limit);
        tracing::info!(channel = %event.channel, payload = %payload, "📥 Received event");

        if let Some(metrics) = &self.metrics {
            metrics.record_received(&event.channel);
        }

        let Some(direction) = self.route(&event.channel) else {
            tracing::warn!(channel = %event.channel, "Unrecognized channel, event discarded");
            if let Some(metrics) = &self.metrics {
                metrics.events_ignored.inc();
            }
            return DispatchOutcome::Ignored;
        };

        let record = match codec::decode(&event.raw_body) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(
                    channel = %event.channel,
                    direction = %direction,
                    payload = %payload,
                    error = %e,
                    "Dropping event with malformed payload"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_malformed(direction.as_str());
                }
                return DispatchOutcome::Malformed;
            }
        };

        let mapped = self.mapper.map(direction, &record);
        tracing::debug!(
            direction = %direction,
            source_fields = record.len(),
            mapped_fields = mapped.len(),
            "Record mapped"
        );

        let started = Instant::now();

        let mapped_ref = &mapped;
        let result = retry_on_transient(&self.config.retry, move |attempt| {
            tracing::debug!(direction = %direction, attempt = attempt, "Calling sink");
            self.call_sink(direction, mapped_ref)
        })
        .await;

        let elapsed = started.elapsed().as_secs_f64();

        match result {
            RetryResult::Success(target) => {
                tracing::info!(
                    channel = %event.channel,
                    direction = %direction,
                    target = %target,
                    "✅ Event forwarded"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_outcome(direction.as_str(), elapsed, None);
                }
                DispatchOutcome::Forwarded
            }
            RetryResult::Failed { error, attempts }
            | RetryResult::PermanentFailure { error, attempts } => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_outcome(direction.as_str(), elapsed, Some(error.reason()));
                }

                let error = BridgeError::DownstreamRejected(error);
                tracing::error!(
                    channel = %event.channel,
                    direction = %direction,
                    payload = %payload,
                    attempts = attempts,
                    error = %error,
                    "❌ Event dropped after sink failure"
                );

                self.dead_letter(&event, direction, &error, attempts).await;
                DispatchOutcome::Failed
            }
        }
    }

    async fn call_sink(&self, direction: Direction, record: &GenericRecord) -> Result<String, SinkError> {
        let timeout = self.config.sink_timeout;

        let call = async {
            match direction {
                Direction::DocumentToRelational => self
                    .relational
                    .send(record)
                    .await
                    .map(|status| format!("HTTP {}", status)),
                Direction::RelationalToDocument => self.document.insert(record).await,
            }
        };

        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| SinkError::Timeout(timeout))?
    }

    async fn dead_letter(&self, event: &ChannelEvent, direction: Direction, error: &BridgeError, attempts: u32) {
        let Some(queue) = &self.dead_letters else {
            return;
        };

        let letter = DeadLetter::new(&event.channel, direction, &event.raw_body, error, attempts);
        let pushed = tokio::time::timeout(self.config.sink_timeout, queue.push(&letter)).await;

        match pushed {
            Ok(Ok(())) => {
                if let Some(metrics) = &self.metrics {
                    metrics.dead_letters.inc();
                }
            }
            Ok(Err(e)) => {
                tracing::error!(dead_letter_id = %letter.id, error = %e, "Failed to store dead letter");
            }
            Err(_) => {
                tracing::error!(dead_letter_id = %letter.id, "Timed out storing dead letter");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;
    use async_trait::async_trait;
    use futures_util::stream;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const DOC_CHANNEL: &str = "eventos:sistema1";
    const REL_CHANNEL: &str = "eventos:sistema2";

    #[derive(Default)]
    struct FakeRelational {
        calls: Mutex<Vec<GenericRecord>>,
        responses: Mutex<VecDeque<Result<u16, SinkError>>>,
    }

    impl FakeRelational {
        fn failing_with(errors: Vec<SinkError>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                responses: Mutex::new(errors.into_iter().map(Err).collect()),
            }
        }

        fn calls(&self) -> Vec<GenericRecord> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RelationalSink for FakeRelational {
        async fn send(&self, record: &GenericRecord) -> Result<u16, SinkError> {
            self.calls.lock().unwrap().push(record.clone());
            self.responses.lock().unwrap().pop_front().unwrap_or(Ok(201))
        }
    }

    #[derive(Default)]
    struct FakeDocument {
        calls: Mutex<Vec<GenericRecord>>,
        delay: Option<Duration>,
        unavailable: bool,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeDocument {
        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        fn unavailable() -> Self {
            Self {
                unavailable: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<GenericRecord> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DocumentSink for FakeDocument {
        async fn insert(&self, record: &GenericRecord) -> Result<String, SinkError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.calls.lock().unwrap().push(record.clone());
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.unavailable {
                return Err(SinkError::Store("server selection timed out".to_string()));
            }
            Ok("65f0c0ffee65f0c0ffee65f0".to_string())
        }
    }

    #[derive(Default)]
    struct FakeDeadLetters {
        letters: Mutex<Vec<DeadLetter>>,
    }

    #[async_trait]
    impl DeadLetterSink for FakeDeadLetters {
        async fn push(&self, letter: &DeadLetter) -> Result<(), BridgeError> {
            self.letters.lock().unwrap().push(letter.clone());
            Ok(())
        }
    }

    /// Dead letter queue that never stores anything.
    struct BrokenDeadLetters {
        hang: bool,
        pushes: AtomicUsize,
    }

    impl BrokenDeadLetters {
        fn new(hang: bool) -> Self {
            Self {
                hang,
                pushes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DeadLetterSink for BrokenDeadLetters {
        async fn push(&self, _letter: &DeadLetter) -> Result<(), BridgeError> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            Err(BridgeError::Connection("dead letter list unavailable".to_string()))
        }
    }

    fn router_config(retry: RetryConfig, sink_timeout: Duration) -> RouterConfig {
        RouterConfig {
            document_channel: DOC_CHANNEL.to_string(),
            relational_channel: REL_CHANNEL.to_string(),
            sink_timeout,
            retry,
            log_payload_limit: 64,
        }
    }

    fn router(relational: Arc<FakeRelational>, document: Arc<FakeDocument>) -> ChannelRouter {
        ChannelRouter::new(
            router_config(RetryConfig::default(), Duration::from_secs(1)),
            relational,
            document,
        )
    }

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_document_channel_goes_to_relational_sink_only() {
        let relational = Arc::new(FakeRelational::default());
        let document = Arc::new(FakeDocument::default());
        let router = router(relational.clone(), document.clone());

        let outcome = router
            .dispatch(ChannelEvent::new(DOC_CHANNEL, r#"{"nomeCompleto":"Ana","cpf":"11122233344"}"#))
            .await;

        assert_eq!(outcome, DispatchOutcome::Forwarded);
        assert_eq!(
            relational.calls(),
            vec![GenericRecord::new().with("nomeCompleto", "Ana").with("cpf", "11122233344")]
        );
        assert!(document.calls().is_empty());
    }

    #[tokio::test]
    async fn test_relational_channel_goes_to_document_sink_only() {
        let relational = Arc::new(FakeRelational::default());
        let document = Arc::new(FakeDocument::default());
        let router = router(relational.clone(), document.clone());

        let body = r#"{"nomeCompleto":"Ana","dataNascimento":"1990-01-01","cpf":"11122233344","endereco":"Rua X","telefone":"119999"}"#;
        let outcome = router.dispatch(ChannelEvent::new(REL_CHANNEL, body)).await;

        assert_eq!(outcome, DispatchOutcome::Forwarded);
        assert_eq!(document.calls(), vec![codec::decode(body.as_bytes()).unwrap()]);
        assert!(relational.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_fields_are_dropped_towards_relational() {
        let relational = Arc::new(FakeRelational::default());
        let router = router(relational.clone(), Arc::new(FakeDocument::default()));

        router
            .dispatch(ChannelEvent::new(DOC_CHANNEL, r#"{"_id":"abc","cpf":"1","prontuario":"P"}"#))
            .await;

        assert_eq!(relational.calls(), vec![GenericRecord::new().with("cpf", "1")]);
    }

    #[tokio::test]
    async fn test_malformed_payload_invokes_no_sink() {
        let relational = Arc::new(FakeRelational::default());
        let document = Arc::new(FakeDocument::default());
        let router = router(relational.clone(), document.clone());

        assert_eq!(
            router.dispatch(ChannelEvent::new(DOC_CHANNEL, "not json")).await,
            DispatchOutcome::Malformed
        );
        assert_eq!(
            router.dispatch(ChannelEvent::new(REL_CHANNEL, "{\"cpf\":")).await,
            DispatchOutcome::Malformed
        );

        assert!(relational.calls().is_empty());
        assert!(document.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_channel_is_ignored() {
        let relational = Arc::new(FakeRelational::default());
        let document = Arc::new(FakeDocument::default());
        let router = router(relational.clone(), document.clone());

        let outcome = router.dispatch(ChannelEvent::new("eventos:outro", r#"{"cpf":"1"}"#)).await;

        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert!(relational.calls().is_empty());
        assert!(document.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_consumption() {
        let relational = Arc::new(FakeRelational::failing_with(vec![SinkError::Rejected {
            status: 400,
            body: "cpf invalido".to_string(),
        }]));
        let document = Arc::new(FakeDocument::default());
        let router = router(relational.clone(), document.clone());

        let events = stream::iter(vec![
            ChannelEvent::new(DOC_CHANNEL, r#"{"cpf":"1"}"#),
            ChannelEvent::new(DOC_CHANNEL, r#"{"cpf":"2"}"#),
            ChannelEvent::new(REL_CHANNEL, r#"{"cpf":"3"}"#),
        ]);

        let err = router.run(events).await;

        assert!(matches!(err, BridgeError::Connection(_)));
        assert_eq!(relational.calls().len(), 2);
        assert_eq!(document.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_sinks_and_dead_letters_do_not_stop_consumption() {
        for hang in [false, true] {
            let relational = Arc::new(FakeRelational::failing_with(vec![SinkError::Rejected {
                status: 500,
                body: String::new(),
            }]));
            let document = Arc::new(FakeDocument::unavailable());
            let dead_letters = Arc::new(BrokenDeadLetters::new(hang));
            let metrics = Arc::new(Metrics::new().unwrap());
            let router = ChannelRouter::new(
                router_config(RetryConfig::default(), Duration::from_millis(50)),
                relational.clone(),
                document.clone(),
            )
            .with_dead_letters(dead_letters.clone())
            .with_metrics(metrics.clone());

            let events = stream::iter(vec![
                ChannelEvent::new(DOC_CHANNEL, r#"{"cpf":"1"}"#),
                ChannelEvent::new(REL_CHANNEL, r#"{"cpf":"2"}"#),
                ChannelEvent::new(REL_CHANNEL, r#"{"cpf":"3"}"#),
                ChannelEvent::new(DOC_CHANNEL, r#"{"cpf":"4"}"#),
            ]);

            let err = router.run(events).await;

            assert!(matches!(err, BridgeError::Connection(_)));
            assert_eq!(relational.calls().len(), 2);
            assert_eq!(document.calls().len(), 2);
            assert_eq!(dead_letters.pushes.load(Ordering::SeqCst), 3);
            assert_eq!(metrics.dead_letters.get(), 0);
        }
    }

    #[tokio::test]
    async fn test_run_dispatches_one_event_at_a_time() {
        let document = Arc::new(FakeDocument::slow(Duration::from_millis(10)));
        let router = router(Arc::new(FakeRelational::default()), document.clone());

        let events = stream::iter((0..5i64).map(|i| ChannelEvent::new(REL_CHANNEL, format!(r#"{{"seq":{}}}"#, i))));
        router.run(events).await;

        let seqs: Vec<_> = document.calls().iter().map(|r| r.get("seq").cloned()).collect();
        assert_eq!(seqs, (0..5i64).map(|i| Some(FieldValue::from(i))).collect::<Vec<_>>());
        assert_eq!(document.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hung_sink_times_out() {
        let document = Arc::new(FakeDocument::slow(Duration::from_secs(5)));
        let router = ChannelRouter::new(
            router_config(RetryConfig::default(), Duration::from_millis(20)),
            Arc::new(FakeRelational::default()),
            document.clone(),
        );

        let outcome = router.dispatch(ChannelEvent::new(REL_CHANNEL, r#"{"cpf":"1"}"#)).await;

        assert_eq!(outcome, DispatchOutcome::Failed);
        assert!(document.calls().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_when_enabled() {
        let relational = Arc::new(FakeRelational::failing_with(vec![SinkError::Rejected {
            status: 503,
            body: String::new(),
        }]));
        let router = ChannelRouter::new(
            router_config(fast_retry(3), Duration::from_secs(1)),
            relational.clone(),
            Arc::new(FakeDocument::default()),
        );

        let outcome = router.dispatch(ChannelEvent::new(DOC_CHANNEL, r#"{"cpf":"1"}"#)).await;

        assert_eq!(outcome, DispatchOutcome::Forwarded);
        assert_eq!(relational.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_event_goes_to_dead_letter_queue() {
        let relational = Arc::new(FakeRelational::failing_with(vec![
            SinkError::Transport("connection refused".to_string()),
            SinkError::Transport("connection refused".to_string()),
        ]));
        let dead_letters = Arc::new(FakeDeadLetters::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let router = ChannelRouter::new(
            router_config(fast_retry(2), Duration::from_secs(1)),
            relational.clone(),
            Arc::new(FakeDocument::default()),
        )
        .with_dead_letters(dead_letters.clone())
        .with_metrics(metrics.clone());

        let outcome = router.dispatch(ChannelEvent::new(DOC_CHANNEL, r#"{"cpf":"1"}"#)).await;

        assert_eq!(outcome, DispatchOutcome::Failed);
        let letters = dead_letters.letters.lock().unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].channel, DOC_CHANNEL);
        assert_eq!(letters[0].direction, Direction::DocumentToRelational);
        assert_eq!(letters[0].attempts, 2);
        assert_eq!(letters[0].payload, r#"{"cpf":"1"}"#);
        assert_eq!(metrics.dead_letters.get(), 1);
    }

    #[test]
    fn test_route_by_channel_identity() {
        let router = router(Arc::new(FakeRelational::default()), Arc::new(FakeDocument::default()));

        assert_eq!(router.route(DOC_CHANNEL), Some(Direction::DocumentToRelational));
        assert_eq!(router.route(REL_CHANNEL), Some(Direction::RelationalToDocument));
        assert_eq!(router.route("eventos:sistema3"), None);
        assert_eq!(router.channels(), vec![DOC_CHANNEL.to_string(), REL_CHANNEL.to_string()]);
    }
}
