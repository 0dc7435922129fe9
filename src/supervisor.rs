use std::future::Future;
use std::sync::Arc;

use crate::errors::BridgeError;
use crate::messaging::Subscriber;
use crate::metrics::Metrics;
use crate::router::ChannelRouter;
use crate::utils::{Backoff, RetryConfig};

// ============================================================================
// Process Supervisor
// ============================================================================
//
// Owns the subscription lifecycle:
//
//   subscribe -> router.run -> (connection lost) -> backoff -> subscribe ...
//
// Consecutive connection failures are bounded by `reconnect.max_attempts`;
// the counter resets whenever a subscription is established.
//
// ============================================================================

pub struct Supervisor<S: Subscriber> {
    subscriber: S,
    router: ChannelRouter,
    reconnect: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl<S: Subscriber> Supervisor<S> {
    pub fn new(subscriber: S, router: ChannelRouter, reconnect: RetryConfig) -> Self {
        Self {
            subscriber,
            router,
            reconnect,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run until `shutdown` resolves or reconnecting is given up.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), BridgeError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.run() => result,
            _ = shutdown => {
                tracing::info!("Shutdown requested, closing subscription");
                Ok(())
            }
        }
    }

    /// Keep the bridge subscribed, reconnecting on connection loss.
    pub async fn run(&self) -> Result<(), BridgeError> {
        let channels = self.router.channels();
        let mut backoff = Backoff::from_config(&self.reconnect);
        let mut failures: u32 = 0;

        loop {
            let error = match self.subscriber.subscribe(&channels).await {
                Ok(events) => {
                    failures = 0;
                    backoff.reset();
                    tracing::info!(channels = ?channels, "🚀 Bridge listening for events");
                    self.router.run(events).await
                }
                Err(e) => e,
            };

            if !matches!(error, BridgeError::Connection(_)) {
                tracing::error!(error = %error, "Unrecoverable subscription error");
                return Err(error);
            }

            failures = failures.saturating_add(1);
            if failures > self.reconnect.max_attempts {
                tracing::error!(
                    failures = failures,
                    error = %error,
                    "Giving up on bus connection"
                );
                return Err(error);
            }

            let delay = backoff.next_delay();
            tracing::warn!(
                failures = failures,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Bus connection lost, reconnecting"
            );
            if let Some(metrics) = &self.metrics {
                metrics.reconnects.inc();
            }
            tokio::time::sleep(delay).await;
        }
    }
}
