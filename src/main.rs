use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod codec;
mod config;
mod errors;
mod mapping;
mod messaging;
mod metrics;
mod models;
mod router;
mod sinks;
mod supervisor;
mod utils;

use config::BridgeConfig;
use messaging::{RedisDeadLetterQueue, RedisSubscriber};
use router::{ChannelRouter, RouterConfig};
use sinks::{DocumentStoreConfig, HttpRelationalSink, MongoDocumentSink};
use supervisor::Supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=paciente_bridge=trace cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,paciente_bridge=debug")),
        )
        .init();

    let config = BridgeConfig::load()?;

    tracing::info!("🚀 Starting paciente bridge");
    tracing::info!(
        document_channel = %config.document_channel,
        relational_channel = %config.relational_channel,
        relational_base_url = %config.relational_base_url,
        database = %config.mongo_database,
        collection = %config.mongo_collection,
        "Bridge configuration loaded"
    );

    // === 1. Metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    if let Some(port) = config.metrics_port {
        let registry = metrics.registry().clone();
        std::thread::spawn(move || {
            let system = actix_web::rt::System::new();
            if let Err(e) = system.block_on(metrics::start_metrics_server(registry, port)) {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    }

    // === 2. Sinks (constructed once, shared by the router) ===
    let relational = Arc::new(HttpRelationalSink::new(
        &config.relational_base_url,
        config.sink_timeout(),
    )?);
    tracing::info!(url = %relational.url(), "Relational sink ready");

    let document = Arc::new(
        MongoDocumentSink::new(DocumentStoreConfig {
            uri: config.mongo_uri.clone(),
            database: config.mongo_database.clone(),
            collection: config.mongo_collection.clone(),
            pooled: config.mongo_pooled,
            timeout: config.sink_timeout(),
        })
        .await?,
    );

    // === 3. Router ===
    let mut router = ChannelRouter::new(RouterConfig::from(&config), relational, document)
        .with_metrics(metrics.clone());

    if let Some(key) = &config.dead_letter_key {
        let queue = RedisDeadLetterQueue::connect(&config.redis_url, key.clone()).await?;
        tracing::info!(key = %key, "💀 Dead letter queue enabled");
        router = router.with_dead_letters(Arc::new(queue));
    }

    // === 4. Subscription, supervised until Ctrl-C ===
    let subscriber = RedisSubscriber::new(&config.redis_url)?;
    let supervisor = Supervisor::new(subscriber, router, config.reconnect_backoff())
        .with_metrics(metrics);

    supervisor.run_until(shutdown_signal()).await?;

    tracing::info!("👋 Bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
