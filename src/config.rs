use crate::errors::BridgeError;
use crate::utils::RetryConfig;
use clap::Parser;
use std::time::Duration;

// ============================================================================
// Bridge Configuration
// ============================================================================
//
// Every flag can also be supplied through a BRIDGE_* environment variable.
// A `.env` file in the working directory is loaded before parsing.
//
// ============================================================================

#[derive(Parser, Debug, Clone)]
#[command(name = "paciente-bridge", version, about = "Replays patient change events between the relational service and the document store")]
pub struct BridgeConfig {
    /// Redis pub/sub address
    #[arg(long, env = "BRIDGE_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Channel carrying events that originate in the document store
    #[arg(long, env = "BRIDGE_DOCUMENT_CHANNEL", default_value = "eventos:sistema1")]
    pub document_channel: String,

    /// Channel carrying events that originate in the relational service
    #[arg(long, env = "BRIDGE_RELATIONAL_CHANNEL", default_value = "eventos:sistema2")]
    pub relational_channel: String,

    /// Base URL of the relational service; `/api/pacientes` is appended
    #[arg(long, env = "BRIDGE_RELATIONAL_BASE_URL", default_value = "http://localhost:8083")]
    pub relational_base_url: String,

    #[arg(long, env = "BRIDGE_MONGO_URI", default_value = "mongodb://localhost:27017/")]
    pub mongo_uri: String,

    #[arg(long, env = "BRIDGE_MONGO_DATABASE", default_value = "mongodb")]
    pub mongo_database: String,

    #[arg(long, env = "BRIDGE_MONGO_COLLECTION", default_value = "pacientes")]
    pub mongo_collection: String,

    /// Reuse one document-store client instead of connecting per insert
    #[arg(long, env = "BRIDGE_MONGO_POOLED", default_value_t = false)]
    pub mongo_pooled: bool,

    /// Upper bound for a single sink call
    #[arg(long, env = "BRIDGE_SINK_TIMEOUT_SECS", default_value_t = 10)]
    pub sink_timeout_secs: u64,

    /// Attempts per sink call; 1 disables retries
    #[arg(long, env = "BRIDGE_SINK_ATTEMPTS", default_value_t = 1)]
    pub sink_attempts: u32,

    /// Redis list receiving events that could not be delivered
    #[arg(long, env = "BRIDGE_DEAD_LETTER_KEY")]
    pub dead_letter_key: Option<String>,

    #[arg(long, env = "BRIDGE_RECONNECT_INITIAL_MS", default_value_t = 500)]
    pub reconnect_initial_ms: u64,

    #[arg(long, env = "BRIDGE_RECONNECT_MAX_MS", default_value_t = 30_000)]
    pub reconnect_max_ms: u64,

    /// Consecutive failed reconnects before giving up; unlimited when unset.
    /// The count resets on every successful subscribe, so a bus that accepts
    /// the subscription and then drops it is retried indefinitely.
    #[arg(long, env = "BRIDGE_MAX_RECONNECTS")]
    pub max_reconnects: Option<u32>,

    /// Serve Prometheus metrics on this port
    #[arg(long, env = "BRIDGE_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Maximum payload bytes echoed into log lines
    #[arg(long, env = "BRIDGE_LOG_PAYLOAD_LIMIT", default_value_t = 256)]
    pub log_payload_limit: usize,
}

impl BridgeConfig {
    /// Load `.env` (if any), then parse flags and environment.
    pub fn load() -> Result<Self, BridgeError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(BridgeError::Config(format!("failed to read .env: {}", e)));
            }
        }

        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.document_channel.trim().is_empty() || self.relational_channel.trim().is_empty() {
            return Err(BridgeError::Config("channel names must not be empty".to_string()));
        }
        if self.document_channel == self.relational_channel {
            return Err(BridgeError::Config(format!(
                "document and relational channels must differ (both are '{}')",
                self.document_channel
            )));
        }
        if !(self.relational_base_url.starts_with("http://")
            || self.relational_base_url.starts_with("https://"))
        {
            return Err(BridgeError::Config(format!(
                "relational base URL must be http(s): {}",
                self.relational_base_url
            )));
        }
        if self.mongo_database.trim().is_empty() || self.mongo_collection.trim().is_empty() {
            return Err(BridgeError::Config(
                "document database and collection must not be empty".to_string(),
            ));
        }
        if self.sink_timeout_secs == 0 {
            return Err(BridgeError::Config("sink timeout must be positive".to_string()));
        }
        if self.sink_attempts == 0 {
            return Err(BridgeError::Config("sink attempts must be at least 1".to_string()));
        }
        if self.reconnect_initial_ms == 0 || self.reconnect_initial_ms > self.reconnect_max_ms {
            return Err(BridgeError::Config(format!(
                "invalid reconnect window {}ms..{}ms",
                self.reconnect_initial_ms, self.reconnect_max_ms
            )));
        }
        Ok(())
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_secs(self.sink_timeout_secs)
    }

    pub fn sink_retry(&self) -> RetryConfig {
        RetryConfig::with_attempts(self.sink_attempts)
    }

    pub fn reconnect_backoff(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_reconnects.unwrap_or(u32::MAX),
            initial_delay: Duration::from_millis(self.reconnect_initial_ms),
            max_delay: Duration::from_millis(self.reconnect_max_ms),
            multiplier: 2.0,
        }
    }
}
