use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::BridgeError;
use crate::models::Direction;

// ============================================================================
// Dead Letter Queue
// ============================================================================
//
// Events whose sink call failed after every attempt. Entries are JSON
// records pushed onto a Redis list for manual inspection or replay.
//
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub id: Uuid,
    pub channel: String,
    pub direction: Direction,
    pub payload: String,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(
        channel: &str,
        direction: Direction,
        raw_body: &[u8],
        error: impl ToString,
        attempts: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            direction,
            payload: String::from_utf8_lossy(raw_body).into_owned(),
            error: error.to_string(),
            attempts,
            failed_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn push(&self, letter: &DeadLetter) -> Result<(), BridgeError>;
}

pub struct RedisDeadLetterQueue {
    connection: redis::aio::MultiplexedConnection,
    key: String,
}

impl RedisDeadLetterQueue {
    pub async fn connect(redis_url: &str, key: impl Into<String>) -> Result<Self, BridgeError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| BridgeError::Config(format!("invalid Redis URL '{}': {}", redis_url, e)))?;
        let connection = client.get_multiplexed_async_connection().await?;

        Ok(Self {
            connection,
            key: key.into(),
        })
    }
}

#[async_trait]
impl DeadLetterSink for RedisDeadLetterQueue {
    async fn push(&self, letter: &DeadLetter) -> Result<(), BridgeError> {
        let entry = serde_json::to_string(letter)
            .map_err(|e| BridgeError::MalformedPayload(e.to_string()))?;

        let mut connection = self.connection.clone();
        let depth: i64 = connection.lpush(&self.key, entry).await?;

        tracing::info!(
            dead_letter_id = %letter.id,
            channel = %letter.channel,
            key = %self.key,
            depth = depth,
            "Event stored in dead letter queue"
        );
        Ok(())
    }
}
