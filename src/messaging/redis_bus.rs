use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};

use crate::errors::BridgeError;
use crate::models::ChannelEvent;

/// Live events from the bus. The stream ending means the connection dropped.
pub type EventStream = BoxStream<'static, ChannelEvent>;

/// Opens a subscription on the bus.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(&self, channels: &[String]) -> Result<EventStream, BridgeError>;
}

/// Redis pub/sub subscriber.
pub struct RedisSubscriber {
    client: redis::Client,
}

impl RedisSubscriber {
    pub fn new(redis_url: &str) -> Result<Self, BridgeError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| BridgeError::Config(format!("invalid Redis URL '{}': {}", redis_url, e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Subscriber for RedisSubscriber {
    async fn subscribe(&self, channels: &[String]) -> Result<EventStream, BridgeError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        for channel in channels {
            pubsub.subscribe(channel.as_str()).await?;
        }

        tracing::info!(channels = ?channels, "Subscribed to Redis channels");

        let events = pubsub
            .into_on_message()
            .map(|msg| ChannelEvent::new(msg.get_channel_name(), msg.get_payload_bytes()));

        Ok(events.boxed())
    }
}
