use async_trait::async_trait;
use mongodb::bson::{self, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::Client;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::DocumentSink;
use crate::errors::{BridgeError, SinkError};
use crate::models::{DocumentInsert, GenericRecord};

// ============================================================================
// Document Store Sink
// ============================================================================
//
// Per-call mode (default) opens a client for each insert and shuts it down
// afterwards, on the error path too. Pooled mode lazily creates one client
// and reuses it for the lifetime of the process.
//
// ============================================================================

/// Headroom left between the driver's own timeouts and the router's sink
/// timeout, so the driver gives up first and the per-call client is shut down.
const DRIVER_TIMEOUT_MARGIN: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct DocumentStoreConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub pooled: bool,
    pub timeout: Duration,
}

pub struct MongoDocumentSink {
    options: ClientOptions,
    database: String,
    collection: String,
    pooled: bool,
    shared: OnceCell<Client>,
}

impl MongoDocumentSink {
    /// Parses the connection string; no connection is opened yet.
    pub async fn new(config: DocumentStoreConfig) -> Result<Self, BridgeError> {
        let mut options = ClientOptions::parse(&config.uri)
            .await
            .map_err(|e| BridgeError::Config(format!("invalid document store URI: {}", e)))?;
        options.app_name = Some("paciente-bridge".to_string());
        let selection_timeout = driver_timeout(config.timeout);
        options.connect_timeout = Some(selection_timeout);
        options.server_selection_timeout = Some(selection_timeout);

        Ok(Self {
            options,
            database: config.database,
            collection: config.collection,
            pooled: config.pooled,
            shared: OnceCell::new(),
        })
    }

    pub fn build_request(&self, record: &GenericRecord) -> Result<DocumentInsert, SinkError> {
        let document = bson::to_document(record).map_err(|e| SinkError::Serialization(e.to_string()))?;

        Ok(DocumentInsert {
            database: self.database.clone(),
            collection: self.collection.clone(),
            document,
        })
    }

    fn connect(&self) -> Result<Client, SinkError> {
        Ok(Client::with_options(self.options.clone())?)
    }

    async fn insert_with(client: &Client, request: DocumentInsert) -> Result<String, SinkError> {
        let result = client
            .database(&request.database)
            .collection::<Document>(&request.collection)
            .insert_one(request.document)
            .await?;

        Ok(document_id(&result.inserted_id))
    }
}

#[async_trait]
impl DocumentSink for MongoDocumentSink {
    async fn insert(&self, record: &GenericRecord) -> Result<String, SinkError> {
        let request = self.build_request(record)?;
        let collection = request.collection.clone();

        let id = if self.pooled {
            let client = self.shared.get_or_try_init(|| async { self.connect() }).await?;
            Self::insert_with(client, request).await?
        } else {
            let client = self.connect()?;
            let result = Self::insert_with(&client, request).await;
            client.shutdown().await;
            result?
        };

        tracing::debug!(collection = %collection, id = %id, "Document inserted");
        Ok(id)
    }
}

fn driver_timeout(sink_timeout: Duration) -> Duration {
    sink_timeout
        .saturating_sub(DRIVER_TIMEOUT_MARGIN)
        .max(sink_timeout / 2)
}

fn document_id(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}
