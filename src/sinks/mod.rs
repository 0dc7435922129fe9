// ============================================================================
// Downstream Sinks
// ============================================================================
//
// Egress adapters for the two stores. Both are constructed once at startup
// and handed to the router, which calls them one event at a time.
//
// ============================================================================

mod document;
mod relational;

use async_trait::async_trait;
use crate::errors::SinkError;
use crate::models::GenericRecord;

pub use document::{DocumentStoreConfig, MongoDocumentSink};
pub use relational::HttpRelationalSink;

/// Creates records in the relational service.
#[async_trait]
pub trait RelationalSink: Send + Sync {
    /// Returns the HTTP status on success (always 2xx).
    async fn send(&self, record: &GenericRecord) -> Result<u16, SinkError>;
}

/// Inserts documents into the document store.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Returns the identifier generated for the new document.
    async fn insert(&self, record: &GenericRecord) -> Result<String, SinkError>;
}
