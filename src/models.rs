use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Bridge Models
// ============================================================================

/// One message received from the bus. Owned by the router for a single
/// dispatch and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub channel: String,
    pub raw_body: Vec<u8>,
}

impl ChannelEvent {
    pub fn new(channel: impl Into<String>, raw_body: impl Into<Vec<u8>>) -> Self {
        Self {
            channel: channel.into(),
            raw_body: raw_body.into(),
        }
    }
}

/// Scalar value carried by a flat record field.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(serde_json::Number),
    Null,
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n.into())
    }
}

/// Flat field-name to value mapping decoded from an event body.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct GenericRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl GenericRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }
}

impl FromIterator<(String, FieldValue)> for GenericRecord {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Which store an event is replayed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Event from the document system, written to the relational service.
    DocumentToRelational,
    /// Event from the relational system, written to the document store.
    RelationalToDocument,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::DocumentToRelational => "document_to_relational",
            Direction::RelationalToDocument => "relational_to_document",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Outbound Requests
// Direction-specific; built from a mapped record and consumed by one sink call
// ============================================================================

/// Create request against the relational service.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpCreate {
    pub method: reqwest::Method,
    pub url: String,
    pub body: Vec<u8>,
}

/// Insert command against the document store.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInsert {
    pub database: String,
    pub collection: String,
    pub document: mongodb::bson::Document,
}
