use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use std::time::Duration;

use super::RelationalSink;
use crate::codec;
use crate::errors::{BridgeError, SinkError};
use crate::models::{GenericRecord, HttpCreate};

pub const PACIENTES_PATH: &str = "/api/pacientes";

/// Longest response body kept in an error for logging.
const MAX_ERROR_BODY: usize = 1024;

/// HTTP client for the relational service's create endpoint.
pub struct HttpRelationalSink {
    client: reqwest::Client,
    url: String,
}

impl HttpRelationalSink {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), PACIENTES_PATH),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn build_request(&self, record: &GenericRecord) -> Result<HttpCreate, SinkError> {
        let body = codec::encode(record).map_err(|e| SinkError::Serialization(e.to_string()))?;

        Ok(HttpCreate {
            method: Method::POST,
            url: self.url.clone(),
            body,
        })
    }
}

#[async_trait]
impl RelationalSink for HttpRelationalSink {
    async fn send(&self, record: &GenericRecord) -> Result<u16, SinkError> {
        let HttpCreate { method, url, body } = self.build_request(record)?;

        let response = self
            .client
            .request(method, &url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(url = %url, status = status.as_u16(), "Relational service accepted record");
            return Ok(status.as_u16());
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            body = codec::truncate_payload(body.as_bytes(), MAX_ERROR_BODY);
        }

        Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
