use crate::utils::IsTransient;

// ============================================================================
// Bridge Errors
// ============================================================================
//
// Only `Connection` may leave the router. Every other variant describes the
// loss of a single event and is logged at the dispatch boundary.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Bus connection error: {0}")]
    Connection(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Downstream rejected event: {0}")]
    DownstreamRejected(#[from] SinkError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<redis::RedisError> for BridgeError {
    fn from(e: redis::RedisError) -> Self {
        BridgeError::Connection(e.to_string())
    }
}

/// Failure reported by a sink for one outbound call.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Document store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl SinkError {
    /// Short label used for the `reason` metric dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            SinkError::Rejected { .. } => "rejected",
            SinkError::Transport(_) => "transport",
            SinkError::Store(_) => "store",
            SinkError::Serialization(_) => "serialization",
            SinkError::Timeout(_) => "timeout",
        }
    }
}

impl IsTransient for SinkError {
    fn is_transient(&self) -> bool {
        match self {
            SinkError::Rejected { status, .. } => *status >= 500 || *status == 429,
            SinkError::Transport(_) | SinkError::Store(_) | SinkError::Timeout(_) => true,
            SinkError::Serialization(_) => false,
        }
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SinkError::Transport(format!("request timed out: {}", e))
        } else {
            SinkError::Transport(e.to_string())
        }
    }
}

impl From<mongodb::error::Error> for SinkError {
    fn from(e: mongodb::error::Error) -> Self {
        SinkError::Store(e.to_string())
    }
}
