use crate::errors::BridgeError;
use crate::models::GenericRecord;

// ============================================================================
// Payload Codec
// ============================================================================
//
// Event bodies are flat UTF-8 JSON objects whose values are strings, numbers
// or null. Anything else (arrays, nested objects, booleans, non-object roots)
// is a malformed payload.
//
// ============================================================================

/// Decode a raw event body into a record.
pub fn decode(raw: &[u8]) -> Result<GenericRecord, BridgeError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| BridgeError::MalformedPayload(format!("body is not UTF-8: {}", e)))?;

    serde_json::from_str::<GenericRecord>(text)
        .map_err(|e| BridgeError::MalformedPayload(e.to_string()))
}

/// Encode a record into a JSON body ready for transport.
pub fn encode(record: &GenericRecord) -> Result<Vec<u8>, BridgeError> {
    serde_json::to_vec(record).map_err(|e| BridgeError::MalformedPayload(e.to_string()))
}

/// Render a body for a log line, cut to at most `limit` bytes on a char boundary.
pub fn truncate_payload(raw: &[u8], limit: usize) -> String {
    let text = String::from_utf8_lossy(raw);
    if text.len() <= limit {
        return text.into_owned();
    }

    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}
