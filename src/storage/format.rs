//! JSON recording file format
//!
//! ```text
//! {
//!   "Entries": [
//!     {
//!       "RequestUri": "https://...",
//!       "RequestMethod": "GET",
//!       "RequestHeaders": { "Name": ["value", ...] },
//!       "RequestBody": "text" | "<base64>" | null,
//!       "RequestBodyEncoding": "base64",      (binary bodies only)
//!       "StatusCode": 200,
//!       "ResponseHeaders": { ... },
//!       "ResponseBody": ...,
//!       "ResponseBodyEncoding": "base64"      (binary bodies only)
//!     }
//!   ],
//!   "Variables": { "name": "value" }
//! }
//! ```
//!
//! Older files may embed JSON bodies as objects or split text bodies into
//! arrays of strings; both are accepted on read and written back as strings.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::recording::{EntryMessage, Headers, RecordEntry, Variables};
use crate::{RecplayError, Result};

/// Marker for bodies stored as base64
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    /// Standard base64 with padding
    Base64,
}

/// A recording as held in memory: entries in recorded order plus variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recording {
    /// Exchanges in recorded order
    pub entries: Vec<RecordEntry>,
    /// Session variables
    pub variables: Variables,
}

impl Recording {
    /// Create a recording
    #[must_use]
    pub fn new(entries: Vec<RecordEntry>, variables: Variables) -> Self {
        Self { entries, variables }
    }
}

/// On-disk shape of a recording file
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordingFile {
    /// Exchanges
    #[serde(default)]
    pub entries: Vec<EntryDto>,
    /// Session variables
    #[serde(default)]
    pub variables: Variables,
}

/// On-disk shape of one exchange
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntryDto {
    /// Absolute request URI
    pub request_uri: String,
    /// HTTP method
    pub request_method: String,
    /// Request headers
    #[serde(default)]
    pub request_headers: Headers,
    /// Request body as text or base64
    #[serde(default, deserialize_with = "body_text")]
    pub request_body: Option<String>,
    /// Set when `request_body` is base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body_encoding: Option<BodyEncoding>,
    /// Response status
    pub status_code: u16,
    /// Response headers
    #[serde(default)]
    pub response_headers: Headers,
    /// Response body as text or base64
    #[serde(default, deserialize_with = "body_text")]
    pub response_body: Option<String>,
    /// Set when `response_body` is base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body_encoding: Option<BodyEncoding>,
}

fn body_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        Value::Array(items) if items.iter().all(Value::is_string) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .concat(),
        ),
        other => Some(other.to_string()),
    })
}

fn encode_body(message: &EntryMessage) -> (Option<String>, Option<BodyEncoding>) {
    if message.body.is_empty() {
        return (None, None);
    }
    if message.is_text() {
        if let Some(text) = message.body_str() {
            return (Some(text.to_string()), None);
        }
    }
    (Some(BASE64.encode(&message.body)), Some(BodyEncoding::Base64))
}

fn decode_body(body: Option<String>, encoding: Option<BodyEncoding>, field: &str) -> Result<Vec<u8>> {
    match (body, encoding) {
        (None, _) => Ok(Vec::new()),
        (Some(text), None) => Ok(text.into_bytes()),
        (Some(text), Some(BodyEncoding::Base64)) => BASE64
            .decode(text.as_bytes())
            .map_err(|e| RecplayError::InvalidFormat(format!("{field} is not valid base64: {e}"))),
    }
}

impl From<&RecordEntry> for EntryDto {
    fn from(entry: &RecordEntry) -> Self {
        let (request_body, request_body_encoding) = encode_body(&entry.request);
        let (response_body, response_body_encoding) = encode_body(&entry.response);
        Self {
            request_uri: entry.request_uri.clone(),
            request_method: entry.request_method.clone(),
            request_headers: entry.request.headers.clone(),
            request_body,
            request_body_encoding,
            status_code: entry.status_code,
            response_headers: entry.response.headers.clone(),
            response_body,
            response_body_encoding,
        }
    }
}

impl EntryDto {
    /// Convert into an entry with the given ordering key
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if a base64 body does not decode.
    pub fn into_entry(self, sequence: u64) -> Result<RecordEntry> {
        let request_body = decode_body(self.request_body, self.request_body_encoding, "RequestBody")?;
        let response_body =
            decode_body(self.response_body, self.response_body_encoding, "ResponseBody")?;
        Ok(RecordEntry {
            request_uri: self.request_uri,
            request_method: self.request_method,
            request: EntryMessage::new(self.request_headers, request_body),
            status_code: self.status_code,
            response: EntryMessage::new(self.response_headers, response_body),
            sequence,
        })
    }
}

impl From<&Recording> for RecordingFile {
    fn from(recording: &Recording) -> Self {
        Self {
            entries: recording.entries.iter().map(EntryDto::from).collect(),
            variables: recording.variables.clone(),
        }
    }
}

impl RecordingFile {
    /// Convert into the in-memory form
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if any entry body does not decode.
    pub fn into_recording(self) -> Result<Recording> {
        let entries = self
            .entries
            .into_iter()
            .enumerate()
            .map(|(index, dto)| dto.into_entry(index as u64))
            .collect::<Result<Vec<_>>>()?;
        Ok(Recording::new(entries, self.variables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_body_uses_base64() {
        let headers: Headers = [("Content-Type", "application/octet-stream")]
            .into_iter()
            .collect();
        let entry = RecordEntry::from_request("PUT", "http://h/blob", headers, vec![0, 159, 146, 150]);
        let dto = EntryDto::from(&entry);

        assert_eq!(dto.request_body.as_deref(), Some("AJ+Slg=="));
        assert_eq!(dto.request_body_encoding, Some(BodyEncoding::Base64));
        assert_eq!(dto.response_body, None);

        let back = dto.into_entry(0).unwrap();
        assert_eq!(back.request.body, vec![0, 159, 146, 150]);
    }

    #[test]
    fn test_legacy_bodies() {
        let json = r#"{
            "RequestUri": "http://h/a",
            "RequestMethod": "POST",
            "RequestHeaders": { "Content-Type": "application/json" },
            "RequestBody": { "b": 1, "a": [true] },
            "StatusCode": 201,
            "ResponseHeaders": {},
            "ResponseBody": ["line one\n", "line two"]
        }"#;
        let dto: EntryDto = serde_json::from_str(json).unwrap();
        let entry = dto.into_entry(3).unwrap();

        let body: Value = serde_json::from_slice(&entry.request.body).unwrap();
        assert_eq!(body, serde_json::json!({ "a": [true], "b": 1 }));
        assert_eq!(entry.response.body, b"line one\nline two");
        assert_eq!(entry.sequence, 3);
    }

    #[test]
    fn test_bad_base64_is_invalid_format() {
        let dto = EntryDto {
            request_uri: "http://h/".to_string(),
            request_method: "GET".to_string(),
            request_headers: Headers::new(),
            request_body: Some("not base64!".to_string()),
            request_body_encoding: Some(BodyEncoding::Base64),
            status_code: 200,
            response_headers: Headers::new(),
            response_body: None,
            response_body_encoding: None,
        };
        assert!(matches!(dto.into_entry(0), Err(RecplayError::InvalidFormat(_))));
    }

    #[test]
    fn test_field_names() {
        let entry = RecordEntry::from_request("GET", "http://h/", Headers::new(), vec![])
            .with_response(204, Headers::new(), vec![]);
        let json = serde_json::to_value(EntryDto::from(&entry)).unwrap();

        for field in [
            "RequestUri",
            "RequestMethod",
            "RequestHeaders",
            "RequestBody",
            "StatusCode",
            "ResponseHeaders",
            "ResponseBody",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert!(json.get("RequestBodyEncoding").is_none());
    }
}
