//! A single captured HTTP exchange

use std::borrow::Cow;

use serde_json::{Map, Value};

use super::headers::Headers;
use super::variables::Variables;

/// One side (request or response) of a recorded exchange
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMessage {
    /// Headers in arrival order
    pub headers: Headers,
    /// Raw body bytes
    pub body: Vec<u8>,
}

impl EntryMessage {
    /// Create a message from headers and a body
    #[must_use]
    pub fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    /// True when the declared content type is JSON
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.headers.content_type().is_some_and(is_json_content_type)
    }

    /// True when the body should be stored as text rather than base64.
    ///
    /// A missing content type counts as textual as long as the bytes are
    /// valid UTF-8.
    #[must_use]
    pub fn is_text(&self) -> bool {
        let textual = self
            .headers
            .content_type()
            .map_or(true, is_textual_content_type);
        textual && std::str::from_utf8(&self.body).is_ok()
    }

    /// Body as UTF-8, if it is valid UTF-8
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Re-serialize a JSON body in canonical form.
    ///
    /// Bodies that are not declared JSON, or fail to parse, are left alone.
    pub fn normalize_json_body(&mut self) {
        if self.body.is_empty() || !self.is_json() {
            return;
        }
        let Ok(value) = serde_json::from_slice::<Value>(&self.body) else {
            return;
        };
        if let Ok(normalized) = serde_json::to_vec(&canonicalize(value)) {
            self.body = normalized;
        }
    }
}

/// One captured request/response exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    /// Absolute request URI
    pub request_uri: String,
    /// HTTP method (uppercase)
    pub request_method: String,
    /// Request headers and body
    pub request: EntryMessage,
    /// Response status code
    pub status_code: u16,
    /// Response headers and body
    pub response: EntryMessage,
    /// Ordering key: the position at which the exchange started
    pub sequence: u64,
}

impl RecordEntry {
    /// Create a request-only entry, as built from a live playback request
    #[must_use]
    pub fn from_request(
        method: &str,
        uri: impl Into<String>,
        headers: Headers,
        body: Vec<u8>,
    ) -> Self {
        Self {
            request_uri: uri.into(),
            request_method: method.to_ascii_uppercase(),
            request: EntryMessage::new(headers, body),
            status_code: 0,
            response: EntryMessage::default(),
            sequence: 0,
        }
    }

    /// Attach a response to this entry
    #[must_use]
    pub fn with_response(mut self, status_code: u16, headers: Headers, body: Vec<u8>) -> Self {
        self.status_code = status_code;
        self.response = EntryMessage::new(headers, body);
        self
    }

    /// Replace `${name}` references to session variables in the request.
    ///
    /// Unknown names are left untouched. Non-UTF-8 bodies are skipped.
    pub fn substitute_variables(&mut self, variables: &Variables) {
        if variables.is_empty() {
            return;
        }
        self.request_uri = variables.substitute(&self.request_uri).into_owned();
        for value in self.request.headers.values_mut() {
            let replaced = variables.substitute(value).into_owned();
            *value = replaced;
        }
        let replaced = self
            .request
            .body_str()
            .and_then(|body| match variables.substitute(body) {
                Cow::Owned(replaced) => Some(replaced),
                Cow::Borrowed(_) => None,
            });
        if let Some(replaced) = replaced {
            self.request.body = replaced.into_bytes();
        }
    }
}

/// Sort object keys recursively so equal documents serialize identically
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(String, Value)> = map.into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, field) in fields {
                sorted.insert(key, canonicalize(field));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    let mime = mime_essence(content_type);
    mime == "application/json" || mime.ends_with("+json") || mime == "text/json"
}

fn is_textual_content_type(content_type: &str) -> bool {
    let mime = mime_essence(content_type);
    mime.starts_with("text/")
        || is_json_content_type(content_type)
        || mime.ends_with("+xml")
        || mime == "application/xml"
        || mime == "application/x-www-form-urlencoded"
        || mime == "application/javascript"
}

fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
