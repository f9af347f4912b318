//! Header, URI, body and general regex sanitizers

use crate::recording::{EntryMessage, Headers, RecordEntry};
use crate::Result;

use super::replacement::{GroupRef, Replacement};
use super::{ApplyCondition, Sanitizer};

fn sanitize_header(headers: &mut Headers, key: &str, replacement: &Replacement) {
    if let Some(values) = headers.get_mut(key) {
        for value in values.iter_mut() {
            let replaced = replacement.apply(value).into_owned();
            *value = replaced;
        }
    }
}

fn sanitize_all_headers(headers: &mut Headers, replacement: &Replacement) {
    for value in headers.values_mut() {
        let replaced = replacement.apply(value).into_owned();
        *value = replaced;
    }
}

fn sanitize_body(message: &mut EntryMessage, replacement: &Replacement) {
    if message.body.is_empty() || !message.is_text() {
        return;
    }
    let replaced = message
        .body_str()
        .map(|body| replacement.apply(body).into_owned());
    if let Some(replaced) = replaced {
        message.body = replaced.into_bytes();
    }
}

/// Replaces the value of one header in requests and responses
#[derive(Debug, Clone)]
pub struct HeaderRegexSanitizer {
    key: String,
    replacement: Replacement,
    condition: Option<ApplyCondition>,
}

impl HeaderRegexSanitizer {
    /// Create a header sanitizer
    ///
    /// # Errors
    ///
    /// Returns `MalformedSanitizerConfig` for a bad regex or group.
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        regex: Option<&str>,
        group: Option<GroupRef>,
        condition: Option<ApplyCondition>,
    ) -> Result<Self> {
        Ok(Self {
            key: key.into(),
            replacement: Replacement::new("HeaderRegexSanitizer", value, regex, group)?,
            condition,
        })
    }
}

impl Sanitizer for HeaderRegexSanitizer {
    fn name(&self) -> &'static str {
        "HeaderRegexSanitizer"
    }

    fn condition(&self) -> Option<&ApplyCondition> {
        self.condition.as_ref()
    }

    fn sanitize(&self, entry: &mut RecordEntry) {
        sanitize_header(&mut entry.request.headers, &self.key, &self.replacement);
        sanitize_header(&mut entry.response.headers, &self.key, &self.replacement);
    }
}

/// Rewrites the request URI
#[derive(Debug, Clone)]
pub struct UriRegexSanitizer {
    replacement: Replacement,
    condition: Option<ApplyCondition>,
}

impl UriRegexSanitizer {
    /// Create a URI sanitizer; a regex is required
    ///
    /// # Errors
    ///
    /// Returns `MalformedSanitizerConfig` for a bad regex or group.
    pub fn new(
        value: impl Into<String>,
        regex: &str,
        group: Option<GroupRef>,
        condition: Option<ApplyCondition>,
    ) -> Result<Self> {
        Ok(Self {
            replacement: Replacement::new("UriRegexSanitizer", value, Some(regex), group)?,
            condition,
        })
    }
}

impl Sanitizer for UriRegexSanitizer {
    fn name(&self) -> &'static str {
        "UriRegexSanitizer"
    }

    fn condition(&self) -> Option<&ApplyCondition> {
        self.condition.as_ref()
    }

    fn sanitize(&self, entry: &mut RecordEntry) {
        let replaced = self.replacement.apply(&entry.request_uri).into_owned();
        entry.request_uri = replaced;
    }
}

/// Rewrites textual request and response bodies
#[derive(Debug, Clone)]
pub struct BodyRegexSanitizer {
    replacement: Replacement,
    condition: Option<ApplyCondition>,
}

impl BodyRegexSanitizer {
    /// Create a body sanitizer; a regex is required
    ///
    /// # Errors
    ///
    /// Returns `MalformedSanitizerConfig` for a bad regex or group.
    pub fn new(
        value: impl Into<String>,
        regex: &str,
        group: Option<GroupRef>,
        condition: Option<ApplyCondition>,
    ) -> Result<Self> {
        Ok(Self {
            replacement: Replacement::new("BodyRegexSanitizer", value, Some(regex), group)?,
            condition,
        })
    }
}

impl Sanitizer for BodyRegexSanitizer {
    fn name(&self) -> &'static str {
        "BodyRegexSanitizer"
    }

    fn condition(&self) -> Option<&ApplyCondition> {
        self.condition.as_ref()
    }

    fn sanitize(&self, entry: &mut RecordEntry) {
        sanitize_body(&mut entry.request, &self.replacement);
        sanitize_body(&mut entry.response, &self.replacement);
    }
}

/// Applies one regex to the URI, every header value and textual bodies
#[derive(Debug, Clone)]
pub struct GeneralRegexSanitizer {
    replacement: Replacement,
    condition: Option<ApplyCondition>,
}

impl GeneralRegexSanitizer {
    /// Create a general sanitizer; a regex is required
    ///
    /// # Errors
    ///
    /// Returns `MalformedSanitizerConfig` for a bad regex or group.
    pub fn new(
        value: impl Into<String>,
        regex: &str,
        group: Option<GroupRef>,
        condition: Option<ApplyCondition>,
    ) -> Result<Self> {
        Ok(Self {
            replacement: Replacement::new("GeneralRegexSanitizer", value, Some(regex), group)?,
            condition,
        })
    }
}

impl Sanitizer for GeneralRegexSanitizer {
    fn name(&self) -> &'static str {
        "GeneralRegexSanitizer"
    }

    fn condition(&self) -> Option<&ApplyCondition> {
        self.condition.as_ref()
    }

    fn sanitize(&self, entry: &mut RecordEntry) {
        let replaced = self.replacement.apply(&entry.request_uri).into_owned();
        entry.request_uri = replaced;
        sanitize_all_headers(&mut entry.request.headers, &self.replacement);
        sanitize_all_headers(&mut entry.response.headers, &self.replacement);
        sanitize_body(&mut entry.request, &self.replacement);
        sanitize_body(&mut entry.response, &self.replacement);
    }
}
