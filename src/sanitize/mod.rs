//! Sanitizers: rewrite recorded and live entries before matching and storage
//!
//! A sanitizer runs over entries as they are recorded, over a whole session
//! before it is persisted or played back, and over every live playback
//! request. Running the same set on both sides keeps volatile values from
//! breaking matches. Sanitizers must be idempotent.

mod body_key;
mod config;
mod oauth;
mod regex_sanitizers;
mod registry;
mod remove;
mod replacement;

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::recording::RecordEntry;
use crate::{RecplayError, Result};

pub use body_key::BodyKeySanitizer;
pub(crate) use config::{condition as condition_from_options, ConditionOptions};
pub use config::{sanitizer_from_config, DEFAULT_REPLACEMENT};
pub use oauth::OAuthResponseSanitizer;
pub use regex_sanitizers::{
    BodyRegexSanitizer, GeneralRegexSanitizer, HeaderRegexSanitizer, UriRegexSanitizer,
};
pub use registry::{SanitizerRegistry, DEFAULT_SANITIZER_IDS};
pub use remove::{RemoveHeaderSanitizer, RemoveQueryParameterSanitizer};
pub use replacement::{GroupRef, Replacement};

/// Restricts a sanitizer or transform to requests whose URI matches
#[derive(Debug, Clone)]
pub struct ApplyCondition {
    uri_regex: Regex,
}

impl ApplyCondition {
    /// Compile a URI condition
    ///
    /// # Errors
    ///
    /// Returns `MalformedSanitizerConfig` if the pattern does not compile.
    pub fn new(owner: &str, uri_regex: &str) -> Result<Self> {
        let uri_regex = Regex::new(uri_regex).map_err(|e| {
            RecplayError::sanitizer_config(owner, format!("invalid condition uriRegex: {e}"))
        })?;
        Ok(Self { uri_regex })
    }

    /// True when the entry's request URI satisfies the condition
    #[must_use]
    pub fn matches(&self, entry: &RecordEntry) -> bool {
        self.uri_regex.is_match(&entry.request_uri)
    }
}

/// Rewrites entries in place
pub trait Sanitizer: Send + Sync + fmt::Debug {
    /// Registered type name
    fn name(&self) -> &'static str;

    /// Optional URI condition
    fn condition(&self) -> Option<&ApplyCondition> {
        None
    }

    /// Rewrite one entry, ignoring the condition
    fn sanitize(&self, entry: &mut RecordEntry);

    /// Rewrite one entry if the condition allows it
    fn sanitize_entry(&self, entry: &mut RecordEntry) {
        if self.condition().map_or(true, |condition| condition.matches(entry)) {
            self.sanitize(entry);
        }
    }

    /// Rewrite a whole session.
    ///
    /// Session-level sanitizers override this to drop or reorder entries.
    fn sanitize_entries(&self, entries: &mut Vec<RecordEntry>) {
        for entry in entries.iter_mut() {
            self.sanitize_entry(entry);
        }
    }
}

/// A sanitizer together with the id it was registered under
#[derive(Debug, Clone)]
pub struct RegisteredSanitizer {
    /// Stable id
    pub id: String,
    /// The sanitizer
    pub sanitizer: Arc<dyn Sanitizer>,
}

impl RegisteredSanitizer {
    /// Pair a sanitizer with an id
    #[must_use]
    pub fn new(id: impl Into<String>, sanitizer: Arc<dyn Sanitizer>) -> Self {
        Self {
            id: id.into(),
            sanitizer,
        }
    }
}

/// Apply a list of sanitizers to one entry in order.
///
/// Every path (record, stop, playback pool, live playback request) goes
/// through this pass or [`sanitize_entries`]. The whole list runs over the
/// request body as it is, then again over its canonical JSON form, so a body
/// pattern written against either form redacts the same text on both sides
/// of a match. The request body ends canonical.
pub fn sanitize_entry(entry: &mut RecordEntry, sanitizers: &[RegisteredSanitizer]) {
    for _ in 0..2 {
        for registered in sanitizers {
            registered.sanitizer.sanitize_entry(entry);
        }
        entry.request.normalize_json_body();
    }
}

/// Session-wide counterpart of [`sanitize_entry`]; session-level
/// sanitizers may drop entries here.
pub fn sanitize_entries(entries: &mut Vec<RecordEntry>, sanitizers: &[RegisteredSanitizer]) {
    for _ in 0..2 {
        for registered in sanitizers {
            registered.sanitizer.sanitize_entries(entries);
        }
        for entry in entries.iter_mut() {
            entry.request.normalize_json_body();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::Headers;

    #[test]
    fn test_condition_limits_sanitizer() {
        let condition = ApplyCondition::new("HeaderRegexSanitizer", r"/secret/").unwrap();
        let sanitizer = HeaderRegexSanitizer::new("x-key", "Sanitized", None, None, Some(condition))
            .unwrap();

        let headers: Headers = [("x-key", "value")].into_iter().collect();
        let mut public = RecordEntry::from_request("GET", "http://h/public", headers.clone(), vec![]);
        let mut secret = RecordEntry::from_request("GET", "http://h/secret/1", headers, vec![]);

        sanitizer.sanitize_entry(&mut public);
        sanitizer.sanitize_entry(&mut secret);

        assert_eq!(public.request.headers.get_first("x-key"), Some("value"));
        assert_eq!(secret.request.headers.get_first("x-key"), Some("Sanitized"));
    }

    fn json_request(body: &str) -> RecordEntry {
        let headers: Headers = [("Content-Type", "application/json")].into_iter().collect();
        RecordEntry::from_request("POST", "http://h/login", headers, body.as_bytes().to_vec())
    }

    #[test]
    fn test_body_pattern_sees_raw_and_canonical_forms() {
        for pattern in [r#""password": "[^"]*""#, r#""password":"[^"]*""#] {
            let sanitizer = BodyRegexSanitizer::new(r#""password":"x""#, pattern, None, None).unwrap();
            let sanitizers = vec![RegisteredSanitizer::new("body", Arc::new(sanitizer))];

            let mut recorded = json_request(r#"{"password": "secret", "a": 1}"#);
            let mut live = json_request(r#"{"password": "other", "a": 1}"#);
            sanitize_entry(&mut recorded, &sanitizers);
            sanitize_entry(&mut live, &sanitizers);

            assert_eq!(recorded.request.body, live.request.body, "pattern {pattern}");
            assert!(!String::from_utf8_lossy(&recorded.request.body).contains("secret"));
        }
    }

    #[test]
    fn test_session_pass_matches_single_entry_pass() {
        let sanitizer = BodyRegexSanitizer::new("X", r#""token":"[^"]*""#, None, None).unwrap();
        let sanitizers = vec![RegisteredSanitizer::new("body", Arc::new(sanitizer))];

        let mut single = json_request(r#"{ "token" : "t-1" }"#);
        sanitize_entry(&mut single, &sanitizers);
        let mut entries = vec![json_request(r#"{ "token" : "t-1" }"#)];
        sanitize_entries(&mut entries, &sanitizers);

        assert_eq!(entries, vec![single]);
    }

    #[test]
    fn test_bad_condition_rejected() {
        assert!(matches!(
            ApplyCondition::new("UriRegexSanitizer", "(unclosed"),
            Err(RecplayError::MalformedSanitizerConfig { .. })
        ));
    }
}
