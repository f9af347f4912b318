//! Session-level sanitizer that drops OAuth token exchanges

use regex::Regex;

use crate::recording::RecordEntry;
use crate::{RecplayError, Result};

use super::Sanitizer;

const TOKEN_ENDPOINT: &str = r"(?i)/oauth2(?:/v2\.0)?/token";

/// Removes token endpoint exchanges from a session.
///
/// Token requests carry credentials and replay poorly, so they are dropped
/// from recordings and from playback pools alike.
#[derive(Debug, Clone)]
pub struct OAuthResponseSanitizer {
    token_endpoint: Regex,
}

impl OAuthResponseSanitizer {
    /// Create the sanitizer
    ///
    /// # Errors
    ///
    /// Never fails in practice; the pattern is fixed.
    pub fn new() -> Result<Self> {
        let token_endpoint = Regex::new(TOKEN_ENDPOINT)
            .map_err(|e| RecplayError::sanitizer_config("OAuthResponseSanitizer", e.to_string()))?;
        Ok(Self { token_endpoint })
    }

    /// True when the entry is a token endpoint exchange
    #[must_use]
    pub fn is_token_exchange(&self, entry: &RecordEntry) -> bool {
        self.token_endpoint.is_match(&entry.request_uri)
    }
}

impl Sanitizer for OAuthResponseSanitizer {
    fn name(&self) -> &'static str {
        "OAuthResponseSanitizer"
    }

    fn sanitize(&self, _entry: &mut RecordEntry) {}

    fn sanitize_entries(&self, entries: &mut Vec<RecordEntry>) {
        entries.retain(|entry| !self.is_token_exchange(entry));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::Headers;

    #[test]
    fn test_drops_token_exchanges() {
        let sanitizer = OAuthResponseSanitizer::new().unwrap();
        let mut entries = vec![
            RecordEntry::from_request("POST", "https://login.example.com/t/oauth2/v2.0/token", Headers::new(), vec![]),
            RecordEntry::from_request("GET", "https://svc.example.com/items", Headers::new(), vec![]),
            RecordEntry::from_request("POST", "https://login.example.com/t/OAuth2/token", Headers::new(), vec![]),
        ];
        sanitizer.sanitize_entries(&mut entries);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].request_uri, "https://svc.example.com/items");
    }
}
