//! Built-in response transforms

use regex::Regex;

use crate::recording::RecordEntry;
use crate::sanitize::ApplyCondition;
use crate::{RecplayError, Result};

use super::ResponseTransform;

/// Header whose request value `ClientIdTransform` echoes by default
pub const DEFAULT_CLIENT_ID_HEADER: &str = "x-ms-client-request-id";

/// Sets or rewrites a response header.
///
/// Without `value_regex` the header is set when absent and replaced when
/// present. With it, only present headers whose value matches are replaced.
#[derive(Debug, Clone)]
pub struct HeaderTransform {
    key: String,
    value: String,
    value_regex: Option<Regex>,
    condition: Option<ApplyCondition>,
}

impl HeaderTransform {
    /// Create a header transform
    ///
    /// # Errors
    ///
    /// Returns `MalformedSanitizerConfig` for an invalid `value_regex`.
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        value_regex: Option<&str>,
        condition: Option<ApplyCondition>,
    ) -> Result<Self> {
        let value_regex = value_regex
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    RecplayError::sanitizer_config("HeaderTransform", format!("invalid valueRegex: {e}"))
                })
            })
            .transpose()?;
        Ok(Self {
            key: key.into(),
            value: value.into(),
            value_regex,
            condition,
        })
    }
}

impl ResponseTransform for HeaderTransform {
    fn name(&self) -> &'static str {
        "HeaderTransform"
    }

    fn condition(&self) -> Option<&ApplyCondition> {
        self.condition.as_ref()
    }

    fn transform(&self, _request: &RecordEntry, matched: &mut RecordEntry) {
        let headers = &mut matched.response.headers;
        if let Some(values) = headers.get_mut(&self.key) {
            let replace = self
                .value_regex
                .as_ref()
                .map_or(true, |regex| values.iter().any(|value| regex.is_match(value)));
            if replace {
                *values = vec![self.value.clone()];
            }
        } else if self.value_regex.is_none() {
            headers.append(self.key.clone(), self.value.clone());
        }
    }
}

/// Copies the live request's client id header into the served response.
///
/// Clients that verify the echoed id would otherwise see the id of the
/// recorded request.
#[derive(Debug, Clone)]
pub struct ClientIdTransform {
    header: String,
    condition: Option<ApplyCondition>,
}

impl Default for ClientIdTransform {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_ID_HEADER, None)
    }
}

impl ClientIdTransform {
    /// Create a transform echoing `header`
    #[must_use]
    pub fn new(header: impl Into<String>, condition: Option<ApplyCondition>) -> Self {
        Self {
            header: header.into(),
            condition,
        }
    }
}

impl ResponseTransform for ClientIdTransform {
    fn name(&self) -> &'static str {
        "ClientIdTransform"
    }

    fn condition(&self) -> Option<&ApplyCondition> {
        self.condition.as_ref()
    }

    fn transform(&self, request: &RecordEntry, matched: &mut RecordEntry) {
        let Some(live) = request.request.headers.get(&self.header) else {
            return;
        };
        if let Some(values) = matched.response.headers.get_mut(&self.header) {
            *values = live.to_vec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::Headers;

    fn matched(response_headers: &[(&str, &str)]) -> RecordEntry {
        RecordEntry::from_request("GET", "http://h/", Headers::new(), vec![]).with_response(
            200,
            response_headers.iter().copied().collect(),
            vec![],
        )
    }

    fn live(headers: &[(&str, &str)]) -> RecordEntry {
        RecordEntry::from_request("GET", "http://h/", headers.iter().copied().collect(), vec![])
    }

    #[test]
    fn test_header_transform_inserts_and_replaces() {
        let transform = HeaderTransform::new("Location", "http://new", None, None).unwrap();

        let mut absent = matched(&[]);
        transform.apply(&live(&[]), &mut absent);
        assert_eq!(absent.response.headers.get_first("location"), Some("http://new"));

        let mut present = matched(&[("Location", "http://old")]);
        transform.apply(&live(&[]), &mut present);
        assert_eq!(present.response.headers.get_first("Location"), Some("http://new"));
    }

    #[test]
    fn test_header_transform_regex_gate() {
        let transform = HeaderTransform::new("Location", "http://new", Some("^http://old"), None).unwrap();

        let mut other = matched(&[("Location", "http://elsewhere")]);
        transform.apply(&live(&[]), &mut other);
        assert_eq!(other.response.headers.get_first("Location"), Some("http://elsewhere"));

        let mut absent = matched(&[]);
        transform.apply(&live(&[]), &mut absent);
        assert!(!absent.response.headers.contains("Location"));

        let mut hit = matched(&[("Location", "http://old/path")]);
        transform.apply(&live(&[]), &mut hit);
        assert_eq!(hit.response.headers.get_first("Location"), Some("http://new"));
    }

    #[test]
    fn test_client_id_echo() {
        let transform = ClientIdTransform::default();

        let mut entry = matched(&[("x-ms-client-request-id", "recorded")]);
        transform.apply(&live(&[("X-MS-Client-Request-Id", "live")]), &mut entry);
        assert_eq!(entry.response.headers.get_first("x-ms-client-request-id"), Some("live"));

        let mut without = matched(&[]);
        transform.apply(&live(&[("x-ms-client-request-id", "live")]), &mut without);
        assert!(without.response.headers.is_empty());
    }
}
