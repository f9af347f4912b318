//! Proxied request/response values

use bytes::Bytes;

use super::{
    ABSTRACTION_IDENTIFIER_HEADER, RECORDING_HEADER_PREFIX, UPSTREAM_BASE_URI_HEADER,
};
use crate::recording::Headers;
use crate::{RecplayError, Result};

/// Headers that only describe one hop and are never forwarded or recorded
const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// A request received from the client under test
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// HTTP method
    pub method: String,
    /// Path and query as the client sent them
    pub path_and_query: String,
    /// Request headers, control headers included
    pub headers: Headers,
    /// Request body
    pub body: Bytes,
}

impl ProxyRequest {
    /// Create a request
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        path_and_query: impl Into<String>,
        headers: Headers,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            method: method.into(),
            path_and_query: path_and_query.into(),
            headers,
            body: body.into(),
        }
    }

    /// Absolute upstream URI: the `x-recording-upstream-base-uri` base
    /// joined with the request's path and query.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the base header is missing or is not an
    /// absolute http(s) URI.
    pub fn upstream_uri(&self) -> Result<String> {
        let base = self
            .headers
            .get_first(UPSTREAM_BASE_URI_HEADER)
            .map(str::trim)
            .filter(|base| !base.is_empty())
            .ok_or_else(|| {
                RecplayError::InvalidRequest(format!(
                    "missing required header '{UPSTREAM_BASE_URI_HEADER}'"
                ))
            })?;

        let lower = base.to_ascii_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return Err(RecplayError::InvalidRequest(format!(
                "'{UPSTREAM_BASE_URI_HEADER}' must be an absolute http(s) URI, got '{base}'"
            )));
        }

        Ok(join_uri(base, &self.path_and_query))
    }

    /// Headers sent upstream and recorded: everything except proxy control
    /// headers, hop-by-hop headers and `Host`
    #[must_use]
    pub fn forwarded_headers(&self) -> Headers {
        let mut headers = self.headers.clone();
        headers.retain(|name| {
            let name = name.to_ascii_lowercase();
            !(is_control_header(&name) || is_hop_by_hop(&name) || name == "host")
        });
        headers
    }

    /// Value of a single header
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_first(name)
    }
}

/// Response handed back to the client under test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: Headers,
    /// Response body
    pub body: Bytes,
}

impl ProxyResponse {
    /// Create a response
    #[must_use]
    pub fn new(status: u16, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Headers worth keeping in a recording
    #[must_use]
    pub fn recorded_headers(&self) -> Headers {
        let mut headers = self.headers.clone();
        headers.retain(|name| !is_hop_by_hop(&name.to_ascii_lowercase()));
        headers
    }
}

fn is_control_header(lower_name: &str) -> bool {
    lower_name.starts_with(RECORDING_HEADER_PREFIX) || lower_name == ABSTRACTION_IDENTIFIER_HEADER
}

fn is_hop_by_hop(lower_name: &str) -> bool {
    HOP_BY_HOP_HEADERS.contains(&lower_name)
}

fn join_uri(base: &str, path_and_query: &str) -> String {
    let base = base.trim_end_matches('/');
    if path_and_query.is_empty() || path_and_query == "/" {
        return format!("{base}/");
    }
    if path_and_query.starts_with('/') {
        format!("{base}{path_and_query}")
    } else {
        format!("{base}/{path_and_query}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)], path: &str) -> ProxyRequest {
        let headers = headers
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect();
        ProxyRequest::new("GET", path, headers, Bytes::new())
    }

    #[test]
    fn test_upstream_uri_joins_base_and_path() {
        let req = request(
            &[(UPSTREAM_BASE_URI_HEADER, "https://example.com/")],
            "/a/b?x=1",
        );
        assert_eq!(req.upstream_uri().unwrap(), "https://example.com/a/b?x=1");

        let req = request(&[(UPSTREAM_BASE_URI_HEADER, "http://h:8080")], "");
        assert_eq!(req.upstream_uri().unwrap(), "http://h:8080/");
    }

    #[test]
    fn test_upstream_uri_requires_absolute_base() {
        assert!(matches!(
            request(&[], "/a").upstream_uri(),
            Err(RecplayError::InvalidRequest(_))
        ));
        assert!(request(&[(UPSTREAM_BASE_URI_HEADER, "example.com")], "/a")
            .upstream_uri()
            .is_err());
    }

    #[test]
    fn test_forwarded_headers_strip_control_and_hop_by_hop() {
        let req = request(
            &[
                ("Host", "localhost:5000"),
                ("x-recording-id", "abc"),
                ("X-Recording-Upstream-Base-Uri", "https://example.com"),
                ("x-abstraction-identifier", "HeaderRegexSanitizer"),
                ("Connection", "keep-alive"),
                ("Content-Type", "application/json"),
                ("x-request-id", "r1"),
            ],
            "/",
        );

        let forwarded = req.forwarded_headers();
        let names: Vec<&str> = forwarded.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Content-Type", "x-request-id"]);
    }

    #[test]
    fn test_recorded_response_headers() {
        let headers = [("Transfer-Encoding", "chunked"), ("ETag", "\"1\"")]
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect();
        let response = ProxyResponse::new(200, headers, Bytes::new());
        let recorded = response.recorded_headers();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded.get_first("etag"), Some("\"1\""));
    }
}
