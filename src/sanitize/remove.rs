//! Sanitizers that drop headers or query parameters outright

use crate::matching::query::filter_query;
use crate::recording::RecordEntry;

use super::{ApplyCondition, Sanitizer};

/// Removes headers by name from requests and responses
#[derive(Debug, Clone)]
pub struct RemoveHeaderSanitizer {
    headers: Vec<String>,
    condition: Option<ApplyCondition>,
}

impl RemoveHeaderSanitizer {
    /// Create from a list of header names
    #[must_use]
    pub fn new(headers: Vec<String>, condition: Option<ApplyCondition>) -> Self {
        Self { headers, condition }
    }

    /// Create from a comma separated list
    #[must_use]
    pub fn from_csv(headers: &str, condition: Option<ApplyCondition>) -> Self {
        let headers = headers
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
            .collect();
        Self::new(headers, condition)
    }
}

impl Sanitizer for RemoveHeaderSanitizer {
    fn name(&self) -> &'static str {
        "RemoveHeaderSanitizer"
    }

    fn condition(&self) -> Option<&ApplyCondition> {
        self.condition.as_ref()
    }

    fn sanitize(&self, entry: &mut RecordEntry) {
        for name in &self.headers {
            entry.request.headers.remove(name);
            entry.response.headers.remove(name);
        }
    }
}

/// Removes query parameters from the request URI
#[derive(Debug, Clone)]
pub struct RemoveQueryParameterSanitizer {
    parameters: Vec<String>,
    condition: Option<ApplyCondition>,
}

impl RemoveQueryParameterSanitizer {
    /// Create from a list of parameter names
    #[must_use]
    pub fn new(parameters: Vec<String>, condition: Option<ApplyCondition>) -> Self {
        Self {
            parameters,
            condition,
        }
    }
}

impl Sanitizer for RemoveQueryParameterSanitizer {
    fn name(&self) -> &'static str {
        "RemoveQueryParameterSanitizer"
    }

    fn condition(&self) -> Option<&ApplyCondition> {
        self.condition.as_ref()
    }

    fn sanitize(&self, entry: &mut RecordEntry) {
        entry.request_uri = filter_query(&entry.request_uri, |name| {
            !self.parameters.iter().any(|removed| removed == name)
        });
    }
}
