//! Matcher trait and the rule-based `RecordMatcher`

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::recording::RecordEntry;
use crate::{RecplayError, Result};

use super::query::{parse_query, split_uri};
use super::rules::{CustomMatcherOptions, MatchRules};

/// One rule a candidate entry failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleFailure {
    /// Methods differ
    Method {
        /// Recorded value
        expected: String,
        /// Live value
        actual: String,
    },
    /// URIs differ outside the query string
    Uri {
        /// Recorded value
        expected: String,
        /// Live value
        actual: String,
    },
    /// Query parameters differ
    Query {
        /// Recorded query
        expected: String,
        /// Live query
        actual: String,
    },
    /// A compared header differs or is missing on one side
    Header {
        /// Header name
        name: String,
        /// Recorded value
        expected: Option<String>,
        /// Live value
        actual: Option<String>,
    },
    /// Request bodies differ
    Body {
        /// Recorded body length
        expected_len: usize,
        /// Live body length
        actual_len: usize,
    },
}

impl fmt::Display for RuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Method { expected, actual } => {
                write!(f, "method: recorded {expected}, request {actual}")
            }
            Self::Uri { expected, actual } => {
                write!(f, "uri: recorded {expected}, request {actual}")
            }
            Self::Query { expected, actual } => {
                write!(f, "query: recorded '{expected}', request '{actual}'")
            }
            Self::Header {
                name,
                expected,
                actual,
            } => write!(
                f,
                "header {name}: recorded {}, request {}",
                expected.as_deref().unwrap_or("<absent>"),
                actual.as_deref().unwrap_or("<absent>")
            ),
            Self::Body {
                expected_len,
                actual_len,
            } => write!(
                f,
                "body: recorded {expected_len} bytes, request {actual_len} bytes differ"
            ),
        }
    }
}

/// The remaining entry that came closest to matching
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosestCandidate {
    /// Position in the remaining pool
    pub index: usize,
    /// Recorded method
    pub method: String,
    /// Recorded URI
    pub uri: String,
    /// Rules it failed
    pub failed: Vec<RuleFailure>,
}

/// Why a lookup found nothing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchDiagnostic {
    /// Matcher that ran
    pub matcher: String,
    /// Number of entries left in the pool
    pub pool_size: usize,
    /// Rules the matcher checks
    pub rules_checked: Vec<String>,
    /// Best candidate, if the pool was not empty
    pub closest: Option<ClosestCandidate>,
}

impl fmt::Display for MatchDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} checked [{}] against {} remaining entries",
            self.matcher,
            self.rules_checked.join(", "),
            self.pool_size
        )?;
        match &self.closest {
            None => write!(f, "; no entries remain"),
            Some(closest) => {
                write!(
                    f,
                    "; closest entry #{} ({} {}) failed:",
                    closest.index, closest.method, closest.uri
                )?;
                for failure in &closest.failed {
                    write!(f, "\n  {failure}")?;
                }
                Ok(())
            }
        }
    }
}

/// Finds the recorded entry that answers a live request.
///
/// Implementors compare one candidate at a time; the provided `find_match`
/// walks the pool in recorded order so the earliest passing entry wins.
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Name used in diagnostics and logs
    fn name(&self) -> &str;

    /// Rules this matcher checks, for diagnostics
    fn rules_checked(&self) -> Vec<String>;

    /// Every rule `candidate` fails for `request`; empty means a match
    fn compare(&self, request: &RecordEntry, candidate: &RecordEntry) -> Vec<RuleFailure>;

    /// Index of the first entry in `pool` that matches `request`
    ///
    /// # Errors
    ///
    /// Returns a diagnostic naming the closest candidate and its failed rules.
    fn find_match(
        &self,
        request: &RecordEntry,
        pool: &[RecordEntry],
    ) -> std::result::Result<usize, MatchDiagnostic> {
        let mut closest: Option<ClosestCandidate> = None;
        for (index, candidate) in pool.iter().enumerate() {
            let failed = self.compare(request, candidate);
            if failed.is_empty() {
                return Ok(index);
            }
            if closest
                .as_ref()
                .map_or(true, |best| failed.len() < best.failed.len())
            {
                closest = Some(ClosestCandidate {
                    index,
                    method: candidate.request_method.clone(),
                    uri: candidate.request_uri.clone(),
                    failed,
                });
            }
        }
        Err(MatchDiagnostic {
            matcher: self.name().to_string(),
            pool_size: pool.len(),
            rules_checked: self.rules_checked(),
            closest,
        })
    }
}

/// Rule-driven matcher behind every built-in matcher name
#[derive(Debug, Clone)]
pub struct RecordMatcher {
    name: String,
    rules: MatchRules,
}

impl Default for RecordMatcher {
    fn default() -> Self {
        Self::new(MatchRules::default())
    }
}

impl RecordMatcher {
    /// Create a matcher from rules
    #[must_use]
    pub fn new(rules: MatchRules) -> Self {
        Self::named("DefaultMatcher", rules)
    }

    /// Create a matcher with a display name
    #[must_use]
    pub fn named(name: impl Into<String>, rules: MatchRules) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    /// The active rules
    #[must_use]
    pub fn rules(&self) -> &MatchRules {
        &self.rules
    }

    fn compare_query(&self, expected: Option<&str>, actual: Option<&str>) -> bool {
        let ignored = &self.rules.ignored_query_parameters;
        let pairs = |query: Option<&str>| {
            let mut pairs: Vec<(String, String)> = query
                .map(parse_query)
                .unwrap_or_default()
                .into_iter()
                .filter(|(name, _)| !ignored.iter().any(|skip| skip == name))
                .collect();
            if self.rules.ignore_query_ordering {
                pairs.sort();
            }
            pairs
        };
        pairs(expected) == pairs(actual)
    }
}

impl Matcher for RecordMatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn rules_checked(&self) -> Vec<String> {
        self.rules.describe()
    }

    fn compare(&self, request: &RecordEntry, candidate: &RecordEntry) -> Vec<RuleFailure> {
        let mut failed = Vec::new();

        if !request
            .request_method
            .eq_ignore_ascii_case(&candidate.request_method)
        {
            failed.push(RuleFailure::Method {
                expected: candidate.request_method.clone(),
                actual: request.request_method.clone(),
            });
        }

        let (live_base, live_query) = split_uri(&request.request_uri);
        let (recorded_base, recorded_query) = split_uri(&candidate.request_uri);
        if live_base != recorded_base {
            failed.push(RuleFailure::Uri {
                expected: recorded_base.to_string(),
                actual: live_base.to_string(),
            });
        }
        if !self.compare_query(recorded_query, live_query) {
            failed.push(RuleFailure::Query {
                expected: recorded_query.unwrap_or_default().to_string(),
                actual: live_query.unwrap_or_default().to_string(),
            });
        }

        for name in &self.rules.headers {
            let expected = candidate.request.headers.get(name).map(|v| v.join(", "));
            let actual = request.request.headers.get(name).map(|v| v.join(", "));
            if expected != actual {
                failed.push(RuleFailure::Header {
                    name: name.clone(),
                    expected,
                    actual,
                });
            }
        }

        if self.rules.compare_bodies && request.request.body != candidate.request.body {
            failed.push(RuleFailure::Body {
                expected_len: candidate.request.body.len(),
                actual_len: request.request.body.len(),
            });
        }

        failed
    }
}

/// Build a matcher from its registered name and JSON options
///
/// # Errors
///
/// Returns `MalformedMatcherConfig` for unknown names or bad options.
pub fn matcher_from_config(name: &str, options: &Value) -> Result<Arc<dyn Matcher>> {
    let rules = match name {
        "DefaultMatcher" => MatchRules::default(),
        "BodilessMatcher" => MatchRules::bodiless(),
        "HeaderlessMatcher" => MatchRules::headerless(),
        "CustomDefaultMatcher" => {
            let options: CustomMatcherOptions = if options.is_null() {
                CustomMatcherOptions::default()
            } else {
                serde_json::from_value(options.clone())
                    .map_err(|e| RecplayError::matcher_config(name, e.to_string()))?
            };
            options.into_rules()
        }
        other => {
            return Err(RecplayError::matcher_config(
                other,
                "unknown matcher; expected DefaultMatcher, BodilessMatcher, \
                 HeaderlessMatcher or CustomDefaultMatcher",
            ))
        }
    };
    Ok(Arc::new(RecordMatcher::named(name, rules)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::Headers;

    fn recorded(method: &str, uri: &str, body: &str) -> RecordEntry {
        RecordEntry::from_request(method, uri, Headers::new(), body.as_bytes().to_vec())
    }

    #[test]
    fn test_first_match_wins() {
        let pool = vec![
            recorded("GET", "http://h/b", ""),
            recorded("GET", "http://h/a", ""),
            recorded("GET", "http://h/a", ""),
        ];
        let matcher = RecordMatcher::default();
        assert_eq!(matcher.find_match(&recorded("GET", "http://h/a", ""), &pool), Ok(1));
    }

    #[test]
    fn test_query_order_ignored_by_default() {
        let pool = vec![recorded("GET", "http://h/a?x=1&y=2", "")];
        let matcher = RecordMatcher::new(MatchRules::default());
        assert!(matcher
            .find_match(&recorded("GET", "http://h/a?y=2&x=1", ""), &pool)
            .is_ok());

        let ordered = RecordMatcher::new(MatchRules {
            ignore_query_ordering: false,
            ..MatchRules::default()
        });
        assert!(ordered
            .find_match(&recorded("GET", "http://h/a?y=2&x=1", ""), &pool)
            .is_err());
    }

    #[test]
    fn test_ignored_query_parameters() {
        let pool = vec![recorded("GET", "http://h/a?sig=old&x=1", "")];
        let matcher = RecordMatcher::new(MatchRules {
            ignored_query_parameters: vec!["sig".to_string()],
            ..MatchRules::default()
        });
        assert!(matcher
            .find_match(&recorded("GET", "http://h/a?x=1&sig=new", ""), &pool)
            .is_ok());
    }

    #[test]
    fn test_header_allow_list() {
        let mut entry = recorded("GET", "http://h/a", "");
        entry.request.headers.append("Content-Type", "application/json");
        entry.request.headers.append("User-Agent", "one");
        let pool = vec![entry];

        let mut request = recorded("GET", "http://h/a", "");
        request.request.headers.append("content-type", "application/json");
        request.request.headers.append("User-Agent", "two");

        let matcher = RecordMatcher::default();
        assert!(matcher.find_match(&request, &pool).is_ok());

        request.request.headers.remove("content-type");
        let diagnostic = matcher.find_match(&request, &pool).unwrap_err();
        let failed = &diagnostic.closest.unwrap().failed;
        assert!(matches!(&failed[0], RuleFailure::Header { name, .. } if name == "content-type"));
    }

    #[test]
    fn test_bodiless_matcher() {
        let pool = vec![recorded("POST", "http://h/a", "one")];
        let request = recorded("POST", "http://h/a", "two");

        assert!(RecordMatcher::default().find_match(&request, &pool).is_err());
        let bodiless = matcher_from_config("BodilessMatcher", &Value::Null).unwrap();
        assert!(bodiless.find_match(&request, &pool).is_ok());
    }

    #[test]
    fn test_diagnostic_names_closest_candidate() {
        let pool = vec![
            recorded("PUT", "http://h/zzz", "x"),
            recorded("GET", "http://h/a", "x"),
        ];
        let diagnostic = RecordMatcher::default()
            .find_match(&recorded("GET", "http://h/a", "y"), &pool)
            .unwrap_err();

        let closest = diagnostic.closest.clone().unwrap();
        assert_eq!(closest.index, 1);
        assert_eq!(closest.failed.len(), 1);
        assert!(matches!(closest.failed[0], RuleFailure::Body { .. }));
        assert!(diagnostic.to_string().contains("body"));
    }

    #[test]
    fn test_empty_pool_diagnostic() {
        let diagnostic = RecordMatcher::default()
            .find_match(&recorded("GET", "http://h/a", ""), &[])
            .unwrap_err();
        assert_eq!(diagnostic.pool_size, 0);
        assert!(diagnostic.closest.is_none());
    }

    #[test]
    fn test_unknown_matcher_rejected() {
        let result = matcher_from_config("FuzzyMatcher", &Value::Null);
        assert!(matches!(
            result,
            Err(RecplayError::MalformedMatcherConfig { .. })
        ));
    }

    #[test]
    fn test_custom_matcher_bad_options() {
        let options = serde_json::json!({ "compareBodies": "yes" });
        assert!(matcher_from_config("CustomDefaultMatcher", &options).is_err());
    }
}
