//! Configurable match rules

use serde::{Deserialize, Serialize};

/// Headers compared by the default rule set
pub const DEFAULT_MATCHED_HEADERS: [&str; 3] = ["content-type", "if-match", "if-none-match"];

/// Which parts of a request must agree with a recorded entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRules {
    /// Compare request bodies byte for byte (after normalization)
    pub compare_bodies: bool,
    /// Header allow-list; names not listed are ignored
    pub headers: Vec<String>,
    /// Treat the query string as an unordered multiset
    pub ignore_query_ordering: bool,
    /// Query parameters left out of the comparison
    pub ignored_query_parameters: Vec<String>,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            compare_bodies: true,
            headers: DEFAULT_MATCHED_HEADERS
                .iter()
                .map(ToString::to_string)
                .collect(),
            ignore_query_ordering: true,
            ignored_query_parameters: Vec::new(),
        }
    }
}

impl MatchRules {
    /// Default rules without the body comparison
    #[must_use]
    pub fn bodiless() -> Self {
        Self {
            compare_bodies: false,
            ..Self::default()
        }
    }

    /// Default rules without any header comparison
    #[must_use]
    pub fn headerless() -> Self {
        Self {
            headers: Vec::new(),
            ..Self::default()
        }
    }

    /// Names of the rules this set checks, for diagnostics
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        let mut rules = vec!["method".to_string(), "uri".to_string()];
        rules.push(if self.ignore_query_ordering {
            "query (unordered)".to_string()
        } else {
            "query (ordered)".to_string()
        });
        rules.extend(self.headers.iter().map(|name| format!("header {name}")));
        if self.compare_bodies {
            rules.push("body".to_string());
        }
        rules
    }
}

/// A list given either as a JSON array or a comma separated string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ListOrCsv {
    List(Vec<String>),
    Csv(String),
}

impl ListOrCsv {
    pub(crate) fn into_vec(self) -> Vec<String> {
        match self {
            Self::List(items) => items
                .into_iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
            Self::Csv(text) => text
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Body of a `CustomDefaultMatcher` registration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct CustomMatcherOptions {
    pub compare_bodies: Option<bool>,
    pub headers: Option<ListOrCsv>,
    pub ignore_query_ordering: Option<bool>,
    pub ignored_query_parameters: Option<ListOrCsv>,
}

impl CustomMatcherOptions {
    pub(crate) fn into_rules(self) -> MatchRules {
        let defaults = MatchRules::default();
        MatchRules {
            compare_bodies: self.compare_bodies.unwrap_or(defaults.compare_bodies),
            headers: self.headers.map_or(defaults.headers, ListOrCsv::into_vec),
            ignore_query_ordering: self
                .ignore_query_ordering
                .unwrap_or(defaults.ignore_query_ordering),
            ignored_query_parameters: self
                .ignored_query_parameters
                .map_or(defaults.ignored_query_parameters, ListOrCsv::into_vec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let rules = MatchRules::default();
        assert!(rules.compare_bodies);
        assert!(rules.ignore_query_ordering);
        assert_eq!(rules.headers, ["content-type", "if-match", "if-none-match"]);
    }

    #[test]
    fn test_custom_options_accept_csv_and_arrays() {
        let options: CustomMatcherOptions = serde_json::from_str(
            r#"{"compareBodies": false, "headers": "x-a, x-b", "ignoredQueryParameters": ["sig"]}"#,
        )
        .unwrap();
        let rules = options.into_rules();

        assert!(!rules.compare_bodies);
        assert_eq!(rules.headers, ["x-a", "x-b"]);
        assert_eq!(rules.ignored_query_parameters, ["sig"]);
        assert!(rules.ignore_query_ordering);
    }

    #[test]
    fn test_custom_options_reject_unknown_fields() {
        let parsed = serde_json::from_str::<CustomMatcherOptions>(r#"{"compareBody": true}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_toml_rules_partial() {
        let rules: MatchRules = toml::from_str("compare_bodies = false").unwrap();
        assert!(!rules.compare_bodies);
        assert_eq!(rules.headers.len(), 3);
    }
}
