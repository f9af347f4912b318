//! Regex-or-whole-value replacement shared by the regex sanitizers

use std::borrow::Cow;

use regex::{Captures, NoExpand, Regex};

use crate::{RecplayError, Result};

/// Capture group selected for replacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupRef {
    /// Group by position
    Index(usize),
    /// Group by name
    Name(String),
}

impl GroupRef {
    /// Parse `"2"` as an index and anything else as a name
    #[must_use]
    pub fn parse(text: &str) -> Self {
        text.parse()
            .map_or_else(|_| Self::Name(text.to_string()), Self::Index)
    }

    fn find<'h>(&self, caps: &Captures<'h>) -> Option<regex::Match<'h>> {
        match self {
            Self::Index(index) => caps.get(*index),
            Self::Name(name) => caps.name(name),
        }
    }
}

/// What to write and where.
///
/// Without a regex the whole value is replaced. With a regex every match
/// is replaced, or only the chosen capture group inside each match.
#[derive(Debug, Clone)]
pub struct Replacement {
    value: String,
    regex: Option<Regex>,
    group: Option<GroupRef>,
}

impl Replacement {
    /// Compile a replacement, checking that the group exists in the regex
    ///
    /// # Errors
    ///
    /// Returns `MalformedSanitizerConfig` for an invalid regex, a group
    /// without a regex, or a group the regex does not define.
    pub fn new(
        owner: &str,
        value: impl Into<String>,
        regex: Option<&str>,
        group: Option<GroupRef>,
    ) -> Result<Self> {
        let regex = regex
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|e| RecplayError::sanitizer_config(owner, format!("invalid regex: {e}")))
            })
            .transpose()?;

        if let Some(group) = &group {
            let Some(regex) = &regex else {
                return Err(RecplayError::sanitizer_config(
                    owner,
                    "groupForReplace requires a regex",
                ));
            };
            let known = match group {
                GroupRef::Index(index) => *index < regex.captures_len(),
                GroupRef::Name(name) => regex.capture_names().flatten().any(|n| n == name.as_str()),
            };
            if !known {
                return Err(RecplayError::sanitizer_config(
                    owner,
                    format!("groupForReplace {group:?} is not defined by regex {regex}"),
                ));
            }
        }

        Ok(Self {
            value: value.into(),
            regex,
            group,
        })
    }

    /// The replacement text
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// True when a regex narrows the replacement
    #[must_use]
    pub fn has_regex(&self) -> bool {
        self.regex.is_some()
    }

    /// Apply to `input`, borrowing when nothing changes
    #[must_use]
    pub fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let Some(regex) = &self.regex else {
            return if input == self.value {
                Cow::Borrowed(input)
            } else {
                Cow::Owned(self.value.clone())
            };
        };
        let Some(group) = &self.group else {
            return regex.replace_all(input, NoExpand(&self.value));
        };
        regex.replace_all(input, |caps: &Captures| {
            let Some(whole) = caps.get(0) else {
                return String::new();
            };
            match group.find(caps) {
                Some(target) => format!(
                    "{}{}{}",
                    &input[whole.start()..target.start()],
                    self.value,
                    &input[target.end()..whole.end()]
                ),
                None => whole.as_str().to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_value() {
        let replacement = Replacement::new("test", "Sanitized", None, None).unwrap();
        assert_eq!(replacement.apply("Bearer abc"), "Sanitized");
    }

    #[test]
    fn test_regex_all_matches() {
        let replacement = Replacement::new("test", "X", Some(r"\d+"), None).unwrap();
        assert_eq!(replacement.apply("a1b22c"), "aXbXc");
    }

    #[test]
    fn test_group_replace_keeps_context() {
        let replacement =
            Replacement::new("test", "fake", Some(r"sig=(?<sig>[^&]+)"), Some(GroupRef::parse("sig")))
                .unwrap();
        assert_eq!(replacement.apply("a=1&sig=secret&b=2"), "a=1&sig=fake&b=2");

        let by_index =
            Replacement::new("test", "fake", Some(r"sig=([^&]+)"), Some(GroupRef::parse("1")))
                .unwrap();
        assert_eq!(by_index.apply("sig=one&sig=two"), "sig=fake&sig=fake");
    }

    #[test]
    fn test_value_is_literal() {
        let replacement = Replacement::new("test", "$1", Some("a(b)"), None).unwrap();
        assert_eq!(replacement.apply("ab"), "$1");
    }

    #[test]
    fn test_invalid_configs() {
        assert!(Replacement::new("test", "x", Some("("), None).is_err());
        assert!(Replacement::new("test", "x", None, Some(GroupRef::Index(1))).is_err());
        assert!(Replacement::new("test", "x", Some("a(b)"), Some(GroupRef::Index(2))).is_err());
        assert!(Replacement::new("test", "x", Some("a(b)"), Some(GroupRef::parse("nope"))).is_err());
    }

    #[test]
    fn test_idempotent() {
        let replacement = Replacement::new("test", "Sanitized", Some("[a-f0-9-]{36}"), None).unwrap();
        let once = replacement.apply("id=0f8fad5b-d9cb-469f-a165-70867728950e").into_owned();
        assert_eq!(replacement.apply(&once), once);
    }
}
