//! JSONPath-targeted body sanitizer

use serde_json::Value;
use serde_json_path::JsonPath;

use crate::recording::{EntryMessage, RecordEntry};
use crate::{RecplayError, Result};

use super::replacement::{GroupRef, Replacement};
use super::{ApplyCondition, Sanitizer};

/// Replaces the values a JSONPath selects in JSON request and response bodies.
///
/// String values go through the replacement (regex or whole value). Other
/// values are replaced with the replacement text only when no regex is set.
#[derive(Debug, Clone)]
pub struct BodyKeySanitizer {
    path: JsonPath,
    replacement: Replacement,
    condition: Option<ApplyCondition>,
}

impl BodyKeySanitizer {
    /// Create a body key sanitizer
    ///
    /// # Errors
    ///
    /// Returns `MalformedSanitizerConfig` for an invalid JSONPath, regex or group.
    pub fn new(
        json_path: &str,
        value: impl Into<String>,
        regex: Option<&str>,
        group: Option<GroupRef>,
        condition: Option<ApplyCondition>,
    ) -> Result<Self> {
        let path = JsonPath::parse(json_path).map_err(|e| {
            RecplayError::sanitizer_config("BodyKeySanitizer", format!("invalid jsonPath: {e}"))
        })?;
        Ok(Self {
            path,
            replacement: Replacement::new("BodyKeySanitizer", value, regex, group)?,
            condition,
        })
    }

    fn sanitize_message(&self, message: &mut EntryMessage) {
        if message.body.is_empty() || !message.is_json() {
            return;
        }
        let Ok(mut document) = serde_json::from_slice::<Value>(&message.body) else {
            return;
        };

        let pointers: Vec<String> = self
            .path
            .query_located(&document)
            .locations()
            .map(|location| location.to_json_pointer())
            .collect();

        let mut changed = false;
        for pointer in pointers {
            let Some(target) = document.pointer_mut(&pointer) else {
                continue;
            };
            let replaced = match target {
                Value::String(text) => {
                    let replaced = self.replacement.apply(text);
                    (replaced != text.as_str()).then(|| Value::String(replaced.into_owned()))
                }
                Value::Null => None,
                _ if !self.replacement.has_regex() => {
                    Some(Value::String(self.replacement.value().to_string()))
                }
                _ => None,
            };
            if let Some(replaced) = replaced {
                *target = replaced;
                changed = true;
            }
        }

        if changed {
            if let Ok(body) = serde_json::to_vec(&document) {
                message.body = body;
            }
        }
    }
}

impl Sanitizer for BodyKeySanitizer {
    fn name(&self) -> &'static str {
        "BodyKeySanitizer"
    }

    fn condition(&self) -> Option<&ApplyCondition> {
        self.condition.as_ref()
    }

    fn sanitize(&self, entry: &mut RecordEntry) {
        self.sanitize_message(&mut entry.request);
        self.sanitize_message(&mut entry.response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::Headers;

    fn json_entry(request: &str, response: &str) -> RecordEntry {
        let headers: Headers = [("Content-Type", "application/json")].into_iter().collect();
        RecordEntry::from_request("POST", "http://h/a", headers.clone(), request.as_bytes().to_vec())
            .with_response(200, headers, response.as_bytes().to_vec())
    }

    #[test]
    fn test_replaces_selected_strings() {
        let sanitizer = BodyKeySanitizer::new("$..secret", "Sanitized", None, None, None).unwrap();
        let mut entry = json_entry(
            r#"{"secret":"a","nested":{"secret":"b"},"keep":"c"}"#,
            r#"{"items":[{"secret":"d"}]}"#,
        );
        sanitizer.sanitize_entry(&mut entry);

        let request: Value = serde_json::from_slice(&entry.request.body).unwrap();
        assert_eq!(request["secret"], "Sanitized");
        assert_eq!(request["nested"]["secret"], "Sanitized");
        assert_eq!(request["keep"], "c");

        let response: Value = serde_json::from_slice(&entry.response.body).unwrap();
        assert_eq!(response["items"][0]["secret"], "Sanitized");
    }

    #[test]
    fn test_regex_narrows_replacement() {
        let sanitizer =
            BodyKeySanitizer::new("$.url", "fake", Some(r"https://(\w+)\."), Some(GroupRef::Index(1)), None)
                .unwrap();
        let mut entry = json_entry(r#"{"url":"https://real.example.com","n":5}"#, "");
        sanitizer.sanitize_entry(&mut entry);

        let request: Value = serde_json::from_slice(&entry.request.body).unwrap();
        assert_eq!(request["url"], "https://fake.example.com");
        assert_eq!(request["n"], 5);
    }

    #[test]
    fn test_untouched_body_keeps_bytes() {
        let sanitizer = BodyKeySanitizer::new("$.missing", "x", None, None, None).unwrap();
        let original = "{ \"a\" : 1 }";
        let mut entry = json_entry(original, "");
        sanitizer.sanitize_entry(&mut entry);
        assert_eq!(entry.request.body, original.as_bytes());
    }

    #[test]
    fn test_invalid_path_rejected() {
        assert!(matches!(
            BodyKeySanitizer::new("$[", "x", None, None, None),
            Err(RecplayError::MalformedSanitizerConfig { .. })
        ));
    }
}
