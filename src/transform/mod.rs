//! Response transforms applied to playback responses after matching

mod builtin;

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;

use crate::recording::RecordEntry;
use crate::sanitize::{condition_from_options, ApplyCondition, ConditionOptions};
use crate::{RecplayError, Result};

pub use builtin::{ClientIdTransform, HeaderTransform, DEFAULT_CLIENT_ID_HEADER};

/// Rewrites a matched entry's response using the live request.
///
/// Transforms never touch what is stored; they run on the copy that is
/// about to be sent back to the client.
pub trait ResponseTransform: Send + Sync + fmt::Debug {
    /// Registered type name
    fn name(&self) -> &'static str;

    /// Optional URI condition, checked against the live request
    fn condition(&self) -> Option<&ApplyCondition> {
        None
    }

    /// Rewrite `matched.response` given the live, unsanitized `request`
    fn transform(&self, request: &RecordEntry, matched: &mut RecordEntry);

    /// Transform if the condition allows it
    fn apply(&self, request: &RecordEntry, matched: &mut RecordEntry) {
        if self.condition().map_or(true, |condition| condition.matches(request)) {
            self.transform(request, matched);
        }
    }
}

/// A transform with the id it was registered under
#[derive(Debug, Clone)]
pub struct RegisteredTransform {
    /// Stable id
    pub id: String,
    /// The transform
    pub transform: Arc<dyn ResponseTransform>,
}

#[derive(Debug)]
struct TransformState {
    transforms: Vec<RegisteredTransform>,
    next_id: u64,
}

/// Global transform list, applied to every playback response in order
#[derive(Debug)]
pub struct TransformRegistry {
    state: RwLock<TransformState>,
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self {
            state: RwLock::new(TransformState {
                transforms: default_transforms(),
                next_id: 0,
            }),
        }
    }
}

fn default_transforms() -> Vec<RegisteredTransform> {
    vec![RegisteredTransform {
        id: "default-client-id".to_string(),
        transform: Arc::new(ClientIdTransform::default()),
    }]
}

impl TransformRegistry {
    /// Create a registry holding the default transforms
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a transform with a fresh id without adding it to the global list
    pub fn allocate(&self, transform: Arc<dyn ResponseTransform>) -> RegisteredTransform {
        let mut state = self.state.write();
        state.next_id += 1;
        RegisteredTransform {
            id: format!("transform-{}", state.next_id),
            transform,
        }
    }

    /// Add a transform to the global list and return its id
    pub fn register(&self, transform: Arc<dyn ResponseTransform>) -> String {
        let registered = self.allocate(transform);
        let id = registered.id.clone();
        self.state.write().transforms.push(registered);
        id
    }

    /// Snapshot of the global list
    #[must_use]
    pub fn transforms(&self) -> Vec<RegisteredTransform> {
        self.state.read().transforms.clone()
    }

    /// Restore the default transforms
    pub fn reset(&self) {
        self.state.write().transforms = default_transforms();
    }
}

/// Apply transforms in order to the response about to be served
pub fn apply_transforms(
    transforms: &[RegisteredTransform],
    request: &RecordEntry,
    matched: &mut RecordEntry,
) {
    for registered in transforms {
        registered.transform.apply(request, matched);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct HeaderTransformOptions {
    key: String,
    value: String,
    value_regex: Option<String>,
    condition: Option<ConditionOptions>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ClientIdTransformOptions {
    header: Option<String>,
    condition: Option<ConditionOptions>,
}

/// Build a transform from its registered name and JSON options
///
/// # Errors
///
/// Returns `MalformedSanitizerConfig` for an unknown name or bad options.
pub fn transform_from_config(name: &str, options: &Value) -> Result<Arc<dyn ResponseTransform>> {
    let options = if options.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        options.clone()
    };
    let malformed = |e: serde_json::Error| RecplayError::sanitizer_config(name, e.to_string());

    match name {
        "HeaderTransform" => {
            let o: HeaderTransformOptions = serde_json::from_value(options).map_err(malformed)?;
            Ok(Arc::new(HeaderTransform::new(
                o.key,
                o.value,
                o.value_regex.as_deref(),
                condition_from_options(name, o.condition)?,
            )?))
        }
        "ClientIdTransform" => {
            let o: ClientIdTransformOptions = serde_json::from_value(options).map_err(malformed)?;
            Ok(Arc::new(ClientIdTransform::new(
                o.header
                    .unwrap_or_else(|| DEFAULT_CLIENT_ID_HEADER.to_string()),
                condition_from_options(name, o.condition)?,
            )))
        }
        other => Err(RecplayError::sanitizer_config(other, "unknown transform")),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::recording::Headers;

    #[test]
    fn test_registry_defaults_and_reset() {
        let registry = TransformRegistry::new();
        assert_eq!(registry.transforms().len(), 1);

        let transform = transform_from_config(
            "HeaderTransform",
            &json!({ "key": "Location", "value": "http://localhost" }),
        )
        .unwrap();
        let id = registry.register(transform);
        assert_eq!(id, "transform-1");
        assert_eq!(registry.transforms().len(), 2);

        registry.reset();
        assert_eq!(registry.transforms().len(), 1);
    }

    #[test]
    fn test_condition_checked_against_live_request() {
        let transform = transform_from_config(
            "HeaderTransform",
            &json!({ "key": "x-t", "value": "on", "condition": { "uriRegex": "/yes" } }),
        )
        .unwrap();

        let mut matched = RecordEntry::from_request("GET", "http://h/yes", Headers::new(), vec![]);
        transform.apply(
            &RecordEntry::from_request("GET", "http://h/no", Headers::new(), vec![]),
            &mut matched,
        );
        assert!(!matched.response.headers.contains("x-t"));

        transform.apply(
            &RecordEntry::from_request("GET", "http://h/yes", Headers::new(), vec![]),
            &mut matched,
        );
        assert_eq!(matched.response.headers.get_first("x-t"), Some("on"));
    }

    #[test]
    fn test_malformed_transform_configs() {
        assert!(transform_from_config("HeaderTransform", &json!({ "key": "a" })).is_err());
        assert!(transform_from_config(
            "HeaderTransform",
            &json!({ "key": "a", "value": "b", "valueRegex": "(" })
        )
        .is_err());
        assert!(transform_from_config("StatusTransform", &Value::Null).is_err());
        assert!(transform_from_config("ClientIdTransform", &Value::Null).is_ok());
    }
}
