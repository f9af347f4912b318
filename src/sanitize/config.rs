//! Build sanitizers from their registered name and JSON options

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::{RecplayError, Result};

use super::{
    ApplyCondition, BodyKeySanitizer, BodyRegexSanitizer, GeneralRegexSanitizer, GroupRef,
    HeaderRegexSanitizer, OAuthResponseSanitizer, RemoveHeaderSanitizer,
    RemoveQueryParameterSanitizer, Sanitizer, UriRegexSanitizer,
};

/// Replacement text used when a registration omits `value`
pub const DEFAULT_REPLACEMENT: &str = "Sanitized";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ConditionOptions {
    pub uri_regex: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GroupOption {
    Index(usize),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct HeaderOptions {
    key: String,
    value: Option<String>,
    regex: Option<String>,
    group_for_replace: Option<GroupOption>,
    condition: Option<ConditionOptions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RegexOptions {
    value: Option<String>,
    regex: String,
    group_for_replace: Option<GroupOption>,
    condition: Option<ConditionOptions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BodyKeyOptions {
    json_path: String,
    value: Option<String>,
    regex: Option<String>,
    group_for_replace: Option<GroupOption>,
    condition: Option<ConditionOptions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RemoveHeaderOptions {
    headers_for_removal: String,
    condition: Option<ConditionOptions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RemoveQueryOptions {
    parameters: String,
    condition: Option<ConditionOptions>,
}

fn parse_options<T: DeserializeOwned>(name: &str, options: &Value) -> Result<T> {
    let options = if options.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        options.clone()
    };
    serde_json::from_value(options).map_err(|e| RecplayError::sanitizer_config(name, e.to_string()))
}

pub(crate) fn condition(name: &str, options: Option<ConditionOptions>) -> Result<Option<ApplyCondition>> {
    options
        .map(|options| ApplyCondition::new(name, &options.uri_regex))
        .transpose()
}

fn group(options: Option<GroupOption>) -> Option<GroupRef> {
    options.map(|group| match group {
        GroupOption::Index(index) => GroupRef::Index(index),
        GroupOption::Text(text) => GroupRef::parse(&text),
    })
}

fn value(value: Option<String>) -> String {
    value.unwrap_or_else(|| DEFAULT_REPLACEMENT.to_string())
}

/// Build a sanitizer from its registered name and JSON options.
///
/// Names are the type names (`HeaderRegexSanitizer`, `BodyKeySanitizer`, ...).
///
/// # Errors
///
/// Returns `MalformedSanitizerConfig` for an unknown name, a missing or
/// mistyped field, an invalid regex or JSONPath, or a bad capture group.
pub fn sanitizer_from_config(name: &str, options: &Value) -> Result<Arc<dyn Sanitizer>> {
    let sanitizer: Arc<dyn Sanitizer> = match name {
        "HeaderRegexSanitizer" => {
            let o: HeaderOptions = parse_options(name, options)?;
            Arc::new(HeaderRegexSanitizer::new(
                o.key,
                value(o.value),
                o.regex.as_deref(),
                group(o.group_for_replace),
                condition(name, o.condition)?,
            )?)
        }
        "UriRegexSanitizer" => {
            let o: RegexOptions = parse_options(name, options)?;
            Arc::new(UriRegexSanitizer::new(
                value(o.value),
                &o.regex,
                group(o.group_for_replace),
                condition(name, o.condition)?,
            )?)
        }
        "BodyRegexSanitizer" => {
            let o: RegexOptions = parse_options(name, options)?;
            Arc::new(BodyRegexSanitizer::new(
                value(o.value),
                &o.regex,
                group(o.group_for_replace),
                condition(name, o.condition)?,
            )?)
        }
        "GeneralRegexSanitizer" => {
            let o: RegexOptions = parse_options(name, options)?;
            Arc::new(GeneralRegexSanitizer::new(
                value(o.value),
                &o.regex,
                group(o.group_for_replace),
                condition(name, o.condition)?,
            )?)
        }
        "BodyKeySanitizer" => {
            let o: BodyKeyOptions = parse_options(name, options)?;
            Arc::new(BodyKeySanitizer::new(
                &o.json_path,
                value(o.value),
                o.regex.as_deref(),
                group(o.group_for_replace),
                condition(name, o.condition)?,
            )?)
        }
        "RemoveHeaderSanitizer" => {
            let o: RemoveHeaderOptions = parse_options(name, options)?;
            Arc::new(RemoveHeaderSanitizer::from_csv(
                &o.headers_for_removal,
                condition(name, o.condition)?,
            ))
        }
        "RemoveQueryParameterSanitizer" => {
            let o: RemoveQueryOptions = parse_options(name, options)?;
            let parameters = o
                .parameters
                .split(',')
                .map(str::trim)
                .filter(|parameter| !parameter.is_empty())
                .map(ToString::to_string)
                .collect();
            Arc::new(RemoveQueryParameterSanitizer::new(
                parameters,
                condition(name, o.condition)?,
            ))
        }
        "OAuthResponseSanitizer" => Arc::new(OAuthResponseSanitizer::new()?),
        other => {
            return Err(RecplayError::sanitizer_config(other, "unknown sanitizer"));
        }
    };
    Ok(sanitizer)
}
