//! Session variables: case-insensitive string map

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Variables recorded with a session (e.g. randomized resource names).
///
/// Keys compare case-insensitively and keep the case they were inserted
/// with. Iteration is sorted by the case-folded key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    map: BTreeMap<String, (String, String)>,
}

impl Variables {
    /// Create an empty variables map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a variable
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.map
            .insert(key.to_lowercase(), (key, value.into()));
    }

    /// Look up a variable
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map
            .get(&key.to_lowercase())
            .map(|(_, value)| value.as_str())
    }

    /// Merge another set of variables over this one
    pub fn extend(&mut self, other: Variables) {
        self.map.extend(other.map);
    }

    /// Iterate `(key, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map
            .values()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of variables
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when no variables are set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Replace `${name}` with the variable's value wherever `name` is known
    #[must_use]
    pub fn substitute<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.is_empty() || !text.contains("${") {
            return Cow::Borrowed(text);
        }
        placeholder().replace_all(text, |caps: &Captures| {
            self.get(&caps[1])
                .map_or_else(|| caps[0].to_string(), str::to_string)
        })
    }
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z0-9_.\-]+)\}").unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Variables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut variables = Self::new();
        for (key, value) in iter {
            variables.insert(key, value);
        }
        variables
    }
}

impl Serialize for Variables {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.map.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct VariablesVisitor;

impl<'de> Visitor<'de> for VariablesVisitor {
    type Value = Variables;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of variable names to string values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Variables, A::Error> {
        let mut variables = Variables::new();
        while let Some((key, value)) = access.next_entry::<String, String>()? {
            variables.insert(key, value);
        }
        Ok(variables)
    }
}

impl<'de> Deserialize<'de> for Variables {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(VariablesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_keys() {
        let mut variables = Variables::new();
        variables.insert("ResourceName", "first");
        variables.insert("RESOURCENAME", "second");

        assert_eq!(variables.len(), 1);
        assert_eq!(variables.get("resourcename"), Some("second"));
    }

    #[test]
    fn test_sorted_iteration() {
        let variables: Variables = [("b", "2"), ("A", "1"), ("c", "3")].into_iter().collect();
        let keys: Vec<_> = variables.iter().map(|(key, _)| key).collect();

        assert_eq!(keys, ["A", "b", "c"]);
    }

    #[test]
    fn test_substitute_leaves_unknown() {
        let variables: Variables = [("name", "value")].into_iter().collect();

        assert_eq!(variables.substitute("a ${name} ${other}"), "a value ${other}");
        assert!(matches!(variables.substitute("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_json_round_trip() {
        let variables: Variables = [("Key", "v1"), ("other", "v2")].into_iter().collect();
        let json = serde_json::to_string(&variables).unwrap();
        let back: Variables = serde_json::from_str(&json).unwrap();

        assert_eq!(json, r#"{"Key":"v1","other":"v2"}"#);
        assert_eq!(back, variables);
    }
}
