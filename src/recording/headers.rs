//! Ordered, case-preserving header multimap

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ordered header multimap.
///
/// Names keep the case they were first seen with and lookups are
/// case-insensitive. Values under one name keep their arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    /// Create an empty header map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, merging into an existing name if present
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => self.entries[index].1.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Replace all values for a name, keeping its position if it exists
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(index) => self.entries[index].1 = values,
            None => self.entries.push((name, values)),
        }
    }

    /// All values for a name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.position(name).map(|i| self.entries[i].1.as_slice())
    }

    /// First value for a name
    #[must_use]
    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Mutable access to the values for a name
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Vec<String>> {
        self.position(name).map(move |i| &mut self.entries[i].1)
    }

    /// Remove a name and return its values
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    /// Keep only the names for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|(name, _)| keep(name));
    }

    /// Check whether a name is present
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Iterate names and their values in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Iterate every value mutably
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut String> {
        self.entries
            .iter_mut()
            .flat_map(|(_, values)| values.iter_mut())
    }

    /// Number of distinct names
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no headers are present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `Content-Type` value, if any
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.get_first("content-type")
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, values) in &self.entries {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HeaderValues {
    One(String),
    Many(Vec<String>),
}

struct HeadersVisitor;

impl<'de> Visitor<'de> for HeadersVisitor {
    type Value = Headers;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of header names to a string or an array of strings")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Headers, A::Error> {
        let mut headers = Headers::new();
        while let Some((name, values)) = access.next_entry::<String, HeaderValues>()? {
            match values {
                HeaderValues::One(value) => headers.append(name, value),
                HeaderValues::Many(values) => match headers.get_mut(&name) {
                    Some(existing) => existing.extend(values),
                    None => headers.insert(name, values),
                },
            }
        }
        Ok(headers)
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(HeadersVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup_preserves_case() {
        let mut headers = Headers::new();
        headers.append("Content-Type", "application/json");

        assert_eq!(headers.get_first("content-type"), Some("application/json"));
        assert_eq!(headers.iter().next().unwrap().0, "Content-Type");
    }

    #[test]
    fn test_multi_value_order() {
        let mut headers = Headers::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("X-Other", "x");
        headers.append("set-cookie", "b=2");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("SET-COOKIE").unwrap(), ["a=1", "b=2"]);
    }

    #[test]
    fn test_json_keeps_order_and_accepts_single_strings() {
        let json = r#"{"Zeta": "1", "alpha": ["2", "3"], "Mid": []}"#;
        let headers: Headers = serde_json::from_str(json).unwrap();

        let names: Vec<_> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["Zeta", "alpha", "Mid"]);
        assert_eq!(headers.get("alpha").unwrap(), ["2", "3"]);

        let out = serde_json::to_string(&headers).unwrap();
        assert_eq!(out, r#"{"Zeta":["1"],"alpha":["2","3"],"Mid":[]}"#);
    }

    #[test]
    fn test_remove_and_retain() {
        let mut headers: Headers = [("A", "1"), ("B", "2"), ("C", "3")].into_iter().collect();

        assert_eq!(headers.remove("b"), Some(vec!["2".to_string()]));
        headers.retain(|name| name != "C");
        assert_eq!(headers.len(), 1);
        assert!(headers.contains("a"));
    }
}
