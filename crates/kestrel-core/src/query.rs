//! Multi-valued query strings.

use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Parsed query parameters.
///
/// Keys may repeat. Single-value access returns the last value given for a
/// key; [`QueryDict::get_list`] returns all of them in order.
///
/// # Example
///
/// ```rust
/// use kestrel_core::QueryDict;
///
/// let query = QueryDict::parse("tag=a&tag=b&page=2");
/// assert_eq!(query.get("tag"), Some("b"));
/// assert_eq!(query.get_list("tag"), ["a", "b"]);
/// assert_eq!(query.get("page"), Some("2"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDict {
    inner: IndexMap<String, Vec<String>>,
}

impl QueryDict {
    /// Creates an empty dict.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an `application/x-www-form-urlencoded` string.
    ///
    /// Undecodable input yields an empty dict.
    #[must_use]
    pub fn parse(query: &str) -> Self {
        serde_urlencoded::from_str::<Vec<(String, String)>>(query)
            .unwrap_or_default()
            .into_iter()
            .collect()
    }

    /// Parses form-encoded bytes.
    #[must_use]
    pub fn parse_bytes(body: &[u8]) -> Self {
        serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
            .unwrap_or_default()
            .into_iter()
            .collect()
    }

    /// Appends a value for `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.entry(key.into()).or_default().push(value.into());
    }

    /// Returns the last value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner
            .get(key)
            .and_then(|values| values.last())
            .map(String::as_str)
    }

    /// Returns all values for `key`.
    #[must_use]
    pub fn get_list(&self, key: &str) -> &[String] {
        self.inner.get(key).map_or(&[][..], Vec::as_slice)
    }

    /// True if `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Iterates `(key, last value)` pairs in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner
            .iter()
            .filter_map(|(k, v)| v.last().map(|last| (k.as_str(), last.as_str())))
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True if there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// JSON object of `key -> last value`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        Value::Object(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryDict {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dict = Self::new();
        for (k, v) in iter {
            dict.append(k, v);
        }
        dict
    }
}
