//! Typed path parameters.
//!
//! Matched placeholders are converted by their declared [`Converter`] and
//! stored in [`Params`], a small-vector of `(name, value)` pairs that avoids
//! heap allocation for the usual one to four parameters.

use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;
use smallvec::SmallVec;

/// Maximum number of parameters stored inline (stack allocated).
const INLINE_PARAMS: usize = 4;

/// The type converter attached to a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Converter {
    /// One or more characters other than `/`. The default.
    #[default]
    Str,
    /// One or more ASCII digits, converted to `i64`.
    Int,
    /// Digits with an optional fractional part, converted to `f64`.
    Float,
}

impl Converter {
    /// Regex fragment matching one value of this converter.
    #[must_use]
    pub const fn pattern(self) -> &'static str {
        match self {
            Self::Str => "[^/]+",
            Self::Int => "[0-9]+",
            Self::Float => r"[0-9]+(?:\.[0-9]+)?",
        }
    }

    /// Converts a raw captured segment.
    ///
    /// Returns `None` when the text does not have the converter's shape or
    /// does not fit the target type. Callers treat `None` as "no match".
    #[must_use]
    pub fn convert(self, raw: &str) -> Option<ParamValue> {
        match self {
            Self::Str => {
                if raw.is_empty() || raw.contains('/') {
                    return None;
                }
                let decoded = percent_decode_str(raw).decode_utf8().ok()?;
                Some(ParamValue::Str(decoded.into_owned()))
            }
            Self::Int => {
                if !is_digits(raw) {
                    return None;
                }
                raw.parse().ok().map(ParamValue::Int)
            }
            Self::Float => {
                let (whole, fraction) = match raw.split_once('.') {
                    Some((whole, fraction)) => (whole, Some(fraction)),
                    None => (raw, None),
                };
                if !is_digits(whole) || fraction.is_some_and(|f| !is_digits(f)) {
                    return None;
                }
                raw.parse().ok().map(ParamValue::Float)
            }
        }
    }

    /// The tag used in templates (`str`, `int`, `float`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
        }
    }
}

impl FromStr for Converter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "str" => Ok(Self::Str),
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// A converted path parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Text value (percent-decoded).
    Str(String),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
}

impl ParamValue {
    /// Returns the text value, if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an `Int`.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a float. Integers are widened.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::Str(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Extracted path parameters from a route match.
///
/// Parameters are stored as (name, value) pairs in template order.
///
/// # Example
///
/// ```rust
/// use kestrel_router::{ParamValue, Params};
///
/// let mut params = Params::new();
/// params.push("user", "alice");
/// params.push("id", 42_i64);
///
/// assert_eq!(params.get_str("user"), Some("alice"));
/// assert_eq!(params.get_int("id"), Some(42));
/// assert_eq!(params.get("unknown"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    inner: SmallVec<[(String, ParamValue); INLINE_PARAMS]>,
}

impl Params {
    /// Creates a new empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a params set with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: SmallVec::with_capacity(capacity),
        }
    }

    /// Adds a parameter to the set.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Returns the value for a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.inner.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Returns a text parameter by name.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    /// Returns an integer parameter by name.
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_int)
    }

    /// Returns a numeric parameter by name.
    #[must_use]
    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_float)
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns an iterator over the parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a str, &'a ParamValue);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (String, ParamValue)>,
        fn(&'a (String, ParamValue)) -> (&'a str, &'a ParamValue),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
