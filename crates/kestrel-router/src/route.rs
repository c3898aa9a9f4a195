//! Routes and their ordering weight.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{RouteConfigError, RouteResult};
use crate::params::{ParamValue, Params};
use crate::pattern::PathPattern;

/// The protocol a route answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    /// Plain HTTP request/response.
    Http,
    /// WebSocket connection.
    WebSocket,
}

impl Protocol {
    /// Short tag (`http` or `ws`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::WebSocket => "ws",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Specificity of a route template, used to order the route table.
///
/// Ordering (first sorts earliest):
///
/// 1. static templates (no placeholders)
/// 2. templates with a literal suffix after the last placeholder
/// 3. more distinct parameters
/// 4. longer literal suffix
///
/// The route table breaks remaining ties on the template text, which makes
/// the order total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Weight {
    has_params: bool,
    ends_in_literal: bool,
    param_count: usize,
    suffix_len: usize,
}

impl Weight {
    /// Computes the weight of a compiled pattern.
    #[must_use]
    pub fn of(pattern: &PathPattern) -> Self {
        let suffix = pattern.literal_suffix();
        Self {
            has_params: pattern.has_params(),
            ends_in_literal: !suffix.is_empty(),
            param_count: pattern.param_count(),
            suffix_len: suffix.len(),
        }
    }

    /// True if the template has placeholders.
    #[must_use]
    pub const fn has_params(&self) -> bool {
        self.has_params
    }

    /// True if literal text follows the last placeholder.
    #[must_use]
    pub const fn ends_in_literal(&self) -> bool {
        self.ends_in_literal
    }

    /// Number of distinct parameters.
    #[must_use]
    pub const fn param_count(&self) -> usize {
        self.param_count
    }
}

impl Ord for Weight {
    fn cmp(&self, other: &Self) -> Ordering {
        self.has_params
            .cmp(&other.has_params)
            .then_with(|| other.ends_in_literal.cmp(&self.ends_in_literal))
            .then_with(|| other.param_count.cmp(&self.param_count))
            .then_with(|| other.suffix_len.cmp(&self.suffix_len))
    }
}

impl PartialOrd for Weight {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A compiled template bound to an endpoint.
///
/// The endpoint type is left to the caller; the server crate stores its
/// handler enum here.
#[derive(Debug, Clone)]
pub struct Route<T> {
    pattern: PathPattern,
    protocol: Protocol,
    name: String,
    weight: Weight,
    endpoint: T,
}

impl<T> Route<T> {
    /// Compiles `template` and binds it to `endpoint`.
    ///
    /// The route is named after its template until [`Route::with_name`]
    /// says otherwise.
    pub fn new(template: &str, protocol: Protocol, endpoint: T) -> RouteResult<Self> {
        if !template.starts_with('/') {
            return Err(RouteConfigError::MissingLeadingSlash {
                template: template.to_string(),
            });
        }
        let pattern = PathPattern::compile(template)?;
        let weight = Weight::of(&pattern);
        Ok(Self {
            name: template.to_string(),
            pattern,
            protocol,
            weight,
            endpoint,
        })
    }

    /// Sets the name used for reverse lookups.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Matches a protocol and path.
    ///
    /// Returns the converted parameters, or `None` when either the protocol
    /// differs or the path does not match.
    #[must_use]
    pub fn matches(&self, protocol: Protocol, path: &str) -> Option<Params> {
        if protocol != self.protocol {
            return None;
        }
        self.pattern.matches(path)
    }

    /// True if `path` matches regardless of protocol.
    #[must_use]
    pub fn does_match(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }

    /// Reverse routing. See [`PathPattern::url`].
    pub fn url<I, K, V>(&self, params: I) -> RouteResult<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ParamValue>,
    {
        self.pattern.url(params)
    }

    /// The raw template.
    #[must_use]
    pub fn template(&self) -> &str {
        self.pattern.template()
    }

    /// The compiled pattern.
    #[must_use]
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// The protocol this route answers.
    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The reverse-lookup name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordering weight.
    #[must_use]
    pub const fn weight(&self) -> Weight {
        self.weight
    }

    /// The bound endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &T {
        &self.endpoint
    }

    /// Total order used by the route table.
    #[must_use]
    pub fn sort_order(&self, other: &Self) -> Ordering {
        self.weight
            .cmp(&other.weight)
            .then_with(|| self.template().cmp(other.template()))
            .then_with(|| self.protocol.cmp(&other.protocol))
    }
}
