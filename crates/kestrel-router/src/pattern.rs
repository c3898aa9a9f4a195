//! Route template compiler.
//!
//! A template is literal text interleaved with placeholders:
//!
//! ```text
//! /items/{id:int}/{slug}.json
//!        ^^^^^^^^ ^^^^^^
//!        int      str (the default converter)
//! ```
//!
//! Placeholder names follow `[A-Za-z_][A-Za-z0-9_]*`. Compilation produces an
//! anchored regex with one named capture per placeholder, so a template can
//! never match a prefix or a suffix of a longer path.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;

use crate::error::{RouteConfigError, RouteResult};
use crate::params::{Converter, ParamValue, Params};

/// Characters escaped when a text value is substituted back into a path.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param { name: String, converter: Converter },
}

/// A compiled route template.
///
/// # Example
///
/// ```rust
/// use kestrel_router::PathPattern;
///
/// let pattern = PathPattern::compile("/items/{id:int}").unwrap();
///
/// let params = pattern.matches("/items/42").unwrap();
/// assert_eq!(params.get_int("id"), Some(42));
///
/// // Conversion failure is a non-match.
/// assert!(pattern.matches("/items/abc").is_none());
/// // Matching is anchored.
/// assert!(pattern.matches("/items/42/extra").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    regex: Regex,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compiles a template.
    ///
    /// Fails on unbalanced braces, invalid placeholder names, unknown
    /// converters, and repeated parameter names.
    pub fn compile(template: &str) -> RouteResult<Self> {
        let segments = tokenize(template)?;

        let mut source = String::with_capacity(template.len() + 16);
        source.push('^');
        for segment in &segments {
            match segment {
                Segment::Literal(text) => source.push_str(&regex::escape(text)),
                Segment::Param { name, converter } => {
                    source.push_str("(?P<");
                    source.push_str(name);
                    source.push('>');
                    source.push_str(converter.pattern());
                    source.push(')');
                }
            }
        }
        source.push('$');

        let regex = Regex::new(&source)
            .map_err(|e| RouteConfigError::malformed(template, e.to_string()))?;

        Ok(Self {
            template: template.to_string(),
            regex,
            segments,
        })
    }

    /// Returns the raw template.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Matches a path and converts the captured values.
    ///
    /// Returns `None` when the path does not match or when any captured
    /// segment fails conversion.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<Params> {
        let captures = self.regex.captures(path)?;
        let mut params = Params::with_capacity(self.param_count());
        for (name, converter) in self.converters() {
            let raw = captures.name(name)?.as_str();
            params.push(name, converter.convert(raw)?);
        }
        Some(params)
    }

    /// Returns true if the path matches.
    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.matches(path).is_some()
    }

    /// Iterates `(name, converter)` pairs in template order.
    pub fn converters(&self) -> impl Iterator<Item = (&str, Converter)> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param { name, converter } => Some((name.as_str(), *converter)),
            Segment::Literal(_) => None,
        })
    }

    /// Number of distinct parameters.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.converters().count()
    }

    /// Returns true if the template has at least one placeholder.
    #[must_use]
    pub fn has_params(&self) -> bool {
        self.param_count() > 0
    }

    /// Literal text after the last placeholder, trimmed of slashes.
    ///
    /// Empty for templates without placeholders.
    #[must_use]
    pub fn literal_suffix(&self) -> &str {
        let Some(last) = self
            .segments
            .iter()
            .rposition(|s| matches!(s, Segment::Param { .. }))
        else {
            return "";
        };
        match self.segments.get(last + 1) {
            Some(Segment::Literal(text)) => text.trim_matches('/'),
            _ => "",
        }
    }

    /// Builds a path by substituting values into the template.
    ///
    /// Text values are percent-encoded. Every rendered value must be
    /// accepted by its placeholder's converter, so the result always
    /// matches this pattern. Names that the template does not use are
    /// ignored.
    pub fn url<I, K, V>(&self, params: I) -> RouteResult<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ParamValue>,
    {
        let mut supplied = Vec::new();
        for (name, value) in params {
            let name = name.as_ref();
            if !is_identifier(name) {
                return Err(RouteConfigError::InvalidParameterName {
                    name: name.to_string(),
                });
            }
            supplied.push((name.to_string(), value.into()));
        }

        let mut path = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => path.push_str(text),
                Segment::Param { name, converter } => {
                    let value = supplied
                        .iter()
                        .rev()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| RouteConfigError::MissingParameter {
                            template: self.template.clone(),
                            name: name.clone(),
                        })?;
                    let rendered = render(value);
                    if converter.convert(&rendered).is_none() {
                        return Err(RouteConfigError::InvalidParameterValue {
                            template: self.template.clone(),
                            name: name.clone(),
                            value: rendered,
                        });
                    }
                    path.push_str(&rendered);
                }
            }
        }
        Ok(path)
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.template == other.template
    }
}

impl Eq for PathPattern {}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

fn render(value: &ParamValue) -> String {
    match value {
        ParamValue::Str(s) => utf8_percent_encode(s, SEGMENT).to_string(),
        other => other.to_string(),
    }
}

/// Returns true for `[A-Za-z_][A-Za-z0-9_]*`.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn tokenize(template: &str) -> RouteResult<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut seen: Vec<&str> = Vec::new();
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        let (before, tail) = rest.split_at(pos);
        literal.push_str(before);
        if tail.starts_with('}') {
            return Err(RouteConfigError::malformed(template, "unmatched '}'"));
        }

        let close = tail
            .find('}')
            .ok_or_else(|| RouteConfigError::malformed(template, "unterminated '{'"))?;
        let body = &tail[1..close];
        if body.contains('{') {
            return Err(RouteConfigError::malformed(template, "nested '{'"));
        }

        let (name, converter) = match body.split_once(':') {
            Some((name, tag)) => {
                let converter =
                    tag.parse::<Converter>()
                        .map_err(|converter| RouteConfigError::UnknownConverter {
                            template: template.to_string(),
                            name: name.to_string(),
                            converter,
                        })?;
                (name, converter)
            }
            None => (body, Converter::Str),
        };

        if !is_identifier(name) {
            return Err(RouteConfigError::malformed(
                template,
                format!("invalid parameter name {name:?}"),
            ));
        }
        if seen.contains(&name) {
            return Err(RouteConfigError::DuplicateParameter {
                template: template.to_string(),
                name: name.to_string(),
            });
        }
        seen.push(name);

        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Param {
            name: name.to_string(),
            converter,
        });
        rest = &tail[close + 1..];
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}
