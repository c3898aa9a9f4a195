//! Template rendering interface.
//!
//! Rendering is pluggable through [`TemplateRenderer`]. The built-in
//! [`SubstitutionRenderer`] replaces `{{ key }}` placeholders from a JSON
//! object, which is all the GraphiQL page needs.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while rendering.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// No template registered under this name.
    #[error("template not found: {0}")]
    NotFound(String),

    /// A `{{` without a matching `}}`.
    #[error("unclosed placeholder at byte {0}")]
    Unclosed(usize),

    /// Renderer specific failure.
    #[error("render failed: {0}")]
    Render(String),
}

/// Renders named templates and template strings.
pub trait TemplateRenderer: Send + Sync {
    /// Render the template registered as `name`.
    ///
    /// # Errors
    ///
    /// Fails if the template is unknown or cannot be rendered.
    fn render(&self, name: &str, vars: &Value) -> Result<String, TemplateError>;

    /// Render `source` directly.
    ///
    /// # Errors
    ///
    /// Fails if `source` cannot be rendered.
    fn render_string(&self, source: &str, vars: &Value) -> Result<String, TemplateError>;
}

/// `{{ key }}` substitution over in-memory templates.
///
/// Strings are inserted verbatim, other JSON values in their JSON form and
/// unknown keys as the empty string.
///
/// ```rust
/// use kestrel_server::templates::{SubstitutionRenderer, TemplateRenderer};
/// use serde_json::json;
///
/// let renderer = SubstitutionRenderer::new();
/// renderer.register("hello", "Hello, {{ name }}!");
/// let page = renderer.render("hello", &json!({"name": "kestrel"})).unwrap();
/// assert_eq!(page, "Hello, kestrel!");
/// ```
#[derive(Debug, Default)]
pub struct SubstitutionRenderer {
    templates: RwLock<HashMap<String, String>>,
}

impl SubstitutionRenderer {
    /// Create a renderer with no named templates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source` under `name`, replacing any previous template.
    pub fn register(&self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.write().insert(name.into(), source.into());
    }
}

impl TemplateRenderer for SubstitutionRenderer {
    fn render(&self, name: &str, vars: &Value) -> Result<String, TemplateError> {
        let templates = self.templates.read();
        let source = templates
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        substitute(source, vars)
    }

    fn render_string(&self, source: &str, vars: &Value) -> Result<String, TemplateError> {
        substitute(source, vars)
    }
}

fn substitute(source: &str, vars: &Value) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or(TemplateError::Unclosed(offset + start))?;
        match vars.get(after[..end].trim()) {
            Some(Value::String(s)) => out.push_str(s),
            Some(Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }
        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    Ok(out)
}

/// The GraphiQL explorer page. Expects `endpoint`.
pub const GRAPHIQL: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>GraphiQL</title>
    <style>
        body { height: 100%; margin: 0; width: 100%; overflow: hidden; }
        #graphiql { height: 100vh; }
    </style>
    <link rel="stylesheet" href="https://unpkg.com/graphiql/graphiql.min.css" />
    <script crossorigin src="https://unpkg.com/react@18/umd/react.production.min.js"></script>
    <script crossorigin src="https://unpkg.com/react-dom@18/umd/react-dom.production.min.js"></script>
    <script crossorigin src="https://unpkg.com/graphiql/graphiql.min.js"></script>
</head>
<body>
    <div id="graphiql">Loading...</div>
    <script>
        const fetcher = GraphiQL.createFetcher({ url: "{{ endpoint }}" });
        ReactDOM.createRoot(document.getElementById("graphiql")).render(
            React.createElement(GraphiQL, { fetcher: fetcher })
        );
    </script>
</body>
</html>
"#;
