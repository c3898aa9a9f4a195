//! Content negotiation.
//!
//! A [`FormatRegistry`] maps format names to [`Format`] implementations.
//! Request bodies are decoded by name; response media is encoded by the first
//! registered format that can encode and that the client's `Accept` header
//! asks for, falling back to JSON.
//!
//! | Name    | Decodes                                  | Encodes            |
//! |---------|------------------------------------------|--------------------|
//! | `json`  | JSON document                            | `application/json` |
//! | `yaml`  | YAML document                            | `application/x-yaml` |
//! | `form`  | urlencoded or multipart form             | no                 |
//! | `files` | multipart form with file parts           | no                 |

mod files;
mod form;
mod json;
mod media;
mod yaml;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::FormatError;
use crate::request::Request;

pub use files::FilesFormat;
pub use form::FormFormat;
pub use json::JsonFormat;
pub use media::{Media, Part, UploadedFile};
pub use yaml::YamlFormat;

/// Name of the fallback format.
pub const FALLBACK_FORMAT: &str = "json";

/// Encoded response media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    /// Body bytes.
    pub body: Bytes,
    /// Value for the `Content-Type` header.
    pub content_type: String,
}

impl Encoded {
    /// Creates an encoded body.
    pub fn new(body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: content_type.into(),
        }
    }
}

/// A named body format.
#[async_trait]
pub trait Format: Send + Sync + 'static {
    /// Registry key.
    fn name(&self) -> &str;

    /// True if the client's `Accept` header asks for this format.
    fn matches_accept(&self, accept: &str) -> bool {
        accept.contains(self.name())
    }

    /// True if [`Format::encode`] is supported.
    fn can_encode(&self) -> bool {
        false
    }

    /// Decodes the request body.
    async fn decode(&self, request: &Request) -> Result<Media, FormatError>;

    /// Encodes response media.
    fn encode(&self, _media: &Value) -> Result<Encoded, FormatError> {
        Err(FormatError::EncodeUnsupported(self.name().to_string()))
    }
}

/// Ordered table of formats.
#[derive(Clone, Default)]
pub struct FormatRegistry {
    formats: IndexMap<String, Arc<dyn Format>>,
}

impl FormatRegistry {
    /// A registry with no formats.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in formats in negotiation order: json, yaml, form, files.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(JsonFormat);
        registry.register(YamlFormat);
        registry.register(FormFormat);
        registry.register(FilesFormat);
        registry
    }

    /// Adds a format. Re-registering a name replaces it in place.
    pub fn register(&mut self, format: impl Format) -> &mut Self {
        self.formats
            .insert(format.name().to_string(), Arc::new(format));
        self
    }

    /// Looks a format up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Format>> {
        self.formats.get(name).cloned()
    }

    /// Registered names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.formats.keys().map(String::as_str)
    }

    /// Picks the response format for an `Accept` header.
    pub fn negotiate(&self, accept: Option<&str>) -> Result<Arc<dyn Format>, FormatError> {
        if let Some(accept) = accept {
            if let Some(format) = self
                .formats
                .values()
                .find(|f| f.can_encode() && f.matches_accept(accept))
            {
                return Ok(Arc::clone(format));
            }
        }
        self.get(FALLBACK_FORMAT)
            .ok_or_else(|| FormatError::UnknownFormat(FALLBACK_FORMAT.to_string()))
    }

    /// Decodes the request body with the named format.
    pub async fn decode(&self, name: &str, request: &Request) -> Result<Media, FormatError> {
        let format = self
            .get(name)
            .ok_or_else(|| FormatError::UnknownFormat(name.to_string()))?;
        format.decode(request).await
    }

    /// Encodes media with the named format.
    pub fn encode(&self, name: &str, media: &Value) -> Result<Encoded, FormatError> {
        let format = self
            .get(name)
            .ok_or_else(|| FormatError::UnknownFormat(name.to_string()))?;
        format.encode(media)
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Picks the decode format from a request `Content-Type`.
#[must_use]
pub fn infer_format(mimetype: &str) -> &'static str {
    if mimetype.contains("yaml") {
        "yaml"
    } else if mimetype.contains("form") {
        "form"
    } else {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order() {
        let registry = FormatRegistry::with_defaults();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["json", "yaml", "form", "files"]);
    }

    #[test]
    fn test_negotiate_yaml() {
        let registry = FormatRegistry::with_defaults();
        let format = registry.negotiate(Some("application/x-yaml")).unwrap();
        assert_eq!(format.name(), "yaml");
    }

    #[test]
    fn test_negotiate_falls_back_to_json() {
        let registry = FormatRegistry::with_defaults();
        assert_eq!(registry.negotiate(None).unwrap().name(), "json");
        assert_eq!(registry.negotiate(Some("text/html")).unwrap().name(), "json");
        // form matches the header text but cannot encode
        assert_eq!(
            registry.negotiate(Some("application/x-www-form-urlencoded")).unwrap().name(),
            "json"
        );
    }

    #[test]
    fn test_negotiate_without_json() {
        let registry = FormatRegistry::empty();
        assert!(matches!(
            registry.negotiate(None),
            Err(FormatError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_encode_by_name() {
        let registry = FormatRegistry::with_defaults();
        let encoded = registry.encode("json", &serde_json::json!({"a": 1})).unwrap();
        assert_eq!(encoded.content_type, "application/json");
        assert!(matches!(
            registry.encode("form", &Value::Null),
            Err(FormatError::EncodeUnsupported(_))
        ));
        assert!(matches!(
            registry.encode("xml", &Value::Null),
            Err(FormatError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_infer_format() {
        assert_eq!(infer_format("application/x-yaml"), "yaml");
        assert_eq!(infer_format("application/x-www-form-urlencoded"), "form");
        assert_eq!(infer_format("multipart/form-data; boundary=x"), "form");
        assert_eq!(infer_format("application/json"), "json");
        assert_eq!(infer_format(""), "json");
    }
}
