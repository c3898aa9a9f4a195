//! Decoded request bodies.

use bytes::Bytes;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::error::FormatError;
use crate::query::QueryDict;

/// A decoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Media {
    /// A structured document (JSON or YAML).
    Value(Value),
    /// A urlencoded form.
    Form(QueryDict),
    /// A multipart form: plain fields and uploaded files by field name.
    Files(IndexMap<String, Part>),
}

impl Media {
    /// The structured value, if this is a document.
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The form fields, if this is a urlencoded form.
    #[must_use]
    pub fn as_form(&self) -> Option<&QueryDict> {
        match self {
            Self::Form(f) => Some(f),
            _ => None,
        }
    }

    /// The multipart parts, if this is a multipart form.
    #[must_use]
    pub fn as_files(&self) -> Option<&IndexMap<String, Part>> {
        match self {
            Self::Files(f) => Some(f),
            _ => None,
        }
    }

    /// A multipart part by field name.
    #[must_use]
    pub fn part(&self, name: &str) -> Option<&Part> {
        self.as_files().and_then(|parts| parts.get(name))
    }

    /// Converts the media into a JSON value.
    ///
    /// Forms become objects of last values. Plain multipart fields become
    /// strings, files become `{filename, content_type, content}` objects
    /// with the content decoded lossily as UTF-8.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Form(form) => form.to_value(),
            Self::Files(parts) => {
                let map: Map<String, Value> = parts
                    .iter()
                    .map(|(name, part)| (name.clone(), part.to_value()))
                    .collect();
                Value::Object(map)
            }
        }
    }

    /// Deserializes the media into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, FormatError> {
        serde_json::from_value(self.to_value()).map_err(|e| FormatError::Shape(e.to_string()))
    }
}

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// A plain field: its raw content.
    Field(Bytes),
    /// A part whose disposition carried a filename.
    File(UploadedFile),
}

impl Part {
    /// Raw content of either kind.
    #[must_use]
    pub fn content(&self) -> &Bytes {
        match self {
            Self::Field(bytes) => bytes,
            Self::File(file) => &file.content,
        }
    }

    /// The file, if this part is one.
    #[must_use]
    pub fn as_file(&self) -> Option<&UploadedFile> {
        match self {
            Self::File(file) => Some(file),
            Self::Field(_) => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Field(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
            Self::File(file) => json!({
                "filename": file.filename,
                "content_type": file.content_type,
                "content": String::from_utf8_lossy(&file.content),
            }),
        }
    }
}

/// An uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Filename from the content disposition.
    pub filename: String,
    /// Declared content type of the part.
    pub content_type: Option<String>,
    /// File bytes.
    pub content: Bytes,
}
