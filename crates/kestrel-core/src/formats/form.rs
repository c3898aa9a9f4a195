use async_trait::async_trait;

use super::{FilesFormat, Format, Media};
use crate::error::FormatError;
use crate::query::QueryDict;
use crate::request::Request;

/// HTML form bodies.
///
/// urlencoded bodies decode to [`Media::Form`]; `multipart/form-data`
/// bodies are handed to [`FilesFormat`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FormFormat;

#[async_trait]
impl Format for FormFormat {
    fn name(&self) -> &str {
        "form"
    }

    async fn decode(&self, request: &Request) -> Result<Media, FormatError> {
        if request.mimetype().starts_with("multipart/form-data") {
            return FilesFormat.decode(request).await;
        }
        let body = request.content().await?;
        Ok(Media::Form(QueryDict::parse_bytes(&body)))
    }
}
