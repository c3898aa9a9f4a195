use std::io;

use async_trait::async_trait;
use indexmap::IndexMap;

use super::{Format, Media, Part, UploadedFile};
use crate::error::FormatError;
use crate::request::Request;

/// `multipart/form-data` bodies.
///
/// A part whose content disposition names a filename becomes
/// [`Part::File`]; every other part becomes [`Part::Field`] with its raw
/// content. A repeated field name keeps the last part.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesFormat;

#[async_trait]
impl Format for FilesFormat {
    fn name(&self) -> &str {
        "files"
    }

    async fn decode(&self, request: &Request) -> Result<Media, FormatError> {
        let boundary = multer::parse_boundary(request.mimetype())
            .map_err(|_| FormatError::decode("files", "missing or invalid multipart boundary"))?;
        let body = request.content().await?;
        let stream = futures_util::stream::once(async move { Ok::<_, io::Error>(body) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        let mut parts = IndexMap::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| FormatError::decode("files", e))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let filename = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(ToString::to_string);
            let content = field
                .bytes()
                .await
                .map_err(|e| FormatError::decode("files", e))?;

            let part = match filename {
                Some(filename) => Part::File(UploadedFile {
                    filename,
                    content_type,
                    content,
                }),
                None => Part::Field(content),
            };
            parts.insert(name, part);
        }
        Ok(Media::Files(parts))
    }
}
