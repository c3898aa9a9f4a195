use async_trait::async_trait;
use serde_json::Value;

use super::{Encoded, Format, Media};
use crate::error::FormatError;
use crate::request::Request;

/// `application/json` bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

#[async_trait]
impl Format for JsonFormat {
    fn name(&self) -> &str {
        "json"
    }

    fn can_encode(&self) -> bool {
        true
    }

    async fn decode(&self, request: &Request) -> Result<Media, FormatError> {
        let body = request.content().await?;
        serde_json::from_slice::<Value>(&body)
            .map(Media::Value)
            .map_err(|e| FormatError::decode("json", e))
    }

    fn encode(&self, media: &Value) -> Result<Encoded, FormatError> {
        let body = serde_json::to_vec(media).map_err(|e| FormatError::encode("json", e))?;
        Ok(Encoded::new(body, "application/json"))
    }
}
