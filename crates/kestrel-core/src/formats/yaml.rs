use async_trait::async_trait;
use serde_json::Value;

use super::{Encoded, Format, Media};
use crate::error::FormatError;
use crate::request::Request;

/// `application/x-yaml` bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlFormat;

#[async_trait]
impl Format for YamlFormat {
    fn name(&self) -> &str {
        "yaml"
    }

    fn can_encode(&self) -> bool {
        true
    }

    async fn decode(&self, request: &Request) -> Result<Media, FormatError> {
        let body = request.content().await?;
        serde_yaml::from_slice::<Value>(&body)
            .map(Media::Value)
            .map_err(|e| FormatError::decode("yaml", e))
    }

    fn encode(&self, media: &Value) -> Result<Encoded, FormatError> {
        let body = serde_yaml::to_string(media).map_err(|e| FormatError::encode("yaml", e))?;
        Ok(Encoded::new(body, "application/x-yaml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_decode() {
        let request = Request::test_with_body("application/x-yaml", "life: 42\nname: deep thought\n");
        let media = YamlFormat.decode(&request).await.unwrap();
        assert_eq!(media, Media::Value(json!({"life": 42, "name": "deep thought"})));
    }

    #[test]
    fn test_encode_roundtrip() {
        let encoded = YamlFormat.encode(&json!({"life": 42})).unwrap();
        assert_eq!(encoded.content_type, "application/x-yaml");
        let back: Value = serde_yaml::from_slice(&encoded.body).unwrap();
        assert_eq!(back, json!({"life": 42}));
    }
}
