//! Test response wrapper.

use std::fmt;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use http_body_util::BodyExt;
use kestrel_core::ResponseBody;
use kestrel_server::DispatchError;
use serde::de::DeserializeOwned;

use crate::error::TestError;

/// A fully read response with assertion helpers.
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    server_error: Option<DispatchError>,
}

impl TestResponse {
    /// Read a dispatched response to the end.
    ///
    /// # Errors
    ///
    /// [`TestError::BodyRead`] if the body stream fails.
    pub async fn from_http(
        response: http::Response<ResponseBody>,
        server_error: Option<DispatchError>,
    ) -> Result<Self, TestError> {
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| TestError::BodyRead(e.to_string()))?
            .to_bytes();

        Ok(Self {
            status: parts.status,
            headers: parts.headers,
            body,
            server_error,
        })
    }

    /// A response from raw parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            server_error: None,
        }
    }

    /// Status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Status code as a number.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// All headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value.
    #[must_use]
    pub fn header(&self, name: impl AsRef<str>) -> Option<&HeaderValue> {
        self.headers.get(name.as_ref())
    }

    /// A header value as text.
    #[must_use]
    pub fn header_str(&self, name: impl AsRef<str>) -> Option<&str> {
        self.header(name).and_then(|v| v.to_str().ok())
    }

    /// The Content-Type header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header_str(header::CONTENT_TYPE.as_str())
    }

    /// Value of a cookie set by this response.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .find(|(n, _)| n.trim() == name)
            .map(|(_, value)| value.trim().to_string())
    }

    /// Raw body.
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// [`TestError::BodyRead`] for invalid UTF-8.
    pub fn text(&self) -> Result<String, TestError> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| TestError::BodyRead(format!("invalid UTF-8: {e}")))
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// [`TestError::Json`] if the body does not decode into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TestError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Decode the body as YAML.
    ///
    /// # Errors
    ///
    /// [`TestError::Yaml`] if the body does not decode into `T`.
    pub fn yaml<T: DeserializeOwned>(&self) -> Result<T, TestError> {
        Ok(serde_yaml::from_slice(&self.body)?)
    }

    /// The failure behind a 500, as the router saw it.
    #[must_use]
    pub fn server_error(&self) -> Option<&DispatchError> {
        self.server_error.as_ref()
    }

    /// Assert the status code.
    ///
    /// # Panics
    ///
    /// Panics if the status differs.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status, expected,
            "expected status {}, got {}",
            expected, self.status
        );
        self
    }

    /// Assert a header value.
    ///
    /// # Panics
    ///
    /// Panics if the header is missing or differs.
    pub fn assert_header(&self, name: impl AsRef<str>, expected: impl AsRef<str>) -> &Self {
        let name = name.as_ref();
        let expected = expected.as_ref();
        let actual = self
            .header_str(name)
            .unwrap_or_else(|| panic!("header '{name}' not found"));
        assert_eq!(
            actual, expected,
            "header '{name}': expected '{expected}', got '{actual}'"
        );
        self
    }

    /// Assert the Content-Type starts with `expected`.
    ///
    /// # Panics
    ///
    /// Panics if Content-Type is missing or differs.
    pub fn assert_content_type(&self, expected: impl AsRef<str>) -> &Self {
        let expected = expected.as_ref();
        let actual = self.content_type().unwrap_or_default();
        assert!(
            actual.starts_with(expected),
            "Content-Type: expected '{expected}', got '{actual}'"
        );
        self
    }

    /// Assert the body equals `expected`.
    ///
    /// # Panics
    ///
    /// Panics if the body differs or is not UTF-8.
    pub fn assert_body_eq(&self, expected: impl AsRef<str>) -> &Self {
        let body = self.text().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(body, expected.as_ref(), "body mismatch");
        self
    }

    /// Assert the body contains `expected`.
    ///
    /// # Panics
    ///
    /// Panics if the substring is absent or the body is not UTF-8.
    pub fn assert_body_contains(&self, expected: impl AsRef<str>) -> &Self {
        let expected = expected.as_ref();
        let body = self.text().unwrap_or_else(|e| panic!("{e}"));
        assert!(body.contains(expected), "body should contain '{expected}', got: {body}");
        self
    }

    /// Assert the JSON body equals `expected`.
    ///
    /// # Panics
    ///
    /// Panics if the body is not JSON or differs.
    pub fn assert_json_eq(&self, expected: &serde_json::Value) -> &Self {
        let actual: serde_json::Value = self.json().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(&actual, expected, "JSON body mismatch");
        self
    }
}

impl fmt::Debug for TestResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("server_error", &self.server_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::body;
    use serde_json::json;

    fn response(status: u16, content_type: &'static str, body: &str) -> TestResponse {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        TestResponse::new(
            StatusCode::from_u16(status).unwrap(),
            headers,
            Bytes::from(body.to_string()),
        )
    }

    #[test]
    fn test_json_and_assertions() {
        let response = response(200, "application/json", r#"{"hello":"world"}"#);
        response
            .assert_status(StatusCode::OK)
            .assert_content_type("application/json")
            .assert_json_eq(&json!({ "hello": "world" }))
            .assert_body_contains("world");
        assert_eq!(response.status_code(), 200);
    }

    #[test]
    fn test_yaml() {
        let response = response(200, "application/x-yaml", "hello: world\n");
        let value: serde_json::Value = response.yaml().unwrap();
        assert_eq!(value, json!({ "hello": "world" }));
        assert!(response.json::<serde_json::Value>().is_err());
    }

    #[test]
    fn test_cookie() {
        let mut response = response(200, "text/plain", "");
        response.headers.append(
            header::SET_COOKIE,
            HeaderValue::from_static("theme=dark; Path=/"),
        );
        response.headers.append(
            header::SET_COOKIE,
            HeaderValue::from_static("session=abc.def; HttpOnly"),
        );
        assert_eq!(response.cookie("theme").as_deref(), Some("dark"));
        assert_eq!(response.cookie("session").as_deref(), Some("abc.def"));
        assert_eq!(response.cookie("missing"), None);
    }

    #[test]
    #[should_panic(expected = "expected status 404")]
    fn test_assert_status_panics() {
        response(200, "text/plain", "").assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_from_http() {
        let http = http::Response::builder()
            .status(StatusCode::CREATED)
            .body(body::full("made"))
            .unwrap();
        let response = TestResponse::from_http(http, None).await.unwrap();
        response.assert_status(StatusCode::CREATED).assert_body_eq("made");
        assert!(response.server_error().is_none());
    }
}
