//! Test request building.

use bytes::{BufMut, Bytes, BytesMut};
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use kestrel_core::BodyReader;
use serde::Serialize;

use crate::error::TestError;

/// A request ready to be dispatched.
#[derive(Debug)]
pub struct TestRequest {
    /// HTTP method
    pub method: Method,
    /// Request URI
    pub uri: Uri,
    /// Request headers
    pub headers: HeaderMap,
    /// Request body
    pub body: Bytes,
}

impl TestRequest {
    /// Start a GET request.
    pub fn get(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::GET, uri)
    }

    /// Start a POST request.
    pub fn post(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::POST, uri)
    }

    /// Start a PUT request.
    pub fn put(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::PUT, uri)
    }

    /// Start a PATCH request.
    pub fn patch(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::PATCH, uri)
    }

    /// Start a DELETE request.
    pub fn delete(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::DELETE, uri)
    }

    /// Start an OPTIONS request.
    pub fn options(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::OPTIONS, uri)
    }

    /// Start a HEAD request.
    pub fn head(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::HEAD, uri)
    }

    /// Convert into the request type the router dispatches.
    ///
    /// # Errors
    ///
    /// [`TestError::RequestBuild`] if the parts do not form a valid request.
    pub fn into_http_request(self) -> Result<http::Request<BodyReader>, TestError> {
        let mut builder = http::Request::builder().method(self.method).uri(self.uri);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers);
        }
        Ok(builder.body(BodyReader::from_bytes(self.body))?)
    }
}

/// Builder for [`TestRequest`].
///
/// Invalid headers or bodies are remembered and reported by
/// [`build`](Self::build), so calls can be chained freely.
#[derive(Debug)]
#[must_use]
pub struct TestRequestBuilder {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    error: Option<TestError>,
}

impl TestRequestBuilder {
    /// A builder for `method` on `uri`.
    pub fn new(method: Method, uri: impl AsRef<str>) -> Self {
        Self {
            method,
            uri: uri.as_ref().to_string(),
            headers: HeaderMap::new(),
            body: None,
            error: None,
        }
    }

    fn fail(mut self, error: TestError) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    /// Set a header, replacing any previous value.
    ///
    /// ```ignore
    /// let request = TestRequest::get("/")
    ///     .header("Accept", "yaml")
    ///     .build()?;
    /// ```
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let name = match HeaderName::try_from(name.as_ref()) {
            Ok(name) => name,
            Err(e) => return self.fail(TestError::RequestBuild(format!("invalid header name: {e}"))),
        };
        let value = match HeaderValue::try_from(value.as_ref()) {
            Ok(value) => value,
            Err(e) => return self.fail(TestError::RequestBuild(format!("invalid header value: {e}"))),
        };
        self.headers.insert(name, value);
        self
    }

    /// Set the Content-Type header.
    pub fn content_type(self, content_type: impl AsRef<str>) -> Self {
        self.header(header::CONTENT_TYPE.as_str(), content_type)
    }

    /// Set the Accept header.
    pub fn accept(self, accept: impl AsRef<str>) -> Self {
        self.header(header::ACCEPT.as_str(), accept)
    }

    /// Set the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a plain-text body.
    pub fn text(self, text: impl Into<String>) -> Self {
        self.body(text.into()).content_type("text/plain")
    }

    /// Encode `value` as a JSON body.
    pub fn json<T: Serialize>(self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.body(bytes).content_type("application/json"),
            Err(e) => self.fail(e.into()),
        }
    }

    /// Encode `value` as a YAML body.
    pub fn yaml<T: Serialize>(self, value: &T) -> Self {
        match serde_yaml::to_string(value) {
            Ok(text) => self.body(text).content_type("application/x-yaml"),
            Err(e) => self.fail(e.into()),
        }
    }

    /// Encode `value` as an urlencoded form body.
    pub fn form<T: Serialize>(self, value: &T) -> Self {
        match serde_urlencoded::to_string(value) {
            Ok(encoded) => self
                .body(encoded)
                .content_type("application/x-www-form-urlencoded"),
            Err(e) => self.fail(TestError::RequestBuild(format!("form encoding failed: {e}"))),
        }
    }

    /// Send a `multipart/form-data` body.
    pub fn multipart(self, form: Multipart) -> Self {
        let content_type = form.content_type();
        self.body(form.encode()).content_type(content_type)
    }

    /// Finish the request.
    ///
    /// # Errors
    ///
    /// The first error recorded while building, or an invalid URI.
    pub fn build(self) -> Result<TestRequest, TestError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let uri: Uri = self
            .uri
            .parse()
            .map_err(|e| TestError::RequestBuild(format!("invalid URI: {e}")))?;

        Ok(TestRequest {
            method: self.method,
            uri,
            headers: self.headers,
            body: self.body.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone)]
struct FormPart {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

/// A `multipart/form-data` body.
///
/// ```ignore
/// let form = Multipart::new()
///     .text("title", "report")
///     .file("upload", "report.csv", "text/csv", "a,b\n1,2\n");
/// client.post("/upload").multipart(form).send().await;
/// ```
#[derive(Debug, Clone)]
pub struct Multipart {
    boundary: String,
    parts: Vec<FormPart>,
}

impl Multipart {
    /// An empty form with a fresh boundary.
    pub fn new() -> Self {
        Self {
            boundary: format!("kestrel-{}", uuid::Uuid::now_v7().simple()),
            parts: Vec::new(),
        }
    }

    /// Add a plain field.
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            filename: None,
            content_type: None,
            data: Bytes::from(value.into()),
        });
        self
    }

    /// Add a file field.
    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            data: data.into(),
        });
        self
    }

    /// Content-Type header value, boundary included.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// The encoded body.
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        for part in &self.parts {
            out.put_slice(format!("--{}\r\n", self.boundary).as_bytes());
            let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
            if let Some(filename) = &part.filename {
                disposition.push_str(&format!("; filename=\"{filename}\""));
            }
            out.put_slice(disposition.as_bytes());
            out.put_slice(b"\r\n");
            if let Some(content_type) = &part.content_type {
                out.put_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
            }
            out.put_slice(b"\r\n");
            out.put_slice(&part.data);
            out.put_slice(b"\r\n");
        }
        out.put_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        out.freeze()
    }
}

impl Default for Multipart {
    fn default() -> Self {
        Self::new()
    }
}
