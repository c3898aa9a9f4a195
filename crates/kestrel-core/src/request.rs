//! The per-request view handed to hooks and handlers.
//!
//! A [`Request`] is cheap to clone: all clones share the same parsed head,
//! the same read-once body and the same decoded-media cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::{header, request, HeaderMap, Method, Uri, Version};
use kestrel_router::Params;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

use crate::body::BodyReader;
use crate::cookies::Cookies;
use crate::error::{BodyError, FormatError};
use crate::formats::{infer_format, FormatRegistry, Media};
use crate::query::QueryDict;
use crate::session::Session;

/// Path prefix stripped by enclosing mounts.
///
/// Stored in request extensions by the mount that forwarded the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootPath(pub String);

/// An incoming HTTP request.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Inner>,
}

struct Inner {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    root_path: String,
    params: Params,
    query: QueryDict,
    cookies: Cookies,
    session: Session,
    formats: Arc<FormatRegistry>,
    body: BodyCell,
    media: Mutex<HashMap<String, Media>>,
}

struct BodyCell {
    source: Mutex<Option<BodyReader>>,
    bytes: OnceCell<Bytes>,
}

impl Request {
    /// Starts building a request from its head and body.
    pub fn builder(parts: request::Parts, body: BodyReader) -> RequestBuilder {
        RequestBuilder {
            parts,
            body,
            params: Params::new(),
            session: Session::new(),
            formats: None,
        }
    }

    /// Builds a request with no path parameters, an empty session and the
    /// default formats.
    pub fn new(parts: request::Parts, body: BodyReader) -> Self {
        Self::builder(parts, body).build()
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    /// Request target as received.
    #[must_use]
    pub fn url(&self) -> &Uri {
        &self.inner.uri
    }

    /// HTTP version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.inner.version
    }

    /// Path of the request, relative to any mount.
    #[must_use]
    pub fn path(&self) -> &str {
        self.inner.uri.path()
    }

    /// Prefix stripped by enclosing mounts, empty at the top level.
    #[must_use]
    pub fn root_path(&self) -> &str {
        &self.inner.root_path
    }

    /// Absolute URL: `scheme://host{root_path}{path}?{query}`.
    ///
    /// The scheme comes from `X-Forwarded-Proto`, then the request target,
    /// then defaults to `http`. The host comes from the request target,
    /// then the `Host` header.
    #[must_use]
    pub fn full_url(&self) -> String {
        let uri = &self.inner.uri;
        let scheme = self.scheme();
        let host = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| self.header(header::HOST.as_str()).map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string());
        let mut url = format!("{scheme}://{host}{}{}", self.root_path(), uri.path());
        if let Some(query) = uri.query() {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    fn scheme(&self) -> &str {
        self.header("x-forwarded-proto")
            .or_else(|| self.inner.uri.scheme_str())
            .unwrap_or("http")
    }

    /// True if the request arrived over HTTPS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.scheme().eq_ignore_ascii_case("https")
    }

    /// Query parameters.
    #[must_use]
    pub fn query(&self) -> &QueryDict {
        &self.inner.query
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    /// A header as text. Non-UTF-8 values are treated as absent.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
    }

    /// Cookies sent by the client.
    #[must_use]
    pub fn cookies(&self) -> &Cookies {
        &self.inner.cookies
    }

    /// Session loaded from the session cookie.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Path parameters of the matched route.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.inner.params
    }

    /// `Content-Type` of the body, or an empty string.
    #[must_use]
    pub fn mimetype(&self) -> &str {
        self.header(header::CONTENT_TYPE.as_str()).unwrap_or("")
    }

    /// True if the `Accept` header mentions `content_type`.
    #[must_use]
    pub fn accepts(&self, content_type: &str) -> bool {
        self.header(header::ACCEPT.as_str())
            .is_some_and(|accept| accept.contains(content_type))
    }

    /// Declared charset of the body, `utf-8` when absent.
    #[must_use]
    pub fn encoding(&self) -> String {
        self.mimetype()
            .parse::<mime::Mime>()
            .ok()
            .and_then(|m| m.get_param(mime::CHARSET).map(|c| c.as_str().to_ascii_lowercase()))
            .unwrap_or_else(|| "utf-8".to_string())
    }

    /// The formats used by [`Request::media`].
    #[must_use]
    pub fn formats(&self) -> &Arc<FormatRegistry> {
        &self.inner.formats
    }

    /// Raw body bytes.
    ///
    /// The transport is read on the first call only; later calls (on any
    /// clone) return the cached bytes.
    pub async fn content(&self) -> Result<Bytes, BodyError> {
        let body = &self.inner.body;
        body.bytes
            .get_or_try_init(|| async {
                let reader = body.source.lock().take().ok_or(BodyError::Consumed)?;
                reader.read().await
            })
            .await
            .cloned()
    }

    /// Body decoded as text with the declared [`Request::encoding`].
    ///
    /// Unknown charsets fall back to UTF-8. Invalid sequences are replaced.
    pub async fn text(&self) -> Result<String, BodyError> {
        let content = self.content().await?;
        let encoding =
            encoding_rs::Encoding::for_label(self.encoding().as_bytes()).unwrap_or(encoding_rs::UTF_8);
        let (text, _, _) = encoding.decode(&content);
        Ok(text.into_owned())
    }

    /// Decoded body.
    ///
    /// Without a format name, the format is inferred from the
    /// `Content-Type`: `yaml`, then `form`, else `json`. Results are cached
    /// per format name.
    pub async fn media(&self, format: Option<&str>) -> Result<Media, FormatError> {
        let name = format.unwrap_or_else(|| infer_format(self.mimetype()));
        let cached = self.inner.media.lock().get(name).cloned();
        if let Some(media) = cached {
            return Ok(media);
        }

        let media = self.inner.formats.decode(name, self).await?;
        self.inner
            .media
            .lock()
            .insert(name.to_string(), media.clone());
        Ok(media)
    }

    /// Decoded body deserialized into `T`.
    pub async fn media_as<T: DeserializeOwned>(&self) -> Result<T, FormatError> {
        self.media(None).await?.deserialize()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.inner.method)
            .field("uri", &self.inner.uri)
            .field("params", &self.inner.params)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Request`].
#[must_use]
pub struct RequestBuilder {
    parts: request::Parts,
    body: BodyReader,
    params: Params,
    session: Session,
    formats: Option<Arc<FormatRegistry>>,
}

impl RequestBuilder {
    /// Sets the path parameters.
    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Sets the loaded session.
    pub fn session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    /// Sets the format registry.
    pub fn formats(mut self, formats: Arc<FormatRegistry>) -> Self {
        self.formats = Some(formats);
        self
    }

    /// Finishes the request.
    pub fn build(self) -> Request {
        let request::Parts {
            method,
            uri,
            version,
            headers,
            extensions,
            ..
        } = self.parts;
        let root_path = extensions
            .get::<RootPath>()
            .map(|r| r.0.clone())
            .unwrap_or_default();
        let query = uri.query().map(QueryDict::parse).unwrap_or_default();
        let cookies = Cookies::from_headers(&headers);

        Request {
            inner: Arc::new(Inner {
                method,
                uri,
                version,
                headers,
                root_path,
                params: self.params,
                query,
                cookies,
                session: self.session,
                formats: self
                    .formats
                    .unwrap_or_else(|| Arc::new(FormatRegistry::with_defaults())),
                body: BodyCell {
                    source: Mutex::new(Some(self.body)),
                    bytes: OnceCell::new(),
                },
                media: Mutex::new(HashMap::new()),
            }),
        }
    }
}

#[cfg(test)]
impl Request {
    /// A POST request with the given body, for format tests.
    pub(crate) fn test_with_body(content_type: &str, body: impl Into<Bytes>) -> Self {
        let (parts, ()) = http::Request::post("/")
            .header(header::CONTENT_TYPE, content_type)
            .body(())
            .unwrap()
            .into_parts();
        Self::new(parts, BodyReader::from_bytes(body))
    }
}
