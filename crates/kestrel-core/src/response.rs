//! The mutable response accumulator.
//!
//! Hooks and handlers mutate a [`Response`]; the dispatcher finalizes it
//! exactly once with [`Response::into_http`]. The body is chosen as:
//!
//! 1. the stream, if one was set
//! 2. explicit content, if set (`text`, `html`, `set_content`)
//! 3. media, encoded by the negotiated format (JSON fallback)

use std::fmt;

use bytes::Bytes;
use futures_util::Stream;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::body::{self, BoxError, ResponseBody};
use crate::cookies::SetCookie;
use crate::error::{FinalizeError, FormatError};
use crate::request::Request;
use crate::session::Session;

/// An outgoing response under construction.
pub struct Response {
    status: Option<StatusCode>,
    content: Option<Bytes>,
    media: Option<Value>,
    mimetype: Option<String>,
    headers: HeaderMap,
    cookies: IndexMap<String, SetCookie>,
    session: Session,
    stream: Option<ResponseBody>,
}

impl Response {
    /// An empty response with no status.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: None,
            content: None,
            media: None,
            mimetype: None,
            headers: HeaderMap::new(),
            cookies: IndexMap::new(),
            session: Session::new(),
            stream: None,
        }
    }

    /// An empty response carrying the request's session forward.
    #[must_use]
    pub fn for_request(request: &Request) -> Self {
        let mut response = Self::new();
        response.session = request.session().clone();
        response
    }

    /// Status set so far, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Sets the status code.
    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = Some(status);
        self
    }

    /// Sets a text body with `text/plain`.
    pub fn text(&mut self, text: impl Into<String>) -> &mut Self {
        self.content = Some(Bytes::from(text.into()));
        self.mimetype = Some("text/plain".to_string());
        self
    }

    /// Sets an HTML body with `text/html`.
    pub fn html(&mut self, html: impl Into<String>) -> &mut Self {
        self.content = Some(Bytes::from(html.into()));
        self.mimetype = Some("text/html".to_string());
        self
    }

    /// Sets raw body bytes. The mimetype is left as is.
    pub fn set_content(&mut self, content: impl Into<Bytes>) -> &mut Self {
        self.content = Some(content.into());
        self
    }

    /// Explicit body bytes, if set.
    #[must_use]
    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    /// Sets structured media, encoded at finalization.
    pub fn set_media(&mut self, media: impl Serialize) -> Result<&mut Self, FormatError> {
        let value = serde_json::to_value(media).map_err(|e| FormatError::encode("json", e))?;
        self.media = Some(value);
        Ok(self)
    }

    /// Media set so far.
    #[must_use]
    pub fn media(&self) -> Option<&Value> {
        self.media.as_ref()
    }

    /// Overrides the `Content-Type` used for explicit content.
    pub fn set_mimetype(&mut self, mimetype: impl Into<String>) -> &mut Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    /// The mimetype override, if set.
    #[must_use]
    pub fn mimetype(&self) -> Option<&str> {
        self.mimetype.as_deref()
    }

    /// Headers set by hooks and handlers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Sets a header from text, replacing earlier values.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<&mut Self, FinalizeError> {
        let invalid = |reason: String| FinalizeError::InvalidHeader {
            name: name.to_string(),
            reason,
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Adds a cookie. A later cookie with the same name replaces it.
    pub fn set_cookie(&mut self, cookie: SetCookie) -> &mut Self {
        self.cookies.insert(cookie.name().to_string(), cookie);
        self
    }

    /// Cookies queued for `Set-Cookie`.
    pub fn cookies(&self) -> impl Iterator<Item = &SetCookie> {
        self.cookies.values()
    }

    /// The session to be written back.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable access to the session.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Streams the body from `chunks`. Takes precedence over content and media.
    pub fn stream<S, E>(&mut self, chunks: S) -> &mut Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.stream = Some(body::stream(chunks));
        self
    }

    /// True if a stream was set.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Permanent redirect (301) to `location`.
    pub fn redirect(&mut self, location: &str) -> Result<&mut Self, FinalizeError> {
        self.redirect_with_status(location, StatusCode::MOVED_PERMANENTLY)
    }

    /// Redirect to `location` with the given status.
    pub fn redirect_with_status(
        &mut self,
        location: &str,
        status: StatusCode,
    ) -> Result<&mut Self, FinalizeError> {
        self.set_header(header::LOCATION.as_str(), location)?;
        self.set_status(status);
        self.text(format!("Redirecting to: {location}"));
        Ok(self)
    }

    /// Finalizes into an HTTP response.
    ///
    /// The status defaults to 200. Headers set on the response override the
    /// negotiated `Content-Type`. Queued cookies become `Set-Cookie` headers.
    pub fn into_http(self, request: &Request) -> Result<http::Response<ResponseBody>, FinalizeError> {
        let mut headers = HeaderMap::new();
        let content_type = self.mimetype.as_deref().map(with_charset);

        let body = if let Some(stream) = self.stream {
            if let Some(ct) = content_type {
                headers.insert(header::CONTENT_TYPE, header_value(header::CONTENT_TYPE.as_str(), &ct)?);
            }
            stream
        } else if let Some(content) = self.content {
            if let Some(ct) = content_type {
                headers.insert(header::CONTENT_TYPE, header_value(header::CONTENT_TYPE.as_str(), &ct)?);
            }
            body::full(content)
        } else {
            let format = request
                .formats()
                .negotiate(request.header(header::ACCEPT.as_str()))?;
            let encoded = format.encode(self.media.as_ref().unwrap_or(&Value::Null))?;
            headers.insert(
                header::CONTENT_TYPE,
                header_value(header::CONTENT_TYPE.as_str(), &encoded.content_type)?,
            );
            body::full(encoded.body)
        };

        headers.extend(self.headers);
        for cookie in self.cookies.values() {
            headers.append(
                header::SET_COOKIE,
                header_value(header::SET_COOKIE.as_str(), &cookie.to_header_value())?,
            );
        }

        let mut response = http::Response::new(body);
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn with_charset(mimetype: &str) -> String {
    if mimetype.starts_with("text/") && !mimetype.contains("charset") {
        format!("{mimetype}; charset=utf-8")
    } else {
        mimetype.to_string()
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, FinalizeError> {
    HeaderValue::from_str(value).map_err(|e| FinalizeError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("mimetype", &self.mimetype)
            .field("has_content", &self.content.is_some())
            .field("has_media", &self.media.is_some())
            .field("streaming", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyReader;
    use futures_util::stream;
    use http_body_util::BodyExt;
    use serde_json::json;

    fn request_accepting(accept: Option<&str>) -> Request {
        let mut builder = http::Request::get("/");
        if let Some(accept) = accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        Request::new(parts, BodyReader::empty())
    }

    async fn finalize(response: Response, accept: Option<&str>) -> (http::response::Parts, Bytes) {
        let http = response.into_http(&request_accepting(accept)).unwrap();
        let (parts, body) = http.into_parts();
        (parts, body.collect().await.unwrap().to_bytes())
    }

    #[tokio::test]
    async fn test_status_defaults_to_200() {
        let (parts, _) = finalize(Response::new(), None).await;
        assert_eq!(parts.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_text_body() {
        let mut response = Response::new();
        response.text("hello, world!");
        let (parts, body) = finalize(response, None).await;
        assert_eq!(body, Bytes::from("hello, world!"));
        assert_eq!(parts.headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn test_content_wins_over_media() {
        let mut response = Response::new();
        response.set_media(json!({"ignored": true})).unwrap();
        response.html("<p>hi</p>");
        let (parts, body) = finalize(response, Some("application/json")).await;
        assert_eq!(body, Bytes::from("<p>hi</p>"));
        assert!(parts.headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
    }

    #[tokio::test]
    async fn test_stream_wins_over_content() {
        let mut response = Response::new();
        response.text("ignored");
        response.stream(stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from("a")),
            Ok(Bytes::from("b")),
        ]));
        let (_, body) = finalize(response, None).await;
        assert_eq!(body, Bytes::from("ab"));
    }

    #[tokio::test]
    async fn test_media_negotiates_yaml() {
        let mut response = Response::new();
        response.set_media(json!({"life": 42})).unwrap();
        let (parts, body) = finalize(response, Some("application/x-yaml")).await;
        assert_eq!(parts.headers[header::CONTENT_TYPE], "application/x-yaml");
        let value: Value = serde_yaml::from_slice(&body).unwrap();
        assert_eq!(value, json!({"life": 42}));
    }

    #[tokio::test]
    async fn test_media_defaults_to_json() {
        for accept in [None, Some("application/json"), Some("*/*")] {
            let mut response = Response::new();
            response.set_media(json!({"life": 42})).unwrap();
            let (parts, body) = finalize(response, accept).await;
            assert_eq!(parts.headers[header::CONTENT_TYPE], "application/json");
            let value: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(value, json!({"life": 42}));
        }
    }

    #[tokio::test]
    async fn test_explicit_headers_override_negotiated() {
        let mut response = Response::new();
        response.set_media(json!([])).unwrap();
        response.set_header("Content-Type", "application/vnd.custom+json").unwrap();
        response.set_header("X-Hook", "ran").unwrap();
        let (parts, _) = finalize(response, None).await;
        assert_eq!(parts.headers[header::CONTENT_TYPE], "application/vnd.custom+json");
        assert_eq!(parts.headers["x-hook"], "ran");
    }

    #[tokio::test]
    async fn test_cookies_become_headers() {
        let mut response = Response::new();
        response.set_cookie(SetCookie::new("a", "1"));
        response.set_cookie(SetCookie::new("b", "2"));
        response.set_cookie(SetCookie::new("a", "3"));
        let (parts, _) = finalize(response, None).await;
        let cookies: Vec<_> = parts
            .headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies, vec!["a=3; HttpOnly; Path=/", "b=2; HttpOnly; Path=/"]);
    }

    #[tokio::test]
    async fn test_redirect() {
        let mut response = Response::new();
        response.redirect("/elsewhere").unwrap();
        let (parts, body) = finalize(response, None).await;
        assert_eq!(parts.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(parts.headers[header::LOCATION], "/elsewhere");
        assert_eq!(body, Bytes::from("Redirecting to: /elsewhere"));
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut response = Response::new();
        assert!(matches!(
            response.set_header("bad header", "x"),
            Err(FinalizeError::InvalidHeader { .. })
        ));
        assert!(response.set_header("x-ok", "line\nbreak").is_err());
    }

    #[test]
    fn test_for_request_copies_session() {
        let (parts, ()) = http::Request::get("/").body(()).unwrap().into_parts();
        let mut session = Session::new();
        session.insert("k", "v");
        let request = Request::builder(parts, BodyReader::empty())
            .session(session)
            .build();
        let response = Response::for_request(&request);
        assert!(response.session().contains("k"));
    }
}
