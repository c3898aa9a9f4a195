//! Request cookies and `Set-Cookie` builders, on top of the `cookie` crate.

use std::time::{Duration, SystemTime};

use cookie::time::{self, OffsetDateTime};
use cookie::Cookie;
use http::{header, HeaderMap};
use indexmap::IndexMap;

pub use cookie::SameSite;

/// Cookies sent by the client in the `Cookie` header.
///
/// A later pair with the same name wins. Malformed pairs are skipped.
///
/// ```rust
/// use http::{header, HeaderMap, HeaderValue};
/// use kestrel_core::Cookies;
///
/// let mut headers = HeaderMap::new();
/// headers.insert(header::COOKIE, HeaderValue::from_static("flavour=oat; size=large"));
///
/// let cookies = Cookies::from_headers(&headers);
/// assert_eq!(cookies.get("flavour"), Some("oat"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookies {
    jar: IndexMap<String, String>,
}

impl Cookies {
    /// No cookies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every `Cookie` header in `headers`.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cookies = Self::new();
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .for_each(|value| cookies.absorb(value));
        cookies
    }

    /// Reads one `Cookie` header value.
    #[must_use]
    pub fn parse(header_value: &str) -> Self {
        let mut cookies = Self::new();
        cookies.absorb(header_value);
        cookies
    }

    fn absorb(&mut self, header_value: &str) {
        for pair in Cookie::split_parse_encoded(header_value).flatten() {
            self.jar
                .insert(pair.name().to_string(), pair.value_trimmed().to_string());
        }
    }

    /// Value of the cookie `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.jar.get(name).map(String::as_str)
    }

    /// True if `name` was sent.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.jar.contains_key(name)
    }

    /// `(name, value)` pairs in the order they were sent.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.jar.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jar.len()
    }

    /// True if no cookie was sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jar.is_empty()
    }
}

/// A cookie queued on a response.
///
/// New cookies default to `Path=/` and `HttpOnly`, and are not `Secure`.
/// Name and value are percent-encoded on the way out, so a value may hold
/// `;`, `=` or spaces; [`Cookies`] decodes them on the way back in.
///
/// ```rust
/// use kestrel_core::SetCookie;
///
/// let cookie = SetCookie::new("hello", "world").max_age_secs(60);
/// assert_eq!(cookie.to_header_value(), "hello=world; HttpOnly; Path=/; Max-Age=60");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SetCookie {
    inner: Cookie<'static>,
}

impl SetCookie {
    /// A cookie with the default attributes.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        let inner = Cookie::build((name.into(), value.into()))
            .path("/")
            .http_only(true)
            .build();
        Self { inner }
    }

    /// Tells the client to drop `name` (`Max-Age=0`).
    #[must_use]
    pub fn remove(name: impl Into<String>) -> Self {
        Self::new(name, "").max_age_secs(0)
    }

    /// `Domain` attribute.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.inner.set_domain(domain.into());
        self
    }

    /// `Path` attribute. An empty path drops it.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        if path.is_empty() {
            self.inner.unset_path();
        } else {
            self.inner.set_path(path);
        }
        self
    }

    /// `Max-Age` attribute.
    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        let seconds = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        self.inner.set_max_age(time::Duration::seconds(seconds));
        self
    }

    /// `Max-Age` attribute in seconds.
    #[must_use]
    pub fn max_age_secs(self, seconds: u64) -> Self {
        self.max_age(Duration::from_secs(seconds))
    }

    /// `Expires` attribute.
    #[must_use]
    pub fn expires(mut self, at: SystemTime) -> Self {
        self.inner.set_expires(OffsetDateTime::from(at));
        self
    }

    /// `Secure` attribute.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.inner.set_secure(secure);
        self
    }

    /// `HttpOnly` attribute.
    #[must_use]
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.inner.set_http_only(http_only);
        self
    }

    /// `SameSite` attribute.
    #[must_use]
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.inner.set_same_site(same_site);
        self
    }

    /// Cookie name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Cookie value.
    #[must_use]
    pub fn value(&self) -> &str {
        self.inner.value()
    }

    /// The `Set-Cookie` header value.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        self.inner.encoded().to_string()
    }
}
