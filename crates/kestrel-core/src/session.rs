//! Signed session cookies.
//!
//! A session is a JSON object. On the way out it is serialized to JSON,
//! signed by a [`Signer`], and stored in a cookie. On the way in, a cookie
//! that fails verification or decoding yields an empty session.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use cookie::{Cookie, CookieJar, Key};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::cookies::{Cookies, SetCookie};
use crate::error::SignatureError;

/// Default session cookie name.
pub const DEFAULT_SESSION_COOKIE: &str = "Kestrel-Session";

/// Minimum secret length accepted by [`CookieSigner::from_secret`].
pub const MIN_SECRET_LEN: usize = 32;

/// Session payload carried between requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session(Map<String, Value>);

impl Session {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Deserializes a value by key.
    ///
    /// Returns `None` when the key is missing or has the wrong shape.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Stores a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Removes a value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Removes every value.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// True if the key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The underlying JSON object.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Session {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Signs and verifies opaque tokens.
pub trait Signer: Send + Sync + 'static {
    /// Produces a cookie-safe token carrying `value`.
    fn sign(&self, value: &[u8]) -> String;

    /// Verifies a token and returns the carried bytes.
    fn unsign(&self, token: &str) -> Result<Vec<u8>, SignatureError>;
}

/// HMAC-SHA256 signer backed by the `cookie` crate's signed jar.
#[derive(Clone)]
pub struct CookieSigner {
    key: Key,
}

/// Cookie name the signature is bound to. Never sent to clients.
const SIGNING_NAME: &str = "kestrel";

impl CookieSigner {
    /// Derives a signing key from a secret of at least [`MIN_SECRET_LEN`] bytes.
    pub fn from_secret(secret: &[u8]) -> Result<Self, SignatureError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(SignatureError::WeakKey {
                min: MIN_SECRET_LEN,
                actual: secret.len(),
            });
        }
        Ok(Self {
            key: Key::derive_from(secret),
        })
    }

    /// Uses a freshly generated random key.
    ///
    /// Sessions signed with it do not survive a restart.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            key: Key::generate(),
        }
    }
}

impl fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

impl Signer for CookieSigner {
    fn sign(&self, value: &[u8]) -> String {
        let mut jar = CookieJar::new();
        jar.signed_mut(&self.key)
            .add(Cookie::new(SIGNING_NAME, URL_SAFE_NO_PAD.encode(value)));
        jar.get(SIGNING_NAME)
            .map(|c| c.value().to_string())
            .unwrap_or_default()
    }

    fn unsign(&self, token: &str) -> Result<Vec<u8>, SignatureError> {
        let mut jar = CookieJar::new();
        jar.add_original(Cookie::new(SIGNING_NAME, token.to_string()));
        let verified = jar
            .signed(&self.key)
            .get(SIGNING_NAME)
            .ok_or(SignatureError::Mismatch)?;
        URL_SAFE_NO_PAD
            .decode(verified.value())
            .map_err(|e| SignatureError::Malformed(e.to_string()))
    }
}

/// Moves sessions in and out of the session cookie.
#[derive(Clone)]
pub struct SessionCodec {
    signer: Arc<dyn Signer>,
    cookie_name: String,
}

impl SessionCodec {
    /// Creates a codec writing to `cookie_name`.
    pub fn new(signer: Arc<dyn Signer>, cookie_name: impl Into<String>) -> Self {
        Self {
            signer,
            cookie_name: cookie_name.into(),
        }
    }

    /// The cookie name.
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Loads the session from request cookies.
    ///
    /// A missing, forged, or undecodable cookie yields an empty session.
    #[must_use]
    pub fn load(&self, cookies: &Cookies) -> Session {
        let Some(token) = cookies.get(&self.cookie_name) else {
            return Session::new();
        };
        let payload = match self.signer.unsign(token) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(cookie = %self.cookie_name, error = %e, "ignoring session cookie");
                return Session::new();
            }
        };
        match serde_json::from_slice::<Map<String, Value>>(&payload) {
            Ok(map) => Session(map),
            Err(e) => {
                debug!(cookie = %self.cookie_name, error = %e, "session payload is not a JSON object");
                Session::new()
            }
        }
    }

    /// Builds the session cookie, or `None` for an empty session.
    #[must_use]
    pub fn store(&self, session: &Session) -> Option<SetCookie> {
        if session.is_empty() {
            return None;
        }
        match serde_json::to_vec(session) {
            Ok(json) => Some(SetCookie::new(&self.cookie_name, self.signer.sign(&json))),
            Err(e) => {
                warn!(error = %e, "failed to serialize session");
                None
            }
        }
    }
}

impl fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCodec")
            .field("cookie_name", &self.cookie_name)
            .finish_non_exhaustive()
    }
}

impl Default for SessionCodec {
    fn default() -> Self {
        Self::new(Arc::new(CookieSigner::generate()), DEFAULT_SESSION_COOKIE)
    }
}
