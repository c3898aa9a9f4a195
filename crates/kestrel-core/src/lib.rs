//! Core request/response types for the Kestrel framework.
//!
//! This crate holds everything a handler touches directly:
//!
//! | Type                 | Purpose                                             |
//! |----------------------|-----------------------------------------------------|
//! | [`Request`]          | Parsed head, read-once body, lazily decoded media   |
//! | [`Response`]         | Mutable accumulator finalized by the dispatcher     |
//! | [`QueryDict`]        | Multi-valued query strings                          |
//! | [`Cookies`]          | Request cookies                                     |
//! | [`SetCookie`]        | Outgoing cookies                                    |
//! | [`Session`]          | Session payload carried in a signed cookie          |
//! | [`FormatRegistry`]   | Named body formats and content negotiation          |
//!
//! # Example
//!
//! ```rust
//! use kestrel_core::{BodyReader, Request, Response};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let (parts, ()) = http::Request::get("/").header("accept", "application/x-yaml")
//!     .body(())?
//!     .into_parts();
//! let request = Request::new(parts, BodyReader::empty());
//!
//! let mut response = Response::for_request(&request);
//! response.set_media(json!({"life": 42}))?;
//!
//! let http = response.into_http(&request)?;
//! assert_eq!(http.headers()["content-type"], "application/x-yaml");
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/kestrel-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod body;
pub mod cookies;
pub mod error;
pub mod formats;
pub mod query;
pub mod request;
pub mod response;
pub mod session;

pub use body::{BodyReader, BodySource, BoxError, BoxFuture, ResponseBody};
pub use cookies::{Cookies, SameSite, SetCookie};
pub use error::{BodyError, FinalizeError, FormatError, SignatureError};
pub use formats::{Encoded, Format, FormatRegistry, Media, Part, UploadedFile};
pub use query::QueryDict;
pub use request::{Request, RequestBuilder, RootPath};
pub use response::Response;
pub use session::{CookieSigner, Session, SessionCodec, Signer, DEFAULT_SESSION_COOKIE};

/// Result type returned by handlers and hooks.
///
/// Any error can be propagated with `?`; the dispatcher turns it into a
/// 500 response and keeps the original for reporting.
pub type HandlerResult<T = ()> = anyhow::Result<T>;
