//! Route templates and weighted route tables for Kestrel.
//!
//! This crate turns route templates such as `/items/{id:int}` into anchored
//! matchers with typed parameters, ranks overlapping routes by specificity,
//! and publishes the ordered table as an immutable snapshot.
//!
//! # Features
//!
//! - **Typed placeholders**: `{name}`, `{name:str}`, `{name:int}`, `{name:float}`
//! - **Fail-fast compilation**: malformed templates and unknown converters are
//!   rejected when the route is registered
//! - **Deterministic ordering**: routes are sorted by [`Weight`] and the first
//!   match wins
//! - **Reverse routing**: [`Route::url`] builds a path that always matches its
//!   own route
//! - **Lock-free reads**: [`RouteTable`] swaps in a freshly sorted snapshot on
//!   every insert
//!
//! # Example
//!
//! ```rust
//! use kestrel_router::{Protocol, Route, RouteTable};
//!
//! let table = RouteTable::new();
//! table.insert(Route::new("/{greetings}", Protocol::Http, 1).unwrap(), true).unwrap();
//! table.insert(Route::new("/{greetings}/{name}", Protocol::Http, 2).unwrap(), true).unwrap();
//!
//! let (route, params) = table.resolve(Protocol::Http, "/hello/world").unwrap();
//! assert_eq!(*route.endpoint(), 2);
//! assert_eq!(params.get_str("name"), Some("world"));
//! ```

#![doc(html_root_url = "https://docs.rs/kestrel-router/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod params;
mod pattern;
mod route;
mod table;

pub use error::{RouteConfigError, RouteResult};
pub use params::{Converter, ParamValue, Params};
pub use pattern::PathPattern;
pub use route::{Protocol, Route, Weight};
pub use table::{CowList, RouteTable};

/// Returns true if `name` is a valid placeholder or parameter name.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    pattern::is_identifier(name)
}
