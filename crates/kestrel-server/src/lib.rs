//! # Kestrel Server
//!
//! Request dispatch and the HTTP server for the Kestrel framework.
//!
//! - [`Router`]: route registration, before-request hooks, mounts,
//!   lifecycle events and the per-request dispatch state machine
//! - [`Endpoint`]: function handlers, class-style [`Resource`]s and
//!   WebSocket handlers, sync or async
//! - [`KestrelService`] and [`Server`]: hyper integration with WebSocket
//!   upgrades and graceful shutdown
//! - [`GraphQlView`]: a single-endpoint GraphQL resource
//!
//! ## Example
//!
//! ```rust
//! use kestrel_server::{Endpoint, Router};
//!
//! let router = Router::new();
//! router
//!     .route("/hello/{who}", Endpoint::blocking(|req, resp| {
//!         resp.text(format!("hello, {}", req.params().get_str("who").unwrap_or("you")));
//!         Ok(())
//!     }))
//!     .unwrap();
//!
//! assert_eq!(router.url_for("/hello/{who}", [("who", "ada")]).unwrap(), "/hello/ada");
//! ```

#![doc(html_root_url = "https://docs.rs/kestrel-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod connection;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod graphql;
pub mod lifecycle;
pub mod mount;
pub mod router;
pub mod server;
pub mod service;
pub mod shutdown;
pub mod templates;

pub use connection::{Application, Connection};
pub use dispatch::{Dispatch, APPLICATION_ERROR_BODY, METHOD_NOT_ALLOWED_BODY, NOT_FOUND_BODY};
pub use endpoint::{Callable, Endpoint, Resource, ResourceDispatch, WsCallable, WsHook};
pub use error::{DispatchError, LifecycleError, ServerError, Stage};
pub use graphql::{GraphQlRequest, GraphQlSchema, GraphQlView};
pub use lifecycle::{Event, Lifecycle, LifecycleHook};
pub use mount::{Mount, MountTable};
pub use router::{ErrorReporter, RouteOptions, Router, RouterBuilder};
pub use server::{Server, ServerConfig};
pub use service::KestrelService;
pub use shutdown::{ConnectionTracker, ShutdownSignal};
pub use templates::{SubstitutionRenderer, TemplateError, TemplateRenderer};
