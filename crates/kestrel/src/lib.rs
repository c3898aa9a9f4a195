//! # Kestrel
//!
//! **An async web framework with content negotiation, signed sessions,
//! WebSockets and background tasks.**
//!
//! - **Routing**: `/{name}` and `/{id:int}` style templates, static segments
//!   before parameters, reverse lookup with [`Api::url_for`]
//! - **Handlers**: async or blocking functions, class-style [`Resource`]s
//!   with per-method handlers, WebSocket handlers
//! - **Formats**: JSON, YAML, urlencoded and multipart bodies, negotiated
//!   from `Accept`
//! - **Sessions**: a signed cookie holding a JSON object
//! - **Background tasks**: a bounded pool drained on shutdown
//! - **Mounts**: whole sub-applications under a path prefix
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kestrel::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ApiError> {
//!     let api = Api::new();
//!
//!     api.route("/hello/{who}", Endpoint::handler(|req, mut resp| async move {
//!         let who = req.params().get_str("who").unwrap_or("world").to_string();
//!         resp.set_media(serde_json::json!({ "hello": who }))?;
//!         Ok(resp)
//!     }))?;
//!
//!     api.run().await
//! }
//! ```
//!
//! ## Request lifecycle
//!
//! ```text
//! Request -> Mounts -> Route match -> Before hooks -> Handler -> Finalize
//!                          |                                        |
//!                     404 / default                     session cookie, media
//!                                                       encoding, 500 on error
//! ```

#![doc(html_root_url = "https://docs.rs/kestrel/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod api;
mod error;

pub use api::{Api, ApiBuilder};
pub use error::{ApiError, ApiResult};

pub use kestrel_config as config;
pub use kestrel_core as core;
pub use kestrel_router as router;
pub use kestrel_server as server;
pub use kestrel_tasks as tasks;
pub use kestrel_telemetry as telemetry;
pub use kestrel_ws as ws;

pub use kestrel_config::{ConfigLoader, KestrelConfig};
pub use kestrel_core::{HandlerResult, Request, Response};
pub use kestrel_server::{
    Callable, Endpoint, Event, GraphQlSchema, GraphQlView, LifecycleHook, Resource, RouteOptions,
    WsHook,
};
pub use kestrel_ws::WebSocket;

/// Prelude module for convenient imports.
///
/// ```rust
/// use kestrel::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Api, ApiError, ApiResult};

    pub use kestrel_core::{HandlerResult, Media, Request, Response, Session};

    pub use kestrel_router::{ParamValue, Params};

    pub use kestrel_server::{
        Application, Callable, DispatchError, Endpoint, Event, GraphQlRequest, GraphQlSchema,
        GraphQlView, LifecycleHook, Resource, RouteOptions, ShutdownSignal, WsHook,
    };

    pub use kestrel_tasks::{BackgroundQueue, TaskHandle};

    pub use kestrel_ws::{CloseCode, Message, WebSocket, WsError};
}
