//! # Kestrel Test
//!
//! In-memory testing for Kestrel routers. Requests go through the full
//! dispatch state machine (mounts, before-request hooks, sessions, error
//! handling) without binding a port.
//!
//! ## Features
//!
//! - **Request builder**: headers plus JSON, YAML, form and multipart bodies
//! - **Cookie jar**: cookies set by responses are sent with later requests
//! - **WebSockets**: in-process connections through the same router
//! - **Assertions**: chainable checks on status, headers and bodies
//!
//! ## Example
//!
//! ```ignore
//! use kestrel_test::TestClient;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_user() {
//!     let client = TestClient::new(Arc::new(router));
//!
//!     let response = client
//!         .post("/users")
//!         .json(&json!({ "name": "Alice" }))
//!         .send()
//!         .await;
//!
//!     response.assert_status(StatusCode::CREATED);
//!
//!     let mut ws = client.websocket("/ws").await?;
//!     ws.send_text("hello")?;
//!     assert_eq!(ws.receive_text().await?, "hello");
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/kestrel-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;
mod websocket;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use request::{Multipart, TestRequest, TestRequestBuilder};
pub use response::TestResponse;
pub use websocket::TestWebSocket;
