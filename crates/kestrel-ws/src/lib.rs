//! # Kestrel WebSockets
//!
//! WebSocket connections for the Kestrel framework.
//!
//! Handlers receive a [`WebSocket`] carrying the handshake's path, query,
//! headers and matched route parameters. The connection talks to the wire
//! through a [`WsTransport`]:
//!
//! - [`StreamTransport`] runs the RFC 6455 framing over an upgraded HTTP
//!   connection, after [`upgrade::switching_protocols`] answered the handshake.
//! - [`memory::channel`] links a socket to an in-process [`MemoryClient`],
//!   which is what the test client uses.
//!
//! ```rust
//! use kestrel_ws::{memory, CloseCode, WebSocket};
//!
//! # async fn demo() -> kestrel_ws::WsResult<()> {
//! let (transport, mut client) = memory::channel();
//! let mut ws = WebSocket::new(&"/echo".parse().unwrap(), Default::default(), transport);
//!
//! ws.accept().await?;
//! client.send_text("hello")?;
//! let text = ws.receive_text().await?;
//! ws.send_text(text).await?;
//! ws.close(CloseCode::Normal).await?;
//!
//! assert_eq!(client.receive_text().await?, "hello");
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/kestrel-ws/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod memory;
mod message;
mod socket;
mod transport;
pub mod upgrade;

pub use error::{CloseCode, WsError, WsResult};
pub use memory::{MemoryClient, MemoryTransport};
pub use message::{CloseFrame, Message};
pub use socket::{SocketState, WebSocket};
pub use transport::{StreamTransport, WsTransport};
