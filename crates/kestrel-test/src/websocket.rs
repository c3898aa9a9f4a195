//! In-memory WebSocket sessions.

use std::ops::{Deref, DerefMut};

use kestrel_server::DispatchError;
use kestrel_ws::MemoryClient;
use tokio::task::JoinHandle;

/// The client side of a WebSocket connected to a router.
///
/// Derefs to [`MemoryClient`] for sending and receiving. The server side
/// runs on its own task; [`server_error`](Self::server_error) waits for it.
#[derive(Debug)]
pub struct TestWebSocket {
    client: MemoryClient,
    server: JoinHandle<Option<DispatchError>>,
}

impl TestWebSocket {
    pub(crate) fn new(client: MemoryClient, server: JoinHandle<Option<DispatchError>>) -> Self {
        Self { client, server }
    }

    /// Drop the client half and wait for the handler to finish.
    ///
    /// Returns what a hook or the handler failed with, if anything. A
    /// panicking server task is reported as `None`, since the router already
    /// contains handler panics.
    pub async fn server_error(self) -> Option<DispatchError> {
        drop(self.client);
        self.server.await.ok().flatten()
    }
}

impl Deref for TestWebSocket {
    type Target = MemoryClient;

    fn deref(&self) -> &MemoryClient {
        &self.client
    }
}

impl DerefMut for TestWebSocket {
    fn deref_mut(&mut self) -> &mut MemoryClient {
        &mut self.client
    }
}
