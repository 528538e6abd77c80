//! Push channel abstraction.
//!
//! The server pushes JSON text notifications over a per-room connection. The
//! client never writes to it, so [`PushTransport`] is receive-only. A
//! [`Connector`] opens a fresh transport for a room; the channel supervisor
//! calls it again after every closure.
//!
//! # Implementing a custom transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use room_sync_client::error::SyncError;
//! use room_sync_client::transport::{Connector, PushTransport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl PushTransport for MyTransport {
//!     async fn recv(&mut self) -> Option<Result<String, SyncError>> {
//!         // Next notification, or None once the server closed the connection.
//!         None
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SyncError> {
//!         Ok(())
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn connect(&self, room_code: &str) -> Result<MyTransport, SyncError> {
//!         Ok(MyTransport {})
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::SyncError;

/// An inbound text message stream from the room server.
///
/// # Cancel Safety
///
/// [`recv`](PushTransport::recv) **MUST** be cancel-safe: the supervisor
/// races it against the shutdown signal inside `tokio::select!`.
#[async_trait]
pub trait PushTransport: Send + 'static {
    /// Receive the next notification.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — one complete notification
    /// - `Some(Err(e))` — the connection failed
    /// - `None` — the server closed the connection
    async fn recv(&mut self) -> Option<Result<String, SyncError>>;

    /// Close the connection. Must be idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails.
    async fn close(&mut self) -> Result<(), SyncError>;
}

/// Opens push connections for a room.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: PushTransport;

    /// Open a push connection scoped to `room_code`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Connect`] (or an I/O error) when the server
    /// cannot be reached.
    async fn connect(&self, room_code: &str) -> Result<Self::Transport, SyncError>;
}
