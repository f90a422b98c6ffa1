//! Transport abstraction for the Nexus relay protocol.
//!
//! The [`Transport`] trait defines a bidirectional text message channel between
//! the connector and the relay server. Frames are JSON text messages, so every
//! transport implementation must handle message framing internally.
//!
//! # Connection Setup
//!
//! Connection setup is not part of this trait. Open the transport externally
//! and hand it to [`Session::attach`](crate::Session::attach), which raises the
//! connector's open signal. Report a failed open with
//! [`Session::fail_open`](crate::Session::fail_open).
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use nexus_client::error::NexusError;
//! use nexus_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), NexusError> {
//!         // Send the JSON text frame
//!         unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, NexusError>> {
//!         // Receive the next JSON text frame; None once the connection closed
//!         unimplemented!()
//!     }
//!
//!     async fn close(&mut self, code: u16, reason: String) -> Result<(), NexusError> {
//!         // Gracefully shut down the connection
//!         unimplemented!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::NexusError;
use crate::protocol::CloseInfo;

/// A bidirectional text message transport for the Nexus relay protocol.
///
/// Each call to [`send`](Transport::send) transmits one complete frame and each
/// call to [`recv`](Transport::recv) returns one complete frame.
///
/// # Object Safety
///
/// This trait is object-safe, so `Box<dyn Transport>` works for dynamic dispatch.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`NexusError::TransportSend`] if the frame could not be sent, or
    /// [`NexusError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, message: String) -> Result<(), NexusError>;

    /// Receive the next JSON text frame from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed; see [`close_info`](Transport::close_info)
    async fn recv(&mut self) -> Option<Result<String, NexusError>>;

    /// Close the connection with the given status code and reason.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self, code: u16, reason: String) -> Result<(), NexusError>;

    /// Code and reason of the close, once [`recv`](Transport::recv) returned `None`.
    ///
    /// Transports without close metadata keep the default, which reports no status.
    fn close_info(&self) -> Option<CloseInfo> {
        None
    }
}
