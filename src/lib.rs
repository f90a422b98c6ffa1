//! # Nexus Client
//!
//! Role-based client for the Nexus relay server.
//!
//! A Nexus connection starts undecided (`User`) and either registers as a
//! **host** or **joins** an existing host as a client. The relay forwards
//! messages between a host and its clients; a host can also broadcast to all
//! of them. Everything is carried as JSON text frames over a WebSocket (or any
//! other [`Transport`]).
//!
//! ## Layout
//!
//! - [`Connector`] is the sans-IO state machine: roles, request outcomes and
//!   notification signals live here.
//! - [`Session`] drives a connector over a [`Transport`] on tokio.
//! - [`DeferredSignal`] and [`DeferredOutcome`] are the callback primitives the
//!   connector exposes.
//! - [`WebSocketTransport`] (feature `transport-websocket`, on by default) is
//!   the built-in transport.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nexus_client::{NexusConfig, Session};
//!
//! # async fn run() -> Result<(), nexus_client::NexusError> {
//! let mut session = Session::connect(NexusConfig::new("ws://127.0.0.1:3000")).await;
//!
//! session
//!     .connector_mut()
//!     .join_or_host("lobby")?
//!     .then(|host_id| println!("joined {host_id}"));
//!
//! session
//!     .run_until(|c| c.joined().is_succeeded() || c.hosting().is_succeeded())
//!     .await?;
//!
//! if let Some(mut host) = session.connector_mut().as_host_mut() {
//!     host.on_message().subscribe(|(message, from)| println!("{from}: {message}"));
//! }
//!
//! session.run().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connector;
pub mod error;
pub mod outcome;
pub mod protocol;
pub mod role;
pub mod session;
pub mod signal;
pub mod transport;
pub mod transports;
pub mod version;

pub use config::NexusConfig;
pub use connector::{ClientHandle, Connector, HostHandle, LinkState, Outbound};
pub use error::NexusError;
pub use outcome::{DeferredOutcome, OutcomeState};
pub use protocol::{ClientFrame, CloseInfo, HostDescriptor, Identifier, ServerFrame};
pub use role::RoleKind;
pub use session::Session;
pub use signal::DeferredSignal;
pub use transport::Transport;

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
