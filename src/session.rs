//! Async driver that connects a [`Connector`] to a [`Transport`].
//!
//! The connector is a pure state machine; [`Session`] owns it together with the
//! transport, raises the transport signals (open, message, error, close) on the
//! connector, and performs the outbound work it releases. Frames are processed
//! one at a time, strictly in arrival order.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut connector = Connector::new(NexusConfig::new("ws://127.0.0.1:3000"));
//! connector.join_or_host("lobby")?;
//!
//! let mut session = Session::connect_with(connector).await;
//! session
//!     .run_until(|c| c.role() == RoleKind::Dead || c.joined().is_succeeded() || c.hosting().is_succeeded())
//!     .await?;
//!
//! session.run().await;
//! ```

use std::fmt;

use tracing::{debug, error, warn};

use crate::connector::{Connector, Outbound};
use crate::error::{NexusError, Result};
use crate::protocol::CloseInfo;
use crate::transport::Transport;

/// A [`Connector`] bound to a transport.
pub struct Session<T: Transport> {
    connector: Connector,
    transport: Option<T>,
}

impl<T: Transport> Session<T> {
    /// Wrap a connector that has no transport yet.
    pub fn new(connector: Connector) -> Self {
        Self {
            connector,
            transport: None,
        }
    }

    /// Hand over an opened transport. Raises the open signal and sends any
    /// work queued while connecting.
    ///
    /// # Errors
    ///
    /// Returns the transport error if flushing the queued work fails.
    pub async fn attach(&mut self, transport: T) -> Result<()> {
        if self.transport.is_some() {
            warn!("replacing an attached transport");
        }
        self.transport = Some(transport);
        self.connector.handle_open();
        self.flush().await
    }

    /// Report that the transport could not be opened.
    pub fn fail_open(&mut self, err: NexusError) {
        self.fail(err);
    }

    /// The wrapped connector.
    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    /// The wrapped connector, for issuing requests and subscribing to signals.
    pub fn connector_mut(&mut self) -> &mut Connector {
        &mut self.connector
    }

    /// Release the connector, dropping the transport.
    pub fn into_connector(self) -> Connector {
        self.connector
    }

    /// Returns `true` while a transport is attached and open.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Perform all outbound work the connector has released.
    ///
    /// # Errors
    ///
    /// Returns the transport error if a send fails. The connector has already
    /// been failed and closed when this returns an error.
    pub async fn flush(&mut self) -> Result<()> {
        for item in self.connector.drain_outbound() {
            let Some(transport) = self.transport.as_mut() else {
                debug!(?item, "no transport, dropping outbound work");
                break;
            };
            match item {
                Outbound::Frame(frame) => {
                    let json = match frame.to_text() {
                        Ok(json) => json,
                        Err(e) => {
                            error!(?frame, "dropping unencodable frame: {e}");
                            continue;
                        }
                    };
                    debug!(frame = %json, "sending frame");
                    if let Err(e) = transport.send(json).await {
                        error!("transport send error: {e}");
                        self.fail(NexusError::TransportSend(e.to_string()));
                        return Err(e);
                    }
                }
                Outbound::Close(info) => {
                    debug!(code = info.code, "closing transport");
                    if let Err(e) = transport.close(info.code, info.reason.clone()).await {
                        warn!("transport close failed: {e}");
                    }
                    self.transport = None;
                    self.connector.handle_close(info);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Process one inbound event, then flush. Returns `false` once the
    /// connection has ended.
    pub async fn step(&mut self) -> bool {
        if self.flush().await.is_err() {
            return false;
        }
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        match transport.recv().await {
            Some(Ok(text)) => self.connector.handle_message(&text),
            Some(Err(e)) => {
                error!("transport receive error: {e}");
                self.fail(e);
                return false;
            }
            None => {
                let info = transport
                    .close_info()
                    .unwrap_or_else(|| CloseInfo::new(CloseInfo::NO_STATUS, ""));
                debug!("transport closed by server");
                self.transport = None;
                self.connector.handle_close(info);
                return false;
            }
        }
        self.flush().await.is_ok() && self.transport.is_some()
    }

    /// Process inbound events until the connection ends.
    pub async fn run(&mut self) {
        while self.step().await {}
        debug!("session ended");
    }

    /// Process inbound events until `done` returns `true`.
    ///
    /// # Errors
    ///
    /// Returns [`NexusError::NotConnected`] if the connection ends first.
    pub async fn run_until(&mut self, mut done: impl FnMut(&mut Connector) -> bool) -> Result<()> {
        loop {
            if done(&mut self.connector) {
                return Ok(());
            }
            if !self.step().await {
                return if done(&mut self.connector) {
                    Ok(())
                } else {
                    Err(NexusError::NotConnected)
                };
            }
        }
    }

    /// Close the connection and wait for the transport to shut down.
    ///
    /// # Errors
    ///
    /// Returns [`NexusError::NotConnected`] if the connection already ended.
    pub async fn close(&mut self, reason: impl Into<String>, code: u16) -> Result<()> {
        self.connector.close(reason, code)?;
        self.flush().await
    }

    /// Raise error then close on the connector and drop the transport.
    fn fail(&mut self, err: NexusError) {
        let reason = err.to_string();
        self.transport = None;
        self.connector.handle_error(err);
        self.connector
            .handle_close(CloseInfo::new(CloseInfo::ABNORMAL, reason));
    }
}

#[cfg(feature = "transport-websocket")]
impl Session<crate::transports::WebSocketTransport> {
    /// Open a WebSocket to `config.server_address` for a fresh connector.
    pub async fn connect(config: crate::config::NexusConfig) -> Self {
        Self::connect_with(Connector::new(config)).await
    }

    /// Open a WebSocket to the connector's server address.
    ///
    /// Requests issued on `connector` beforehand are sent once the socket is
    /// open. A failed or timed-out open leaves the connector `Dead` with
    /// `connected` failed.
    pub async fn connect_with(connector: Connector) -> Self {
        let url = connector.config().server_address.clone();
        let timeout = connector.config().connect_timeout;
        let mut session = Self::new(connector);
        match crate::transports::WebSocketTransport::connect_with_timeout(&url, timeout).await {
            Ok(transport) => {
                if let Err(e) = session.attach(transport).await {
                    debug!("initial flush failed: {e}");
                }
            }
            Err(e) => session.fail_open(e),
        }
        session
    }
}

impl<T: Transport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("connector", &self.connector)
            .field("open", &self.transport.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::config::NexusConfig;
    use crate::role::RoleKind;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    // ── Mock transport ──────────────────────────────────────────────

    /// A mock transport that records sent frames and replays scripted responses.
    struct MockTransport {
        incoming: VecDeque<Option<Result<String>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
        fail_sends: bool,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<Result<String>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
                fail_sends: false,
            };
            (transport, sent, closed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> Result<()> {
            if self.fail_sends {
                return Err(NexusError::TransportSend("broken pipe".into()));
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                // All scripted frames delivered; hang like an idle socket.
                std::future::pending().await
            }
        }

        async fn close(&mut self, _code: u16, _reason: String) -> Result<()> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn quiet() -> Connector {
        Connector::new(NexusConfig::default().with_suppress_missed_warnings(true))
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn attach_flushes_queued_requests() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let mut connector = quiet();
        connector.host("lobby").unwrap();
        connector.get_hosts().unwrap();

        let mut session = Session::new(connector);
        session.attach(transport).await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        let first: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(first, serde_json::json!({"type": "HOST", "name": "lobby"}));
        assert_eq!(sent[1], r#"{"type":"LIST"}"#);
        assert!(session.is_open());
    }

    #[tokio::test]
    async fn step_dispatches_inbound_frames() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(
            r#"{"type":"HOSTING","id":1,"name":"lobby"}"#.to_string(),
        ))]);
        let mut connector = quiet();
        connector.host("lobby").unwrap();
        let mut session = Session::new(connector);
        session.attach(transport).await.unwrap();

        assert!(session.step().await);
        assert!(session.connector_mut().hosting().is_succeeded());
    }

    #[tokio::test]
    async fn clean_close_by_server_collapses_to_dead() {
        let (transport, _sent, _closed) = MockTransport::new(vec![None]);
        let mut session = Session::new(quiet());
        session.attach(transport).await.unwrap();

        assert!(!session.step().await);
        assert!(!session.is_open());
        assert_eq!(session.connector().role(), RoleKind::Dead);
    }

    #[tokio::test]
    async fn receive_error_fails_connection() {
        let (transport, _sent, _closed) =
            MockTransport::new(vec![Some(Err(NexusError::TransportReceive("reset".into())))]);
        let mut session = Session::new(quiet());
        session.attach(transport).await.unwrap();

        session.run().await;

        assert!(session.connector_mut().connected().is_failed());
        assert_eq!(session.connector().role(), RoleKind::Dead);
    }

    #[tokio::test]
    async fn send_error_fails_connection() {
        let (mut transport, _sent, _closed) = MockTransport::new(vec![]);
        transport.fail_sends = true;
        let mut connector = quiet();
        connector.join("roomA").unwrap();
        let mut session = Session::new(connector);

        let err = session.attach(transport).await.unwrap_err();

        assert!(matches!(err, NexusError::TransportSend(_)));
        assert!(session.connector_mut().joined().is_failed());
        assert_eq!(session.connector().role(), RoleKind::Dead);
    }

    #[tokio::test]
    async fn close_shuts_down_transport() {
        let (transport, _sent, closed) = MockTransport::new(vec![]);
        let mut session = Session::new(quiet());
        session.attach(transport).await.unwrap();

        session.close("done", 1000).await.unwrap();

        assert!(closed.load(Ordering::Relaxed));
        assert!(!session.is_open());
        assert!(matches!(
            session.close("again", 1000).await,
            Err(NexusError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn fail_open_marks_connector_dead() {
        let mut session: Session<MockTransport> = Session::new(quiet());
        session.fail_open(NexusError::ConnectionFailed("refused".into()));

        assert!(session.connector_mut().connected().is_failed());
        assert_eq!(session.connector().role(), RoleKind::Dead);
        assert!(!session.step().await);
    }

    #[tokio::test]
    async fn run_until_reports_early_disconnect() {
        let (transport, _sent, _closed) = MockTransport::new(vec![None]);
        let mut connector = quiet();
        connector.join("roomA").unwrap();
        let mut session = Session::new(connector);
        session.attach(transport).await.unwrap();

        let result = session.run_until(|c| c.joined().is_succeeded()).await;

        assert!(matches!(result, Err(NexusError::NotConnected)));
    }
}
