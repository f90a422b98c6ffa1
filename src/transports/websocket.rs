//! Nexus frames over a WebSocket, via `tokio-tungstenite`.
//!
//! Every Nexus frame is one WebSocket text message. Binary messages are not
//! part of the protocol and are skipped. When the relay closes the socket its
//! close code and reason are kept, so the connector can report them through
//! `on_close`.
//!
//! Only available with the `transport-websocket` feature (on by default).
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), nexus_client::NexusError> {
//! use nexus_client::{Transport, WebSocketTransport};
//!
//! let mut transport = WebSocketTransport::connect("ws://127.0.0.1:3000").await?;
//! transport.send(r#"{"type":"LIST"}"#.to_string()).await?;
//! while let Some(frame) = transport.recv().await {
//!     println!("server said {}", frame?);
//! }
//! println!("closed: {:?}", transport.close_info());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::error::NexusError;
use crate::protocol::CloseInfo;
use crate::transport::Transport;

/// The WebSocket stream a [`WebSocketTransport`] wraps.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Relay connection over `ws://` or `wss://`.
///
/// Use [`from_stream`](Self::from_stream) when the socket needs custom TLS,
/// proxy or header setup.
///
/// [`recv`](Transport::recv) is cancel-safe, so it can sit in a `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
    close_info: Option<CloseInfo>,
}

impl WebSocketTransport {
    /// Open a connection to a relay.
    ///
    /// # Errors
    ///
    /// [`NexusError::Io`] if the URL is invalid or the handshake fails. The
    /// I/O error kind is kept when the failure came from the socket.
    pub async fn connect(url: &str) -> Result<Self, NexusError> {
        tracing::debug!(%url, "opening relay socket");
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(handshake_error)?;
        tracing::info!(%url, "relay socket open");
        Ok(Self::from_stream(stream))
    }

    /// Like [`connect`](Self::connect), bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// [`NexusError::Timeout`] if the handshake does not finish in time.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, NexusError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| NexusError::Timeout)?
    }

    /// Wrap a stream that is already connected.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
            close_info: None,
        }
    }
}

fn handshake_error(e: WsError) -> NexusError {
    let kind = match &e {
        WsError::Io(io) => io.kind(),
        _ => std::io::ErrorKind::Other,
    };
    NexusError::Io(std::io::Error::new(kind, e))
}

fn close_info_of(frame: Option<CloseFrame>) -> CloseInfo {
    match frame {
        Some(frame) => CloseInfo::new(u16::from(frame.code), frame.reason.as_str()),
        None => CloseInfo::new(CloseInfo::NO_STATUS, ""),
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), NexusError> {
        if self.closed {
            return Err(NexusError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| NexusError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, NexusError>> {
        while let Some(next) = self.stream.next().await {
            match next {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(frame)) => {
                    let info = close_info_of(frame);
                    tracing::debug!(code = info.code, reason = %info.reason, "relay closed the socket");
                    self.close_info = Some(info);
                    return None;
                }
                Ok(Message::Binary(bytes)) => {
                    tracing::warn!(len = bytes.len(), "skipping binary message");
                }
                // Pings are answered by tungstenite.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => return Some(Err(NexusError::TransportReceive(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self, code: u16, reason: String) -> Result<(), NexusError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.clone().into(),
        };
        self.close_info = Some(CloseInfo::new(code, reason));
        self.stream
            .close(Some(frame))
            .await
            .map_err(|e| NexusError::TransportSend(e.to_string()))
    }

    fn close_info(&self) -> Option<CloseInfo> {
        self.close_info.clone()
    }
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    type ServerSocket = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Accept one connection on a local port and hand it to `relay`.
    async fn local_relay<F, Fut>(relay: F) -> String
    where
        F: FnOnce(ServerSocket) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            relay(tokio_tungstenite::accept_async(tcp).await.unwrap()).await;
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn invalid_url_is_an_io_error() {
        let err = WebSocketTransport::connect("not-a-valid-url").await.unwrap_err();
        assert!(matches!(err, NexusError::Io(_)));
    }

    #[tokio::test]
    async fn list_request_gets_a_reply() {
        let url = local_relay(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                assert_eq!(text.as_str(), r#"{"type":"LIST"}"#);
                ws.send(Message::Text(r#"{"type":"LIST","payload":["lobby"]}"#.into()))
                    .await
                    .unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.send(r#"{"type":"LIST"}"#.to_string()).await.unwrap();

        let reply = transport.recv().await.unwrap().unwrap();
        assert_eq!(reply, r#"{"type":"LIST","payload":["lobby"]}"#);
    }

    #[tokio::test]
    async fn relay_close_without_status_reports_no_status() {
        let url = local_relay(|mut ws| async move {
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert!(transport.recv().await.is_none());
        assert_eq!(
            transport.close_info(),
            Some(CloseInfo::new(CloseInfo::NO_STATUS, ""))
        );
    }

    #[tokio::test]
    async fn relay_close_code_and_reason_are_kept() {
        let url = local_relay(|mut ws| async move {
            ws.send(Message::Text(r#"{"type":"SERVER_INFO","apiVersion":"1.0.0"}"#.into()))
                .await
                .unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "server restarting".into(),
            }))
            .await
            .unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert!(transport.recv().await.unwrap().unwrap().contains("SERVER_INFO"));
        assert!(transport.recv().await.is_none());
        assert_eq!(
            transport.close_info(),
            Some(CloseInfo::new(1001, "server restarting"))
        );
    }

    #[tokio::test]
    async fn binary_messages_are_skipped() {
        let url = local_relay(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"JOINED","host":1}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(frame, r#"{"type":"JOINED","host":1}"#);
    }

    #[tokio::test]
    async fn local_close_sends_code_and_reason_to_relay() {
        let (seen_tx, seen_rx) = oneshot::channel();
        let url = local_relay(|mut ws| async move {
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Close(frame) = message {
                    let _ = seen_tx.send(close_info_of(frame));
                    break;
                }
            }
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close(4000, "leaving lobby".to_string()).await.unwrap();

        let expected = CloseInfo::new(4000, "leaving lobby");
        assert_eq!(transport.close_info(), Some(expected.clone()));
        assert_eq!(seen_rx.await.unwrap(), expected);

        let err = transport.send(r#"{"type":"LIST"}"#.to_string()).await.unwrap_err();
        assert!(matches!(err, NexusError::TransportClosed));
        // A second close is a no-op.
        transport.close(1000, "again".to_string()).await.unwrap();
        assert_eq!(transport.close_info(), Some(CloseInfo::new(4000, "leaving lobby")));
    }
}
