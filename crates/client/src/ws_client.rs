//! Transport seam between the connection manager and the bridge.
//!
//! A [`Connector`] opens one [`Link`]: a pair of text queues plus a close
//! handle. [`WsConnector`] backs it with a WebSocket; tests and embedders
//! can use [`Link::channel`] instead.

use std::future::Future;
use std::pin::Pin;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use relaychat_protocol::ProtocolError;
use relaychat_protocol::constants::MAX_MESSAGE_SIZE;

/// Capacity of each link queue.
pub const LINK_BUFFER_SIZE: usize = 256;

/// Errors from the client connection layer.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    Closed,

    #[error("outbound queue full")]
    QueueFull,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// An open connection as seen by the manager.
///
/// `inbound` yields `None` once the remote side is gone.
pub struct Link {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
    close: CancellationToken,
}

/// Remote end of an in-memory [`Link`].
pub struct LinkPeer {
    /// Frames the client sent.
    pub sent: mpsc::Receiver<String>,
    /// Pushes frames to the client. Dropping it closes the link.
    pub push: mpsc::Sender<String>,
    pub closed: CancellationToken,
}

impl Link {
    pub fn new(
        outbound: mpsc::Sender<String>,
        inbound: mpsc::Receiver<String>,
        close: CancellationToken,
    ) -> Self {
        Self {
            outbound,
            inbound,
            close,
        }
    }

    /// In-memory link and its remote end.
    pub fn channel(capacity: usize) -> (Link, LinkPeer) {
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let close = CancellationToken::new();
        let link = Link::new(out_tx, in_rx, close.clone());
        let peer = LinkPeer {
            sent: out_rx,
            push: in_tx,
            closed: close,
        };
        (link, peer)
    }

    /// Tears the link down. Idempotent.
    pub fn close(&self) {
        self.close.cancel();
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.close.cancel();
    }
}

/// Boxed future returned by [`Connector::connect`].
pub type ConnectFuture<'a> = Pin<Box<dyn Future<Output = Result<Link, ConnectionError>> + Send + 'a>>;

/// Opens links to the bridge.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> ConnectFuture<'_>;
}

/// WebSocket connector for a bridge URL such as `ws://localhost:8082`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    max_message_size: usize,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn open(&self) -> Result<Link, ConnectionError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(self.max_message_size);
        ws_config.max_frame_size = Some(self.max_message_size);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(&self.url, Some(ws_config), false).await?;
        let (write, read) = ws_stream.split();
        debug!(url = %self.url, "WebSocket connected");

        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(LINK_BUFFER_SIZE);
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(LINK_BUFFER_SIZE);
        let (control_tx, control_rx) = mpsc::channel::<tungstenite::Message>(8);
        let cancel = CancellationToken::new();

        tokio::spawn(crate::pumps::write::write_pump(
            write,
            outbound_rx,
            control_rx,
            cancel.clone(),
        ));
        tokio::spawn(crate::pumps::read::read_pump(
            read,
            inbound_tx,
            control_tx,
            self.max_message_size,
            cancel.clone(),
        ));

        Ok(Link::new(outbound_tx, inbound_rx, cancel))
    }
}

impl Connector for WsConnector {
    fn connect(&self) -> ConnectFuture<'_> {
        Box::pin(self.open())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_link_carries_both_directions() {
        let (mut link, mut peer) = Link::channel(4);

        link.outbound.send("up".into()).await.unwrap();
        assert_eq!(peer.sent.recv().await.as_deref(), Some("up"));

        peer.push.send("down".into()).await.unwrap();
        assert_eq!(link.inbound.recv().await.as_deref(), Some("down"));

        drop(peer.push);
        assert!(link.inbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropping_link_signals_peer() {
        let (link, peer) = Link::channel(4);
        assert!(!peer.closed.is_cancelled());
        drop(link);
        assert!(peer.closed.is_cancelled());
    }

    #[tokio::test]
    async fn ws_connector_fails_without_server() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = WsConnector::new(format!("ws://127.0.0.1:{port}"));
        let result = connector.connect().await;
        assert!(matches!(result, Err(ConnectionError::WebSocket(_))));
    }
}
