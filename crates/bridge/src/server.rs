//! Bridge WebSocket server.
//!
//! Listens for client WebSocket connections and pairs each one with its own
//! TCP connection to the backend.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::accept_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;

use relaychat_protocol::constants::{DEFAULT_BACKEND_PORT, DEFAULT_BRIDGE_PORT, MAX_MESSAGE_SIZE};

use crate::BridgeError;
use crate::pair;
use crate::stats::{BridgeStats, StatsSnapshot};

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Interface to listen on for clients.
    pub listen_host: String,
    /// Client-facing port (0 = OS-assigned).
    pub listen_port: u16,
    pub backend_host: String,
    pub backend_port: u16,
    /// Largest client frame or backend line accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".into(),
            listen_port: DEFAULT_BRIDGE_PORT,
            backend_host: "127.0.0.1".into(),
            backend_port: DEFAULT_BACKEND_PORT,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl BridgeConfig {
    pub fn listen_addr(&self) -> String {
        host_port(&self.listen_host, self.listen_port)
    }

    pub fn backend_addr(&self) -> String {
        host_port(&self.backend_host, self.backend_port)
    }
}

fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// The bridge server.
///
/// Every accepted client gets an independent pair; pairs share nothing but
/// the diagnostics counters.
pub struct BridgeServer {
    config: BridgeConfig,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
    stats: Arc<BridgeStats>,
}

impl BridgeServer {
    pub fn new(config: BridgeConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
            stats: Arc::new(BridgeStats::default()),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stops accepting and tears down every open pair.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the server until [`shutdown`](Self::shutdown).
    pub async fn run(self: &Arc<Self>) -> Result<(), BridgeError> {
        let listener = TcpListener::bind(self.config.listen_addr()).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!(
            backend = %self.config.backend_addr(),
            "bridge listening on {local_addr}"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("bridge shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    tracing::error!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Upgrades one client to WebSocket, connects its backend stream, and
    /// forwards until either side goes away.
    async fn handle_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), BridgeError> {
        let max = self.config.max_message_size;
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(max);
        ws_config.max_frame_size = Some(max);
        let mut ws_stream = accept_async_with_config(stream, Some(ws_config)).await?;
        tracing::info!(%peer_addr, "client connected");

        let backend_addr = self.config.backend_addr();
        let backend = match TcpStream::connect(&backend_addr).await {
            Ok(s) => s,
            Err(source) => {
                self.stats.backend_connect_failed();
                let _ = ws_stream.close(None).await;
                return Err(BridgeError::BackendConnect {
                    addr: backend_addr,
                    source,
                });
            }
        };
        let _ = backend.set_nodelay(true);
        tracing::debug!(%peer_addr, backend = %backend_addr, "backend stream connected");

        self.stats.pair_opened();
        pair::run_pair(
            ws_stream,
            backend,
            peer_addr,
            max,
            Arc::clone(&self.stats),
            self.cancel.child_token(),
        )
        .await;
        self.stats.pair_closed();

        tracing::info!(%peer_addr, "client disconnected");
        Ok(())
    }
}
