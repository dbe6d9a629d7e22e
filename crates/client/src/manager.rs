//! Connection manager: owns the link to the bridge and its reconnection.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use relaychat_protocol::Event;

use crate::reconnection::{LinkContext, cancel_supervisor, replace_supervisor, supervise};
use crate::types::{ConnectionEvent, ConnectionState, ReconnectConfig};
use crate::ws_client::{ConnectionError, Connector};

/// Manages the single client connection to the bridge.
///
/// State changes and inbound frames are delivered, in order, through the
/// receiver returned by [`ConnectionManager::take_events`]. The channel is
/// unbounded: the consumer also drives `connect`/`disconnect`, so producers
/// must never wait on it.
pub struct ConnectionManager {
    ctx: LinkContext,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ConnectionEvent>>>,
    run_cancel: Arc<std::sync::Mutex<Option<CancellationToken>>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            ctx: LinkContext {
                connector,
                policy,
                state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
                outbound: Arc::new(std::sync::Mutex::new(None)),
                events_tx,
            },
            events_rx: Mutex::new(Some(events_rx)),
            run_cancel: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ConnectionEvent>> {
        self.events_rx.lock().await.take()
    }

    pub async fn state(&self) -> ConnectionState {
        self.ctx.state.read().await.clone()
    }

    /// Returns `true` while a link is open.
    pub fn is_connected(&self) -> bool {
        self.ctx
            .outbound
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Starts connecting.
    ///
    /// Only acts from `Disconnected` or `Failed`; returns `false` if a
    /// connection is already open or being attempted.
    pub async fn connect(&self) -> bool {
        let state = self.state().await;
        if state.is_active() {
            debug!(?state, "connect ignored, already active");
            return false;
        }

        let token = CancellationToken::new();
        replace_supervisor(&self.run_cancel, token.clone());
        tokio::spawn(supervise(self.ctx.clone(), token));
        true
    }

    /// Closes the link and cancels any pending reconnection.
    pub async fn disconnect(&self) {
        cancel_supervisor(&self.run_cancel);
        self.ctx.clear_outbound();
        self.ctx.set_state(ConnectionState::Disconnected, None).await;
    }

    /// Queues one raw envelope for the bridge.
    ///
    /// Fails with [`ConnectionError::NotConnected`] instead of buffering when
    /// no link is open.
    pub fn send(&self, raw: String) -> Result<(), ConnectionError> {
        let tx = self
            .ctx
            .outbound
            .lock()
            .ok()
            .and_then(|guard| guard.clone());

        let Some(tx) = tx else {
            warn!("dropping outbound envelope, not connected");
            return Err(ConnectionError::NotConnected);
        };

        tx.try_send(raw).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(_) => ConnectionError::Closed,
            mpsc::error::TrySendError::Full(_) => {
                warn!("outbound queue full, dropping envelope");
                ConnectionError::QueueFull
            }
        })
    }

    /// Encodes and queues one event.
    pub fn send_event(&self, event: &Event) -> Result<(), ConnectionError> {
        let raw = event.to_json()?;
        self.send(raw)
    }

    /// Same as [`ConnectionManager::disconnect`]; used on application exit.
    pub async fn shutdown(&self) {
        self.disconnect().await;
    }
}
