//! Connection supervisor: connect, forward, and retry with a fixed delay.
//!
//! Contains the shared [`LinkContext`], cancellation helpers and the
//! supervisor loop spawned by [`crate::ConnectionManager::connect`].

use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::{ConnectionEvent, ConnectionState, ReconnectConfig};
use crate::ws_client::{Connector, Link};

/// Shared state between the manager and its supervisor task.
#[derive(Clone)]
pub(crate) struct LinkContext {
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) policy: ReconnectConfig,
    pub(crate) state: Arc<RwLock<ConnectionState>>,
    /// Outbound queue of the open link. `Some` only while connected.
    pub(crate) outbound: Arc<std::sync::Mutex<Option<mpsc::Sender<String>>>>,
    pub(crate) events_tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl LinkContext {
    /// Moves to `new_state` and emits `StateChanged`.
    ///
    /// With a supervisor token, the transition is skipped (returning `false`)
    /// once the token is cancelled, so a superseded supervisor can never
    /// overwrite the state set by `disconnect`.
    pub(crate) async fn set_state(
        &self,
        new_state: ConnectionState,
        cancel: Option<&CancellationToken>,
    ) -> bool {
        let mut state = self.state.write().await;
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return false;
        }
        if *state == new_state {
            return true;
        }
        *state = new_state.clone();
        // Sent under the lock so events arrive in transition order.
        let _ = self.events_tx.send(ConnectionEvent::StateChanged(new_state));
        true
    }

    fn open_outbound(&self, tx: mpsc::Sender<String>, cancel: &CancellationToken) {
        if let Ok(mut guard) = self.outbound.lock() {
            if !cancel.is_cancelled() {
                *guard = Some(tx);
            }
        }
    }

    pub(crate) fn clear_outbound(&self) {
        if let Ok(mut guard) = self.outbound.lock() {
            *guard = None;
        }
    }

    /// Clears the outbound slot only if it still holds `tx`.
    fn release_outbound(&self, tx: &mpsc::Sender<String>) {
        if let Ok(mut guard) = self.outbound.lock() {
            if guard.as_ref().is_some_and(|cur| cur.same_channel(tx)) {
                *guard = None;
            }
        }
    }
}

/// Cancels the running supervisor, if any.
pub(crate) fn cancel_supervisor(run_cancel: &std::sync::Mutex<Option<CancellationToken>>) {
    if let Ok(mut guard) = run_cancel.lock() {
        if let Some(token) = guard.take() {
            token.cancel();
        }
    }
}

/// Cancels the running supervisor and installs `token` in its place.
pub(crate) fn replace_supervisor(
    run_cancel: &std::sync::Mutex<Option<CancellationToken>>,
    token: CancellationToken,
) {
    if let Ok(mut guard) = run_cancel.lock() {
        if let Some(old) = guard.replace(token) {
            old.cancel();
        }
    }
}

/// Owns the connection lifecycle until cancelled or out of attempts.
///
/// Every failed attempt and every lost connection counts as one failure;
/// a successful open resets the count. After `max_attempts` consecutive
/// failures the state becomes [`ConnectionState::Failed`] and the loop ends.
pub(crate) async fn supervise(ctx: LinkContext, cancel: CancellationToken) {
    let mut failures: u32 = 0;

    loop {
        if !ctx.set_state(ConnectionState::Connecting, Some(&cancel)).await {
            return;
        }

        let attempt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = ctx.connector.connect() => result,
        };

        match attempt {
            Ok(mut link) => {
                failures = 0;
                // Sendable before anyone hears about `Connected`.
                ctx.open_outbound(link.outbound.clone(), &cancel);
                if !ctx.set_state(ConnectionState::Connected, Some(&cancel)).await {
                    ctx.release_outbound(&link.outbound);
                    link.close();
                    return;
                }
                info!("connected to bridge");

                let lost = forward_inbound(&ctx, &mut link, &cancel).await;
                ctx.release_outbound(&link.outbound);
                link.close();
                if !lost {
                    debug!("supervisor cancelled while connected");
                    return;
                }
                warn!("connection to bridge lost");
            }
            Err(e) => {
                warn!(attempt = failures + 1, error = %e, "connection attempt failed");
            }
        }

        failures += 1;
        if ctx.policy.exhausted(failures) {
            warn!(failures, "giving up on bridge connection");
            ctx.set_state(ConnectionState::Failed, Some(&cancel)).await;
            return;
        }

        if !ctx
            .set_state(ConnectionState::Reconnecting { attempt: failures }, Some(&cancel))
            .await
        {
            return;
        }

        let delay = ctx.policy.delay_for_attempt(failures);
        info!(
            attempt = failures,
            delay_ms = delay.as_millis() as u64,
            "reconnecting"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("reconnect cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Forwards inbound frames as events. Returns `true` if the link was lost,
/// `false` if the supervisor was cancelled.
async fn forward_inbound(ctx: &LinkContext, link: &mut Link, cancel: &CancellationToken) -> bool {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            msg = link.inbound.recv() => match msg {
                Some(text) => {
                    let _ = ctx.events_tx.send(ConnectionEvent::Message(text));
                }
                None => return true,
            },
        }
    }
}
