//! Typing indicators, local and remote.
//!
//! The local side emits a start signal on the first keystroke and a stop
//! signal after a quiet period, on send, or on peer change. The remote side
//! tracks which peers are typing, expiring each one that stops refreshing.
//!
//! Timers are owned handles: each one is a spawned sleep that posts a
//! [`TimerEvent`] to the session loop unless cancelled first. Every timer
//! carries a generation so that an event already queued when its timer was
//! replaced is ignored.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use relaychat_protocol::{Event, TypingSignal};

/// Timer expiry posted to the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// The local quiet period ended.
    QuietElapsed { generation: u64 },
    /// A remote peer's indicator expired.
    RemoteExpired { peer: String, generation: u64 },
}

/// A pending timer. Dropping it cancels the timer.
#[derive(Debug)]
struct Timer {
    generation: u64,
    cancel: CancellationToken,
}

impl Timer {
    fn start(
        delay: Duration,
        generation: u64,
        event: TimerEvent,
        tx: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        let deadline = tokio::time::Instant::now() + delay;
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    let _ = tx.send(event);
                }
            }
        });
        Self { generation, cancel }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug)]
struct LocalTyping {
    sender: String,
    peer: String,
    quiet: Timer,
}

/// Local and remote typing state for one session.
#[derive(Debug)]
pub struct TypingController {
    quiet_period: Duration,
    remote_expiry: Duration,
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
    local: Option<LocalTyping>,
    remote: HashMap<String, Timer>,
    next_generation: u64,
}

impl TypingController {
    pub fn new(
        quiet_period: Duration,
        remote_expiry: Duration,
        timer_tx: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        Self {
            quiet_period,
            remote_expiry,
            timer_tx,
            local: None,
            remote: HashMap::new(),
            next_generation: 0,
        }
    }

    fn generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn quiet_timer(&mut self) -> Timer {
        let generation = self.generation();
        Timer::start(
            self.quiet_period,
            generation,
            TimerEvent::QuietElapsed { generation },
            self.timer_tx.clone(),
        )
    }

    /// Records a local keystroke toward `peer`.
    ///
    /// Returns the signals to send: a start signal if not already typing
    /// toward `peer` (preceded by a stop for a previous peer). The quiet
    /// timer is re-armed either way.
    pub fn keystroke(&mut self, sender: &str, peer: &str) -> Vec<Event> {
        let mut out = Vec::new();

        let switching = self
            .local
            .as_ref()
            .is_some_and(|l| l.peer != peer || l.sender != sender);
        if switching {
            out.extend(self.stop_local());
        }

        let quiet = self.quiet_timer();
        match self.local.as_mut() {
            Some(local) => local.quiet = quiet,
            None => {
                trace!(%peer, "local typing started");
                self.local = Some(LocalTyping {
                    sender: sender.to_string(),
                    peer: peer.to_string(),
                    quiet,
                });
                out.push(signal(sender, peer, true));
            }
        }
        out
    }

    /// A message was sent: typing stops immediately.
    pub fn message_sent(&mut self) -> Option<Event> {
        self.stop_local()
    }

    /// The selected peer changed: local typing stops and every remote
    /// indicator is cleared.
    pub fn peer_changed(&mut self) -> Option<Event> {
        self.remote.clear();
        self.stop_local()
    }

    fn stop_local(&mut self) -> Option<Event> {
        let local = self.local.take()?;
        trace!(peer = %local.peer, "local typing stopped");
        Some(signal(&local.sender, &local.peer, false))
    }

    /// Applies a fired timer. Returns a stop signal to send when the local
    /// quiet period ended.
    pub fn on_timer(&mut self, event: TimerEvent) -> Option<Event> {
        match event {
            TimerEvent::QuietElapsed { generation } => {
                let current = self.local.as_ref().map(|l| l.quiet.generation);
                if current == Some(generation) {
                    self.stop_local()
                } else {
                    None
                }
            }
            TimerEvent::RemoteExpired { peer, generation } => {
                let current = self.remote.get(&peer).map(|t| t.generation);
                if current == Some(generation) {
                    trace!(%peer, "remote typing expired");
                    self.remote.remove(&peer);
                }
                None
            }
        }
    }

    /// Applies a typing signal from a remote peer.
    pub fn on_signal(&mut self, signal: &TypingSignal) {
        if !signal.is_typing {
            self.remote.remove(&signal.sender);
            return;
        }

        let generation = self.generation();
        let timer = Timer::start(
            self.remote_expiry,
            generation,
            TimerEvent::RemoteExpired {
                peer: signal.sender.clone(),
                generation,
            },
            self.timer_tx.clone(),
        );
        // Replacing the entry drops, and so cancels, the previous timer.
        self.remote.insert(signal.sender.clone(), timer);
    }

    pub fn is_typing(&self, peer: &str) -> bool {
        self.remote.contains_key(peer)
    }

    /// Remote peers currently typing, sorted.
    pub fn typing_peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.remote.keys().cloned().collect();
        peers.sort();
        peers
    }

    pub fn is_local_typing(&self) -> bool {
        self.local.is_some()
    }

    /// Cancels every timer without emitting signals.
    pub fn reset(&mut self) {
        self.local = None;
        self.remote.clear();
    }
}

fn signal(sender: &str, peer: &str, is_typing: bool) -> Event {
    Event::Typing(TypingSignal {
        sender: sender.to_string(),
        receiver: Some(peer.to_string()),
        is_typing,
    })
}
