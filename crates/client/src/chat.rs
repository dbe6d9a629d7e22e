//! The chat session: connection, dispatcher, state and timers driven from
//! one task.
//!
//! [`ChatSession::run`] owns everything mutable. Callers talk to it through
//! a [`SessionHandle`] and observe it through [`SessionUpdate`]s, so state
//! is never touched from two places at once.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use relaychat_protocol::{
    ChatMessage, Event, FileContent, LoginRequest, MessageType, RegisterRequest, Role, User,
};

use crate::config::ClientConfig;
use crate::dispatcher::Dispatcher;
use crate::manager::ConnectionManager;
use crate::session::{Effect, SessionState};
use crate::store::SessionStore;
use crate::types::{ConnectionEvent, ConnectionState};
use crate::typing::{TimerEvent, TypingController};
use crate::ws_client::{ConnectionError, Connector};

/// Capacity of the command queue.
const COMMAND_BUFFER_SIZE: usize = 64;

/// Request from the user interface.
#[derive(Debug, Clone)]
pub enum Command {
    Login {
        role: Role,
        email: String,
        password: String,
    },
    Register {
        email: String,
        password: String,
        username: String,
    },
    SelectPeer(String),
    /// The user typed in the compose box.
    Keystroke,
    /// Private message to the selected peer.
    SendText(String),
    /// Public message to everyone.
    Broadcast(String),
    SendFile(FileContent),
    RefreshRoster,
    FetchHistory,
    FetchFiles,
    Logout,
    Connect,
    Disconnect,
    Shutdown,
}

/// Change published to the user interface.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Connection(ConnectionState),
    Identity(Option<User>),
    Roster(Vec<User>),
    /// One entry appended to the log.
    Message(ChatMessage),
    /// The whole log was replaced.
    LogReplaced(Vec<ChatMessage>),
    /// Remote peers currently typing.
    Typing(Vec<String>),
    Error(String),
    Notice(String),
}

/// Mutable session data handed to dispatcher handlers.
pub struct SessionCore {
    pub state: SessionState,
    pub typing: TypingController,
    effects: Vec<Effect>,
}

impl SessionCore {
    fn reduce(&mut self, event: &Event) {
        if let Event::Typing(signal) = event {
            let me = self.state.current_email();
            let from_self = me == Some(signal.sender.as_str());
            let for_other = signal.receiver.is_some() && signal.receiver.as_deref() != me;
            if !from_self && !for_other {
                self.typing.on_signal(signal);
            }
        }
        let effects = self.state.apply(event);
        self.effects.extend(effects);
    }
}

/// Cloneable sender of [`Command`]s.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    pub async fn send(&self, command: Command) -> Result<(), ConnectionError> {
        self.tx.send(command).await.map_err(|_| ConnectionError::Closed)
    }

    pub async fn login(
        &self,
        role: Role,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<(), ConnectionError> {
        self.send(Command::Login {
            role,
            email: email.into(),
            password: password.into(),
        })
        .await
    }

    pub async fn select_peer(&self, email: impl Into<String>) -> Result<(), ConnectionError> {
        self.send(Command::SelectPeer(email.into())).await
    }

    pub async fn keystroke(&self) -> Result<(), ConnectionError> {
        self.send(Command::Keystroke).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ConnectionError> {
        self.send(Command::SendText(text.into())).await
    }

    pub async fn logout(&self) -> Result<(), ConnectionError> {
        self.send(Command::Logout).await
    }

    pub async fn shutdown(&self) -> Result<(), ConnectionError> {
        self.send(Command::Shutdown).await
    }
}

/// Receiver of [`SessionUpdate`]s.
pub type UpdateReceiver = mpsc::UnboundedReceiver<SessionUpdate>;

/// One client chat session.
pub struct ChatSession {
    config: ClientConfig,
    manager: ConnectionManager,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    dispatcher: Dispatcher<SessionCore>,
    core: SessionCore,
    store: Arc<dyn SessionStore>,
    timers: mpsc::UnboundedReceiver<TimerEvent>,
    commands: mpsc::Receiver<Command>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
}

impl ChatSession {
    /// Builds a session, restoring a persisted identity if there is one.
    pub async fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        store: Arc<dyn SessionStore>,
    ) -> Result<(Self, SessionHandle, UpdateReceiver), ConnectionError> {
        let manager = ConnectionManager::new(connector, config.reconnect());
        let events = manager.take_events().await.ok_or(ConnectionError::Closed)?;

        let state = match store.load_identity() {
            Ok(Some(user)) => {
                info!(email = %user.email, "restored session identity");
                SessionState::with_identity(user)
            }
            Ok(None) => SessionState::new(),
            Err(e) => {
                warn!("failed to load session identity: {e}");
                SessionState::new()
            }
        };

        let (timer_tx, timers) = mpsc::unbounded_channel();
        let typing = TypingController::new(config.typing_quiet(), config.typing_expiry(), timer_tx);

        let mut dispatcher = Dispatcher::new();
        dispatcher.on_any(|core: &mut SessionCore, event: &Event| core.reduce(event));

        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let (updates, update_rx) = mpsc::unbounded_channel();

        let session = Self {
            config,
            manager,
            events,
            dispatcher,
            core: SessionCore {
                state,
                typing,
                effects: Vec::new(),
            },
            store,
            timers,
            commands,
            updates,
        };
        Ok((session, SessionHandle { tx: command_tx }, update_rx))
    }

    pub fn state(&self) -> &SessionState {
        &self.core.state
    }

    pub fn typing(&self) -> &TypingController {
        &self.core.typing
    }

    /// Registers an extra handler for one envelope type. It runs after the
    /// session state has been updated.
    pub fn on<F>(&mut self, tag: MessageType, handler: F)
    where
        F: FnMut(&mut SessionCore, &Event) + Send + 'static,
    {
        self.dispatcher.on(tag, handler);
    }

    /// Connects and processes input until shutdown.
    pub async fn run(mut self) {
        self.manager.connect().await;
        while self.step().await {}
        self.core.typing.reset();
        self.manager.shutdown().await;
        debug!("chat session stopped");
    }

    /// Processes one input. Returns `false` on shutdown.
    pub async fn step(&mut self) -> bool {
        tokio::select! {
            Some(event) = self.events.recv() => {
                self.on_connection_event(event);
                true
            }
            Some(timer) = self.timers.recv() => {
                self.on_timer(timer);
                true
            }
            command = self.commands.recv() => match command {
                Some(Command::Shutdown) | None => false,
                Some(command) => {
                    self.on_command(command).await;
                    true
                }
            },
        }
    }

    fn on_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::StateChanged(state) => {
                info!(?state, "connection state changed");
                let connected = state == ConnectionState::Connected;
                self.publish(SessionUpdate::Connection(state));

                if connected {
                    // A restored session resumes without logging in again.
                    if self.core.state.is_logged_in() {
                        let request = self.core.state.roster_request();
                        let _ = self.send(&request);
                    }
                } else if !self.core.typing.typing_peers().is_empty() {
                    self.core.typing.reset();
                    self.publish(SessionUpdate::Typing(Vec::new()));
                } else {
                    self.core.typing.reset();
                }
            }
            ConnectionEvent::Message(raw) => self.on_inbound(&raw),
        }
    }

    fn on_inbound(&mut self, raw: &str) {
        let Some(event) = self.dispatcher.dispatch(&mut self.core, raw) else {
            return;
        };
        self.flush_effects();
        self.publish_for(&event);
    }

    fn on_timer(&mut self, timer: TimerEvent) {
        let before = self.core.typing.typing_peers();
        if let Some(stop) = self.core.typing.on_timer(timer) {
            let _ = self.send(&stop);
        }
        let after = self.core.typing.typing_peers();
        if before != after {
            self.publish(SessionUpdate::Typing(after));
        }
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Login {
                role,
                email,
                password,
            } => self.send_or_report(&Event::Login(LoginRequest {
                role,
                email,
                password,
            })),
            Command::Register {
                email,
                password,
                username,
            } => self.send_or_report(&Event::Register(RegisterRequest {
                email,
                password,
                username,
            })),
            Command::SelectPeer(peer) => {
                if let Some(stop) = self.core.typing.peer_changed() {
                    let _ = self.send(&stop);
                }
                let effects = self.core.state.select_peer(&peer);
                self.core.effects.extend(effects);
                self.flush_effects();
                self.publish(SessionUpdate::LogReplaced(Vec::new()));
                self.publish(SessionUpdate::Typing(Vec::new()));
            }
            Command::Keystroke => {
                let core = &mut self.core;
                let signals = match (core.state.current_email(), core.state.selected_peer()) {
                    (Some(me), Some(peer)) => core.typing.keystroke(me, peer),
                    _ => Vec::new(),
                };
                for signal in &signals {
                    let _ = self.send(signal);
                }
            }
            Command::SendText(text) => {
                let composed = self.core.state.compose_message(&text);
                self.send_composed(composed);
            }
            Command::Broadcast(text) => {
                let composed = self.core.state.compose_broadcast(&text);
                self.send_composed(composed);
            }
            Command::SendFile(file) => {
                let composed = self
                    .core
                    .state
                    .compose_file(file, self.config.max_attachment_bytes);
                self.send_composed(composed);
            }
            Command::RefreshRoster => {
                let request = self.core.state.roster_request();
                self.send_or_report(&request);
            }
            Command::FetchHistory => {
                let request = self.core.state.history_request();
                self.send_or_report(&request);
            }
            Command::FetchFiles => {
                let request = self.core.state.files_request();
                self.send_or_report(&request);
            }
            Command::Logout => {
                self.core.typing.reset();
                let effects = self.core.state.logout();
                self.core.effects.extend(effects);
                self.flush_effects();
                self.publish(SessionUpdate::Identity(None));
                self.publish(SessionUpdate::Roster(Vec::new()));
                self.publish(SessionUpdate::LogReplaced(Vec::new()));
            }
            Command::Connect => {
                self.manager.connect().await;
            }
            Command::Disconnect => {
                self.core.typing.reset();
                self.manager.disconnect().await;
            }
            Command::Shutdown => {}
        }
    }

    fn send_composed(&mut self, composed: Result<Event, crate::session::ComposeError>) {
        match composed {
            Ok(event) => {
                self.send_or_report(&event);
                if let Some(stop) = self.core.typing.message_sent() {
                    let _ = self.send(&stop);
                }
            }
            Err(e) => self.publish(SessionUpdate::Error(e.to_string())),
        }
    }

    /// Carries out the effects queued by the reducer, in order.
    fn flush_effects(&mut self) {
        for effect in std::mem::take(&mut self.core.effects) {
            match effect {
                Effect::Send(event) => {
                    let _ = self.send(&event);
                }
                Effect::PersistIdentity(user) => {
                    if let Err(e) = self.store.save_identity(&user) {
                        warn!("failed to persist session identity: {e}");
                    }
                }
                Effect::ClearIdentity => {
                    if let Err(e) = self.store.clear_identity() {
                        warn!("failed to clear session identity: {e}");
                    }
                }
                Effect::Error(message) => self.publish(SessionUpdate::Error(message)),
                Effect::Notice(message) => self.publish(SessionUpdate::Notice(message)),
            }
        }
    }

    fn publish_for(&self, event: &Event) {
        let update = match event {
            Event::LoginSuccess(user) => SessionUpdate::Identity(Some(user.clone())),
            Event::UserList(_) => {
                SessionUpdate::Roster(self.core.state.roster().cloned().collect())
            }
            Event::Chat(msg) | Event::File(msg) => SessionUpdate::Message(msg.clone()),
            Event::History { .. } | Event::FilesList(_) => {
                SessionUpdate::LogReplaced(self.core.state.log().to_vec())
            }
            Event::Typing(_) => SessionUpdate::Typing(self.core.typing.typing_peers()),
            _ => return,
        };
        self.publish(update);
    }

    fn publish(&self, update: SessionUpdate) {
        let _ = self.updates.send(update);
    }

    fn send(&self, event: &Event) -> Result<(), ConnectionError> {
        self.manager.send_event(event).inspect_err(|e| {
            debug!(tag = %event.msg_type(), "envelope not sent: {e}");
        })
    }

    fn send_or_report(&self, event: &Event) {
        if let Err(e) = self.send(event) {
            self.publish(SessionUpdate::Error(format!(
                "could not send {}: {e}",
                event.msg_type()
            )));
        }
    }
}
