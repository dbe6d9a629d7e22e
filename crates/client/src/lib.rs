//! Client side of relaychat.
//!
//! [`ConnectionManager`] keeps one connection to the bridge alive with a
//! bounded, fixed-delay reconnection policy. [`ChatSession`] layers the
//! envelope [`Dispatcher`], the [`SessionState`] reducer and the
//! [`TypingController`] on top of it and runs them on a single task.

pub mod chat;
pub mod config;
pub mod dispatcher;
pub mod manager;
mod pumps;
pub(crate) mod reconnection;
pub mod session;
pub mod store;
pub mod types;
pub mod typing;
pub mod ws_client;

pub use chat::{ChatSession, Command, SessionCore, SessionHandle, SessionUpdate, UpdateReceiver};
pub use config::{ClientConfig, ConfigError};
pub use dispatcher::Dispatcher;
pub use manager::ConnectionManager;
pub use session::{ComposeError, Effect, SessionState};
pub use store::{JsonFileStore, MemoryStore, SessionStore, StoreError};
pub use types::{ConnectionEvent, ConnectionState, ReconnectConfig};
pub use typing::{TimerEvent, TypingController};
pub use ws_client::{ConnectionError, Connector, Link, LinkPeer, WsConnector};
