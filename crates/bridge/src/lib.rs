//! Transport bridge between WebSocket clients and the chat backend.
//!
//! Each client connection is paired with one TCP connection to the backend.
//! Client frames are written to the backend as newline-terminated lines;
//! the backend byte stream is split on newlines and each non-blank line is
//! sent back to the client as one text frame. Closing either side closes
//! the other.

mod codec;
mod pair;
mod server;
mod stats;

pub use codec::JsonLinesCodec;
pub use server::{BridgeConfig, BridgeServer};
pub use stats::{BridgeStats, StatsSnapshot};

/// Capacity of the per-pair queue toward the client.
pub const SEND_BUFFER_SIZE: usize = 256;

/// Errors produced by the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("backend connect to {addr} failed: {source}")]
    BackendConnect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("frame too large ({size} > {max} bytes)")]
    FrameTooLarge { size: usize, max: usize },
}
