//! WebSocket server for the FileDrop relay.
//!
//! Accepts any number of client connections, gives each a connection id,
//! dispatches JSON and binary frames to a [`Handler`], and keeps a
//! [`ConnectionRegistry`] that the [`Notifier`] broadcasts through.

mod binary;
mod broadcast;
mod connection;
mod handler;
mod registry;
mod server;

pub use binary::{BinaryChunk, BinaryChunkHeader, ParseError, encode_binary_chunk, parse_binary_chunk};
pub use broadcast::Notifier;
pub use connection::{SendError, Sender};
pub use handler::{Handler, HandlerFuture};
pub use registry::{ConnectionInfo, ConnectionRegistry};
pub use server::{RelayServer, ServerConfig};

/// Send buffer capacity per connection.
///
/// Every chunk produces a progress event, and broadcasts land in the same
/// queue. `try_send()` drops messages once this fills up.
pub const SEND_BUFFER_SIZE: usize = 2048;

/// Errors produced by the relay server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
