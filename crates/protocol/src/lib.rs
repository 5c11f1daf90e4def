//! Wire protocol shared by FileDrop clients and the relay.
//!
//! Every text frame is a JSON [`Message`] envelope whose `type` selects the
//! payload struct in [`messages`].

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::MessageType;
pub use envelope::{Message, PayloadError, WsError};
pub use types::TransferStatus;
