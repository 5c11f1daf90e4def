//! Handler trait for processing client messages.
//!
//! Implementors provide the relay logic (transfers, downloads, presence)
//! while the server framework handles connection management, routing, and
//! the binary frame format.

use std::future::Future;
use std::pin::Pin;

use filedrop_protocol::constants::WS_ERR_CODE_NOT_IMPLEMENTED;
use filedrop_protocol::envelope::Message;

use crate::binary::BinaryChunk;
use crate::connection::Sender;

/// A boxed future returned by handler methods.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Trait for handling messages from connected clients.
///
/// Each method receives the [`Sender`] of the connection the message came
/// from; [`Sender::connection_id`] identifies the requester. Request
/// methods default to a "not implemented" error reply so handlers only
/// override the message types they serve.
pub trait Handler: Send + Sync + 'static {
    /// Called once the connection is registered, before any frame is read.
    fn on_connected(&self, _sender: Sender) -> HandlerFuture<'_> {
        Box::pin(async {})
    }

    /// Called for `start-transfer`.
    fn on_start_transfer(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `file-chunk` (base64 JSON; raw bytes use `on_binary_chunk`).
    fn on_file_chunk(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `cancel-transfer`.
    fn on_cancel_transfer(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `request-download`.
    fn on_request_download(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `user-status`.
    fn on_user_status(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `get-stats`.
    fn on_get_stats(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for binary chunk frames.
    fn on_binary_chunk(&self, _sender: Sender, _chunk: BinaryChunk) -> HandlerFuture<'_> {
        Box::pin(async {
            tracing::warn!("binary chunk received but not handled");
        })
    }

    /// Called after the connection is gone and has been unregistered.
    fn on_disconnected(&self, _connection_id: String) -> HandlerFuture<'_> {
        Box::pin(async {})
    }
}

fn not_implemented<'a>(sender: Sender, msg: Message) -> HandlerFuture<'a> {
    Box::pin(async move {
        let _ = sender.send_error(&msg, WS_ERR_CODE_NOT_IMPLEMENTED, "not implemented");
    })
}
