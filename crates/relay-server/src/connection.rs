//! Client connection management: read/write pumps, ping/pong, send buffering.

use std::sync::Arc;

use filedrop_protocol::constants::{
    MessageType, WS_ERR_CODE_BAD_REQUEST, WS_ERR_CODE_NOT_IMPLEMENTED, WS_MAX_MESSAGE_SIZE,
    WS_PING_PERIOD, WS_PONG_WAIT,
};
use filedrop_protocol::envelope::Message;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use crate::SEND_BUFFER_SIZE;
use crate::binary::parse_binary_chunk;
use crate::handler::Handler;
use crate::registry::ConnectionRegistry;

/// Handle for sending messages to one connected client.
///
/// Cloneable and cheap: wraps an `mpsc::Sender` and the connection id.
#[derive(Clone)]
pub struct Sender {
    connection_id: Arc<str>,
    tx: mpsc::Sender<WsMessage>,
}

impl Sender {
    /// Creates a sender for `connection_id` and the receiving end of its
    /// outbound queue.
    pub fn channel(connection_id: &str, capacity: usize) -> (Self, mpsc::Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                connection_id: Arc::from(connection_id),
                tx,
            },
            rx,
        )
    }

    /// Id of the connection this sender writes to.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Sends a protocol [`Message`] as JSON text.
    ///
    /// Returns `Err` if the buffer is full or the client disconnected.
    pub fn send_msg(&self, msg: Message) -> Result<(), SendError> {
        let json = serde_json::to_string(&msg).map_err(|_| SendError)?;
        self.tx.try_send(WsMessage::Text(json.into())).map_err(|_| {
            tracing::warn!(
                connection_id = %self.connection_id,
                "send buffer full or closed, dropping message"
            );
            SendError
        })
    }

    /// Sends a protocol [`Message`], waiting for queue space instead of
    /// dropping it.
    ///
    /// For messages the client must not miss. Returns `Err` only once the
    /// client has disconnected.
    pub async fn send_msg_reliable(&self, msg: Message) -> Result<(), SendError> {
        let json = serde_json::to_string(&msg).map_err(|_| SendError)?;
        self.tx
            .send(WsMessage::Text(json.into()))
            .await
            .map_err(|_| {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    "connection closed, dropping message"
                );
                SendError
            })
    }

    /// Sends a server-initiated event with a fresh message id.
    pub fn send_event<T: Serialize>(&self, msg_type: MessageType, payload: &T) -> Result<(), SendError> {
        self.send_msg(new_event(msg_type, payload)?)
    }

    /// Like [`Sender::send_event`], but waits for queue space.
    pub async fn send_event_reliable<T: Serialize>(
        &self,
        msg_type: MessageType,
        payload: &T,
    ) -> Result<(), SendError> {
        self.send_msg_reliable(new_event(msg_type, payload)?).await
    }

    /// Sends an error response for the given request message.
    pub fn send_error(&self, req: &Message, code: i32, message: &str) -> Result<(), SendError> {
        self.send_msg(req.reply_error(code, message))
    }

    /// Returns `true` if the send channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

fn new_event<T: Serialize>(msg_type: MessageType, payload: &T) -> Result<Message, SendError> {
    Message::new(uuid::Uuid::new_v4().to_string(), msg_type, Some(payload)).map_err(|_| SendError)
}

/// Error returned when the send channel is full or closed.
#[derive(Debug, thiserror::Error)]
#[error("send failed: buffer full or connection closed")]
pub struct SendError;

/// Registers a WebSocket connection and runs its read and write pumps.
///
/// The pumps run as background tokio tasks and stop when the client
/// closes, the pong deadline passes, or `server_cancel` fires. On exit
/// the connection is unregistered before the handler's
/// [`Handler::on_disconnected`] runs.
pub(crate) async fn spawn_connection<S, H>(
    ws_stream: S,
    connection_id: String,
    handler: Arc<H>,
    registry: Arc<ConnectionRegistry>,
    server_cancel: CancellationToken,
) -> Sender
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Send
        + 'static,
    H: Handler,
{
    let (sender, rx) = Sender::channel(&connection_id, SEND_BUFFER_SIZE);
    let cancel = server_cancel.child_token();

    registry.register(sender.clone()).await;
    handler.on_connected(sender.clone()).await;

    let (ws_sink, ws_stream) = ws_stream.split();

    // Write pump.
    tokio::spawn(write_pump(ws_sink, rx, cancel.clone()));

    // Read pump.
    let read_sender = sender.clone();
    tokio::spawn(async move {
        read_pump(ws_stream, read_sender, Arc::clone(&handler), cancel.clone()).await;
        // When read pump exits, cancel the write pump too.
        cancel.cancel();
        let owned = registry
            .unregister(&connection_id)
            .await
            .map(|info| info.transfers)
            .unwrap_or_default();
        handler.on_disconnected(connection_id.clone()).await;
        tracing::info!(%connection_id, ?owned, "client disconnected");
    });

    sender
}

/// Write pump: drains the send channel and sends WS pings.
async fn write_pump<S>(mut sink: S, mut rx: mpsc::Receiver<WsMessage>, cancel: CancellationToken)
where
    S: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Send + Unpin,
{
    let mut ping_interval = tokio::time::interval(WS_PING_PERIOD);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = rx.recv() => {
                match msg {
                    Some(ws_msg) => {
                        if let Err(e) = sink.send(ws_msg).await {
                            tracing::error!("write pump send error: {e}");
                            break;
                        }
                    }
                    None => break, // Channel closed.
                }
            }

            _ = ping_interval.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    tracing::error!("write pump ping error: {e}");
                    break;
                }
            }
        }
    }

    // Best-effort close frame.
    let _ = sink.close().await;
}

/// Read pump: reads WS frames in order and dispatches them to the handler.
async fn read_pump<S, H>(mut stream: S, sender: Sender, handler: Arc<H>, cancel: CancellationToken)
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Send
        + Unpin,
    H: Handler,
{
    let mut pong_deadline = tokio::time::interval(WS_PONG_WAIT);
    pong_deadline.reset();
    let mut got_pong = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = pong_deadline.tick() => {
                if !got_pong {
                    tracing::warn!(connection_id = sender.connection_id(), "pong timeout, closing connection");
                    break;
                }
                got_pong = false;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(ws_msg)) => {
                        // Any traffic proves the peer is alive.
                        got_pong = true;
                        match ws_msg {
                            WsMessage::Text(text) => {
                                if text.len() > WS_MAX_MESSAGE_SIZE {
                                    tracing::error!("message exceeds max size ({} > {})", text.len(), WS_MAX_MESSAGE_SIZE);
                                    continue;
                                }
                                dispatch_text(&handler, &sender, &text).await;
                            }
                            WsMessage::Binary(data) => {
                                if data.len() > WS_MAX_MESSAGE_SIZE {
                                    tracing::error!("binary message exceeds max size ({} > {})", data.len(), WS_MAX_MESSAGE_SIZE);
                                    continue;
                                }
                                dispatch_binary(&handler, &sender, &data).await;
                            }
                            WsMessage::Pong(_) => {
                                pong_deadline.reset();
                            }
                            WsMessage::Ping(data) => {
                                let _ = sender.tx.try_send(WsMessage::Pong(data));
                            }
                            WsMessage::Close(_) => {
                                tracing::debug!(connection_id = sender.connection_id(), "received close frame");
                                break;
                            }
                            WsMessage::Frame(_) => {} // Raw frames ignored.
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(connection_id = sender.connection_id(), "read pump error: {e}");
                        break;
                    }
                    None => break, // Stream ended.
                }
            }
        }
    }
}

/// Dispatches a text (JSON) message to the appropriate handler method.
async fn dispatch_text<H: Handler>(handler: &Arc<H>, sender: &Sender, text: &str) {
    let msg: Message = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(connection_id = sender.connection_id(), "invalid message JSON: {e}");
            let _ = sender.send_msg(Message::error(
                "",
                WS_ERR_CODE_BAD_REQUEST,
                "invalid message",
            ));
            return;
        }
    };

    let s = sender.clone();
    match msg.msg_type {
        MessageType::StartTransfer => handler.on_start_transfer(s, msg).await,
        MessageType::FileChunk => handler.on_file_chunk(s, msg).await,
        MessageType::CancelTransfer => handler.on_cancel_transfer(s, msg).await,
        MessageType::RequestDownload => handler.on_request_download(s, msg).await,
        MessageType::UserStatus => handler.on_user_status(s, msg).await,
        MessageType::GetStats => handler.on_get_stats(s, msg).await,
        _ => {
            tracing::warn!(msg_type = ?msg.msg_type, "unhandled message type");
            let _ = sender.send_error(&msg, WS_ERR_CODE_NOT_IMPLEMENTED, "unknown message type");
        }
    }
}

/// Dispatches a binary WebSocket frame to the handler.
async fn dispatch_binary<H: Handler>(handler: &Arc<H>, sender: &Sender, data: &[u8]) {
    match parse_binary_chunk(data) {
        Ok(chunk) => handler.on_binary_chunk(sender.clone(), chunk).await,
        Err(e) => {
            tracing::warn!(connection_id = sender.connection_id(), "failed to parse binary message: {e}");
            let _ = sender.send_msg(Message::error(
                "",
                WS_ERR_CODE_BAD_REQUEST,
                format!("invalid binary frame: {e}"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_error_display() {
        let err = SendError;
        assert!(err.to_string().contains("buffer full"));
    }

    #[tokio::test]
    async fn send_event_wraps_payload_in_envelope() {
        let (sender, mut rx) = Sender::channel("c1", 4);
        sender
            .send_event(MessageType::UserDisconnected, &serde_json::json!({"userId": "c2"}))
            .unwrap();

        let Some(WsMessage::Text(text)) = rx.recv().await else {
            panic!("expected text frame");
        };
        let msg: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(msg.msg_type, MessageType::UserDisconnected);
        assert!(!msg.id.is_empty());
        let payload: serde_json::Value = msg.require_payload().unwrap();
        assert_eq!(payload["userId"], "c2");
    }

    #[tokio::test]
    async fn full_buffer_drops_message() {
        let (sender, _rx) = Sender::channel("c1", 1);
        tokio_test::assert_ok!(sender.send_msg(Message::error("", 400, "one")));
        assert!(sender.send_msg(Message::error("", 400, "two")).is_err());
    }

    #[tokio::test]
    async fn reliable_send_waits_for_space() {
        let (sender, mut rx) = Sender::channel("c1", 1);
        tokio_test::assert_ok!(sender.send_msg(Message::error("", 400, "fill")));

        let waiting = sender.clone();
        let pending = tokio::spawn(async move {
            waiting
                .send_event_reliable(MessageType::TransferComplete, &serde_json::json!({}))
                .await
        });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        rx.recv().await.unwrap();
        tokio_test::assert_ok!(pending.await.unwrap());
        let Some(WsMessage::Text(text)) = rx.recv().await else {
            panic!("expected text frame");
        };
        let msg: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(msg.msg_type, MessageType::TransferComplete);
    }

    #[tokio::test]
    async fn reliable_send_fails_once_closed() {
        let (sender, rx) = Sender::channel("c1", 1);
        drop(rx);
        assert!(sender.send_msg_reliable(Message::error("", 400, "x")).await.is_err());
    }

    #[tokio::test]
    async fn closed_channel_reports_disconnected() {
        let (sender, rx) = Sender::channel("c1", 4);
        assert!(sender.is_connected());
        drop(rx);
        assert!(!sender.is_connected());
        assert!(sender.send_msg(Message::error("", 400, "x")).is_err());
        assert_eq!(sender.connection_id(), "c1");
    }
}
