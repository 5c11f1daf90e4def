//! Relay message handler: wires the transfer engine to client connections.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use filedrop_protocol::constants::{MessageType, WS_ERR_CODE_BAD_REQUEST};
use filedrop_protocol::envelope::Message;
use filedrop_protocol::messages::{
    CancelTransferRequest, DownloadError, DownloadReady, FileChunkRequest, FileUploaded,
    RequestDownloadRequest, StartTransferRequest, StatsResponse, TransferCancelled,
    TransferComplete, TransferErrorEvent, TransferProgress, TransferReady, UploadStats,
    UserDisconnected, UserStatusRequest, UserUpdated, Welcome,
};
use filedrop_relay_server::{
    BinaryChunk, ConnectionRegistry, Handler, HandlerFuture, Notifier, Sender,
};
use filedrop_transfer::{
    CancelOutcome, CompletedUpload, ErrorKind, IngestOutcome, TransferEngine, TransferError,
    public_path,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Handles every client message type the relay serves.
pub struct TransferHandler {
    engine: Arc<TransferEngine>,
    registry: Arc<ConnectionRegistry>,
    notifier: Notifier,
}

impl TransferHandler {
    pub fn new(engine: Arc<TransferEngine>, registry: Arc<ConnectionRegistry>) -> Self {
        let notifier = Notifier::new(Arc::clone(&registry));
        Self {
            engine,
            registry,
            notifier,
        }
    }

    /// Applies one chunk, from either a `file-chunk` message or a binary
    /// frame, and reports the outcome to the sender.
    async fn ingest_chunk(
        &self,
        sender: &Sender,
        transfer_id: &str,
        chunk_index: u32,
        data: Vec<u8>,
        total_chunks: u32,
    ) {
        let owner = sender.connection_id();
        let outcome = match self
            .engine
            .ingest(transfer_id, owner, chunk_index, data, total_chunks)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.kind() == ErrorKind::UnauthorizedAccess {
                    tracing::warn!(transfer_id, connection_id = owner, "rejected chunk for foreign transfer");
                }
                send_transfer_error(sender, transfer_id, &e).await;
                return;
            }
        };

        let progress: TransferProgress = outcome.progress().clone().into();
        send(sender, MessageType::TransferProgress, &progress);

        match outcome {
            IngestOutcome::Progress(_) => {}
            IngestOutcome::Completed { upload, .. } => {
                self.registry.remove_transfer(owner, transfer_id).await;
                deliver(sender, MessageType::TransferComplete, &transfer_complete(&upload)).await;

                let announced = FileUploaded {
                    file_name: upload.file_name.clone(),
                    file_size: upload.size,
                    uploaded_by: upload.owner.clone(),
                    upload_time: rfc3339(upload.finished_at),
                };
                self.notifier
                    .notify_others(owner, MessageType::FileUploaded, &announced)
                    .await;
            }
            IngestOutcome::Failed { error, .. } => {
                self.registry.remove_transfer(owner, transfer_id).await;
                send_transfer_error(sender, transfer_id, &error).await;
            }
        }
    }
}

impl Handler for TransferHandler {
    fn on_connected(&self, sender: Sender) -> HandlerFuture<'_> {
        Box::pin(async move {
            let welcome = Welcome {
                message: "Connected to FileDrop relay".into(),
                user_id: sender.connection_id().to_string(),
                server_time: rfc3339(Utc::now()),
            };
            send(&sender, MessageType::Welcome, &welcome);
        })
    }

    fn on_start_transfer(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse::<StartTransferRequest>(&sender, &msg) else {
                return;
            };
            let owner = sender.connection_id();

            match self
                .engine
                .initiate(
                    owner,
                    &req.file_name,
                    req.file_size,
                    req.declared_type(),
                    &req.transfer_id,
                )
                .await
            {
                Ok(storage_name) => {
                    self.registry.add_transfer(owner, &req.transfer_id).await;
                    let ready = TransferReady {
                        transfer_id: req.transfer_id.clone(),
                        unique_file_name: storage_name,
                    };
                    reply_reliable(&sender, &msg, MessageType::TransferReady, &ready).await;
                }
                Err(e) => {
                    tracing::info!(
                        transfer_id = %req.transfer_id,
                        connection_id = owner,
                        "transfer rejected: {e}"
                    );
                    send_transfer_error(&sender, &req.transfer_id, &e).await;
                }
            }
        })
    }

    fn on_file_chunk(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse::<FileChunkRequest>(&sender, &msg) else {
                return;
            };
            self.ingest_chunk(
                &sender,
                &req.transfer_id,
                req.chunk_index,
                req.chunk,
                req.total_chunks,
            )
            .await;
        })
    }

    fn on_binary_chunk(&self, sender: Sender, chunk: BinaryChunk) -> HandlerFuture<'_> {
        Box::pin(async move {
            let BinaryChunk { header, data } = chunk;
            self.ingest_chunk(
                &sender,
                &header.transfer_id,
                header.chunk_index,
                data,
                header.total_chunks,
            )
            .await;
        })
    }

    fn on_cancel_transfer(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse::<CancelTransferRequest>(&sender, &msg) else {
                return;
            };
            let owner = sender.connection_id();

            if self.engine.cancel(&req.transfer_id, owner).await == CancelOutcome::Cancelled {
                self.registry.remove_transfer(owner, &req.transfer_id).await;
                let cancelled = TransferCancelled {
                    transfer_id: req.transfer_id,
                };
                reply_reliable(&sender, &msg, MessageType::TransferCancelled, &cancelled).await;
            }
        })
    }

    fn on_request_download(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse::<RequestDownloadRequest>(&sender, &msg) else {
                return;
            };

            match self.engine.files().lookup(&req.file_name).await {
                Some(size) => {
                    let ready = DownloadReady {
                        file_path: public_path(&req.file_name),
                        file_name: req.file_name,
                        file_size: size,
                    };
                    reply(&sender, &msg, MessageType::DownloadReady, &ready);
                }
                None => {
                    let err = DownloadError {
                        file_name: req.file_name,
                        message: "File not found".into(),
                    };
                    reply(&sender, &msg, MessageType::DownloadError, &err);
                }
            }
        })
    }

    fn on_user_status(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse::<UserStatusRequest>(&sender, &msg) else {
                return;
            };
            let user_id = sender.connection_id();

            if self.registry.set_status(user_id, &req.status).await {
                let updated = UserUpdated {
                    user_id: user_id.to_string(),
                    status: req.status,
                };
                self.notifier
                    .notify_others(user_id, MessageType::UserUpdated, &updated)
                    .await;
            }
        })
    }

    fn on_get_stats(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let stats = StatsResponse {
                connected_users: self.registry.len().await,
                active_transfers: self.engine.active_count().await,
            };
            reply(&sender, &msg, MessageType::Stats, &stats);
        })
    }

    fn on_disconnected(&self, connection_id: String) -> HandlerFuture<'_> {
        Box::pin(async move {
            self.engine.on_connection_closed(&connection_id).await;
            let gone = UserDisconnected {
                user_id: connection_id.clone(),
            };
            self.notifier
                .notify_others(&connection_id, MessageType::UserDisconnected, &gone)
                .await;
        })
    }
}

/// Decodes a request payload, answering the sender with a 400 on failure.
fn parse<T: DeserializeOwned>(sender: &Sender, msg: &Message) -> Option<T> {
    match msg.require_payload() {
        Ok(req) => Some(req),
        Err(e) => {
            tracing::debug!(msg_type = ?msg.msg_type, "bad payload: {e}");
            let _ = sender.send_error(msg, WS_ERR_CODE_BAD_REQUEST, &e.to_string());
            None
        }
    }
}

fn reply<T: Serialize>(sender: &Sender, req: &Message, msg_type: MessageType, payload: &T) {
    match req.reply(msg_type, Some(payload)) {
        Ok(reply) => {
            let _ = sender.send_msg(reply);
        }
        Err(e) => tracing::error!("failed to build reply: {e}"),
    }
}

/// Replies with a message that must not be dropped on a full queue.
async fn reply_reliable<T: Serialize>(
    sender: &Sender,
    req: &Message,
    msg_type: MessageType,
    payload: &T,
) {
    match req.reply(msg_type, Some(payload)) {
        Ok(reply) => {
            let _ = sender.send_msg_reliable(reply).await;
        }
        Err(e) => tracing::error!("failed to build reply: {e}"),
    }
}

/// Best-effort event; dropped when the client's queue is full.
fn send<T: Serialize>(sender: &Sender, msg_type: MessageType, payload: &T) {
    let _ = sender.send_event(msg_type, payload);
}

/// Terminal event; waits for queue space.
async fn deliver<T: Serialize>(sender: &Sender, msg_type: MessageType, payload: &T) {
    let _ = sender.send_event_reliable(msg_type, payload).await;
}

async fn send_transfer_error(sender: &Sender, transfer_id: &str, error: &TransferError) {
    let event = TransferErrorEvent {
        transfer_id: transfer_id.to_string(),
        message: error.client_message(),
    };
    deliver(sender, MessageType::TransferError, &event).await;
}

fn transfer_complete(upload: &CompletedUpload) -> TransferComplete {
    TransferComplete {
        transfer_id: upload.transfer_id.clone(),
        file_name: upload.file_name.clone(),
        server_file_name: upload.storage_file_name.clone(),
        file_path: upload.file_path.clone(),
        stats: UploadStats {
            name: upload.file_name.clone(),
            size: upload.size,
            upload_date: rfc3339(upload.finished_at),
            upload_duration: upload.duration.as_millis() as u64,
            uploaded_by: upload.owner.clone(),
            server_file_name: upload.storage_file_name.clone(),
        },
    }
}

fn rfc3339(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use filedrop_relay_server::{BinaryChunkHeader, RelayServer, ServerConfig, encode_binary_chunk};
    use filedrop_transfer::{EngineConfig, FileStore, SessionStore};
    use futures_util::{SinkExt, StreamExt};
    use tempfile::TempDir;
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    struct Harness {
        _dir: TempDir,
        uploads: std::path::PathBuf,
        engine: Arc<TransferEngine>,
        server: Arc<RelayServer<TransferHandler>>,
        url: String,
    }

    impl Harness {
        async fn start() -> Self {
            let dir = TempDir::new().unwrap();
            let uploads = dir.path().join("uploads");
            let engine = Arc::new(TransferEngine::new(
                EngineConfig::default(),
                Arc::new(SessionStore::new()),
                FileStore::new(&uploads),
            ));
            let registry = Arc::new(ConnectionRegistry::new());
            let handler = Arc::new(TransferHandler::new(
                Arc::clone(&engine),
                Arc::clone(&registry),
            ));
            let server = RelayServer::new(ServerConfig { port: 0 }, handler, registry);
            let run = Arc::clone(&server);
            tokio::spawn(async move {
                run.run().await.unwrap();
            });

            let port = loop {
                let p = server.port().await;
                if p > 0 {
                    break p;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            };

            Self {
                _dir: dir,
                uploads,
                engine,
                server,
                url: format!("ws://127.0.0.1:{port}"),
            }
        }

        /// Connects and consumes the welcome, returning the connection id.
        async fn connect(&self) -> (Client, String) {
            let (mut ws, _) = tokio_tungstenite::connect_async(&self.url).await.unwrap();
            let welcome = expect(&mut ws, MessageType::Welcome).await;
            let welcome: Welcome = welcome.require_payload().unwrap();
            (ws, welcome.user_id)
        }
    }

    async fn send_json(ws: &mut Client, msg_type: MessageType, payload: &impl Serialize) {
        let msg = Message::new("req", msg_type, Some(payload)).unwrap();
        let text = serde_json::to_string(&msg).unwrap();
        ws.send(WsMessage::Text(text.into())).await.unwrap();
    }

    async fn next_msg(ws: &mut Client) -> Message {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for a message")
                .unwrap()
                .unwrap();
            if let WsMessage::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn expect(ws: &mut Client, msg_type: MessageType) -> Message {
        let msg = next_msg(ws).await;
        assert_eq!(msg.msg_type, msg_type, "unexpected message: {msg:?}");
        msg
    }

    async fn start_transfer(ws: &mut Client, id: &str, name: &str, size: u64) -> TransferReady {
        let req = StartTransferRequest {
            file_name: name.into(),
            file_size: size,
            file_type: Some("text/plain".into()),
            transfer_id: id.into(),
        };
        send_json(ws, MessageType::StartTransfer, &req).await;
        expect(ws, MessageType::TransferReady)
            .await
            .require_payload()
            .unwrap()
    }

    async fn send_chunk(ws: &mut Client, id: &str, index: u32, data: &[u8], total: u32) {
        let req = FileChunkRequest {
            transfer_id: id.into(),
            chunk: data.to_vec(),
            chunk_index: index,
            total_chunks: total,
        };
        send_json(ws, MessageType::FileChunk, &req).await;
    }

    #[tokio::test]
    async fn upload_completes_and_is_announced() {
        let h = Harness::start().await;
        let (mut a, a_id) = h.connect().await;
        let (mut b, _) = h.connect().await;

        let ready = start_transfer(&mut a, "t1", "a.txt", 128).await;
        assert!(ready.unique_file_name.ends_with("a.txt"));

        send_chunk(&mut a, "t1", 0, &[b'x'; 64], 2).await;
        let p: TransferProgress = expect(&mut a, MessageType::TransferProgress)
            .await
            .require_payload()
            .unwrap();
        assert_eq!(p.progress, 50);
        assert_eq!(p.received_size, 64);
        assert_eq!(p.total_size, 128);

        send_chunk(&mut a, "t1", 1, &[b'y'; 64], 2).await;
        let p: TransferProgress = expect(&mut a, MessageType::TransferProgress)
            .await
            .require_payload()
            .unwrap();
        assert_eq!(p.progress, 100);

        let done: TransferComplete = expect(&mut a, MessageType::TransferComplete)
            .await
            .require_payload()
            .unwrap();
        assert_eq!(done.file_name, "a.txt");
        assert_eq!(done.server_file_name, ready.unique_file_name);
        assert_eq!(done.file_path, format!("/uploads/{}", ready.unique_file_name));
        assert_eq!(done.stats.size, 128);
        assert_eq!(done.stats.uploaded_by, a_id);

        let stored = std::fs::read(h.uploads.join(&done.server_file_name)).unwrap();
        assert_eq!(stored.len(), 128);

        let announced: FileUploaded = expect(&mut b, MessageType::FileUploaded)
            .await
            .require_payload()
            .unwrap();
        assert_eq!(announced.file_name, "a.txt");
        assert_eq!(announced.file_size, 128);
        assert_eq!(announced.uploaded_by, a_id);

        // The uploader is not told about its own upload.
        send_json(&mut a, MessageType::GetStats, &serde_json::json!({})).await;
        let stats: StatsResponse = expect(&mut a, MessageType::Stats)
            .await
            .require_payload()
            .unwrap();
        assert_eq!(stats.connected_users, 2);
        assert_eq!(stats.active_transfers, 0);

        h.server.shutdown();
    }

    #[tokio::test]
    async fn rejected_start_gets_transfer_error() {
        let h = Harness::start().await;
        let (mut a, _) = h.connect().await;

        let req = StartTransferRequest {
            file_name: "big.zip".into(),
            file_size: 60 * 1024 * 1024,
            file_type: Some("application/zip".into()),
            transfer_id: "t1".into(),
        };
        send_json(&mut a, MessageType::StartTransfer, &req).await;
        let err: TransferErrorEvent = expect(&mut a, MessageType::TransferError)
            .await
            .require_payload()
            .unwrap();
        assert_eq!(err.transfer_id, "t1");
        assert_eq!(err.message, "File size exceeds maximum limit of 50MB");
        assert_eq!(h.engine.active_count().await, 0);

        h.server.shutdown();
    }

    #[tokio::test]
    async fn cancel_stops_transfer_and_writes_nothing() {
        let h = Harness::start().await;
        let (mut a, _) = h.connect().await;
        let (mut b, _) = h.connect().await;

        start_transfer(&mut a, "t1", "a.txt", 128).await;
        send_chunk(&mut a, "t1", 0, &[0; 64], 2).await;
        expect(&mut a, MessageType::TransferProgress).await;

        let cancel = CancelTransferRequest {
            transfer_id: "t1".into(),
        };
        send_json(&mut a, MessageType::CancelTransfer, &cancel).await;
        let cancelled: TransferCancelled = expect(&mut a, MessageType::TransferCancelled)
            .await
            .require_payload()
            .unwrap();
        assert_eq!(cancelled.transfer_id, "t1");

        send_chunk(&mut a, "t1", 1, &[0; 64], 2).await;
        let err: TransferErrorEvent = expect(&mut a, MessageType::TransferError)
            .await
            .require_payload()
            .unwrap();
        assert_eq!(err.message, "Transfer not found or expired");
        assert!(!h.uploads.exists() || std::fs::read_dir(&h.uploads).unwrap().next().is_none());

        // Nothing was announced: the next message `b` sees is its own reply.
        send_json(&mut b, MessageType::GetStats, &serde_json::json!({})).await;
        expect(&mut b, MessageType::Stats).await;

        h.server.shutdown();
    }

    #[tokio::test]
    async fn foreign_chunk_is_unauthorized() {
        let h = Harness::start().await;
        let (mut a, _) = h.connect().await;
        let (mut b, _) = h.connect().await;

        start_transfer(&mut a, "t1", "a.txt", 10).await;
        send_chunk(&mut b, "t1", 0, &[0; 10], 1).await;
        let err: TransferErrorEvent = expect(&mut b, MessageType::TransferError)
            .await
            .require_payload()
            .unwrap();
        assert_eq!(err.message, "Unauthorized transfer access");
        assert_eq!(h.engine.active_count().await, 1);

        h.server.shutdown();
    }

    #[tokio::test]
    async fn binary_frames_upload_like_json_chunks() {
        let h = Harness::start().await;
        let (mut a, _) = h.connect().await;

        let ready = start_transfer(&mut a, "t1", "raw.txt", 6).await;
        for (index, part) in [&b"abc"[..], &b"def"[..]].into_iter().enumerate() {
            let header = BinaryChunkHeader {
                transfer_id: "t1".into(),
                chunk_index: index as u32,
                total_chunks: 2,
            };
            let frame = encode_binary_chunk(&header, part).unwrap();
            a.send(WsMessage::Binary(frame.into())).await.unwrap();
            expect(&mut a, MessageType::TransferProgress).await;
        }
        expect(&mut a, MessageType::TransferComplete).await;

        let stored = std::fs::read(h.uploads.join(&ready.unique_file_name)).unwrap();
        assert_eq!(stored, b"abcdef");

        h.server.shutdown();
    }

    #[tokio::test]
    async fn disconnect_cleans_up_and_notifies_others() {
        let h = Harness::start().await;
        let (mut a, a_id) = h.connect().await;
        let (mut b, _) = h.connect().await;

        start_transfer(&mut a, "t1", "a.txt", 128).await;
        start_transfer(&mut b, "t2", "b.txt", 128).await;
        assert_eq!(h.engine.active_count().await, 2);

        a.close(None).await.unwrap();
        drop(a);

        let gone: UserDisconnected = expect(&mut b, MessageType::UserDisconnected)
            .await
            .require_payload()
            .unwrap();
        assert_eq!(gone.user_id, a_id);
        assert_eq!(h.engine.active_ids().await, vec!["t2"]);

        h.server.shutdown();
    }

    #[tokio::test]
    async fn status_updates_reach_other_clients() {
        let h = Harness::start().await;
        let (mut a, a_id) = h.connect().await;
        let (mut b, _) = h.connect().await;

        send_json(
            &mut a,
            MessageType::UserStatus,
            &UserStatusRequest {
                status: "away".into(),
            },
        )
        .await;
        let updated: UserUpdated = expect(&mut b, MessageType::UserUpdated)
            .await
            .require_payload()
            .unwrap();
        assert_eq!(updated.user_id, a_id);
        assert_eq!(updated.status, "away");

        h.server.shutdown();
    }

    #[tokio::test]
    async fn download_lookup() {
        let h = Harness::start().await;
        let (mut a, _) = h.connect().await;

        let ready = start_transfer(&mut a, "t1", "a.txt", 3).await;
        send_chunk(&mut a, "t1", 0, b"abc", 1).await;
        expect(&mut a, MessageType::TransferProgress).await;
        expect(&mut a, MessageType::TransferComplete).await;

        let req = RequestDownloadRequest {
            file_name: ready.unique_file_name.clone(),
        };
        send_json(&mut a, MessageType::RequestDownload, &req).await;
        let found: DownloadReady = expect(&mut a, MessageType::DownloadReady)
            .await
            .require_payload()
            .unwrap();
        assert_eq!(found.file_size, 3);
        assert_eq!(found.file_path, format!("/uploads/{}", ready.unique_file_name));

        let req = RequestDownloadRequest {
            file_name: "../secret".into(),
        };
        send_json(&mut a, MessageType::RequestDownload, &req).await;
        let missing: DownloadError = expect(&mut a, MessageType::DownloadError)
            .await
            .require_payload()
            .unwrap();
        assert_eq!(missing.message, "File not found");

        h.server.shutdown();
    }

    #[tokio::test]
    async fn missing_payload_is_bad_request() {
        let h = Harness::start().await;
        let (mut a, _) = h.connect().await;

        send_json(&mut a, MessageType::StartTransfer, &serde_json::Value::Null).await;
        let err = expect(&mut a, MessageType::Error).await;
        assert_eq!(err.error.unwrap().code, WS_ERR_CODE_BAD_REQUEST);

        h.server.shutdown();
    }

    fn one_byte(index: u32) -> BinaryChunk {
        BinaryChunk {
            header: BinaryChunkHeader {
                transfer_id: "t1".into(),
                chunk_index: index,
                total_chunks: 4,
            },
            data: vec![b'x'],
        }
    }

    #[tokio::test]
    async fn completion_survives_a_full_send_queue() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(TransferEngine::new(
            EngineConfig::default(),
            Arc::new(SessionStore::new()),
            FileStore::new(dir.path()),
        ));
        let handler = Arc::new(TransferHandler::new(
            Arc::clone(&engine),
            Arc::new(ConnectionRegistry::new()),
        ));
        let (sender, mut rx) = Sender::channel("c1", 3);

        let req = StartTransferRequest {
            file_name: "a.txt".into(),
            file_size: 4,
            file_type: None,
            transfer_id: "t1".into(),
        };
        let start = Message::new("m1", MessageType::StartTransfer, Some(&req)).unwrap();
        handler.on_start_transfer(sender.clone(), start).await;

        // Nobody drains the queue: the third progress snapshot is dropped.
        for index in 0..3 {
            handler.on_binary_chunk(sender.clone(), one_byte(index)).await;
        }

        let last = {
            let handler = Arc::clone(&handler);
            let sender = sender.clone();
            tokio::spawn(async move { handler.on_binary_chunk(sender, one_byte(3)).await })
        };

        let mut seen = Vec::new();
        while seen.last() != Some(&MessageType::TransferComplete) {
            let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for transfer-complete")
                .unwrap();
            let WsMessage::Text(text) = frame else {
                panic!("expected text frame");
            };
            let msg: Message = serde_json::from_str(&text).unwrap();
            seen.push(msg.msg_type);
        }
        last.await.unwrap();

        assert_eq!(seen.first(), Some(&MessageType::TransferReady));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(engine.active_count().await, 0);
    }
}
