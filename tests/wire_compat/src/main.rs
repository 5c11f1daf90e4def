fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use filedrop_protocol::messages::*;
    use filedrop_protocol::{Message, MessageType};
    use filedrop_relay_server::BinaryChunkHeader;

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture file as text.
    fn load_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent comparison).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let text = load_fixture(name);
        let fixture: serde_json::Value = serde_json::from_str(&text)
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"));
        let parsed: T = serde_json::from_str(&text)
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized: serde_json::Value = serde_json::to_string(&parsed)
            .and_then(|s| serde_json::from_str(&s))
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  Rust: {reserialized}"
        );
        parsed
    }

    // --- Envelopes ---

    #[test]
    fn fixture_message_start_transfer() {
        let msg: Message = roundtrip_test("message_start_transfer.json");
        assert_eq!(msg.msg_type, MessageType::StartTransfer);
        let req: StartTransferRequest = msg.require_payload().unwrap();
        assert_eq!(req.file_size, 128);
    }

    #[test]
    fn fixture_message_error() {
        let msg: Message = roundtrip_test("message_error.json");
        assert_eq!(msg.msg_type, MessageType::Error);
        assert!(msg.payload.is_none());
        assert_eq!(msg.error.unwrap().code, 400);
    }

    #[test]
    fn fixture_message_file_uploaded() {
        let msg: Message = roundtrip_test("message_file_uploaded.json");
        assert_eq!(msg.msg_type, MessageType::FileUploaded);
        let event: FileUploaded = msg.require_payload().unwrap();
        assert_eq!(event.uploaded_by, "c1");
    }

    // --- Client requests ---

    #[test]
    fn fixture_start_transfer() {
        let req: StartTransferRequest = roundtrip_test("start_transfer.json");
        assert_eq!(req.declared_type(), Some("application/pdf"));
    }

    #[test]
    fn fixture_start_transfer_untyped() {
        let req: StartTransferRequest = roundtrip_test("start_transfer_untyped.json");
        assert_eq!(req.declared_type(), None);
    }

    #[test]
    fn fixture_file_chunk() {
        let req: FileChunkRequest = roundtrip_test("file_chunk.json");
        assert_eq!(req.chunk, b"hello world");
        assert_eq!(req.total_chunks, 2);
    }

    #[test]
    fn fixture_binary_chunk_header() {
        let header: BinaryChunkHeader = roundtrip_test("binary_chunk_header.json");
        assert_eq!(header.chunk_index, 1);
    }

    #[test]
    fn fixture_cancel_transfer() {
        roundtrip_test::<CancelTransferRequest>("cancel_transfer.json");
    }

    #[test]
    fn fixture_request_download() {
        roundtrip_test::<RequestDownloadRequest>("request_download.json");
    }

    #[test]
    fn fixture_user_status() {
        roundtrip_test::<UserStatusRequest>("user_status.json");
    }

    // --- Replies ---

    #[test]
    fn fixture_welcome() {
        roundtrip_test::<Welcome>("welcome.json");
    }

    #[test]
    fn fixture_transfer_ready() {
        let ready: TransferReady = roundtrip_test("transfer_ready.json");
        assert!(ready.unique_file_name.ends_with("_report.pdf"));
    }

    #[test]
    fn fixture_transfer_progress() {
        let p: TransferProgress = roundtrip_test("transfer_progress.json");
        assert_eq!(p.progress, 50);
        assert_eq!(p.estimated_time.as_deref(), Some("2s"));
    }

    #[test]
    fn fixture_transfer_progress_without_eta() {
        // estimatedTime is sent as an explicit null, not omitted.
        let p: TransferProgress = roundtrip_test("transfer_progress_no_eta.json");
        assert_eq!(p.estimated_time, None);
    }

    #[test]
    fn fixture_transfer_complete() {
        let done: TransferComplete = roundtrip_test("transfer_complete.json");
        assert_eq!(done.stats.upload_duration, 4000);
        assert_eq!(done.file_path, format!("/uploads/{}", done.server_file_name));
    }

    #[test]
    fn fixture_transfer_error() {
        roundtrip_test::<TransferErrorEvent>("transfer_error.json");
    }

    #[test]
    fn fixture_transfer_cancelled() {
        roundtrip_test::<TransferCancelled>("transfer_cancelled.json");
    }

    #[test]
    fn fixture_download_ready() {
        roundtrip_test::<DownloadReady>("download_ready.json");
    }

    #[test]
    fn fixture_download_error() {
        roundtrip_test::<DownloadError>("download_error.json");
    }

    #[test]
    fn fixture_stats() {
        let stats: StatsResponse = roundtrip_test("stats.json");
        assert_eq!(stats.connected_users, 3);
    }

    // --- Broadcasts ---

    #[test]
    fn fixture_file_uploaded() {
        roundtrip_test::<FileUploaded>("file_uploaded.json");
    }

    #[test]
    fn fixture_user_updated() {
        roundtrip_test::<UserUpdated>("user_updated.json");
    }

    #[test]
    fn fixture_user_disconnected() {
        roundtrip_test::<UserDisconnected>("user_disconnected.json");
    }
}
