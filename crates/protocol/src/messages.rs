use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Starts a new upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransferRequest {
    pub file_name: String,
    pub file_size: u64,
    /// Declared MIME type. Absent and empty both mean "not declared".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    pub transfer_id: String,
}

impl StartTransferRequest {
    /// Returns the declared type, treating an empty string as absent.
    pub fn declared_type(&self) -> Option<&str> {
        self.file_type.as_deref().filter(|t| !t.is_empty())
    }
}

/// Sends one chunk of upload data.
///
/// `chunk` is base64-encoded in JSON. Binary frames carry the same fields
/// in their header and the raw bytes as payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChunkRequest {
    pub transfer_id: String,
    #[serde(with = "base64_bytes")]
    pub chunk: Vec<u8>,
    pub chunk_index: u32,
    #[serde(default)]
    pub total_chunks: u32,
}

/// Cancels an active upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTransferRequest {
    pub transfer_id: String,
}

/// Asks whether a persisted file is available for download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDownloadRequest {
    pub file_name: String,
}

/// Reports the client's presence status (e.g. "online", "away").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStatusRequest {
    pub status: String,
}

// ---------------------------------------------------------------------------
// Replies to the requesting connection
// ---------------------------------------------------------------------------

/// Sent once right after the WebSocket upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub message: String,
    pub user_id: String,
    pub server_time: String,
}

/// Acknowledges a successful `start-transfer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReady {
    pub transfer_id: String,
    pub unique_file_name: String,
}

/// Progress snapshot emitted after every accepted chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub transfer_id: String,
    /// Whole percent, 0-100.
    pub progress: u8,
    pub received_size: u64,
    pub total_size: u64,
    /// Bytes per second since the transfer started.
    pub speed: u64,
    /// `"12s"`, `"3m"`, `"1h"`; `null` while the speed is unknown.
    pub estimated_time: Option<String>,
}

/// Details of a persisted upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStats {
    pub name: String,
    pub size: u64,
    pub upload_date: String,
    /// Milliseconds from `start-transfer` to the file being stored.
    pub upload_duration: u64,
    pub uploaded_by: String,
    pub server_file_name: String,
}

/// Terminal success for an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferComplete {
    pub transfer_id: String,
    pub file_name: String,
    pub server_file_name: String,
    pub file_path: String,
    pub stats: UploadStats,
}

/// Terminal failure or rejection for an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferErrorEvent {
    pub transfer_id: String,
    pub message: String,
}

/// Acknowledges a cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferCancelled {
    pub transfer_id: String,
}

/// A persisted file is available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadReady {
    pub file_name: String,
    pub file_size: u64,
    pub file_path: String,
}

/// A requested file could not be found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadError {
    pub file_name: String,
    pub message: String,
}

/// Relay-wide counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub connected_users: usize,
    pub active_transfers: usize,
}

// ---------------------------------------------------------------------------
// Broadcasts to other connections
// ---------------------------------------------------------------------------

/// Another client finished an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploaded {
    pub file_name: String,
    pub file_size: u64,
    pub uploaded_by: String,
    pub upload_time: String,
}

/// Another client changed its presence status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdated {
    pub user_id: String,
    pub status: String,
}

/// Another client went away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDisconnected {
    pub user_id: String,
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
