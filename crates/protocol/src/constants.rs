use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Time to wait for a pong response (or any incoming frame).
///
/// Acts as a read deadline: if nothing arrives within this window the
/// connection is considered dead and its transfers are reaped.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often the relay pings each client.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(20);

/// Maximum WebSocket message size in bytes (72 MiB).
///
/// Must exceed [`DEFAULT_MAX_FILE_SIZE`] as base64 plus the JSON envelope
/// so a client may send a whole file as a single chunk.
pub const WS_MAX_MESSAGE_SIZE: usize = 72 * 1024 * 1024;

/// Default upper bound on a declared upload size (50 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Content types accepted when no allow-list is configured.
pub const DEFAULT_ALLOWED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
    "text/csv",
    "application/json",
    "application/xml",
    "video/mp4",
    "video/avi",
    "video/mov",
    "video/wmv",
    "audio/mpeg",
    "audio/wav",
    "audio/ogg",
    "audio/mp3",
    "application/zip",
    "application/x-rar-compressed",
    "application/x-7z-compressed",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
];

/// URL prefix under which persisted uploads are served.
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

/// WebSocket message type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Connection management
    #[serde(rename = "welcome")]
    Welcome,
    #[serde(rename = "user-status")]
    UserStatus,
    #[serde(rename = "user-updated")]
    UserUpdated,
    #[serde(rename = "user-disconnected")]
    UserDisconnected,
    #[serde(rename = "get-stats")]
    GetStats,
    #[serde(rename = "stats")]
    Stats,

    // Upload requests from client to relay
    #[serde(rename = "start-transfer")]
    StartTransfer,
    #[serde(rename = "file-chunk")]
    FileChunk,
    #[serde(rename = "cancel-transfer")]
    CancelTransfer,
    #[serde(rename = "request-download")]
    RequestDownload,

    // Replies from relay to the uploading client
    #[serde(rename = "transfer-ready")]
    TransferReady,
    #[serde(rename = "transfer-progress")]
    TransferProgress,
    #[serde(rename = "transfer-complete")]
    TransferComplete,
    #[serde(rename = "transfer-error")]
    TransferError,
    #[serde(rename = "transfer-cancelled")]
    TransferCancelled,
    #[serde(rename = "download-ready")]
    DownloadReady,
    #[serde(rename = "download-error")]
    DownloadError,
    #[serde(rename = "error")]
    Error,

    // Broadcasts to every other connection
    #[serde(rename = "file-uploaded")]
    FileUploaded,

    /// Forward compatibility: unknown message types deserialize here.
    #[serde(other)]
    Unknown,
}

/// Common WebSocket error codes.
pub const WS_ERR_CODE_BAD_REQUEST: i32 = 400;
pub const WS_ERR_CODE_NOT_IMPLEMENTED: i32 = 501;
