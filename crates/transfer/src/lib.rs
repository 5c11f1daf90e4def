//! Chunked upload sessions for the FileDrop relay.
//!
//! A client declares a file with `start-transfer`, streams indexed chunks,
//! and the [`TransferEngine`] assembles and persists the file once every
//! declared byte has arrived. Sessions live in a [`SessionStore`] that the
//! engine shares with whoever needs ownership facts.

mod engine;
mod progress;
mod session;
mod storage;
mod store;
mod validation;

use filedrop_protocol::TransferStatus;

pub use engine::{
    CancelOutcome, CancelReason, CompletedUpload, EngineConfig, IngestOutcome, LifecycleEvent,
    TransferEngine,
};
pub use progress::{ProgressSnapshot, format_eta, percent_complete, throughput};
pub use session::TransferSession;
pub use storage::{FileStore, public_path, storage_file_name, validate_storage_name};
pub use store::{SessionStore, SharedSession};
pub use validation::validate_file_name;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("file size {size} exceeds maximum limit of {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("file type not allowed: {0}")]
    TypeNotAllowed(String),

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("transfer already in progress: {0}")]
    AlreadyActive(String),

    #[error("transfer not found or expired: {0}")]
    NotFound(String),

    #[error("unauthorized access to transfer {0}")]
    Unauthorized(String),

    #[error("chunk would exceed declared size of {declared} bytes")]
    ExceedsDeclaredSize { declared: u64 },

    #[error("chunk index {index} out of range for {total} chunks")]
    ChunkOutOfRange { index: u32, total: u32 },

    #[error("chunk {index} resent with {got} bytes, previously {expected}")]
    ConflictingChunk { index: u32, expected: usize, got: usize },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: TransferStatus,
        to: TransferStatus,
    },

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

/// Coarse classification used to decide how an error is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad request at initiation or a malformed chunk; non-fatal.
    RejectedRequest,
    /// A connection touched a transfer it does not own.
    UnauthorizedAccess,
    /// Unknown or already-finished transfer id.
    NotFound,
    /// Writing the assembled file failed.
    StorageFailure,
    /// A state machine transition that cannot happen.
    InvalidState,
}

impl TransferError {
    /// Returns the error's category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileTooLarge { .. }
            | Self::TypeNotAllowed(_)
            | Self::InvalidFileName(_)
            | Self::AlreadyActive(_)
            | Self::ExceedsDeclaredSize { .. }
            | Self::ChunkOutOfRange { .. }
            | Self::ConflictingChunk { .. } => ErrorKind::RejectedRequest,
            Self::Unauthorized(_) => ErrorKind::UnauthorizedAccess,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Storage(_) => ErrorKind::StorageFailure,
            Self::InvalidTransition { .. } => ErrorKind::InvalidState,
        }
    }

    /// Human-readable text sent to the client in `transfer-error`.
    pub fn client_message(&self) -> String {
        match self {
            Self::FileTooLarge { max, .. } => format!(
                "File size exceeds maximum limit of {}MB",
                max / (1024 * 1024)
            ),
            Self::TypeNotAllowed(_) => "File type not allowed".into(),
            Self::InvalidFileName(_) => "Invalid file name".into(),
            Self::AlreadyActive(_) => "Transfer already in progress".into(),
            Self::NotFound(_) => "Transfer not found or expired".into(),
            Self::Unauthorized(_) => "Unauthorized transfer access".into(),
            Self::Storage(_) => "Error saving file to server".into(),
            Self::ExceedsDeclaredSize { .. }
            | Self::ChunkOutOfRange { .. }
            | Self::ConflictingChunk { .. }
            | Self::InvalidTransition { .. } => {
                let mut msg = self.to_string();
                if let Some(first) = msg.get_mut(0..1) {
                    first.make_ascii_uppercase();
                }
                msg
            }
        }
    }
}
