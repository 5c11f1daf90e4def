use serde::{Deserialize, Serialize};

/// Lifecycle state of a transfer session.
///
/// `Receiving` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Receiving,
    Completed,
    Cancelled,
    Failed,
}

impl TransferStatus {
    /// Returns `true` for `Completed`, `Cancelled` and `Failed`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Receiving)
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Receiving => "receiving",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}
