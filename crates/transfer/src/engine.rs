//! Transfer protocol engine: initiation, chunk ingestion, completion,
//! cancellation and cleanup.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use filedrop_protocol::constants::{DEFAULT_ALLOWED_TYPES, DEFAULT_MAX_FILE_SIZE};
use tokio::sync::broadcast;

use crate::TransferError;
use crate::progress::ProgressSnapshot;
use crate::session::TransferSession;
use crate::storage::{FileStore, public_path, storage_file_name, validate_storage_name};
use crate::store::{SessionStore, SharedSession};
use crate::validation::validate_file_name;

/// Capacity of the lifecycle event channel. Slow subscribers lag and lose
/// events; the engine never waits for them.
const EVENT_CAPACITY: usize = 256;

/// Limits applied when a transfer is initiated.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Largest accepted declared size, in bytes.
    pub max_file_size: u64,
    /// Accepted content types. Empty accepts every type.
    pub allowed_types: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Why a session was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The owner sent `cancel-transfer`.
    Requested,
    /// The owning connection went away.
    Disconnected,
    /// The relay is shutting down.
    Shutdown,
}

/// Session lifecycle notifications for observers (stats, logging).
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Created {
        transfer_id: String,
        owner: String,
        file_name: String,
        declared_size: u64,
    },
    Progressed {
        transfer_id: String,
        received_bytes: u64,
        total_bytes: u64,
    },
    Completed {
        transfer_id: String,
        storage_file_name: String,
        size: u64,
    },
    Cancelled {
        transfer_id: String,
        reason: CancelReason,
    },
    Failed {
        transfer_id: String,
        reason: String,
    },
}

/// A file that was assembled and stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedUpload {
    pub transfer_id: String,
    pub owner: String,
    /// Name the client declared.
    pub file_name: String,
    /// Collision-free name on disk.
    pub storage_file_name: String,
    /// Public URL path, e.g. `/uploads/1700000000000_a.txt`.
    pub file_path: String,
    pub size: u64,
    pub duration: Duration,
    pub finished_at: DateTime<Utc>,
}

/// Result of an accepted chunk.
#[derive(Debug)]
pub enum IngestOutcome {
    /// More chunks are expected.
    Progress(ProgressSnapshot),
    /// This chunk finished the file and it was stored.
    Completed {
        progress: ProgressSnapshot,
        upload: CompletedUpload,
    },
    /// This chunk finished the file but storing it failed; the session is
    /// gone.
    Failed {
        progress: ProgressSnapshot,
        error: TransferError,
    },
}

impl IngestOutcome {
    /// The snapshot taken right after the chunk was placed.
    pub fn progress(&self) -> &ProgressSnapshot {
        match self {
            Self::Progress(p) => p,
            Self::Completed { progress, .. } | Self::Failed { progress, .. } => progress,
        }
    }
}

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// Unknown id, not the owner, or already finished.
    Noop,
}

/// Drives every upload session through its lifecycle.
pub struct TransferEngine {
    config: EngineConfig,
    store: Arc<SessionStore>,
    files: FileStore,
    events: broadcast::Sender<LifecycleEvent>,
    last_stamp: AtomicI64,
}

impl TransferEngine {
    /// Creates an engine over a shared session store and a file store.
    pub fn new(config: EngineConfig, store: Arc<SessionStore>, files: FileStore) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            store,
            files,
            events,
            last_stamp: AtomicI64::new(0),
        }
    }

    /// Returns the session store.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Returns the file store uploads are persisted to.
    pub fn files(&self) -> &FileStore {
        &self.files
    }

    /// Returns the configured limits.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Number of uploads currently in flight.
    pub async fn active_count(&self) -> usize {
        self.store.len().await
    }

    /// Ids of the uploads currently in flight, sorted.
    pub async fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .store
            .entries()
            .await
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    /// Validates a transfer request and opens a session for it.
    ///
    /// Returns the storage name on success. A rejection leaves no trace.
    pub async fn initiate(
        &self,
        owner: &str,
        file_name: &str,
        declared_size: u64,
        declared_type: Option<&str>,
        transfer_id: &str,
    ) -> Result<String, TransferError> {
        if declared_size > self.config.max_file_size {
            return Err(TransferError::FileTooLarge {
                size: declared_size,
                max: self.config.max_file_size,
            });
        }

        if let Some(t) = declared_type {
            let allowed = &self.config.allowed_types;
            if !allowed.is_empty() && !allowed.iter().any(|a| a == t) {
                return Err(TransferError::TypeNotAllowed(t.to_string()));
            }
        }

        validate_file_name(file_name)?;
        let storage_name = storage_file_name(self.next_stamp(), file_name);
        validate_storage_name(&storage_name)?;

        let session = TransferSession::new(
            transfer_id,
            owner,
            file_name,
            declared_size,
            declared_type.map(str::to_string),
            storage_name.clone(),
        );
        self.store.insert(session).await?;

        tracing::info!(
            transfer_id,
            owner,
            file_name,
            declared_size,
            "transfer started"
        );
        self.emit(LifecycleEvent::Created {
            transfer_id: transfer_id.to_string(),
            owner: owner.to_string(),
            file_name: file_name.to_string(),
            declared_size,
        });
        Ok(storage_name)
    }

    /// Places one chunk and, if it completes the file, assembles and
    /// persists it.
    pub async fn ingest(
        &self,
        transfer_id: &str,
        requester: &str,
        chunk_index: u32,
        data: Vec<u8>,
        total_chunks: u32,
    ) -> Result<IngestOutcome, TransferError> {
        let not_found = || TransferError::NotFound(transfer_id.to_string());
        let shared = self.store.get(transfer_id).await.ok_or_else(not_found)?;
        let mut session = shared.lock().await;

        // A cancel or disconnect that got the lock first wins.
        if session.status().is_terminal()
            || !self.store.is_current(transfer_id, &shared).await
        {
            return Err(not_found());
        }

        if session.owner() != requester {
            tracing::warn!(transfer_id, requester, "chunk from non-owning connection");
            return Err(TransferError::Unauthorized(transfer_id.to_string()));
        }

        session.accept_chunk(chunk_index, data, total_chunks)?;
        let progress = session.snapshot();
        self.emit(LifecycleEvent::Progressed {
            transfer_id: transfer_id.to_string(),
            received_bytes: progress.received_bytes,
            total_bytes: progress.total_bytes,
        });

        if !session.is_complete() {
            return Ok(IngestOutcome::Progress(progress));
        }

        if !self.store.remove_if_current(transfer_id, &shared).await {
            return Err(not_found());
        }

        // Copy everything needed out of the session, then write without
        // holding any lock.
        let bytes = session.assemble();
        let storage_name = session.storage_file_name().to_string();
        let file_name = session.file_name().to_string();
        let owner = session.owner().to_string();
        let elapsed = session.elapsed();
        drop(session);
        let write_started = Instant::now();

        match self.files.persist(&storage_name, &bytes).await {
            Ok(_) => {
                shared.lock().await.complete()?;
                let duration = elapsed + write_started.elapsed();
                tracing::info!(
                    transfer_id,
                    storage_name = %storage_name,
                    bytes = bytes.len(),
                    duration_ms = duration.as_millis() as u64,
                    "file saved"
                );
                self.emit(LifecycleEvent::Completed {
                    transfer_id: transfer_id.to_string(),
                    storage_file_name: storage_name.clone(),
                    size: bytes.len() as u64,
                });
                Ok(IngestOutcome::Completed {
                    progress,
                    upload: CompletedUpload {
                        transfer_id: transfer_id.to_string(),
                        owner,
                        file_name,
                        file_path: public_path(&storage_name),
                        storage_file_name: storage_name,
                        size: bytes.len() as u64,
                        duration,
                        finished_at: Utc::now(),
                    },
                })
            }
            Err(error) => {
                shared.lock().await.fail()?;
                tracing::error!(transfer_id, storage_name = %storage_name, "error saving file: {error}");
                self.emit(LifecycleEvent::Failed {
                    transfer_id: transfer_id.to_string(),
                    reason: error.to_string(),
                });
                Ok(IngestOutcome::Failed { progress, error })
            }
        }
    }

    /// Cancels a transfer on behalf of `requester`.
    ///
    /// Only the owner can cancel; everyone else gets a silent no-op.
    pub async fn cancel(&self, transfer_id: &str, requester: &str) -> CancelOutcome {
        let Some(shared) = self.store.get(transfer_id).await else {
            return CancelOutcome::Noop;
        };
        let mut session = shared.lock().await;
        if session.owner() != requester || session.status().is_terminal() {
            return CancelOutcome::Noop;
        }
        if !self.store.remove_if_current(transfer_id, &shared).await {
            return CancelOutcome::Noop;
        }
        if session.cancel().is_err() {
            return CancelOutcome::Noop;
        }
        tracing::info!(
            transfer_id,
            requester,
            file_name = session.file_name(),
            "transfer cancelled"
        );
        drop(session);
        self.emit(LifecycleEvent::Cancelled {
            transfer_id: transfer_id.to_string(),
            reason: CancelReason::Requested,
        });
        CancelOutcome::Cancelled
    }

    /// Discards every session owned by `connection_id`.
    ///
    /// Returns how many sessions were removed.
    pub async fn on_connection_closed(&self, connection_id: &str) -> usize {
        let reaped = self.store.remove_owned_by(connection_id).await;
        let count = reaped.len();
        self.cancel_all(reaped, CancelReason::Disconnected).await;
        if count > 0 {
            tracing::info!(connection_id, count, "cleaned up transfers for closed connection");
        }
        count
    }

    /// Fails every `Receiving` session that has not seen a chunk for
    /// `max_idle`.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut expired = 0;
        for (transfer_id, shared) in self.store.entries().await {
            let mut session = shared.lock().await;
            if session.status().is_terminal() || session.idle_for(now) < max_idle {
                continue;
            }
            if !self.store.remove_if_current(&transfer_id, &shared).await {
                continue;
            }
            if session.fail().is_ok() {
                expired += 1;
                tracing::warn!(
                    transfer_id = %transfer_id,
                    owner = session.owner(),
                    received = session.received_bytes(),
                    "expired idle transfer"
                );
                self.emit(LifecycleEvent::Failed {
                    transfer_id,
                    reason: "idle timeout".into(),
                });
            }
        }
        expired
    }

    /// Cancels every in-flight session. Called once on relay shutdown.
    pub async fn shutdown(&self) -> usize {
        let drained = self.store.drain().await;
        let count = drained.len();
        self.cancel_all(drained, CancelReason::Shutdown).await;
        if count > 0 {
            tracing::info!(count, "cancelled in-flight transfers on shutdown");
        }
        count
    }

    async fn cancel_all(&self, sessions: Vec<SharedSession>, reason: CancelReason) {
        for shared in sessions {
            let mut session = shared.lock().await;
            if session.cancel().is_ok() {
                tracing::debug!(
                    transfer_id = session.transfer_id(),
                    ?reason,
                    "discarded partial transfer"
                );
                self.emit(LifecycleEvent::Cancelled {
                    transfer_id: session.transfer_id().to_string(),
                    reason,
                });
            }
        }
    }

    /// Milliseconds since the epoch, strictly increasing across calls so
    /// two uploads of the same name never share a storage name.
    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last_stamp.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self.last_stamp.compare_exchange_weak(
                prev,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
