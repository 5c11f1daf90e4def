use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use filedrop_protocol::TransferStatus;

use crate::TransferError;
use crate::progress::ProgressSnapshot;

/// Server-side record of one in-flight upload.
///
/// Not synchronized on its own; the [`SessionStore`](crate::SessionStore)
/// wraps each session in a mutex so chunk placement and the byte counter
/// are updated together.
#[derive(Debug)]
pub struct TransferSession {
    transfer_id: String,
    owner: String,
    file_name: String,
    declared_size: u64,
    declared_type: Option<String>,
    storage_file_name: String,
    chunks: BTreeMap<u32, Vec<u8>>,
    received_bytes: u64,
    expected_chunks: Option<u32>,
    started_at: Instant,
    last_activity: Instant,
    status: TransferStatus,
}

impl TransferSession {
    /// Creates a session in the `Receiving` state.
    pub fn new(
        transfer_id: impl Into<String>,
        owner: impl Into<String>,
        file_name: impl Into<String>,
        declared_size: u64,
        declared_type: Option<String>,
        storage_file_name: impl Into<String>,
    ) -> Self {
        let now = Instant::now();
        Self {
            transfer_id: transfer_id.into(),
            owner: owner.into(),
            file_name: file_name.into(),
            declared_size,
            declared_type,
            storage_file_name: storage_file_name.into(),
            chunks: BTreeMap::new(),
            received_bytes: 0,
            expected_chunks: None,
            started_at: now,
            last_activity: now,
            status: TransferStatus::Receiving,
        }
    }

    /// Places `data` at `index`.
    ///
    /// The byte counter is the sum of occupied slots, so a retransmitted
    /// chunk replaces its slot without being counted twice. A resend with a
    /// different length is refused because it would move the counter
    /// backwards. Nothing is mutated when an error is returned.
    pub fn accept_chunk(
        &mut self,
        index: u32,
        data: Vec<u8>,
        total_chunks: u32,
    ) -> Result<(), TransferError> {
        if self.status.is_terminal() {
            return Err(TransferError::NotFound(self.transfer_id.clone()));
        }

        if total_chunks > 0 && index >= total_chunks {
            return Err(TransferError::ChunkOutOfRange {
                index,
                total: total_chunks,
            });
        }

        let previous = self.chunks.get(&index).map_or(0, Vec::len);
        if self.chunks.contains_key(&index) && previous != data.len() {
            return Err(TransferError::ConflictingChunk {
                index,
                expected: previous,
                got: data.len(),
            });
        }

        let received = self.received_bytes - previous as u64 + data.len() as u64;
        if received > self.declared_size {
            return Err(TransferError::ExceedsDeclaredSize {
                declared: self.declared_size,
            });
        }

        self.chunks.insert(index, data);
        self.received_bytes = received;
        if total_chunks > 0 {
            self.expected_chunks = Some(total_chunks);
        }
        self.last_activity = Instant::now();
        Ok(())
    }

    /// Returns `true` once every declared byte is present in a gap-free
    /// run of chunks starting at index 0 (and, if the client announced a
    /// chunk count, exactly that many chunks).
    pub fn is_complete(&self) -> bool {
        if self.received_bytes < self.declared_size || self.chunks.is_empty() {
            return false;
        }
        let contiguous = self
            .chunks
            .keys()
            .next_back()
            .is_some_and(|&last| last as usize + 1 == self.chunks.len());
        let count_matches = self
            .expected_chunks
            .is_none_or(|n| n as usize == self.chunks.len());
        contiguous && count_matches
    }

    /// Concatenates the chunks in ascending index order, releasing them.
    pub fn assemble(&mut self) -> Vec<u8> {
        let chunks = std::mem::take(&mut self.chunks);
        let mut out = Vec::with_capacity(self.received_bytes as usize);
        for (_, data) in chunks {
            out.extend_from_slice(&data);
        }
        out
    }

    /// Progress snapshot as of now.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot_at(Instant::now())
    }

    /// Progress snapshot as of `now`.
    pub fn snapshot_at(&self, now: Instant) -> ProgressSnapshot {
        ProgressSnapshot::compute(
            &self.transfer_id,
            self.received_bytes,
            self.declared_size,
            now.saturating_duration_since(self.started_at),
        )
    }

    // -- State transitions --------------------------------------------------

    /// `Receiving → Completed`.
    pub fn complete(&mut self) -> Result<(), TransferError> {
        self.transition(TransferStatus::Completed)
    }

    /// `Receiving → Cancelled`, discarding every buffered chunk.
    pub fn cancel(&mut self) -> Result<(), TransferError> {
        self.transition(TransferStatus::Cancelled)?;
        self.chunks.clear();
        Ok(())
    }

    /// `Receiving → Failed`, discarding every buffered chunk.
    pub fn fail(&mut self) -> Result<(), TransferError> {
        self.transition(TransferStatus::Failed)?;
        self.chunks.clear();
        Ok(())
    }

    fn transition(&mut self, to: TransferStatus) -> Result<(), TransferError> {
        if self.status.is_terminal() || !to.is_terminal() {
            return Err(TransferError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    // -- Accessors ----------------------------------------------------------

    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    pub fn declared_type(&self) -> Option<&str> {
        self.declared_type.as_deref()
    }

    pub fn storage_file_name(&self) -> &str {
        &self.storage_file_name
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    /// Time since the session was created.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Time since the last accepted chunk (or creation).
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }
}
