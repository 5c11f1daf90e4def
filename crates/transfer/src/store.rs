use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::TransferError;
use crate::session::TransferSession;

/// A session handle shared between the store and in-flight operations.
pub type SharedSession = Arc<Mutex<TransferSession>>;

struct Entry {
    /// Copied out of the session so ownership scans never wait on a
    /// session lock.
    owner: String,
    session: SharedSession,
}

/// Authoritative map of in-flight uploads, keyed by transfer id.
///
/// The map lock is only held to look up, insert or remove entries; each
/// session has its own mutex, so chunks for different transfers never
/// contend. Callers that hold a session lock may take the map lock, never
/// the other way round.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Entry>>,
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session.
    ///
    /// Fails with [`TransferError::AlreadyActive`] if the id is in use.
    pub async fn insert(&self, session: TransferSession) -> Result<SharedSession, TransferError> {
        let id = session.transfer_id().to_string();
        let owner = session.owner().to_string();
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(TransferError::AlreadyActive(id));
        }
        let shared = Arc::new(Mutex::new(session));
        sessions.insert(
            id,
            Entry {
                owner,
                session: Arc::clone(&shared),
            },
        );
        Ok(shared)
    }

    /// Returns the session registered under `transfer_id`.
    pub async fn get(&self, transfer_id: &str) -> Option<SharedSession> {
        let sessions = self.sessions.read().await;
        sessions.get(transfer_id).map(|e| Arc::clone(&e.session))
    }

    /// Returns the owning connection of `transfer_id`.
    pub async fn owner_of(&self, transfer_id: &str) -> Option<String> {
        let sessions = self.sessions.read().await;
        sessions.get(transfer_id).map(|e| e.owner.clone())
    }

    /// Returns `true` if `session` is still the one registered under
    /// `transfer_id`.
    pub async fn is_current(&self, transfer_id: &str, session: &SharedSession) -> bool {
        let sessions = self.sessions.read().await;
        sessions
            .get(transfer_id)
            .is_some_and(|e| Arc::ptr_eq(&e.session, session))
    }

    /// Removes `transfer_id` only if it still maps to `session`.
    ///
    /// Returns `false` when someone else already removed it, which makes
    /// every terminal path remove a session exactly once.
    pub async fn remove_if_current(&self, transfer_id: &str, session: &SharedSession) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(transfer_id) {
            Some(e) if Arc::ptr_eq(&e.session, session) => {
                sessions.remove(transfer_id);
                true
            }
            _ => false,
        }
    }

    /// Removes and returns every session owned by `owner`.
    pub async fn remove_owned_by(&self, owner: &str) -> Vec<SharedSession> {
        let mut sessions = self.sessions.write().await;
        let ids: Vec<String> = sessions
            .iter()
            .filter(|(_, e)| e.owner == owner)
            .map(|(id, _)| id.clone())
            .collect();
        ids.iter()
            .filter_map(|id| sessions.remove(id))
            .map(|e| e.session)
            .collect()
    }

    /// Snapshot of every registered `(transfer_id, session)` pair.
    pub async fn entries(&self) -> Vec<(String, SharedSession)> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .map(|(id, e)| (id.clone(), Arc::clone(&e.session)))
            .collect()
    }

    /// Removes and returns every session.
    pub async fn drain(&self) -> Vec<SharedSession> {
        let mut sessions = self.sessions.write().await;
        sessions.drain().map(|(_, e)| e.session).collect()
    }

    /// Number of in-flight sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no session is in flight.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
