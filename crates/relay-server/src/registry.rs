use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::connection::Sender;

/// Status every connection starts with.
const DEFAULT_STATUS: &str = "online";

struct Entry {
    sender: Sender,
    connected_at: DateTime<Utc>,
    status: String,
    transfers: HashSet<String>,
}

/// Snapshot of one registered connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub connection_id: String,
    pub connected_at: DateTime<Utc>,
    pub status: String,
    /// Transfers this connection owns, sorted.
    pub transfers: Vec<String>,
}

/// Live connections, keyed by connection id.
///
/// Ownership of transfers is mirrored here for presence and stats; the
/// session store stays authoritative for access checks.
#[derive(Default)]
pub struct ConnectionRegistry {
    conns: RwLock<HashMap<String, Entry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection under its sender's id.
    pub async fn register(&self, sender: Sender) {
        let id = sender.connection_id().to_string();
        let entry = Entry {
            sender,
            connected_at: Utc::now(),
            status: DEFAULT_STATUS.into(),
            transfers: HashSet::new(),
        };
        self.conns.write().await.insert(id.clone(), entry);
        tracing::debug!(connection_id = %id, "connection registered");
    }

    /// Removes a connection, returning what it looked like.
    pub async fn unregister(&self, connection_id: &str) -> Option<ConnectionInfo> {
        let entry = self.conns.write().await.remove(connection_id)?;
        Some(info(connection_id, &entry))
    }

    pub async fn get(&self, connection_id: &str) -> Option<ConnectionInfo> {
        let conns = self.conns.read().await;
        conns.get(connection_id).map(|e| info(connection_id, e))
    }

    /// Records that `connection_id` owns `transfer_id`. Returns `false` if
    /// the connection is gone.
    pub async fn add_transfer(&self, connection_id: &str, transfer_id: &str) -> bool {
        let mut conns = self.conns.write().await;
        match conns.get_mut(connection_id) {
            Some(e) => {
                e.transfers.insert(transfer_id.to_string());
                true
            }
            None => false,
        }
    }

    pub async fn remove_transfer(&self, connection_id: &str, transfer_id: &str) {
        if let Some(e) = self.conns.write().await.get_mut(connection_id) {
            e.transfers.remove(transfer_id);
        }
    }

    /// Sets the presence status. Returns `false` if the connection is gone.
    pub async fn set_status(&self, connection_id: &str, status: &str) -> bool {
        let mut conns = self.conns.write().await;
        match conns.get_mut(connection_id) {
            Some(e) => {
                e.status = status.to_string();
                true
            }
            None => false,
        }
    }

    /// Senders of every connection except `excluding`.
    pub async fn senders_except(&self, excluding: &str) -> Vec<Sender> {
        let conns = self.conns.read().await;
        conns
            .iter()
            .filter(|(id, _)| id.as_str() != excluding)
            .map(|(_, e)| e.sender.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.conns.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conns.read().await.is_empty()
    }
}

fn info(connection_id: &str, entry: &Entry) -> ConnectionInfo {
    let mut transfers: Vec<String> = entry.transfers.iter().cloned().collect();
    transfers.sort();
    ConnectionInfo {
        connection_id: connection_id.to_string(),
        connected_at: entry.connected_at,
        status: entry.status.clone(),
        transfers,
    }
}
