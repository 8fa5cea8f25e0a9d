//! Listener presence.
//!
//! Each session joins under a random id; the room reports how many distinct
//! ids are joined and pushes the count to subscribers on every change.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn random() -> Self {
        let n: u64 = rand::thread_rng().gen();
        Self(format!("{:016x}", n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PresenceEntry {
    pub id: SessionId,
    pub joined_at: DateTime<Utc>,
}

pub struct PresenceRoom {
    members: Mutex<HashMap<SessionId, DateTime<Utc>>>,
    count_tx: watch::Sender<usize>,
}

impl Default for PresenceRoom {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRoom {
    pub fn new() -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            members: Mutex::new(HashMap::new()),
            count_tx,
        }
    }

    fn members(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, DateTime<Utc>>> {
        self.members.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Join under a fresh random id.
    pub fn join(&self) -> SessionId {
        let id = SessionId::random();
        self.join_as(id.clone());
        id
    }

    /// Join under a known id.  Joining twice is a no-op.
    pub fn join_as(&self, id: SessionId) {
        let count = {
            let mut members = self.members();
            if members.contains_key(&id) {
                return;
            }
            members.insert(id.clone(), Utc::now());
            members.len()
        };
        debug!("presence: {} joined ({} listening)", id, count);
        self.count_tx.send_replace(count);
    }

    /// Returns false when the id was not joined.
    pub fn leave(&self, id: &SessionId) -> bool {
        let count = {
            let mut members = self.members();
            if members.remove(id).is_none() {
                return false;
            }
            members.len()
        };
        debug!("presence: {} left ({} listening)", id, count);
        self.count_tx.send_replace(count);
        true
    }

    pub fn count(&self) -> usize {
        self.members().len()
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// Joined sessions, oldest first.
    pub fn entries(&self) -> Vec<PresenceEntry> {
        let mut out: Vec<PresenceEntry> = self
            .members()
            .iter()
            .map(|(id, at)| PresenceEntry {
                id: id.clone(),
                joined_at: *at,
            })
            .collect();
        out.sort_by_key(|e| e.joined_at);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_hex_and_distinct() {
        let a = SessionId::random();
        let b = SessionId::random();
        assert_eq!(a.as_str().len(), 16);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_count_tracks_distinct_ids() {
        let room = PresenceRoom::new();
        let a = room.join();
        let b = room.join();
        assert_eq!(room.count(), 2);
        room.join_as(a.clone());
        assert_eq!(room.count(), 2);
        assert!(room.leave(&a));
        assert!(!room.leave(&a));
        assert_eq!(room.count(), 1);
        assert_eq!(room.entries()[0].id, b);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let room = PresenceRoom::new();
        let mut rx = room.subscribe();
        assert_eq!(*rx.borrow(), 0);
        let id = room.join();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);
        room.leave(&id);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 0);
    }
}
