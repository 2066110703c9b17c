//! Short-lived "who is typing" state with automatic expiry.
//!
//! Never persisted and never part of message history. Reads filter expired
//! entries, so no sweep is required for correctness; the gateway runs a
//! periodic [`TypingCoordinator::sweep`] anyway so observers see indicators
//! drop and the maps stay bounded between reads.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::identity::Identity;

pub const TYPING_TTL: Duration = Duration::from_secs(5);

pub struct TypingCoordinator {
    ttl: Duration,
    inner: Mutex<HashMap<Uuid, HashMap<String, Entry>>>,
}

struct Entry {
    identity: Identity,
    expires_at: Instant,
}

impl Default for TypingCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl TypingCoordinator {
    pub fn new() -> Self {
        Self::with_ttl(TYPING_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl, inner: Mutex::new(HashMap::new()) }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, HashMap<String, Entry>>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets or refreshes the typing state for `identity` in `room_id`.
    pub fn start(&self, room_id: Uuid, identity: Identity) {
        let expires_at = Instant::now() + self.ttl;
        self.lock()
            .entry(room_id)
            .or_default()
            .insert(identity.id.clone(), Entry { identity, expires_at });
    }

    /// Clears the state immediately. Returns whether a live entry existed
    /// (an already-expired one does not count).
    pub fn stop(&self, room_id: Uuid, identity_id: &str) -> bool {
        let mut inner = self.lock();
        let Some(room) = inner.get_mut(&room_id) else {
            return false;
        };
        let removed = room
            .remove(identity_id)
            .is_some_and(|e| e.expires_at > Instant::now());
        if room.is_empty() {
            inner.remove(&room_id);
        }
        removed
    }

    /// Identities currently typing in the room, expired entries filtered out.
    pub fn typists_of(&self, room_id: Uuid) -> Vec<Identity> {
        let now = Instant::now();
        let inner = self.lock();
        let Some(room) = inner.get(&room_id) else {
            return Vec::new();
        };
        room.values()
            .filter(|e| e.expires_at > now)
            .map(|e| e.identity.clone())
            .collect()
    }

    /// Drops every state owned by `identity_id` (disconnect path). Returns
    /// the rooms where a live entry was removed.
    pub fn clear_identity(&self, identity_id: &str) -> Vec<Uuid> {
        let now = Instant::now();
        let mut inner = self.lock();
        let mut cleared = Vec::new();
        inner.retain(|room_id, room| {
            if let Some(entry) = room.remove(identity_id) {
                if entry.expires_at > now {
                    cleared.push(*room_id);
                }
            }
            !room.is_empty()
        });
        cleared
    }

    /// Evicts expired entries, returning `(room, identity)` per eviction so
    /// the caller can emit typing-changed events.
    pub fn sweep(&self) -> Vec<(Uuid, Identity)> {
        let now = Instant::now();
        let mut inner = self.lock();
        let mut expired = Vec::new();
        inner.retain(|room_id, room| {
            room.retain(|_, entry| {
                if entry.expires_at > now {
                    true
                } else {
                    expired.push((*room_id, entry.identity.clone()));
                    false
                }
            });
            !room.is_empty()
        });
        expired
    }
}
