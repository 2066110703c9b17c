//! In-memory registry of live connections and per-room online sets.
//!
//! Connections are ephemeral: they exist only while a socket is up and are
//! rebuilt from scratch on reconnect. Nothing here is a source of truth for
//! durable membership. All operations are synchronous and never held across
//! an await point.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use uuid::Uuid;

use crate::identity::Identity;

pub struct PresenceRegistry {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<Uuid, ConnectionEntry>,
    // room -> connection ids currently joined (distinct from durable membership)
    rooms: HashMap<Uuid, HashSet<Uuid>>,
}

struct ConnectionEntry {
    identity: Identity,
    joined_rooms: HashSet<Uuid>,
    last_seen: Instant,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, connection_id: Uuid, identity: Identity) {
        self.lock().connections.insert(
            connection_id,
            ConnectionEntry {
                identity,
                joined_rooms: HashSet::new(),
                last_seen: Instant::now(),
            },
        );
    }

    /// Removes the connection and clears it from every room it had joined,
    /// in one critical section so no partial state is observable.
    /// Returns the rooms it was joined to.
    pub fn unregister(&self, connection_id: Uuid) -> Vec<Uuid> {
        let mut inner = self.lock();
        let Some(entry) = inner.connections.remove(&connection_id) else {
            return Vec::new();
        };
        for room_id in &entry.joined_rooms {
            if let Some(conns) = inner.rooms.get_mut(room_id) {
                conns.remove(&connection_id);
                if conns.is_empty() {
                    inner.rooms.remove(room_id);
                }
            }
        }
        entry.joined_rooms.into_iter().collect()
    }

    pub fn join_room(&self, connection_id: Uuid, room_id: Uuid) {
        let mut inner = self.lock();
        let Some(entry) = inner.connections.get_mut(&connection_id) else {
            return;
        };
        entry.joined_rooms.insert(room_id);
        entry.last_seen = Instant::now();
        inner.rooms.entry(room_id).or_default().insert(connection_id);
    }

    pub fn leave_room(&self, connection_id: Uuid, room_id: Uuid) {
        let mut inner = self.lock();
        if let Some(entry) = inner.connections.get_mut(&connection_id) {
            entry.joined_rooms.remove(&room_id);
            entry.last_seen = Instant::now();
        }
        if let Some(conns) = inner.rooms.get_mut(&room_id) {
            conns.remove(&connection_id);
            if conns.is_empty() {
                inner.rooms.remove(&room_id);
            }
        }
    }

    pub fn touch(&self, connection_id: Uuid) {
        if let Some(entry) = self.lock().connections.get_mut(&connection_id) {
            entry.last_seen = Instant::now();
        }
    }

    pub fn identity_of(&self, connection_id: Uuid) -> Option<Identity> {
        self.lock().connections.get(&connection_id).map(|e| e.identity.clone())
    }

    pub fn last_seen(&self, connection_id: Uuid) -> Option<Instant> {
        self.lock().connections.get(&connection_id).map(|e| e.last_seen)
    }

    /// Identities with at least one live connection joined to the room,
    /// deduped across devices.
    pub fn online_members_of(&self, room_id: Uuid) -> Vec<Identity> {
        let inner = self.lock();
        let Some(conns) = inner.rooms.get(&room_id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut members = Vec::new();
        for conn_id in conns {
            if let Some(entry) = inner.connections.get(conn_id) {
                if seen.insert(entry.identity.id.clone()) {
                    members.push(entry.identity.clone());
                }
            }
        }
        members
    }

    /// Fan-out targets: every live connection joined to the room, with the
    /// identity that owns it.
    pub fn connections_in(&self, room_id: Uuid) -> Vec<(Uuid, String)> {
        let inner = self.lock();
        let Some(conns) = inner.rooms.get(&room_id) else {
            return Vec::new();
        };
        conns
            .iter()
            .filter_map(|conn_id| {
                inner
                    .connections
                    .get(conn_id)
                    .map(|e| (*conn_id, e.identity.id.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str) -> Identity {
        Identity { id: id.to_owned(), display_name: id.to_uppercase(), avatar: None }
    }

    #[test]
    fn join_and_online_members() {
        let registry = PresenceRegistry::new();
        let room = Uuid::now_v7();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());

        registry.register(a, identity("alice"));
        registry.register(b, identity("bob"));
        registry.join_room(a, room);
        registry.join_room(b, room);

        let mut online: Vec<_> = registry
            .online_members_of(room)
            .into_iter()
            .map(|i| i.id)
            .collect();
        online.sort();
        assert_eq!(online, ["alice", "bob"]);
    }

    #[test]
    fn multi_device_identity_deduped() {
        let registry = PresenceRegistry::new();
        let room = Uuid::now_v7();
        let (tab1, tab2) = (Uuid::now_v7(), Uuid::now_v7());

        registry.register(tab1, identity("alice"));
        registry.register(tab2, identity("alice"));
        registry.join_room(tab1, room);
        registry.join_room(tab2, room);

        assert_eq!(registry.online_members_of(room).len(), 1);
        assert_eq!(registry.connections_in(room).len(), 2);

        // closing one tab keeps the identity online
        registry.unregister(tab1);
        assert_eq!(registry.online_members_of(room).len(), 1);

        registry.unregister(tab2);
        assert!(registry.online_members_of(room).is_empty());
    }

    #[test]
    fn unregister_clears_every_room() {
        let registry = PresenceRegistry::new();
        let (r1, r2) = (Uuid::now_v7(), Uuid::now_v7());
        let conn = Uuid::now_v7();

        registry.register(conn, identity("alice"));
        registry.join_room(conn, r1);
        registry.join_room(conn, r2);

        let mut rooms = registry.unregister(conn);
        rooms.sort();
        let mut expected = vec![r1, r2];
        expected.sort();
        assert_eq!(rooms, expected);
        assert!(registry.online_members_of(r1).is_empty());
        assert!(registry.online_members_of(r2).is_empty());
    }

    #[test]
    fn leave_room_is_scoped() {
        let registry = PresenceRegistry::new();
        let (r1, r2) = (Uuid::now_v7(), Uuid::now_v7());
        let conn = Uuid::now_v7();

        registry.register(conn, identity("alice"));
        registry.join_room(conn, r1);
        registry.join_room(conn, r2);
        registry.leave_room(conn, r1);

        assert!(registry.online_members_of(r1).is_empty());
        assert_eq!(registry.online_members_of(r2).len(), 1);
    }

    #[test]
    fn unknown_connection_is_ignored() {
        let registry = PresenceRegistry::new();
        let room = Uuid::now_v7();
        registry.join_room(Uuid::now_v7(), room);
        assert!(registry.online_members_of(room).is_empty());
        assert!(registry.unregister(Uuid::now_v7()).is_empty());
        assert!(registry.last_seen(Uuid::now_v7()).is_none());
    }

    #[test]
    fn touch_advances_last_seen() {
        let registry = PresenceRegistry::new();
        let conn = Uuid::now_v7();
        registry.register(conn, identity("alice"));
        let before = registry.last_seen(conn).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        registry.touch(conn);
        assert!(registry.last_seen(conn).unwrap() > before);
    }
}
