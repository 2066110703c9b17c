//! Fan-out of server events to live connections.
//!
//! One unbounded sender per connection; `broadcast` resolves the target set
//! through the presence registry at send time. Delivery is best-effort and
//! at-most-once: a sink whose connection is mid-disconnect is skipped
//! silently, and reconnecting clients reconcile through `history`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::ServerEvent;
use crate::presence::PresenceRegistry;

pub struct DeliveryBroker {
    registry: Arc<PresenceRegistry>,
    sinks: Mutex<HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>>,
}

impl DeliveryBroker {
    pub fn new(registry: Arc<PresenceRegistry>) -> Self {
        Self { registry, sinks: Mutex::new(HashMap::new()) }
    }

    fn sinks(&self) -> MutexGuard<'_, HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>> {
        self.sinks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register_sink(&self, connection_id: Uuid, sink: mpsc::UnboundedSender<ServerEvent>) {
        self.sinks().insert(connection_id, sink);
    }

    pub fn unregister_sink(&self, connection_id: Uuid) {
        self.sinks().remove(&connection_id);
    }

    /// Direct push to one connection (`rooms:list` snapshot, `error` frames).
    pub fn send_to(&self, connection_id: Uuid, event: ServerEvent) {
        if let Some(sink) = self.sinks().get(&connection_id) {
            let _ = sink.send(event);
        }
    }

    /// Pushes `event` to every connection currently joined to the room.
    /// `exclude_identity` drops every connection owned by that identity
    /// (typing events are not echoed to their originator); message events
    /// pass `None` so the sender's other devices stay consistent.
    pub fn broadcast(&self, room_id: Uuid, event: ServerEvent, exclude_identity: Option<&str>) {
        let targets = self.registry.connections_in(room_id);
        let sinks = self.sinks();
        for (connection_id, identity_id) in targets {
            if exclude_identity.is_some_and(|excluded| excluded == identity_id) {
                continue;
            }
            if let Some(sink) = sinks.get(&connection_id) {
                // a closed sink means the connection is tearing down
                let _ = sink.send(event.clone());
            }
        }
    }
}
