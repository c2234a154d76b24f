use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio::sync::broadcast;

use crate::observability;

/// One broadcast group: a thread's conversation room or a user's
/// personal room for out-of-band delivery.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum RoomKey {
    Thread(String),
    User(String),
}

impl RoomKey {
    pub fn kind(&self) -> &'static str {
        match self {
            RoomKey::Thread(_) => "thread",
            RoomKey::User(_) => "user",
        }
    }
}

/// A frame fanned out to a room. `skip_user` lets typing and read
/// relays exclude their originator; the forwarding side filters, so one
/// publish reaches every other member.
#[derive(Clone, Debug)]
pub struct RoomEvent {
    pub event: &'static str,
    pub frame: String,
    pub skip_user: Option<String>,
}

/// In-memory room registry: the only mutable state shared across
/// connections, owned entirely by this type. A multi-instance
/// deployment swaps this for a distributed registry without touching
/// the handlers or services above it.
pub struct RoomRegistry {
    buffer: usize,
    rooms: RwLock<HashMap<RoomKey, broadcast::Sender<RoomEvent>>>,
}

impl RoomRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub async fn subscribe(&self, key: &RoomKey) -> broadcast::Receiver<RoomEvent> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .subscribe()
    }

    /// Delivers to current subscribers; returns how many there were.
    /// A room whose last subscriber is gone is pruned on the way out.
    pub async fn publish(&self, key: &RoomKey, event: RoomEvent) -> usize {
        let receivers = {
            let rooms = self.rooms.read().await;
            match rooms.get(key) {
                Some(sender) => sender.send(event.clone()).unwrap_or(0),
                None => 0,
            }
        };
        if receivers == 0 {
            self.prune(key).await;
        }
        observability::register_room_broadcast(key.kind(), event.event, receivers);
        receivers
    }

    pub async fn prune(&self, key: &RoomKey) {
        let mut rooms = self.rooms.write().await;
        if let Some(sender) = rooms.get(key) {
            if sender.receiver_count() == 0 {
                rooms.remove(key);
            }
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
