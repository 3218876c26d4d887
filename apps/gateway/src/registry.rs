//! Per-instance connection and room registries.
//!
//! One lock covers both maps: a connection must never be visible in the
//! user map without its room membership (or vice versa), so insertions
//! and removals are atomic across the pair. Rooms are instance-local;
//! the fleet-wide room a client experiences is the union of same-named
//! rooms across all instances.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::channel::{Channel, PushError};

/// Local members of one room. Exists iff it has at least one member.
struct Room {
    members: HashMap<i64, Arc<Channel>>,
}

impl Room {
    fn new() -> Self {
        Self {
            members: HashMap::new(),
        }
    }
}

#[derive(Default)]
struct Maps {
    users: HashMap<i64, Arc<Channel>>,
    rooms: HashMap<i64, Room>,
}

/// Single point of mutation for connect/disconnect on this instance.
pub struct ConnectionRegistry {
    inner: RwLock<Maps>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Maps::default()),
        }
    }

    /// Install `channel` under `user_id` and join it to `room_id`,
    /// creating the room if absent. A previous connection for the same
    /// user is superseded and closed (last-writer-wins).
    pub fn register(&self, user_id: i64, room_id: i64, channel: Arc<Channel>) {
        let superseded = {
            let mut maps = self.inner.write();

            let old = maps.users.insert(user_id, Arc::clone(&channel));
            if let Some(old) = &old {
                // Drop the old handle's room membership, but only if the
                // slot still belongs to it.
                if let Some(room) = maps.rooms.get_mut(&old.room_id) {
                    if room.members.get(&user_id).is_some_and(|m| Arc::ptr_eq(m, old)) {
                        room.members.remove(&user_id);
                    }
                    if room.members.is_empty() && old.room_id != room_id {
                        maps.rooms.remove(&old.room_id);
                        tracing::debug!(room_id = old.room_id, "deleted empty room");
                    }
                }
            }

            // room_id 0 means the connection is not joining a room.
            if room_id != 0 {
                let room = maps.rooms.entry(room_id).or_insert_with(|| {
                    tracing::debug!(room_id, "created room");
                    Room::new()
                });
                room.members.insert(user_id, channel);
            }
            old
        };

        if let Some(old) = superseded {
            old.close();
            tracing::info!(user_id, "superseded older connection");
        }
        tracing::info!(user_id, room_id, "user registered");
    }

    /// Remove `user_id` from the registry and from `room_id`, deleting
    /// the room if it empties. Idempotent; a no-op for absent users.
    ///
    /// `channel` guards against a superseded connection's late teardown
    /// evicting its successor: entries are removed only while they still
    /// point at the given handle.
    pub fn unregister(&self, user_id: i64, room_id: i64, channel: &Arc<Channel>) {
        let mut maps = self.inner.write();

        if maps.users.get(&user_id).is_some_and(|c| Arc::ptr_eq(c, channel)) {
            maps.users.remove(&user_id);
            tracing::info!(user_id, room_id, "user unregistered");
        }

        if let Some(room) = maps.rooms.get_mut(&room_id) {
            if room.members.get(&user_id).is_some_and(|m| Arc::ptr_eq(m, channel)) {
                room.members.remove(&user_id);
            }
            if room.members.is_empty() {
                maps.rooms.remove(&room_id);
                tracing::debug!(room_id, "deleted empty room");
            }
        }
    }

    pub fn lookup(&self, user_id: i64) -> Option<Arc<Channel>> {
        self.inner.read().users.get(&user_id).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.inner.read().users.len()
    }

    pub fn room_len(&self, room_id: i64) -> usize {
        self.inner
            .read()
            .rooms
            .get(&room_id)
            .map_or(0, |room| room.members.len())
    }

    pub fn room_users(&self, room_id: i64) -> Vec<i64> {
        self.inner
            .read()
            .rooms
            .get(&room_id)
            .map(|room| room.members.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Enqueue `frame` to every local member of the room without ever
    /// blocking: a member with a full queue is closed as a slow/dead
    /// consumer so it cannot stall delivery to the others. Returns
    /// `false` only when the room has no local members.
    pub fn broadcast_local(&self, room_id: i64, frame: &str) -> bool {
        let members: Vec<(i64, Arc<Channel>)> = {
            let maps = self.inner.read();
            match maps.rooms.get(&room_id) {
                None => return false,
                Some(room) => room
                    .members
                    .iter()
                    .map(|(user_id, channel)| (*user_id, Arc::clone(channel)))
                    .collect(),
            }
        };

        for (user_id, channel) in members {
            match channel.try_push(frame.to_string()) {
                Ok(()) => {}
                Err(PushError::Full) => {
                    tracing::warn!(user_id, room_id, "outbound queue full, closing slow consumer");
                    channel.close();
                }
                Err(PushError::Closed) => {}
            }
        }
        true
    }
}
