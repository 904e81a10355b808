//! Bidirectional room / participant index.

use std::collections::{BTreeSet, HashMap};

/// In-memory index mapping rooms to their members and participants to the
/// rooms they belong to. The two maps are kept as mirror images under every
/// mutation; entries that empty out are deleted rather than retained.
///
/// The index itself is pure bookkeeping: no I/O, no locking. Callers that
/// share one across tasks are responsible for serializing access.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<String, BTreeSet<String>>,
    participant_rooms: HashMap<String, BTreeSet<String>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a room exists with at least an empty member set. Idempotent.
    pub fn create_room(&mut self, room_id: &str) {
        self.rooms.entry(room_id.to_string()).or_default();
    }

    /// Add a participant to a room, creating the room if absent.
    /// Idempotent for a repeated (room, participant) pair.
    pub fn add_participant(&mut self, room_id: &str, participant_id: &str) {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(participant_id.to_string());
        self.participant_rooms
            .entry(participant_id.to_string())
            .or_default()
            .insert(room_id.to_string());
    }

    /// Remove a participant from a room. The participant record is purged
    /// once it belongs to no rooms. The room itself stays, even when empty;
    /// deleting it is a separate decision made through [`remove_room`].
    ///
    /// [`remove_room`]: RoomDirectory::remove_room
    pub fn remove_participant(&mut self, room_id: &str, participant_id: &str) {
        if let Some(members) = self.rooms.get_mut(room_id) {
            members.remove(participant_id);
        }
        if let Some(rooms) = self.participant_rooms.get_mut(participant_id) {
            rooms.remove(room_id);
            if rooms.is_empty() {
                self.participant_rooms.remove(participant_id);
            }
        }
    }

    /// Delete a room, removing it from every member's room set. Members left
    /// with no rooms are purged. No-op for unknown rooms.
    pub fn remove_room(&mut self, room_id: &str) {
        let Some(members) = self.rooms.remove(room_id) else {
            return;
        };
        for participant_id in members {
            if let Some(rooms) = self.participant_rooms.get_mut(&participant_id) {
                rooms.remove(room_id);
                if rooms.is_empty() {
                    self.participant_rooms.remove(&participant_id);
                }
            }
        }
    }

    /// Members of a room in deterministic order. Empty for unknown rooms.
    pub fn participants_of(&self, room_id: &str) -> Vec<String> {
        self.rooms
            .get(room_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Rooms a participant belongs to. Empty for unknown participants.
    pub fn rooms_of(&self, participant_id: &str) -> Vec<String> {
        self.participant_rooms
            .get(participant_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of rooms currently present, empty ones included.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of participants currently tracked.
    pub fn participant_count(&self) -> usize {
        self.participant_rooms.len()
    }
}
