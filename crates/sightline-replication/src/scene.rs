//! The seam between replication and the host's 3D scene.
//!
//! The protocol needs exactly four operations from the engine: create a
//! visual placeholder for a remote player, remove it, and read/write its
//! world transform. Placeholders are addressed by the owning player's guid,
//! which doubles as the entity's name in the host scene.

use std::collections::HashMap;

use sightline_net::{PlayerGuid, Transform};

/// Host-scene contract consumed by the replication manager.
pub trait PlaceholderScene {
    /// Insert a placeholder entity for `guid` at the identity frame.
    fn create_placeholder(&mut self, guid: PlayerGuid);

    /// Remove `guid`'s placeholder, if present.
    fn destroy_placeholder(&mut self, guid: PlayerGuid);

    /// Overwrite an entity's world transform. Unknown guids are ignored.
    fn set_transform(&mut self, guid: PlayerGuid, transform: Transform);

    /// Read an entity's world transform.
    ///
    /// Must answer for placeholders *and* for the locally controlled
    /// player(s), whose frames feed the outgoing snapshot batch.
    fn get_transform(&self, guid: PlayerGuid) -> Option<Transform>;
}

/// A minimal in-memory scene: a transform per guid.
///
/// Used by the test suites and by hosts that drive their visuals entirely
/// from the replication event stream.
#[derive(Debug, Default)]
pub struct MemoryScene {
    entities: HashMap<PlayerGuid, Transform>,
}

impl MemoryScene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a locally controlled entity (e.g. the client's own player).
    pub fn insert(&mut self, guid: PlayerGuid, transform: Transform) {
        self.entities.insert(guid, transform);
    }

    /// Number of entities currently in the scene.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the scene is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Whether `guid` has an entity in the scene.
    pub fn contains(&self, guid: PlayerGuid) -> bool {
        self.entities.contains_key(&guid)
    }
}

impl PlaceholderScene for MemoryScene {
    fn create_placeholder(&mut self, guid: PlayerGuid) {
        self.entities.entry(guid).or_insert(Transform::IDENTITY);
    }

    fn destroy_placeholder(&mut self, guid: PlayerGuid) {
        self.entities.remove(&guid);
    }

    fn set_transform(&mut self, guid: PlayerGuid, transform: Transform) {
        if let Some(slot) = self.entities.get_mut(&guid) {
            *slot = transform;
        }
    }

    fn get_transform(&self, guid: PlayerGuid) -> Option<Transform> {
        self.entities.get(&guid).copied()
    }
}
