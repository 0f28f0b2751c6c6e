//! Entity replication manager: placeholder lifecycle and snapshot
//! application/production.
//!
//! Placeholders are created and destroyed *only* by the explicit lifecycle
//! messages (or, on the server, by registration itself) — an inbound update
//! for an unknown guid is dropped, never implicitly spawned. Updates for a
//! locally-owned guid are dropped too, so a relayed echo of our own frames
//! can never feed back into the local player.

use std::collections::HashSet;

use tracing::{debug, warn};

use sightline_net::{EntityRecord, MAX_BATCH_RECORDS, Message, PlayerGuid, UpdateKind};

use crate::scene::PlaceholderScene;

/// Which entities feed the outgoing snapshot batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchScope {
    /// Only locally-owned players (a client snapshots just itself).
    OwnedOnly,
    /// Locally-owned players plus every known remote — the authoritative
    /// server fanning each client's frames out to all the others.
    Relay,
}

/// Callbacks for the host, drained once per tick, so the gameplay layer can
/// attach per-entity visuals without knowing protocol details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationEvent {
    /// A placeholder was created for a newly visible remote player.
    EntityCreated(PlayerGuid),
    /// A remote player's placeholder was removed.
    EntityDestroyed(PlayerGuid),
    /// A remote player's transform changed.
    EntityUpdated(PlayerGuid),
}

/// Owns the guid → placeholder map and the update/batch logic.
#[derive(Debug)]
pub struct ReplicationManager {
    scope: BatchScope,
    /// Remote guids with a live placeholder.
    remotes: HashSet<PlayerGuid>,
    /// Locally-owned guids: excluded from inbound updates, included in
    /// outbound batches.
    owned: Vec<PlayerGuid>,
    events: Vec<ReplicationEvent>,
}

impl ReplicationManager {
    /// Create a manager with the given outbound scope.
    pub fn new(scope: BatchScope) -> Self {
        Self {
            scope,
            remotes: HashSet::new(),
            owned: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Declare a locally-owned player. Its frames are read from the scene
    /// each tick; inbound updates for it are dropped.
    pub fn register_owned(&mut self, guid: PlayerGuid) {
        if !self.owned.contains(&guid) {
            self.owned.push(guid);
        }
    }

    /// Whether `guid` has a live remote placeholder.
    pub fn is_remote(&self, guid: PlayerGuid) -> bool {
        self.remotes.contains(&guid)
    }

    /// Number of live remote placeholders.
    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    /// Create a placeholder for a remote player.
    pub fn create_remote<S: PlaceholderScene>(&mut self, guid: PlayerGuid, scene: &mut S) {
        if self.owned.contains(&guid) {
            debug!(%guid, "ignoring create for locally-owned guid");
            return;
        }
        if !self.remotes.insert(guid) {
            // Exactly one placeholder per known remote guid.
            debug!(%guid, "placeholder already exists");
            return;
        }
        scene.create_placeholder(guid);
        self.events.push(ReplicationEvent::EntityCreated(guid));
    }

    /// Destroy a remote player's placeholder.
    pub fn destroy_remote<S: PlaceholderScene>(&mut self, guid: PlayerGuid, scene: &mut S) {
        if !self.remotes.remove(&guid) {
            debug!(%guid, "destroy for unknown guid dropped");
            return;
        }
        scene.destroy_placeholder(guid);
        self.events.push(ReplicationEvent::EntityDestroyed(guid));
    }

    /// Apply one inbound update record.
    pub fn apply_update<S: PlaceholderScene>(&mut self, record: &EntityRecord, scene: &mut S) {
        if self.owned.contains(&record.guid) {
            // Self-echo from the relay; dropping it prevents feedback loops.
            return;
        }
        if !self.remotes.contains(&record.guid) {
            debug!(guid = %record.guid, "update for unknown guid dropped");
            return;
        }
        match record.update {
            UpdateKind::Noop => {}
            UpdateKind::ReplaceFrame(frame) => {
                scene.set_transform(record.guid, frame);
                self.events.push(ReplicationEvent::EntityUpdated(record.guid));
            }
        }
    }

    /// Apply every record of an inbound batch.
    pub fn apply_batch<S: PlaceholderScene>(&mut self, records: &[EntityRecord], scene: &mut S) {
        for record in records {
            self.apply_update(record, scene);
        }
    }

    /// Build this tick's outbound batch from the scene's current frames.
    ///
    /// Covers the owned guids, plus every remote when relaying. Entities the
    /// scene cannot answer for are skipped. Capped at 255 records.
    pub fn build_batch<S: PlaceholderScene>(&self, scene: &S) -> Message {
        let mut records = Vec::with_capacity(self.owned.len());
        Self::push_frames(&mut records, self.owned.iter().copied(), scene);
        if self.scope == BatchScope::Relay {
            Self::push_frames(&mut records, self.remotes.iter().copied(), scene);
        }
        Message::BatchEntityUpdate(records)
    }

    fn push_frames<S: PlaceholderScene>(
        records: &mut Vec<EntityRecord>,
        guids: impl Iterator<Item = PlayerGuid>,
        scene: &S,
    ) {
        for guid in guids {
            if records.len() == MAX_BATCH_RECORDS {
                warn!("snapshot batch full, truncating at {MAX_BATCH_RECORDS} records");
                break;
            }
            let Some(frame) = scene.get_transform(guid) else {
                debug!(%guid, "no scene transform for snapshot source");
                continue;
            };
            records.push(EntityRecord {
                guid,
                update: UpdateKind::ReplaceFrame(frame),
            });
        }
    }

    /// Drain the event queue accumulated since the last call.
    pub fn drain_events(&mut self) -> Vec<ReplicationEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::MemoryScene;
    use glam::{Quat, Vec3};
    use sightline_net::Transform;

    fn frame(x: f32) -> Transform {
        Transform {
            translation: Vec3::new(x, 0.0, 0.0),
            rotation: Quat::IDENTITY,
        }
    }

    fn replace(guid: PlayerGuid, x: f32) -> EntityRecord {
        EntityRecord {
            guid,
            update: UpdateKind::ReplaceFrame(frame(x)),
        }
    }

    #[test]
    fn replace_frame_moves_the_placeholder() {
        let mut scene = MemoryScene::new();
        let mut manager = ReplicationManager::new(BatchScope::OwnedOnly);
        let remote = PlayerGuid::generate();

        manager.create_remote(remote, &mut scene);
        manager.apply_update(&replace(remote, 4.5), &mut scene);

        assert_eq!(scene.get_transform(remote), Some(frame(4.5)));
        assert_eq!(
            manager.drain_events(),
            vec![
                ReplicationEvent::EntityCreated(remote),
                ReplicationEvent::EntityUpdated(remote)
            ]
        );
    }

    #[test]
    fn noop_reserves_a_slot_without_touching_the_scene() {
        let mut scene = MemoryScene::new();
        let mut manager = ReplicationManager::new(BatchScope::OwnedOnly);
        let remote = PlayerGuid::generate();
        manager.create_remote(remote, &mut scene);
        manager.drain_events();

        manager.apply_update(
            &EntityRecord {
                guid: remote,
                update: UpdateKind::Noop,
            },
            &mut scene,
        );
        assert_eq!(scene.get_transform(remote), Some(Transform::IDENTITY));
        assert!(manager.drain_events().is_empty());
    }

    #[test]
    fn updates_for_unknown_guids_are_dropped() {
        let mut scene = MemoryScene::new();
        let mut manager = ReplicationManager::new(BatchScope::OwnedOnly);

        manager.apply_update(&replace(PlayerGuid::generate(), 1.0), &mut scene);

        assert!(scene.is_empty(), "no implicit placeholder creation");
        assert!(manager.drain_events().is_empty());
    }

    #[test]
    fn self_updates_are_dropped() {
        let mut scene = MemoryScene::new();
        let mut manager = ReplicationManager::new(BatchScope::OwnedOnly);
        let me = PlayerGuid::generate();
        manager.register_owned(me);
        scene.insert(me, frame(1.0));

        manager.apply_update(&replace(me, 99.0), &mut scene);

        assert_eq!(scene.get_transform(me), Some(frame(1.0)));
    }

    #[test]
    fn owned_scope_batches_only_local_players() {
        let mut scene = MemoryScene::new();
        let mut manager = ReplicationManager::new(BatchScope::OwnedOnly);
        let me = PlayerGuid::generate();
        let remote = PlayerGuid::generate();
        manager.register_owned(me);
        scene.insert(me, frame(2.0));
        manager.create_remote(remote, &mut scene);

        let Message::BatchEntityUpdate(records) = manager.build_batch(&scene) else {
            panic!("wrong message kind");
        };
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].guid, me);
        assert_eq!(records[0].update, UpdateKind::ReplaceFrame(frame(2.0)));
    }

    #[test]
    fn relay_scope_batches_every_known_entity() {
        let mut scene = MemoryScene::new();
        let mut manager = ReplicationManager::new(BatchScope::Relay);
        let a = PlayerGuid::generate();
        let b = PlayerGuid::generate();
        manager.create_remote(a, &mut scene);
        manager.create_remote(b, &mut scene);

        let Message::BatchEntityUpdate(records) = manager.build_batch(&scene) else {
            panic!("wrong message kind");
        };
        let guids: HashSet<_> = records.iter().map(|r| r.guid).collect();
        assert_eq!(guids, HashSet::from([a, b]));
    }

    #[test]
    fn destroying_unknown_guid_is_harmless() {
        let mut scene = MemoryScene::new();
        let mut manager = ReplicationManager::new(BatchScope::OwnedOnly);
        manager.destroy_remote(PlayerGuid::generate(), &mut scene);
        assert!(manager.drain_events().is_empty());
    }

    #[test]
    fn duplicate_create_keeps_a_single_placeholder() {
        let mut scene = MemoryScene::new();
        let mut manager = ReplicationManager::new(BatchScope::OwnedOnly);
        let remote = PlayerGuid::generate();
        manager.create_remote(remote, &mut scene);
        manager.create_remote(remote, &mut scene);

        assert_eq!(manager.remote_count(), 1);
        assert_eq!(scene.len(), 1);
        assert_eq!(
            manager.drain_events(),
            vec![ReplicationEvent::EntityCreated(remote)]
        );
    }
}
