//! Profile persistence.
//!
//! A [`ProfileSnapshot`] captures everything that survives between runs:
//! equipment and bag, perks, level and run history. Snapshots go through a
//! [`SnapshotStore`]; loading never fails the game, a missing or unreadable
//! profile falls back to a fresh one. During a session the profile lives in
//! the world as a [`ProfileSnapshot`] resource.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use emberwake_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::Player;
use crate::config::SimConfig;
use crate::context::FrameContext;
use crate::inventory::{Equipment, Inventory};
use crate::loot::{ItemInstance, LootRoller};
use crate::pipeline::System;
use crate::progression::{Experience, PerkPoints, PlayerPerks, RunStats};
use crate::scene::{Scene, SceneEntered};
use crate::stats;
use crate::waves::WaveDirector;
use crate::SimError;

/// Bumped when the snapshot layout changes incompatibly.
pub const PROFILE_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("profile I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("profile is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),

    #[error("profile version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EquipmentSnapshot {
    pub equipped: Vec<ItemInstance>,
    pub inventory: Vec<ItemInstance>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerkSnapshot {
    pub ranks: BTreeMap<String, u32>,
    pub available_points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub seed: u64,
    pub wave_reached: u32,
    pub kills: u32,
    pub duration_secs: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSnapshot {
    pub version: u32,
    pub level: u32,
    pub experience: u32,
    pub equipment: EquipmentSnapshot,
    pub perks: PerkSnapshot,
    pub history: Vec<RunRecord>,
}

impl Default for ProfileSnapshot {
    fn default() -> Self {
        Self {
            version: PROFILE_VERSION,
            level: 1,
            experience: 0,
            equipment: EquipmentSnapshot::default(),
            perks: PerkSnapshot::default(),
            history: Vec::new(),
        }
    }
}

impl ProfileSnapshot {
    pub fn best_wave(&self) -> u32 {
        self.history.iter().map(|r| r.wave_reached).max().unwrap_or(0)
    }

    fn highest_item_id(&self) -> u64 {
        self.equipment
            .equipped
            .iter()
            .chain(&self.equipment.inventory)
            .map(|i| i.instance_id)
            .max()
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

pub trait SnapshotStore {
    /// `Ok(None)` when no profile has been saved yet.
    fn load(&self) -> Result<Option<ProfileSnapshot>, PersistenceError>;
    fn save(&mut self, snapshot: &ProfileSnapshot) -> Result<(), PersistenceError>;
}

fn decode(json: &str) -> Result<ProfileSnapshot, PersistenceError> {
    let snapshot: ProfileSnapshot = serde_json::from_str(json)?;
    if snapshot.version != PROFILE_VERSION {
        return Err(PersistenceError::Version {
            found: snapshot.version,
            expected: PROFILE_VERSION,
        });
    }
    Ok(snapshot)
}

/// Keeps the serialized profile in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Option<String>,
}

impl MemoryStore {
    pub fn with_raw(json: impl Into<String>) -> Self {
        Self {
            data: Some(json.into()),
        }
    }

    pub fn raw(&self) -> Option<&str> {
        self.data.as_deref()
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> Result<Option<ProfileSnapshot>, PersistenceError> {
        self.data.as_deref().map(decode).transpose()
    }

    fn save(&mut self, snapshot: &ProfileSnapshot) -> Result<(), PersistenceError> {
        self.data = Some(serde_json::to_string(snapshot)?);
        Ok(())
    }
}

/// Pretty-printed JSON file. Writes go to a sibling temp file first and are
/// renamed into place.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Result<Option<ProfileSnapshot>, PersistenceError> {
        match fs::read_to_string(&self.path) {
            Ok(json) => decode(&json).map(Some),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&mut self, snapshot: &ProfileSnapshot) -> Result<(), PersistenceError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(snapshot)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// The stored profile, or a fresh one if absent or unreadable.
pub fn load_or_default(store: &dyn SnapshotStore) -> ProfileSnapshot {
    match store.load() {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => ProfileSnapshot::default(),
        Err(err) => {
            tracing::warn!(%err, "could not load profile, starting fresh");
            ProfileSnapshot::default()
        }
    }
}

// ---------------------------------------------------------------------------
// World <-> snapshot
// ---------------------------------------------------------------------------

fn player_entity(world: &World) -> Option<Entity> {
    world.entities_with::<(&Player,)>().first().copied()
}

/// Snapshot the player's persistent state on top of `base` (which carries the
/// run history).
pub fn capture_profile(world: &World, base: &ProfileSnapshot) -> ProfileSnapshot {
    let mut snapshot = base.clone();
    let Some(player) = player_entity(world) else {
        return snapshot;
    };
    if let Some(xp) = world.get::<Experience>(player) {
        snapshot.level = xp.level;
        snapshot.experience = xp.current;
    }
    snapshot.equipment = EquipmentSnapshot {
        equipped: world
            .get::<Equipment>(player)
            .map(|e| e.slots.values().cloned().collect())
            .unwrap_or_default(),
        inventory: world
            .get::<Inventory>(player)
            .map(|i| i.items.clone())
            .unwrap_or_default(),
    };
    snapshot.perks = PerkSnapshot {
        ranks: world
            .get::<PlayerPerks>(player)
            .map(|p| p.ranks.clone())
            .unwrap_or_default(),
        available_points: world.get::<PerkPoints>(player).map_or(0, |p| p.available),
    };
    snapshot
}

/// Fold the player's current state into the session's [`ProfileSnapshot`]
/// resource. Without a player (e.g. after its despawn) the resource keeps the
/// last capture.
pub fn refresh_profile(world: &mut World) {
    let Some(base) = world.resource::<ProfileSnapshot>() else {
        return;
    };
    if player_entity(world).is_none() {
        return;
    }
    let snapshot = capture_profile(world, base);
    world.insert_resource(snapshot);
}

/// Load `snapshot` onto the player entity.
pub fn restore_profile(world: &mut World, snapshot: &ProfileSnapshot) -> Result<(), SimError> {
    let Some(player) = player_entity(world) else {
        return Ok(());
    };
    world.insert(
        player,
        Experience {
            level: snapshot.level.max(1),
            current: snapshot.experience,
        },
    )?;
    let equipment = Equipment {
        slots: snapshot
            .equipment
            .equipped
            .iter()
            .map(|item| (item.slot, item.clone()))
            .collect(),
    };
    world.insert(player, equipment)?;
    let capacity = world.get::<Inventory>(player).map_or(
        crate::inventory::DEFAULT_INVENTORY_CAPACITY,
        |i| i.capacity,
    );
    world.insert(
        player,
        Inventory {
            items: snapshot.equipment.inventory.clone(),
            capacity: capacity.max(snapshot.equipment.inventory.len()),
        },
    )?;
    world.insert(
        player,
        PlayerPerks {
            ranks: snapshot
                .perks
                .ranks
                .iter()
                .filter(|(_, &rank)| rank > 0)
                .map(|(id, &rank)| (id.clone(), rank))
                .collect(),
        },
    )?;
    world.insert(
        player,
        PerkPoints {
            available: snapshot.perks.available_points,
        },
    )?;
    if let Some(roller) = world.resource_mut::<LootRoller>() {
        roller.reserve_ids_through(snapshot.highest_item_id());
    }
    stats::mark_dirty(world, player);
    Ok(())
}

/// Record of the current run.
pub fn run_record(world: &World, seed: u64) -> RunRecord {
    let run = world.resource::<RunStats>().copied().unwrap_or_default();
    RunRecord {
        seed,
        wave_reached: world.resource::<WaveDirector>().map_or(0, |d| d.wave),
        kills: run.kills,
        duration_secs: run.elapsed,
    }
}

/// Append the finished run to the session's [`ProfileSnapshot`] resource on
/// game over.
pub fn install(world: &mut World) {
    world.subscribe::<SceneEntered, _>(|world, ev| {
        if ev.to != Scene::GameOver {
            return;
        }
        let seed = world.resource::<SimConfig>().map_or(0, |c| c.seed);
        let record = run_record(world, seed);
        let Some(profile) = world.resource_mut::<ProfileSnapshot>() else {
            return;
        };
        tracing::info!(wave = record.wave_reached, kills = record.kills, "run recorded");
        profile.history.push(record);
    });
}

// ---------------------------------------------------------------------------
// Autosave
// ---------------------------------------------------------------------------

/// Saves the profile every `interval` seconds and right after a run is
/// recorded. Save failures are logged and retried at the next interval.
pub struct AutoSave {
    interval: f32,
    elapsed: f32,
    store: Box<dyn SnapshotStore>,
    saved_runs: usize,
    saves: u32,
}

impl AutoSave {
    pub fn new(interval: f32, store: Box<dyn SnapshotStore>) -> Self {
        Self {
            interval,
            elapsed: 0.0,
            store,
            saved_runs: 0,
            saves: 0,
        }
    }

    pub fn saves(&self) -> u32 {
        self.saves
    }

    /// Refresh the session profile from the player and write it out.
    pub fn save_now(&mut self, world: &mut World) -> Result<(), PersistenceError> {
        refresh_profile(world);
        let snapshot = match world.resource::<ProfileSnapshot>() {
            Some(profile) => profile.clone(),
            None => capture_profile(world, &ProfileSnapshot::default()),
        };
        self.store.save(&snapshot)?;
        self.saved_runs = snapshot.history.len();
        self.saves += 1;
        tracing::debug!(saves = self.saves, "profile saved");
        Ok(())
    }
}

impl System for AutoSave {
    fn run(&mut self, world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
        self.elapsed += ctx.dt;
        let new_run = world
            .resource::<ProfileSnapshot>()
            .is_some_and(|p| p.history.len() > self.saved_runs);
        if self.elapsed < self.interval && !new_run {
            return Ok(());
        }
        self.elapsed = 0.0;
        if let Err(err) = self.save_now(world) {
            tracing::warn!(%err, "autosave failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loot::ItemDatabase;
    use crate::progression::PerkCatalog;
    use crate::spawn::spawn_player;
    use glam::Vec2;

    fn setup_world() -> (World, Entity) {
        let mut world = World::new();
        crate::register_components(&mut world);
        world.insert_resource(PerkCatalog::default());
        world.insert_resource(LootRoller::new(1));
        let player = spawn_player(&mut world, Vec2::ZERO).unwrap();
        (world, player)
    }

    #[test]
    fn missing_or_corrupt_profile_falls_back() {
        assert_eq!(load_or_default(&MemoryStore::default()), ProfileSnapshot::default());
        let corrupt = MemoryStore::with_raw("{ definitely not json");
        assert_eq!(load_or_default(&corrupt), ProfileSnapshot::default());
        let future = MemoryStore::with_raw(r#"{ "version": 99 }"#);
        assert!(matches!(future.load(), Err(PersistenceError::Version { found: 99, .. })));
    }

    #[test]
    fn capture_and_restore_round_trip() {
        let (mut world, player) = setup_world();
        let db = ItemDatabase::default();
        let item = LootRoller::new(2).roll_item(db.get("leather_coat").unwrap());
        world.get_mut::<Equipment>(player).unwrap().slots.insert(item.slot, item.clone());
        world.get_mut::<PlayerPerks>(player).unwrap().ranks.insert("might".into(), 2);
        world.get_mut::<PerkPoints>(player).unwrap().available = 3;

        let mut store = MemoryStore::default();
        store.save(&capture_profile(&world, &ProfileSnapshot::default())).unwrap();
        let loaded = load_or_default(&store);

        let (mut fresh, fresh_player) = setup_world();
        restore_profile(&mut fresh, &loaded).unwrap();
        assert_eq!(
            fresh.get::<Equipment>(fresh_player).unwrap().get(item.slot),
            Some(&item)
        );
        assert_eq!(fresh.get::<PlayerPerks>(fresh_player).unwrap().rank("might"), 2);
        assert_eq!(fresh.get::<PerkPoints>(fresh_player).unwrap().available, 3);
        stats::mark_dirty(&mut world, player);
        assert_eq!(
            stats::current(&mut fresh, fresh_player),
            stats::current(&mut world, player)
        );
    }

    #[test]
    fn file_store_round_trip() {
        let dir = std::env::temp_dir().join(format!("emberwake-test-{}", std::process::id()));
        let path = dir.join("profile.json");
        let mut store = JsonFileStore::new(&path);
        assert!(store.load().unwrap().is_none());

        let mut profile = ProfileSnapshot::default();
        profile.history.push(RunRecord {
            seed: 1,
            wave_reached: 7,
            kills: 40,
            duration_secs: 300.0,
        });
        store.save(&profile).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, profile);
        assert_eq!(loaded.best_wave(), 7);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn game_over_save_keeps_progress_from_the_fatal_run() {
        let (mut world, player) = setup_world();
        world.insert_resource(ProfileSnapshot::default());
        assert_eq!(crate::progression::grant_experience(&mut world, player, 150), 2);

        crate::health::kill(&mut world, player, None);
        world.apply_commands();
        assert!(!world.is_alive(player));

        let record = run_record(&world, 4);
        world.resource_mut::<ProfileSnapshot>().unwrap().history.push(record);

        let dir = std::env::temp_dir().join(format!("emberwake-gameover-{}", std::process::id()));
        let path = dir.join("profile.json");
        let mut autosave = AutoSave::new(60.0, Box::new(JsonFileStore::new(&path)));
        autosave.run(&mut world, &FrameContext::idle(0.1)).unwrap();
        assert_eq!(autosave.saves(), 1);

        let saved = JsonFileStore::new(&path).load().unwrap().unwrap();
        assert_eq!(saved.level, 3);
        assert_eq!(saved.experience, 10);
        assert_eq!(saved.history.len(), 1);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn autosave_fires_on_interval() {
        let (mut world, _) = setup_world();
        world.insert_resource(ProfileSnapshot::default());
        let mut autosave = AutoSave::new(1.0, Box::new(MemoryStore::default()));
        for _ in 0..25 {
            autosave.run(&mut world, &FrameContext::idle(0.1)).unwrap();
        }
        assert_eq!(autosave.saves(), 2);

        let record = run_record(&world, 9);
        world.resource_mut::<ProfileSnapshot>().unwrap().history.push(record);
        autosave.run(&mut world, &FrameContext::idle(0.1)).unwrap();
        assert_eq!(autosave.saves(), 3);
    }
}
