//! The assembled game session: a [`Pipeline`] with every gameplay system,
//! subscriber and session resource wired up.

use emberwake_ecs::prelude::*;
use glam::Vec2;
use serde::Serialize;

use crate::ai;
use crate::buffs::buff_tick_system;
use crate::combat::{hitbox_system, projectile_system, telegraph_system};
use crate::components::{position_of, Dead, Health, Position};
use crate::config::SimConfig;
use crate::context::{Camera2D, FrameContext, InputState};
use crate::damage::DamageCalculator;
use crate::elite::{self, elite_shield_system, explosion_system};
use crate::health;
use crate::loot::{self, pickup_system, ItemDatabase, LootRoller, LootTables};
use crate::movement::movement_system;
use crate::persistence::{self, load_or_default, restore_profile, AutoSave, MemoryStore, ProfileSnapshot, SnapshotStore};
use crate::pipeline::{Pipeline, TickDiagnostics};
use crate::player::{self, player_input_system};
use crate::progression::{self, run_clock_system, PerkCatalog, RunStats};
use crate::scene::{self, request_scene, Scene, SceneState};
use crate::skills::skill_system;
use crate::spawn::spawn_player;
use crate::stats::stat_recompute_system;
use crate::status::status_effect_system;
use crate::waves::{self, wave_system, WaveDirector};
use crate::SimError;

/// Catch entities marked dead outside the health subscriber.
fn cleanup_system(world: &mut World, _ctx: &FrameContext) -> Result<(), SimError> {
    for entity in world.entities_with::<(&Dead,)>() {
        if !world.commands().despawn_queued(entity) {
            world.commands().despawn(entity, "dead sweep");
        }
    }
    Ok(())
}

/// Idle frames allowed after the player's death for the run to be recorded
/// and saved.
pub const GAME_OVER_GRACE_FRAMES: u64 = 10;

pub struct Simulation {
    pipeline: Pipeline,
    config: SimConfig,
    camera: Camera2D,
    player: Entity,
}

impl Simulation {
    /// A session whose profile lives only in memory.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        Self::with_store(config, Box::new(MemoryStore::default()))
    }

    /// A session that loads its profile from `store` and autosaves back to it.
    pub fn with_store(config: SimConfig, store: Box<dyn SnapshotStore>) -> Result<Self, SimError> {
        config.validate()?;
        let profile = load_or_default(store.as_ref());

        let mut world = World::new();
        crate::register_components(&mut world);
        world.insert_resource(config.clone());
        world.insert_resource(DamageCalculator::new(config.seed));
        world.insert_resource(LootRoller::new(config.seed));
        world.insert_resource(WaveDirector::new(config.seed, config.wave.clone()));
        world.insert_resource(ItemDatabase::default());
        world.insert_resource(LootTables::default());
        world.insert_resource(PerkCatalog::default());
        world.insert_resource(SceneState::default());
        world.insert_resource(RunStats::default());

        // Subscriber order is dispatch order within one event.
        health::install(&mut world);
        elite::install(&mut world);
        player::install(&mut world);
        progression::install(&mut world);
        loot::install(&mut world);
        scene::install(&mut world);
        waves::install(&mut world);
        persistence::install(&mut world);

        let player = spawn_player(&mut world, Vec2::ZERO)?;
        restore_profile(&mut world, &profile)?;
        world.insert_resource(profile);

        let mut pipeline = Pipeline::new(world);
        pipeline.add_system("run_clock", run_clock_system);
        pipeline.add_system("player_input", player_input_system);
        pipeline.add_system("skills", skill_system);
        pipeline.add_system("ai_charger", ai::charger_ai_system);
        pipeline.add_system("ai_ranged", ai::ranged_ai_system);
        pipeline.add_system("ai_buffer", ai::buffer_ai_system);
        pipeline.add_system("ai_protector", ai::protector_ai_system);
        pipeline.add_system_after("movement", &["player_input", "ai_protector"], movement_system);
        pipeline.add_system_after("hitboxes", &["movement"], hitbox_system);
        pipeline.add_system_after("projectiles", &["movement"], projectile_system);
        pipeline.add_system("telegraphs", telegraph_system);
        pipeline.add_system("explosions", explosion_system);
        pipeline.add_system("elite_shields", elite_shield_system);
        pipeline.add_system("status_effects", status_effect_system);
        pipeline.add_system("buff_tick", buff_tick_system);
        pipeline.add_system_after(
            "stat_recompute",
            &["status_effects", "buff_tick"],
            stat_recompute_system,
        );
        pipeline.add_system("waves", wave_system);
        pipeline.add_system("pickups", pickup_system);
        pipeline.add_system("autosave", AutoSave::new(config.autosave_interval, store));
        pipeline.add_system("cleanup", cleanup_system);

        tracing::info!(seed = config.seed, systems = pipeline.system_count(), "simulation ready");
        Ok(Self {
            pipeline,
            config,
            camera: Camera2D::default(),
            player,
        })
    }

    /// Advance one fixed step with `input`.
    pub fn step(&mut self, input: InputState) -> Result<&TickDiagnostics, SimError> {
        if let Some(pos) = position_of(self.pipeline.world(), self.player) {
            self.camera.center = pos;
        }
        let time = self.pipeline.tick_count() as f64 * f64::from(self.config.fixed_dt);
        let ctx = FrameContext::new(self.config.fixed_dt, time, input, self.camera);
        self.pipeline.tick(&ctx)
    }

    /// Queue a scene change; it resolves at the next step's drain.
    pub fn enter_scene(&mut self, scene: Scene) {
        request_scene(self.pipeline.world_mut(), scene);
    }

    pub fn scene(&self) -> Scene {
        scene::current_scene(self.world()).unwrap_or(Scene::MainMenu)
    }

    /// Runs recorded in the session profile.
    pub fn recorded_runs(&self) -> usize {
        self.world()
            .resource::<ProfileSnapshot>()
            .map_or(0, |p| p.history.len())
    }

    /// Step idle frames after the player's death until the run lands in the
    /// profile, then once more so autosave writes it. Returns whether the run
    /// was recorded within [`GAME_OVER_GRACE_FRAMES`].
    pub fn settle_game_over(&mut self) -> Result<bool, SimError> {
        let runs_before = self.recorded_runs();
        for _ in 0..GAME_OVER_GRACE_FRAMES {
            let recorded = self.scene() == Scene::GameOver && self.recorded_runs() > runs_before;
            self.step(InputState::default())?;
            if recorded {
                return Ok(true);
            }
        }
        tracing::warn!(frames = GAME_OVER_GRACE_FRAMES, "run was not recorded after death");
        Ok(false)
    }

    pub fn player(&self) -> Entity {
        self.player
    }

    pub fn is_player_alive(&self) -> bool {
        self.world().is_alive(self.player) && !self.world().has::<Dead>(self.player)
    }

    pub fn tick_count(&self) -> u64 {
        self.pipeline.tick_count()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn camera(&self) -> &Camera2D {
        &self.camera
    }

    pub fn world(&self) -> &World {
        self.pipeline.world()
    }

    pub fn world_mut(&mut self) -> &mut World {
        self.pipeline.world_mut()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// blake3 digest (hex) of every living entity's position and health plus
    /// the wave count. Equal seeds and inputs give equal hashes.
    pub fn state_hash(&self) -> Result<String, SimError> {
        #[derive(Serialize)]
        struct Row {
            entity: u64,
            position: [f32; 2],
            health: Option<(f32, f32)>,
        }

        let world = self.world();
        let mut rows: Vec<Row> = world
            .query::<(&Position, Option<&Health>)>()
            .map(|(entity, (pos, health))| Row {
                entity: entity.to_bits(),
                position: pos.0.to_array(),
                health: health.map(|h| (h.current, h.max)),
            })
            .collect();
        rows.sort_by_key(|r| r.entity);
        let wave = world.resource::<WaveDirector>().map_or(0, |d| d.wave);

        let dump = serde_json::to_vec(&(wave, rows))
            .map_err(|e| SimError::Persistence(e.into()))?;
        Ok(blake3::hash(&dump).to_hex().to_string())
    }
}
