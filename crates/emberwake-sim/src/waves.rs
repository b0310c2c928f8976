//! Wave director: spawns escalating enemy waves while a stage is active.

use emberwake_ecs::prelude::*;
use glam::Vec2;
use rand::Rng;
use rand_pcg::Pcg32;

use crate::components::{Bounty, Player, Position};
use crate::config::WaveTuning;
use crate::context::FrameContext;
use crate::elite::{attach_elite_modifier, EliteModifierKind};
use crate::loot::WeightedTable;
use crate::progression::RunStats;
use crate::rng::{seeded, stream};
use crate::scene::{current_scene, SceneEntered};
use crate::spawn::{spawn_enemy, EnemyArchetype};
use crate::SimError;

/// Published when a wave begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveStarted {
    pub wave: u32,
    pub enemies: u32,
}

#[derive(Debug, Clone)]
pub struct WaveDirector {
    pub wave: u32,
    /// Seconds until the next wave.
    pub timer: f32,
    pub tuning: WaveTuning,
    rng: Pcg32,
    archetypes: WeightedTable<EnemyArchetype>,
}

impl WaveDirector {
    pub fn new(seed: u64, tuning: WaveTuning) -> Self {
        Self {
            wave: 0,
            // The first wave arrives shortly after the stage starts.
            timer: 1.0,
            tuning,
            rng: seeded(seed, stream::WAVES),
            archetypes: WeightedTable::new()
                .with(EnemyArchetype::Charger, 5)
                .with(EnemyArchetype::Ranged, 3)
                .with(EnemyArchetype::Buffer, 1)
                .with(EnemyArchetype::Protector, 1),
        }
    }

    pub fn wave_size(&self, wave: u32) -> u32 {
        self.tuning.base_count + self.tuning.growth * wave.saturating_sub(1)
    }

    /// Restart from wave zero (new stage).
    pub fn reset(&mut self) {
        self.wave = 0;
        self.timer = 1.0;
    }
}

/// Restart the wave count on every stage entry; a run starts when a stage is
/// entered from outside combat.
pub fn install(world: &mut World) {
    world.subscribe::<SceneEntered, _>(|world, ev| {
        if !ev.to.is_stage() {
            return;
        }
        if let Some(director) = world.resource_mut::<WaveDirector>() {
            director.reset();
        }
        if !ev.from.is_stage() {
            world.insert_resource(RunStats::default());
        }
    });
}

pub fn wave_system(world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
    if !current_scene(world).is_some_and(|s| s.is_stage()) {
        return Ok(());
    }
    let Some(center) = world
        .query::<(&Player, &Position)>()
        .map(|(_, (_, p))| p.0)
        .next()
    else {
        return Ok(());
    };
    let Some(director) = world.resource_mut::<WaveDirector>() else {
        return Ok(());
    };
    director.timer -= ctx.dt;
    if director.timer > 0.0 {
        return Ok(());
    }
    director.wave += 1;
    director.timer = director.tuning.interval;
    let wave = director.wave;
    let count = director.wave_size(wave);

    let mut plan = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let archetype = director
            .archetypes
            .sample(&mut director.rng)
            .copied()
            .unwrap_or(EnemyArchetype::Charger);
        let angle = director.rng.gen_range(0.0..std::f32::consts::TAU);
        let at = center + Vec2::from_angle(angle) * director.tuning.spawn_radius;
        let elite = (director.rng.gen::<f32>() < director.tuning.elite_chance).then(|| {
            let i = director.rng.gen_range(0..EliteModifierKind::ALL.len());
            EliteModifierKind::ALL[i]
        });
        plan.push((archetype, at, elite));
    }

    for (archetype, at, elite) in plan {
        let enemy = spawn_enemy(world, archetype, at)?;
        if let Some(kind) = elite {
            attach_elite_modifier(world, enemy, kind)?;
            if let Some(bounty) = world.get_mut::<Bounty>(enemy) {
                bounty.experience *= 2;
                bounty.loot_table = Some("elite".to_owned());
            }
        }
    }
    tracing::info!(wave, enemies = count, "wave started");
    world.publish(WaveStarted { wave, enemies: count });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiBehaviorStateMachine;
    use crate::scene::{Scene, SceneState};
    use crate::spawn::spawn_player;

    fn setup_world(scene: Scene) -> World {
        let mut world = World::new();
        crate::register_components(&mut world);
        world.insert_resource(SceneState {
            current: scene,
            transitions: 0,
        });
        world.insert_resource(WaveDirector::new(4, WaveTuning::default()));
        spawn_player(&mut world, Vec2::ZERO).unwrap();
        world
    }

    #[test]
    fn waves_grow_and_only_run_in_stages() {
        let mut hub = setup_world(Scene::Hub);
        wave_system(&mut hub, &FrameContext::idle(5.0)).unwrap();
        assert_eq!(hub.count::<AiBehaviorStateMachine>(), 0);

        let mut world = setup_world(Scene::Stage(1));
        let tuning = WaveTuning::default();
        wave_system(&mut world, &FrameContext::idle(1.0)).unwrap();
        assert_eq!(world.count::<AiBehaviorStateMachine>() as u32, tuning.base_count);

        wave_system(&mut world, &FrameContext::idle(tuning.interval)).unwrap();
        assert_eq!(
            world.count::<AiBehaviorStateMachine>() as u32,
            2 * tuning.base_count + tuning.growth
        );
        assert_eq!(world.resource::<WaveDirector>().unwrap().wave, 2);
        assert_eq!(world.events().pending_of::<WaveStarted>(), 2);
    }

    #[test]
    fn entering_a_stage_resets_the_director() {
        let mut world = setup_world(Scene::Stage(1));
        install(&mut world);
        wave_system(&mut world, &FrameContext::idle(1.0)).unwrap();
        world.insert_resource(RunStats { kills: 3, elapsed: 10.0 });

        world.publish(SceneEntered { from: Scene::Stage(1), to: Scene::Stage(2) });
        world.process_events().unwrap();
        assert_eq!(world.resource::<WaveDirector>().unwrap().wave, 0);
        assert_eq!(world.resource::<RunStats>().unwrap().kills, 3);

        world.publish(SceneEntered { from: Scene::Hub, to: Scene::Stage(1) });
        world.process_events().unwrap();
        assert_eq!(world.resource::<RunStats>().unwrap().kills, 0);
    }

    #[test]
    fn enemies_spawn_on_the_ring() {
        let mut world = setup_world(Scene::Stage(1));
        wave_system(&mut world, &FrameContext::idle(1.0)).unwrap();
        let radius = WaveTuning::default().spawn_radius;
        for (_, (_, pos)) in world.query::<(&AiBehaviorStateMachine, &Position)>() {
            assert!((pos.0.length() - radius).abs() < 1e-3);
        }
    }
}
