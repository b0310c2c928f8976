//! Emberwake simulation core -- the gameplay rules of a top-down action
//! roguelite, built on `emberwake-ecs`.
//!
//! Everything runs in a single-threaded, fixed-order frame: the
//! [`Pipeline`](pipeline::Pipeline) invokes each system once, drains the event
//! bus once, then applies deferred structural commands. Damage, deaths, loot,
//! experience and scene changes all travel as events, so systems never call
//! each other directly.
//!
//! # Quick Start
//!
//! ```
//! use emberwake_sim::prelude::*;
//!
//! let config = SimConfig { seed: 7, ..SimConfig::default() };
//! let mut sim = Simulation::new(config).unwrap();
//! sim.enter_scene(Scene::Stage(1));
//!
//! for _ in 0..120 {
//!     sim.step(InputState::default()).unwrap();
//! }
//!
//! assert_eq!(sim.tick_count(), 120);
//! assert!(sim.world().resource::<WaveDirector>().unwrap().wave >= 1);
//! ```

#![deny(unsafe_code)]

pub mod ai;
pub mod buffs;
pub mod combat;
pub mod components;
pub mod config;
pub mod context;
pub mod damage;
pub mod elite;
pub mod health;
pub mod inventory;
pub mod logging;
pub mod loot;
pub mod movement;
pub mod persistence;
pub mod pipeline;
pub mod player;
pub mod progression;
pub mod rng;
pub mod scene;
pub mod simulation;
pub mod skills;
pub mod spawn;
pub mod stats;
pub mod status;
pub mod waves;

use emberwake_ecs::prelude::*;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by gameplay operations.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Ecs(#[from] EcsError),

    /// A session resource the operation depends on was never inserted.
    #[error("resource '{0}' is not present in the world")]
    MissingResource(&'static str),

    #[error("entity {entity:?} has no '{component}' component")]
    MissingComponent {
        entity: Entity,
        component: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Persistence(#[from] persistence::PersistenceError),

    #[error("unknown item definition '{0}'")]
    UnknownItem(String),

    #[error("unknown perk '{0}'")]
    UnknownPerk(String),

    #[error("perk '{0}' is already at max rank")]
    PerkMaxRank(String),

    #[error("perk '{0}' has no allocated ranks")]
    PerkNotAllocated(String),

    #[error("no perk points available")]
    NoPerkPoints,

    #[error("inventory is full")]
    InventoryFull,

    #[error("no inventory item at index {0}")]
    InvalidInventoryIndex(usize),

    /// The pipeline's `after` constraints cannot be satisfied.
    #[error("cannot order systems: {0}")]
    Schedule(String),

    /// A pipeline system failed; the rest of the frame was skipped.
    #[error("system '{name}' failed: {source}")]
    System {
        name: String,
        #[source]
        source: Box<SimError>,
    },
}

// ---------------------------------------------------------------------------
// Component registration
// ---------------------------------------------------------------------------

/// Register every component type the simulation stores on entities.
pub fn register_components(world: &mut World) {
    use crate::ai::{AiBehaviorStateMachine, BufferConfig, ChargerConfig, ProtectorConfig, RangedConfig};
    use crate::buffs::ActiveBuffs;
    use crate::combat::{ActiveTelegraph, AttackHitbox, Projectile};
    use crate::components::*;
    use crate::elite::{EliteModifierData, EliteShield, PendingExplosion};
    use crate::inventory::{Equipment, Inventory};
    use crate::loot::ItemPickup;
    use crate::player::{BasicAttack, Dash};
    use crate::progression::{Experience, PerkPoints, PlayerPerks};
    use crate::skills::SkillBar;
    use crate::stats::{BaseStats, ComputedStats};
    use crate::status::StatusEffects;

    world.register_component::<Position>("position");
    world.register_component::<Velocity>("velocity");
    world.register_component::<MoveIntent>("move_intent");
    world.register_component::<Knockback>("knockback");
    world.register_component::<Facing>("facing");
    world.register_component::<Faction>("faction");
    world.register_component::<Health>("health");
    world.register_component::<Collider>("collider");
    world.register_component::<StaticCollider>("static_collider");
    world.register_component::<Dead>("dead");
    world.register_component::<Bounty>("bounty");
    world.register_component::<Player>("player");

    world.register_component::<BaseStats>("base_stats");
    world.register_component::<ComputedStats>("computed_stats");
    world.register_component::<ActiveBuffs>("active_buffs");
    world.register_component::<StatusEffects>("status_effects");

    world.register_component::<AiBehaviorStateMachine>("ai_state");
    world.register_component::<ChargerConfig>("charger_config");
    world.register_component::<RangedConfig>("ranged_config");
    world.register_component::<BufferConfig>("buffer_config");
    world.register_component::<ProtectorConfig>("protector_config");
    world.register_component::<EliteModifierData>("elite_modifiers");
    world.register_component::<EliteShield>("elite_shield");
    world.register_component::<PendingExplosion>("pending_explosion");

    world.register_component::<AttackHitbox>("attack_hitbox");
    world.register_component::<ActiveTelegraph>("telegraph");
    world.register_component::<Projectile>("projectile");

    world.register_component::<BasicAttack>("basic_attack");
    world.register_component::<Dash>("dash");
    world.register_component::<SkillBar>("skill_bar");
    world.register_component::<Inventory>("inventory");
    world.register_component::<Equipment>("equipment");
    world.register_component::<ItemPickup>("item_pickup");
    world.register_component::<Experience>("experience");
    world.register_component::<PerkPoints>("perk_points");
    world.register_component::<PlayerPerks>("player_perks");
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::components::{Collider, Faction, Health, Player, Position, StaticCollider};
    pub use crate::config::{SimConfig, WaveTuning};
    pub use crate::context::{Camera2D, FrameContext, InputState};
    pub use crate::damage::{apply_damage, DamageDealt, DamageInfo, DamageType};
    pub use crate::health::EntityDied;
    pub use crate::persistence::{load_or_default, ProfileSnapshot, SnapshotStore};
    pub use crate::pipeline::{Pipeline, System, TickDiagnostics};
    pub use crate::scene::{Scene, SceneState};
    pub use crate::simulation::Simulation;
    pub use crate::stats::{ComputedStats, StatModifiers};
    pub use crate::waves::WaveDirector;
    pub use crate::SimError;
    pub use emberwake_ecs::prelude::*;
}
