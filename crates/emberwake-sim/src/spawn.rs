//! Entity archetypes: the player, each enemy role and static walls.

use emberwake_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::ai::{AiBehaviorStateMachine, BufferConfig, ChargerConfig, ProtectorConfig, RangedConfig};
use crate::components::{
    Bounty, Collider, Facing, Faction, Health, MoveIntent, Player, Position, StaticCollider, Velocity,
};
use crate::inventory::{Equipment, Inventory};
use crate::player::{BasicAttack, Dash};
use crate::progression::{Experience, PerkPoints, PlayerPerks};
use crate::skills::SkillBar;
use crate::stats::{BaseStats, ComputedStats, DefensiveStats, OffensiveStats};
use crate::SimError;

pub const PLAYER_MAX_HEALTH: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnemyArchetype {
    Charger,
    Ranged,
    Buffer,
    Protector,
}

pub fn spawn_player(world: &mut World, at: Vec2) -> Result<Entity, SimError> {
    let player = world.spawn_bundle((
        Player,
        Position(at),
        Velocity::default(),
        MoveIntent::default(),
        Facing::default(),
        Faction::Player,
        Health::new(PLAYER_MAX_HEALTH),
        Collider::circle(0.4),
        BaseStats::default(),
        ComputedStats::dirty(),
        BasicAttack::default(),
        Dash::default(),
    ))?;
    world.insert(player, SkillBar::starter())?;
    world.insert(player, Inventory::default())?;
    world.insert(player, Equipment::default())?;
    world.insert(player, Experience::default())?;
    world.insert(player, PerkPoints::default())?;
    world.insert(player, PlayerPerks::default())?;
    tracing::debug!(?player, "player spawned");
    Ok(player)
}

struct EnemyTemplate {
    health: f32,
    move_speed: f32,
    armor: f32,
    resist: f32,
    radius: f32,
    experience: u32,
}

fn template(archetype: EnemyArchetype) -> EnemyTemplate {
    match archetype {
        EnemyArchetype::Charger => EnemyTemplate {
            health: 40.0,
            move_speed: 3.5,
            armor: 20.0,
            resist: 0.0,
            radius: 0.5,
            experience: 12,
        },
        EnemyArchetype::Ranged => EnemyTemplate {
            health: 25.0,
            move_speed: 3.0,
            armor: 0.0,
            resist: 15.0,
            radius: 0.4,
            experience: 10,
        },
        EnemyArchetype::Buffer => EnemyTemplate {
            health: 30.0,
            move_speed: 3.2,
            armor: 5.0,
            resist: 25.0,
            radius: 0.4,
            experience: 15,
        },
        EnemyArchetype::Protector => EnemyTemplate {
            health: 60.0,
            move_speed: 2.8,
            armor: 40.0,
            resist: 20.0,
            radius: 0.6,
            experience: 18,
        },
    }
}

/// Spawn an enemy of `archetype` at `at`.
pub fn spawn_enemy(world: &mut World, archetype: EnemyArchetype, at: Vec2) -> Result<Entity, SimError> {
    let t = template(archetype);
    let base = BaseStats {
        offense: OffensiveStats::default(),
        defense: DefensiveStats {
            armor: t.armor,
            resist: t.resist,
        },
        move_speed: t.move_speed,
    };
    let enemy = world.spawn_bundle((
        Position(at),
        Velocity::default(),
        MoveIntent::default(),
        Facing::default(),
        Faction::Enemy,
        Health::new(t.health),
        Collider::circle(t.radius),
        base,
        ComputedStats::dirty(),
        AiBehaviorStateMachine::default(),
        Bounty {
            experience: t.experience,
            loot_table: Some("grunt".to_owned()),
        },
    ))?;
    match archetype {
        EnemyArchetype::Charger => {
            world.insert(enemy, ChargerConfig::default())?;
        }
        EnemyArchetype::Ranged => {
            world.insert(enemy, RangedConfig::default())?;
        }
        EnemyArchetype::Buffer => {
            world.insert(enemy, BufferConfig::default())?;
        }
        EnemyArchetype::Protector => {
            world.insert(enemy, ProtectorConfig::default())?;
        }
    }
    tracing::trace!(?enemy, ?archetype, "enemy spawned");
    Ok(enemy)
}

/// Spawn an immovable box.
pub fn spawn_wall(world: &mut World, center: Vec2, half_extents: Vec2) -> Result<Entity, SimError> {
    Ok(world.spawn_bundle((Position(center), Collider::aabb(half_extents), StaticCollider))?)
}
