//! Shared gameplay components: transform, faction, health and colliders.
//!
//! Role-specific data (AI configs, hitboxes, buffs, items) lives next to the
//! systems that own it.

use emberwake_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// World-space position in game units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position(pub Vec2);

/// Velocity applied by the last movement pass.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity(pub Vec2);

/// Desired movement direction. The movement system normalizes it and scales
/// by the entity's computed move speed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MoveIntent(pub Vec2);

/// Decaying external impulse, added on top of intent-driven movement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Knockback {
    pub velocity: Vec2,
    pub remaining: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Faction {
    Player,
    Enemy,
    Neutral,
}

impl Faction {
    /// Players and enemies fight each other. Neutral entities fight nobody.
    pub fn is_hostile_to(self, other: Faction) -> bool {
        matches!(
            (self, other),
            (Faction::Player, Faction::Enemy) | (Faction::Enemy, Faction::Player)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn is_depleted(&self) -> bool {
        self.current <= 0.0
    }

    /// Restore up to `max`; returns the amount actually healed.
    pub fn heal(&mut self, amount: f32) -> f32 {
        let before = self.current;
        self.current = (self.current + amount.max(0.0)).min(self.max);
        self.current - before
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ColliderShape {
    Circle { radius: f32 },
    Aabb { half_extents: Vec2 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collider {
    pub shape: ColliderShape,
}

impl Collider {
    pub fn circle(radius: f32) -> Self {
        Self {
            shape: ColliderShape::Circle { radius },
        }
    }

    pub fn aabb(half_extents: Vec2) -> Self {
        Self {
            shape: ColliderShape::Aabb { half_extents },
        }
    }

    /// Radius used for circle-vs-circle contact tests.
    pub fn radius(&self) -> f32 {
        match self.shape {
            ColliderShape::Circle { radius } => radius,
            ColliderShape::Aabb { half_extents } => half_extents.length(),
        }
    }
}

/// Marks an immovable collider (walls, props).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StaticCollider;

/// Set once health reaches zero; the entity is despawned at end of frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dead;

/// Rewards granted to the killer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounty {
    pub experience: u32,
    pub loot_table: Option<String>,
}

/// The player-controlled entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Player;

/// Unit facing, updated from input or AI aim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Facing(pub Vec2);

impl Default for Facing {
    fn default() -> Self {
        Self(Vec2::X)
    }
}

/// Position of `entity`, or `None` if it has none (or is dead).
pub fn position_of(world: &World, entity: Entity) -> Option<Vec2> {
    world.get::<Position>(entity).map(|p| p.0)
}

/// Faction of `entity`, defaulting to [`Faction::Neutral`].
pub fn faction_of(world: &World, entity: Entity) -> Faction {
    world
        .get::<Faction>(entity)
        .copied()
        .unwrap_or(Faction::Neutral)
}

/// Alive, has health left and is not already marked [`Dead`].
pub fn is_targetable(world: &World, entity: Entity) -> bool {
    world.is_alive(entity)
        && !world.has::<Dead>(entity)
        && world.get::<Health>(entity).is_some_and(|h| !h.is_depleted())
}

/// Closest targetable entity hostile to `faction` within `range` of `origin`.
pub fn nearest_hostile(
    world: &World,
    origin: Vec2,
    faction: Faction,
    range: f32,
) -> Option<(Entity, Vec2, f32)> {
    nearest_matching(world, origin, range, |other, _| faction.is_hostile_to(other))
}

/// Closest targetable entity of `faction` within `range`, excluding `exclude`.
pub fn nearest_ally(
    world: &World,
    origin: Vec2,
    faction: Faction,
    range: f32,
    exclude: Entity,
) -> Option<(Entity, Vec2, f32)> {
    nearest_matching(world, origin, range, |other, e| other == faction && e != exclude)
}

pub(crate) fn nearest_matching(
    world: &World,
    origin: Vec2,
    range: f32,
    mut accept: impl FnMut(Faction, Entity) -> bool,
) -> Option<(Entity, Vec2, f32)> {
    let mut best: Option<(Entity, Vec2, f32)> = None;
    for (entity, (pos, faction, health)) in world.query::<(&Position, &Faction, &Health)>() {
        if health.is_depleted() || world.has::<Dead>(entity) || !accept(*faction, entity) {
            continue;
        }
        let dist = pos.0.distance(origin);
        if dist > range {
            continue;
        }
        // Ties break on entity order so results never depend on table layout.
        let better = match best {
            None => true,
            Some((b, _, d)) => dist < d || (dist == d && entity < b),
        };
        if better {
            best = Some((entity, pos.0, dist));
        }
    }
    best
}
