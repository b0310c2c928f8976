//! Elite modifiers.
//!
//! An elite carries an [`EliteModifierData`] list. Vampiric, ExplosiveDeath
//! and Shield are deduplicated; ExtraProjectiles stacks and each copy adds one
//! projectile to a ranged volley.

use emberwake_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::{faction_of, Faction, Health, Position};
use crate::context::FrameContext;
use crate::damage::{self, DamageDealt, DamageInfo, DamageSource, DamageType};
use crate::health::EntityDied;
use crate::SimError;

/// Fraction of damage dealt that a Vampiric elite heals.
pub const VAMPIRIC_HEAL_FRACTION: f32 = 0.25;
/// Shield capacity as a fraction of max health.
pub const SHIELD_HEALTH_FRACTION: f32 = 0.3;
/// Seconds without taking damage before a shield refills.
pub const SHIELD_REGEN_DELAY: f32 = 4.0;
pub const EXPLOSION_DELAY: f32 = 0.75;
pub const EXPLOSION_RADIUS: f32 = 3.0;
pub const EXPLOSION_DAMAGE: f32 = 25.0;
/// Max-health multiplier applied when an enemy first becomes elite.
pub const ELITE_HEALTH_MULTIPLIER: f32 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EliteModifierKind {
    Vampiric,
    ExplosiveDeath,
    ExtraProjectiles,
    Shield,
}

impl EliteModifierKind {
    pub const ALL: [EliteModifierKind; 4] = [
        EliteModifierKind::Vampiric,
        EliteModifierKind::ExplosiveDeath,
        EliteModifierKind::ExtraProjectiles,
        EliteModifierKind::Shield,
    ];

    pub fn stacks(self) -> bool {
        matches!(self, EliteModifierKind::ExtraProjectiles)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EliteModifierData {
    pub modifiers: Vec<EliteModifierKind>,
}

impl EliteModifierData {
    /// Add `kind`; returns `false` if it was a duplicate of a unique modifier.
    pub fn add(&mut self, kind: EliteModifierKind) -> bool {
        if !kind.stacks() && self.has(kind) {
            return false;
        }
        self.modifiers.push(kind);
        true
    }

    pub fn has(&self, kind: EliteModifierKind) -> bool {
        self.modifiers.contains(&kind)
    }

    pub fn count(&self, kind: EliteModifierKind) -> usize {
        self.modifiers.iter().filter(|&&m| m == kind).count()
    }
}

/// Damage absorber that refills after [`SHIELD_REGEN_DELAY`] quiet seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EliteShield {
    pub current: f32,
    pub max: f32,
    pub regen_delay: f32,
    pub since_hit: f32,
}

impl EliteShield {
    pub fn new(max: f32) -> Self {
        Self {
            current: max,
            max,
            regen_delay: SHIELD_REGEN_DELAY,
            since_hit: 0.0,
        }
    }

    /// Soak up to `current` of `amount`; returns what passes through.
    pub fn absorb(&mut self, amount: f32) -> f32 {
        self.since_hit = 0.0;
        let soaked = amount.min(self.current).max(0.0);
        self.current -= soaked;
        amount - soaked
    }
}

/// Delayed area blast left behind by an ExplosiveDeath elite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingExplosion {
    pub timer: f32,
    pub radius: f32,
    pub damage: f32,
    pub faction: Faction,
}

/// Number of extra projectiles an elite fires per volley.
pub fn extra_projectiles(world: &World, entity: Entity) -> usize {
    world
        .get::<EliteModifierData>(entity)
        .map_or(0, |data| data.count(EliteModifierKind::ExtraProjectiles))
}

/// Give `entity` an elite modifier. Returns whether it was added.
///
/// The first modifier also raises max health by [`ELITE_HEALTH_MULTIPLIER`].
pub fn attach_elite_modifier(
    world: &mut World,
    entity: Entity,
    kind: EliteModifierKind,
) -> Result<bool, SimError> {
    let added = match world.get_mut::<EliteModifierData>(entity) {
        Some(data) => data.add(kind),
        None => {
            world.insert(
                entity,
                EliteModifierData {
                    modifiers: vec![kind],
                },
            )?;
            if let Some(health) = world.get_mut::<Health>(entity) {
                health.max *= ELITE_HEALTH_MULTIPLIER;
                health.current = health.max;
            }
            true
        }
    };
    if !added {
        tracing::debug!(?entity, ?kind, "duplicate elite modifier ignored");
        return Ok(false);
    }
    if kind == EliteModifierKind::Shield {
        let max = world
            .get::<Health>(entity)
            .map_or(0.0, |h| h.max * SHIELD_HEALTH_FRACTION);
        world.insert(entity, EliteShield::new(max))?;
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Reactions
// ---------------------------------------------------------------------------

/// Subscribe the lifesteal and death-explosion reactions.
pub fn install(world: &mut World) {
    world.subscribe::<DamageDealt, _>(|world, ev| {
        let Some(attacker) = ev.attacker else {
            return;
        };
        let vampiric = world
            .get::<EliteModifierData>(attacker)
            .is_some_and(|d| d.has(EliteModifierKind::Vampiric));
        if !vampiric {
            return;
        }
        if let Some(health) = world.get_mut::<Health>(attacker) {
            if !health.is_depleted() {
                let healed = health.heal(ev.amount * VAMPIRIC_HEAL_FRACTION);
                tracing::trace!(?attacker, healed, "vampiric heal");
            }
        }
    });

    world.subscribe::<EntityDied, _>(|world, ev| {
        let explosive = ev
            .elite
            .as_ref()
            .is_some_and(|d| d.has(EliteModifierKind::ExplosiveDeath));
        if !explosive {
            return;
        }
        tracing::debug!(entity = ?ev.entity, "explosive death armed");
        world.commands().spawn(
            (
                Position(ev.position),
                PendingExplosion {
                    timer: EXPLOSION_DELAY,
                    radius: EXPLOSION_RADIUS,
                    damage: EXPLOSION_DAMAGE,
                    faction: ev.faction,
                },
            ),
            "explosive death",
        );
    });
}

/// Refill shields that have not been hit for their regen delay.
pub fn elite_shield_system(world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
    world.for_each_mut::<EliteShield>(|_, shield| {
        shield.since_hit += ctx.dt;
        if shield.since_hit >= shield.regen_delay {
            shield.current = shield.max;
        }
    });
    Ok(())
}

/// Count down pending explosions and detonate the expired ones.
pub fn explosion_system(world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
    for entity in world.entities_with::<(&PendingExplosion, &Position)>() {
        let Some(pending) = world.get_mut::<PendingExplosion>(entity) else {
            continue;
        };
        pending.timer -= ctx.dt;
        if pending.timer > 0.0 {
            continue;
        }
        let blast = *pending;
        let Some(center) = world.get::<Position>(entity).map(|p| p.0) else {
            continue;
        };
        let targets: Vec<Entity> = world
            .query::<(&Position, &Health)>()
            .filter(|&(target, (pos, health))| {
                !health.is_depleted()
                    && blast.faction.is_hostile_to(faction_of(world, target))
                    && pos.0.distance(center) <= blast.radius
            })
            .map(|(target, _)| target)
            .collect();
        let info = DamageInfo::new(blast.damage, DamageType::Hybrid, DamageSource::Explosion)
            .without_crit();
        tracing::debug!(?entity, hits = targets.len(), "explosion detonated");
        for target in targets {
            damage::apply_environmental_damage(world, target, &info, center, blast.faction)?;
        }
        world.commands().despawn(entity, "explosion detonated");
    }
    Ok(())
}
