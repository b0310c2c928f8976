//! Damage calculation and application.
//!
//! [`DamageCalculator::calculate`] is the single place where raw damage turns
//! into final damage: power scaling, crit roll and armor/resist mitigation.
//! [`apply_damage`] runs the calculation with the attacker's and target's
//! fresh stats and publishes a [`DamageDealt`] event. Health is only touched
//! by the event's subscriber when the bus drains.

use emberwake_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::components::{faction_of, Faction};
use crate::config::{MAX_MITIGATION, MITIGATION_CONSTANT};
use crate::rng::CombatRng;
use crate::stats::{self, DefensiveStats, OffensiveStats};
use crate::status::StatusKind;
use crate::SimError;

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageType {
    /// Mitigated by armor.
    Physical,
    /// Mitigated by resist.
    Arcane,
    /// Mitigated by the average of both reductions.
    Hybrid,
    /// Never mitigated.
    True,
}

/// Per-hit behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageFlags {
    pub can_crit: bool,
    pub ignore_armor: bool,
    pub ignore_resist: bool,
}

impl Default for DamageFlags {
    fn default() -> Self {
        Self {
            can_crit: true,
            ignore_armor: false,
            ignore_resist: false,
        }
    }
}

/// What produced the hit. Used for logging and on-hit reactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageSource {
    Melee,
    Charge,
    Projectile,
    Skill,
    Explosion,
    StatusEffect,
    Environment,
}

/// Status effect attached to a hit, applied only if the target survives it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub kind: StatusKind,
    pub duration: f32,
    /// Damage per second for DoTs, slow fraction for Slow, unused by Stun.
    pub potency: f32,
}

/// Everything needed to compute one hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageInfo {
    pub base_damage: f32,
    pub damage_type: DamageType,
    pub flags: DamageFlags,
    pub source: DamageSource,
    pub status: Option<StatusPayload>,
}

impl DamageInfo {
    pub fn new(base_damage: f32, damage_type: DamageType, source: DamageSource) -> Self {
        Self {
            base_damage,
            damage_type,
            flags: DamageFlags::default(),
            source,
            status: None,
        }
    }

    pub fn physical(base_damage: f32, source: DamageSource) -> Self {
        Self::new(base_damage, DamageType::Physical, source)
    }

    pub fn arcane(base_damage: f32, source: DamageSource) -> Self {
        Self::new(base_damage, DamageType::Arcane, source)
    }

    pub fn without_crit(mut self) -> Self {
        self.flags.can_crit = false;
        self
    }

    pub fn ignoring_armor(mut self) -> Self {
        self.flags.ignore_armor = true;
        self
    }

    pub fn ignoring_resist(mut self) -> Self {
        self.flags.ignore_resist = true;
        self
    }

    pub fn with_status(mut self, status: StatusPayload) -> Self {
        self.status = Some(status);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageResult {
    pub final_damage: f32,
    pub is_crit: bool,
    /// Fraction of the post-crit damage removed by mitigation.
    pub reduction: f32,
    pub damage_type: DamageType,
    pub source: DamageSource,
}

/// Published once per landed hit. Health, shields, statuses and lifesteal are
/// resolved by subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct DamageDealt {
    pub target: Entity,
    /// `None` for environmental damage.
    pub attacker: Option<Entity>,
    pub attacker_faction: Faction,
    pub amount: f32,
    pub is_crit: bool,
    pub damage_type: DamageType,
    pub source: DamageSource,
    /// Where the hit came from (knockback, hit-direction effects).
    pub source_position: Vec2,
    pub status: Option<StatusPayload>,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// `s / (s + 100)`, clamped to `[0, 0.9]`.
pub fn mitigation(stat: f32) -> f32 {
    let stat = stat.max(0.0);
    (stat / (stat + MITIGATION_CONSTANT)).clamp(0.0, MAX_MITIGATION)
}

/// Damage reduction for `info` against `defense`.
pub fn reduction_for(info: &DamageInfo, defense: &DefensiveStats) -> f32 {
    let armor = if info.flags.ignore_armor {
        0.0
    } else {
        mitigation(defense.armor)
    };
    let resist = if info.flags.ignore_resist {
        0.0
    } else {
        mitigation(defense.resist)
    };
    match info.damage_type {
        DamageType::Physical => armor,
        DamageType::Arcane => resist,
        DamageType::Hybrid => (armor + resist) * 0.5,
        DamageType::True => 0.0,
    }
}

/// Session-wide calculator owning the combat RNG stream.
#[derive(Debug, Clone)]
pub struct DamageCalculator {
    rng: CombatRng,
}

impl DamageCalculator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: CombatRng::from_seed(seed),
        }
    }

    /// Power scaling, then crit, then mitigation. Never negative.
    ///
    /// The RNG is only consumed when the hit can crit.
    pub fn calculate(
        &mut self,
        info: &DamageInfo,
        offense: &OffensiveStats,
        defense: &DefensiveStats,
    ) -> DamageResult {
        let mut damage = info.base_damage.max(0.0) * offense.power.max(0.0);
        let is_crit = info.flags.can_crit && self.rng.roll(offense.crit_chance);
        if is_crit {
            damage *= offense.crit_multiplier;
        }
        let reduction = reduction_for(info, defense);
        DamageResult {
            final_damage: (damage * (1.0 - reduction)).max(0.0),
            is_crit,
            reduction,
            damage_type: info.damage_type,
            source: info.source,
        }
    }
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Compute a hit from `attacker` on `target` and publish [`DamageDealt`].
///
/// Returns `Ok(None)` without side effects if the target is already gone.
/// A dead attacker (e.g. a projectile owner) falls back to default stats.
pub fn apply_damage(
    world: &mut World,
    attacker: Entity,
    target: Entity,
    info: &DamageInfo,
    source_position: Vec2,
) -> Result<Option<DamageResult>, SimError> {
    if !world.is_alive(target) {
        return Ok(None);
    }
    let offense = stats::offense_of(world, attacker);
    let attacker_faction = faction_of(world, attacker);
    let attacker = world.is_alive(attacker).then_some(attacker);
    deal(world, attacker, attacker_faction, target, info, &offense, source_position)
}

/// Damage with no attacking entity (hazards, expired owners, DoTs whose
/// source died). Uses default offensive stats.
pub fn apply_environmental_damage(
    world: &mut World,
    target: Entity,
    info: &DamageInfo,
    source_position: Vec2,
    faction: Faction,
) -> Result<Option<DamageResult>, SimError> {
    if !world.is_alive(target) {
        return Ok(None);
    }
    deal(
        world,
        None,
        faction,
        target,
        info,
        &OffensiveStats::default(),
        source_position,
    )
}

fn deal(
    world: &mut World,
    attacker: Option<Entity>,
    attacker_faction: Faction,
    target: Entity,
    info: &DamageInfo,
    offense: &OffensiveStats,
    source_position: Vec2,
) -> Result<Option<DamageResult>, SimError> {
    let defense = stats::defense_of(world, target);
    let calculator = world
        .resource_mut::<DamageCalculator>()
        .ok_or(SimError::MissingResource("DamageCalculator"))?;
    let result = calculator.calculate(info, offense, &defense);
    tracing::trace!(
        ?target,
        ?attacker,
        damage = result.final_damage,
        crit = result.is_crit,
        source = ?result.source,
        "damage dealt"
    );
    world.publish(DamageDealt {
        target,
        attacker,
        attacker_faction,
        amount: result.final_damage,
        is_crit: result.is_crit,
        damage_type: result.damage_type,
        source: result.source,
        source_position,
        status: info.status,
    });
    Ok(Some(result))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
