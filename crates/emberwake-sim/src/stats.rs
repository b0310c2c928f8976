//! Stat aggregation: base stats plus modifiers from equipment, perks, buffs
//! and status effects, resolved into a cached [`ComputedStats`].
//!
//! Every modifier source marks the cache dirty when it changes. Readers go
//! through [`current`] (or [`offense_of`]/[`defense_of`]), which recompute a
//! dirty cache before returning it, so a stale value is never observed.
//!
//! ```
//! use emberwake_sim::stats::{compute_stats, BaseStats, StatChannel, StatModifiers};
//!
//! let mods = StatModifiers::default()
//!     .with_add(StatChannel::Power, 0.5)
//!     .with_mul(StatChannel::Power, 1.2);
//! let stats = compute_stats(&BaseStats::default(), &mods);
//! assert!((stats.offense.power - 1.8).abs() < 1e-6);
//! ```

use emberwake_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::buffs::{self, ActiveBuffs};
use crate::config::{MAX_COOLDOWN_REDUCTION, MIN_COOLDOWN};
use crate::context::FrameContext;
use crate::inventory::{self, Equipment};
use crate::progression::{self, PerkCatalog, PlayerPerks};
use crate::status::{self, StatusEffects};
use crate::SimError;

// ---------------------------------------------------------------------------
// Stat blocks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffensiveStats {
    /// Outgoing damage multiplier.
    pub power: f32,
    /// Probability in `[0, 1]`.
    pub crit_chance: f32,
    pub crit_multiplier: f32,
    /// Global cooldown reduction, `[0, 0.8]`.
    pub cooldown_reduction: f32,
}

impl Default for OffensiveStats {
    fn default() -> Self {
        Self {
            power: 1.0,
            crit_chance: 0.05,
            crit_multiplier: 1.5,
            cooldown_reduction: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DefensiveStats {
    pub armor: f32,
    pub resist: f32,
}

/// Unmodified stats of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseStats {
    pub offense: OffensiveStats,
    pub defense: DefensiveStats,
    pub move_speed: f32,
}

impl Default for BaseStats {
    fn default() -> Self {
        Self {
            offense: OffensiveStats::default(),
            defense: DefensiveStats::default(),
            move_speed: 5.0,
        }
    }
}

/// Cached result of [`compute_stats`].
///
/// Read it through [`current`]; the raw component may be dirty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComputedStats {
    pub offense: OffensiveStats,
    pub defense: DefensiveStats,
    pub move_speed: f32,
    pub is_dirty: bool,
}

impl ComputedStats {
    /// A dirty placeholder, filled on first read.
    pub fn dirty() -> Self {
        Self {
            offense: OffensiveStats::default(),
            defense: DefensiveStats::default(),
            move_speed: 0.0,
            is_dirty: true,
        }
    }
}

impl Default for ComputedStats {
    fn default() -> Self {
        Self::dirty()
    }
}

// ---------------------------------------------------------------------------
// Modifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatChannel {
    Power,
    CritChance,
    CritMultiplier,
    CooldownReduction,
    Armor,
    Resist,
    MoveSpeed,
}

/// `(base + additive) * multiplicative` for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatModifier {
    pub additive: f32,
    pub multiplicative: f32,
}

impl Default for StatModifier {
    fn default() -> Self {
        Self {
            additive: 0.0,
            multiplicative: 1.0,
        }
    }
}

impl StatModifier {
    pub fn apply(&self, base: f32) -> f32 {
        (base + self.additive) * self.multiplicative
    }

    fn stack(&mut self, other: &StatModifier) {
        self.additive += other.additive;
        self.multiplicative *= other.multiplicative;
    }
}

/// One modifier per channel. Combining sums additives and multiplies
/// multiplicatives.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatModifiers {
    pub power: StatModifier,
    pub crit_chance: StatModifier,
    pub crit_multiplier: StatModifier,
    pub cooldown_reduction: StatModifier,
    pub armor: StatModifier,
    pub resist: StatModifier,
    pub move_speed: StatModifier,
}

impl StatModifiers {
    pub fn channel(&self, channel: StatChannel) -> &StatModifier {
        match channel {
            StatChannel::Power => &self.power,
            StatChannel::CritChance => &self.crit_chance,
            StatChannel::CritMultiplier => &self.crit_multiplier,
            StatChannel::CooldownReduction => &self.cooldown_reduction,
            StatChannel::Armor => &self.armor,
            StatChannel::Resist => &self.resist,
            StatChannel::MoveSpeed => &self.move_speed,
        }
    }

    pub fn channel_mut(&mut self, channel: StatChannel) -> &mut StatModifier {
        match channel {
            StatChannel::Power => &mut self.power,
            StatChannel::CritChance => &mut self.crit_chance,
            StatChannel::CritMultiplier => &mut self.crit_multiplier,
            StatChannel::CooldownReduction => &mut self.cooldown_reduction,
            StatChannel::Armor => &mut self.armor,
            StatChannel::Resist => &mut self.resist,
            StatChannel::MoveSpeed => &mut self.move_speed,
        }
    }

    pub fn with_add(mut self, channel: StatChannel, value: f32) -> Self {
        self.channel_mut(channel).additive += value;
        self
    }

    pub fn with_mul(mut self, channel: StatChannel, factor: f32) -> Self {
        self.channel_mut(channel).multiplicative *= factor;
        self
    }

    /// Fold `other` into `self`.
    pub fn stack(&mut self, other: &StatModifiers) {
        self.power.stack(&other.power);
        self.crit_chance.stack(&other.crit_chance);
        self.crit_multiplier.stack(&other.crit_multiplier);
        self.cooldown_reduction.stack(&other.cooldown_reduction);
        self.armor.stack(&other.armor);
        self.resist.stack(&other.resist);
        self.move_speed.stack(&other.move_speed);
    }

    pub fn combine<'a>(all: impl IntoIterator<Item = &'a StatModifiers>) -> StatModifiers {
        let mut total = StatModifiers::default();
        for m in all {
            total.stack(m);
        }
        total
    }

    /// The same modifier applied `times` times (perk ranks).
    pub fn repeated(&self, times: u32) -> StatModifiers {
        let mut total = StatModifiers::default();
        for _ in 0..times {
            total.stack(self);
        }
        total
    }
}

// ---------------------------------------------------------------------------
// Computation
// ---------------------------------------------------------------------------

/// Apply `mods` to `base` and clamp every channel into its legal range.
pub fn compute_stats(base: &BaseStats, mods: &StatModifiers) -> ComputedStats {
    let offense = OffensiveStats {
        power: mods.power.apply(base.offense.power).max(0.0),
        crit_chance: mods.crit_chance.apply(base.offense.crit_chance).clamp(0.0, 1.0),
        crit_multiplier: mods.crit_multiplier.apply(base.offense.crit_multiplier).max(1.0),
        cooldown_reduction: mods
            .cooldown_reduction
            .apply(base.offense.cooldown_reduction)
            .clamp(0.0, MAX_COOLDOWN_REDUCTION),
    };
    let defense = DefensiveStats {
        armor: mods.armor.apply(base.defense.armor).max(0.0),
        resist: mods.resist.apply(base.defense.resist).max(0.0),
    };
    ComputedStats {
        offense,
        defense,
        move_speed: mods.move_speed.apply(base.move_speed).max(0.0),
        is_dirty: false,
    }
}

/// Cooldown after reduction. `total_reduction` is the additive sum of every
/// source; it is capped at 0.8 and the result never drops below 0.1 s.
pub fn effective_cooldown(base: f32, total_reduction: f32) -> f32 {
    let reduction = total_reduction.clamp(0.0, MAX_COOLDOWN_REDUCTION);
    (base * (1.0 - reduction)).max(MIN_COOLDOWN)
}

/// Every active modifier on `entity`, combined.
pub fn gather_modifiers(world: &World, entity: Entity) -> StatModifiers {
    let mut total = StatModifiers::default();
    if let Some(equipment) = world.get::<Equipment>(entity) {
        total.stack(&inventory::equipment_modifiers(equipment));
    }
    if let (Some(perks), Some(catalog)) = (
        world.get::<PlayerPerks>(entity),
        world.resource::<PerkCatalog>(),
    ) {
        total.stack(&progression::perk_modifiers(perks, catalog));
    }
    if let Some(active) = world.get::<ActiveBuffs>(entity) {
        total.stack(&buffs::buff_modifiers(active));
    }
    if let Some(effects) = world.get::<StatusEffects>(entity) {
        total.stack(&status::status_modifiers(effects));
    }
    total
}

/// Flag the cache of `entity` for recomputation. No-op without a cache.
pub fn mark_dirty(world: &mut World, entity: Entity) {
    if let Some(stats) = world.get_mut::<ComputedStats>(entity) {
        stats.is_dirty = true;
    }
}

/// Fresh stats for `entity`, recomputing (and caching) a dirty value first.
///
/// Entities without [`BaseStats`] have no stats.
pub fn current(world: &mut World, entity: Entity) -> Option<ComputedStats> {
    let base = *world.get::<BaseStats>(entity)?;
    let cached = world.get::<ComputedStats>(entity).copied();
    match cached {
        Some(cached) if !cached.is_dirty => Some(cached),
        Some(_) => {
            let fresh = compute_stats(&base, &gather_modifiers(world, entity));
            if let Some(slot) = world.get_mut::<ComputedStats>(entity) {
                *slot = fresh;
            }
            Some(fresh)
        }
        None => Some(compute_stats(&base, &gather_modifiers(world, entity))),
    }
}

/// Offensive stats, or defaults for entities without stats (hazards).
pub fn offense_of(world: &mut World, entity: Entity) -> OffensiveStats {
    current(world, entity).map(|s| s.offense).unwrap_or_default()
}

pub fn defense_of(world: &mut World, entity: Entity) -> DefensiveStats {
    current(world, entity).map(|s| s.defense).unwrap_or_default()
}

/// Recompute every dirty cache once per frame so the component is fresh for
/// readers outside the simulation (HUD, debug overlays).
pub fn stat_recompute_system(world: &mut World, _ctx: &FrameContext) -> Result<(), SimError> {
    let dirty: Vec<Entity> = world
        .query::<(&ComputedStats,)>()
        .filter(|(_, (stats,))| stats.is_dirty)
        .map(|(entity, _)| entity)
        .collect();
    for entity in dirty {
        current(world, entity);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffs::{attach_buff, BuffType, TimedBuff};

    fn setup_world() -> World {
        let mut world = World::new();
        crate::register_components(&mut world);
        world
    }

    #[test]
    fn additive_then_multiplicative() {
        let mods = StatModifiers::default()
            .with_add(StatChannel::Power, 0.5)
            .with_mul(StatChannel::Power, 1.2);
        let stats = compute_stats(&BaseStats::default(), &mods);
        assert!((stats.offense.power - 1.8).abs() < 1e-6);
        assert!(!stats.is_dirty);
    }

    #[test]
    fn combine_sums_additive_and_multiplies_multiplicative() {
        let a = StatModifiers::default()
            .with_add(StatChannel::Armor, 10.0)
            .with_mul(StatChannel::Armor, 1.5);
        let b = StatModifiers::default()
            .with_add(StatChannel::Armor, 5.0)
            .with_mul(StatChannel::Armor, 2.0);
        let total = StatModifiers::combine([&a, &b]);
        assert_eq!(total.armor.additive, 15.0);
        assert_eq!(total.armor.multiplicative, 3.0);
    }

    #[test]
    fn channels_are_clamped() {
        let mods = StatModifiers::default()
            .with_add(StatChannel::CritChance, 3.0)
            .with_add(StatChannel::CooldownReduction, 2.0)
            .with_add(StatChannel::Armor, -500.0)
            .with_mul(StatChannel::MoveSpeed, -1.0);
        let stats = compute_stats(&BaseStats::default(), &mods);
        assert_eq!(stats.offense.crit_chance, 1.0);
        assert_eq!(stats.offense.cooldown_reduction, MAX_COOLDOWN_REDUCTION);
        assert_eq!(stats.defense.armor, 0.0);
        assert_eq!(stats.move_speed, 0.0);
    }

    #[test]
    fn cooldown_reduction_caps_and_floors() {
        assert!((effective_cooldown(10.0, 0.9) - 2.0).abs() < 1e-5);
        assert!((effective_cooldown(10.0, 0.25) - 7.5).abs() < 1e-5);
        assert_eq!(effective_cooldown(0.2, 0.8), MIN_COOLDOWN);
        assert_eq!(effective_cooldown(5.0, -1.0), 5.0);
    }

    #[test]
    fn repeated_scales_ranks() {
        let per_rank = StatModifiers::default()
            .with_add(StatChannel::Power, 0.1)
            .with_mul(StatChannel::Power, 1.1);
        let three = per_rank.repeated(3);
        assert!((three.power.additive - 0.3).abs() < 1e-6);
        assert!((three.power.multiplicative - 1.331).abs() < 1e-5);
        assert_eq!(per_rank.repeated(0), StatModifiers::default());
    }

    #[test]
    fn current_recomputes_dirty_cache() {
        let mut world = setup_world();
        let e = world
            .spawn_bundle((BaseStats::default(), ComputedStats::dirty()))
            .unwrap();
        let first = current(&mut world, e).unwrap();
        assert_eq!(first.offense.power, 1.0);
        assert!(!world.get::<ComputedStats>(e).unwrap().is_dirty);

        let buff = TimedBuff::new(
            BuffType::Empower,
            5.0,
            StatModifiers::default().with_mul(StatChannel::Power, 2.0),
        );
        attach_buff(&mut world, e, buff).unwrap();
        assert!(world.get::<ComputedStats>(e).unwrap().is_dirty);
        assert_eq!(current(&mut world, e).unwrap().offense.power, 2.0);
    }

    #[test]
    fn recompute_system_clears_every_dirty_flag() {
        let mut world = setup_world();
        let a = world
            .spawn_bundle((BaseStats::default(), ComputedStats::dirty()))
            .unwrap();
        let b = world
            .spawn_bundle((BaseStats::default(), ComputedStats::dirty()))
            .unwrap();
        stat_recompute_system(&mut world, &FrameContext::idle(0.016)).unwrap();
        for e in [a, b] {
            let stats = world.get::<ComputedStats>(e).unwrap();
            assert!(!stats.is_dirty);
            assert_eq!(stats.move_speed, 5.0);
        }
    }

    #[test]
    fn entity_without_base_has_no_stats() {
        let mut world = setup_world();
        let e = world.spawn();
        assert!(current(&mut world, e).is_none());
        assert_eq!(offense_of(&mut world, e), OffensiveStats::default());
    }
}
