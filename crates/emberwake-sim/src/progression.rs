//! Experience, levels and perks.
//!
//! Kills grant experience to the killer; each level-up awards one perk point.
//! Perks are ranked; rank 0 is represented by the perk's absence.

use std::collections::BTreeMap;

use emberwake_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::Faction;
use crate::context::FrameContext;
use crate::health::EntityDied;
use crate::stats::{self, StatChannel, StatModifiers};
use crate::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experience {
    pub level: u32,
    /// Progress toward the next level.
    pub current: u32,
}

impl Default for Experience {
    fn default() -> Self {
        Self { level: 1, current: 0 }
    }
}

/// Experience needed to go from `level` to `level + 1`.
pub fn xp_to_next(level: u32) -> u32 {
    40 + 20 * level
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PerkPoints {
    pub available: u32,
}

/// Published per level gained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelUp {
    pub entity: Entity,
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerkDefinition {
    pub id: String,
    pub name: String,
    pub max_rank: u32,
    pub per_rank: StatModifiers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerkCatalog {
    pub perks: BTreeMap<String, PerkDefinition>,
}

impl PerkCatalog {
    pub fn get(&self, id: &str) -> Result<&PerkDefinition, SimError> {
        self.perks
            .get(id)
            .ok_or_else(|| SimError::UnknownPerk(id.to_owned()))
    }
}

impl Default for PerkCatalog {
    fn default() -> Self {
        let perk = |id: &str, name: &str, max_rank: u32, per_rank: StatModifiers| PerkDefinition {
            id: id.to_owned(),
            name: name.to_owned(),
            max_rank,
            per_rank,
        };
        let defs = [
            perk("might", "Might", 5, StatModifiers::default().with_add(StatChannel::Power, 0.1)),
            perk(
                "precision",
                "Precision",
                5,
                StatModifiers::default().with_add(StatChannel::CritChance, 0.03),
            ),
            perk(
                "alacrity",
                "Alacrity",
                4,
                StatModifiers::default().with_add(StatChannel::CooldownReduction, 0.05),
            ),
            perk(
                "bulwark",
                "Bulwark",
                5,
                StatModifiers::default()
                    .with_add(StatChannel::Armor, 10.0)
                    .with_add(StatChannel::Resist, 10.0),
            ),
            perk(
                "swiftness",
                "Swiftness",
                3,
                StatModifiers::default().with_mul(StatChannel::MoveSpeed, 1.05),
            ),
        ];
        Self {
            perks: defs.into_iter().map(|d| (d.id.clone(), d)).collect(),
        }
    }
}

/// Allocated perk ranks. Only ranks >= 1 are stored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerPerks {
    pub ranks: BTreeMap<String, u32>,
}

impl PlayerPerks {
    pub fn rank(&self, id: &str) -> u32 {
        self.ranks.get(id).copied().unwrap_or(0)
    }
}

pub fn perk_modifiers(perks: &PlayerPerks, catalog: &PerkCatalog) -> StatModifiers {
    let mut total = StatModifiers::default();
    for (id, &rank) in &perks.ranks {
        match catalog.perks.get(id) {
            Some(def) => total.stack(&def.per_rank.repeated(rank.min(def.max_rank))),
            None => tracing::warn!(perk = %id, "allocated perk missing from catalog"),
        }
    }
    total
}

fn missing(entity: Entity, component: &'static str) -> SimError {
    SimError::MissingComponent { entity, component }
}

/// Spend a point on `perk_id`. Returns the new rank.
pub fn allocate_perk(world: &mut World, entity: Entity, perk_id: &str) -> Result<u32, SimError> {
    let max_rank = world
        .resource::<PerkCatalog>()
        .ok_or(SimError::MissingResource("PerkCatalog"))?
        .get(perk_id)?
        .max_rank;
    let points = world
        .get::<PerkPoints>(entity)
        .ok_or_else(|| missing(entity, "PerkPoints"))?
        .available;
    let perks = world
        .get_mut::<PlayerPerks>(entity)
        .ok_or_else(|| missing(entity, "PlayerPerks"))?;
    let rank = perks.rank(perk_id);
    if rank >= max_rank {
        return Err(SimError::PerkMaxRank(perk_id.to_owned()));
    }
    if points == 0 {
        return Err(SimError::NoPerkPoints);
    }
    perks.ranks.insert(perk_id.to_owned(), rank + 1);
    if let Some(p) = world.get_mut::<PerkPoints>(entity) {
        p.available -= 1;
    }
    stats::mark_dirty(world, entity);
    tracing::debug!(?entity, perk = perk_id, rank = rank + 1, "perk allocated");
    Ok(rank + 1)
}

/// Refund one rank of `perk_id`. Returns the new rank; at 0 the perk is
/// removed.
pub fn deallocate_perk(world: &mut World, entity: Entity, perk_id: &str) -> Result<u32, SimError> {
    let perks = world
        .get_mut::<PlayerPerks>(entity)
        .ok_or_else(|| missing(entity, "PlayerPerks"))?;
    let rank = perks.rank(perk_id);
    if rank == 0 {
        return Err(SimError::PerkNotAllocated(perk_id.to_owned()));
    }
    if rank == 1 {
        perks.ranks.remove(perk_id);
    } else {
        perks.ranks.insert(perk_id.to_owned(), rank - 1);
    }
    match world.get_mut::<PerkPoints>(entity) {
        Some(p) => p.available += 1,
        None => {
            world.insert(entity, PerkPoints { available: 1 })?;
        }
    }
    stats::mark_dirty(world, entity);
    Ok(rank - 1)
}

/// Add experience, resolving any number of level-ups. Returns levels gained.
pub fn grant_experience(world: &mut World, entity: Entity, amount: u32) -> u32 {
    let Some(xp) = world.get_mut::<Experience>(entity) else {
        return 0;
    };
    xp.current += amount;
    let mut gained = Vec::new();
    while xp.current >= xp_to_next(xp.level) {
        xp.current -= xp_to_next(xp.level);
        xp.level += 1;
        gained.push(xp.level);
    }
    if gained.is_empty() {
        return 0;
    }
    if let Some(points) = world.get_mut::<PerkPoints>(entity) {
        points.available += gained.len() as u32;
    }
    for &level in &gained {
        tracing::info!(?entity, level, "level up");
        world.publish(LevelUp { entity, level });
    }
    gained.len() as u32
}

/// Per-run tallies.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub kills: u32,
    pub elapsed: f32,
}

pub fn run_clock_system(world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
    if let Some(run) = world.resource_mut::<RunStats>() {
        run.elapsed += ctx.dt;
    }
    Ok(())
}

/// Experience to killers and the kill counter.
pub fn install(world: &mut World) {
    world.subscribe::<EntityDied, _>(|world, ev| {
        if ev.faction == Faction::Enemy {
            if let Some(run) = world.resource_mut::<RunStats>() {
                run.kills += 1;
            }
        }
        let (Some(killer), Some(bounty)) = (ev.killer, ev.bounty.as_ref()) else {
            return;
        };
        if world.is_alive(killer) && bounty.experience > 0 {
            grant_experience(world, killer, bounty.experience);
        }
    });
}
