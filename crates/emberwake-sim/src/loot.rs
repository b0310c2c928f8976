//! Item definitions, loot rolling and drops.
//!
//! Drops come from weighted tables keyed by name. Each rolled
//! [`ItemInstance`] gets a unique id, a rarity at or above its definition's
//! base rarity, and `rarity.affix_count()` distinct affixes drawn from the
//! definition's pool.

use std::collections::BTreeMap;

use emberwake_ecs::prelude::*;
use glam::Vec2;
use rand::Rng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::components::{Player, Position};
use crate::context::FrameContext;
use crate::health::EntityDied;
use crate::inventory::Inventory;
use crate::rng::{seeded, stream};
use crate::stats::{StatChannel, StatModifiers};
use crate::SimError;

/// Distance at which the player collects a dropped item.
pub const PICKUP_RADIUS: f32 = 1.0;

// ---------------------------------------------------------------------------
// Weighted tables
// ---------------------------------------------------------------------------

/// Weighted random choice. Empty or all-zero tables yield nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedTable<T> {
    entries: Vec<(T, u32)>,
}

impl<T> Default for WeightedTable<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> WeightedTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, value: T, weight: u32) -> Self {
        self.push(value, weight);
        self
    }

    pub fn push(&mut self, value: T, weight: u32) {
        self.entries.push((value, weight));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_weight(&self) -> u64 {
        self.entries.iter().map(|(_, w)| u64::from(*w)).sum()
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&T> {
        self.sample_index(rng).map(|i| &self.entries[i].0)
    }

    fn sample_index<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        let total = self.total_weight();
        if total == 0 {
            return None;
        }
        let mut roll = rng.gen_range(0..total);
        for (i, (_, weight)) in self.entries.iter().enumerate() {
            let weight = u64::from(*weight);
            if roll < weight {
                return Some(i);
            }
            roll -= weight;
        }
        None
    }

    /// Draw and remove one entry.
    fn take<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<T> {
        self.sample_index(rng).map(|i| self.entries.remove(i).0)
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rarity {
    Common,
    Magic,
    Rare,
    Legendary,
}

impl Rarity {
    const ORDER: [Rarity; 4] = [Rarity::Common, Rarity::Magic, Rarity::Rare, Rarity::Legendary];

    pub fn affix_count(self) -> usize {
        match self {
            Rarity::Common => 1,
            Rarity::Magic => 2,
            Rarity::Rare => 3,
            Rarity::Legendary => 4,
        }
    }

    /// `steps` tiers higher, saturating at Legendary.
    pub fn upgraded(self, steps: usize) -> Rarity {
        let idx = Self::ORDER.iter().position(|&r| r == self).unwrap_or(0);
        Self::ORDER[(idx + steps).min(Self::ORDER.len() - 1)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EquipSlot {
    Weapon,
    Armor,
    Trinket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AffixKind {
    /// Adds `value` to the channel.
    Flat,
    /// Multiplies the channel by `1 + value`.
    Percent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffixDefinition {
    pub id: String,
    pub channel: StatChannel,
    pub kind: AffixKind,
    pub min: f32,
    pub max: f32,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Affix {
    pub id: String,
    pub channel: StatChannel,
    pub kind: AffixKind,
    pub value: f32,
}

impl Affix {
    pub fn modifiers(&self) -> StatModifiers {
        match self.kind {
            AffixKind::Flat => StatModifiers::default().with_add(self.channel, self.value),
            AffixKind::Percent => StatModifiers::default().with_mul(self.channel, 1.0 + self.value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub id: String,
    pub name: String,
    pub slot: EquipSlot,
    pub base_rarity: Rarity,
    /// Always-on modifiers of the base item.
    pub implicit: StatModifiers,
    pub affix_pool: Vec<AffixDefinition>,
}

/// A concrete rolled item. Owned by exactly one place at a time: a pickup on
/// the ground, an inventory, or an equipment slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInstance {
    pub instance_id: u64,
    pub definition_id: String,
    pub slot: EquipSlot,
    pub rarity: Rarity,
    pub implicit: StatModifiers,
    pub affixes: Vec<Affix>,
}

impl ItemInstance {
    pub fn modifiers(&self) -> StatModifiers {
        let mut total = self.implicit;
        for affix in &self.affixes {
            total.stack(&affix.modifiers());
        }
        total
    }
}

/// Every known item definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDatabase {
    pub items: BTreeMap<String, ItemDefinition>,
}

impl ItemDatabase {
    pub fn get(&self, id: &str) -> Result<&ItemDefinition, SimError> {
        self.items
            .get(id)
            .ok_or_else(|| SimError::UnknownItem(id.to_owned()))
    }
}

fn affix(id: &str, channel: StatChannel, kind: AffixKind, min: f32, max: f32, weight: u32) -> AffixDefinition {
    AffixDefinition {
        id: id.to_owned(),
        channel,
        kind,
        min,
        max,
        weight,
    }
}

fn common_pool() -> Vec<AffixDefinition> {
    vec![
        affix("mighty", StatChannel::Power, AffixKind::Flat, 0.05, 0.2, 10),
        affix("keen", StatChannel::CritChance, AffixKind::Flat, 0.02, 0.08, 8),
        affix("brutal", StatChannel::CritMultiplier, AffixKind::Flat, 0.1, 0.4, 5),
        affix("swift", StatChannel::CooldownReduction, AffixKind::Flat, 0.03, 0.1, 6),
        affix("sturdy", StatChannel::Armor, AffixKind::Flat, 5.0, 25.0, 10),
        affix("warded", StatChannel::Resist, AffixKind::Flat, 5.0, 25.0, 10),
        affix("fleet", StatChannel::MoveSpeed, AffixKind::Percent, 0.03, 0.1, 6),
    ]
}

impl Default for ItemDatabase {
    fn default() -> Self {
        let defs = [
            ItemDefinition {
                id: "rusty_blade".to_owned(),
                name: "Rusty Blade".to_owned(),
                slot: EquipSlot::Weapon,
                base_rarity: Rarity::Common,
                implicit: StatModifiers::default().with_add(StatChannel::Power, 0.1),
                affix_pool: common_pool(),
            },
            ItemDefinition {
                id: "ember_staff".to_owned(),
                name: "Ember Staff".to_owned(),
                slot: EquipSlot::Weapon,
                base_rarity: Rarity::Magic,
                implicit: StatModifiers::default().with_mul(StatChannel::Power, 1.1),
                affix_pool: common_pool(),
            },
            ItemDefinition {
                id: "leather_coat".to_owned(),
                name: "Leather Coat".to_owned(),
                slot: EquipSlot::Armor,
                base_rarity: Rarity::Common,
                implicit: StatModifiers::default().with_add(StatChannel::Armor, 15.0),
                affix_pool: common_pool(),
            },
            ItemDefinition {
                id: "cinder_charm".to_owned(),
                name: "Cinder Charm".to_owned(),
                slot: EquipSlot::Trinket,
                base_rarity: Rarity::Magic,
                implicit: StatModifiers::default().with_add(StatChannel::CooldownReduction, 0.05),
                affix_pool: common_pool(),
            },
        ];
        Self {
            items: defs.into_iter().map(|d| (d.id.clone(), d)).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rolling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LootTable {
    /// Chance that a death rolls this table at all.
    pub drop_chance: f32,
    /// Item definition ids.
    pub items: WeightedTable<String>,
}

/// Named drop tables, referenced by `Bounty::loot_table`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LootTables {
    pub tables: BTreeMap<String, LootTable>,
}

impl Default for LootTables {
    fn default() -> Self {
        let mut tables = BTreeMap::new();
        tables.insert(
            "grunt".to_owned(),
            LootTable {
                drop_chance: 0.15,
                items: WeightedTable::new()
                    .with("rusty_blade".to_owned(), 5)
                    .with("leather_coat".to_owned(), 5)
                    .with("cinder_charm".to_owned(), 1),
            },
        );
        tables.insert(
            "elite".to_owned(),
            LootTable {
                drop_chance: 1.0,
                items: WeightedTable::new()
                    .with("ember_staff".to_owned(), 3)
                    .with("leather_coat".to_owned(), 2)
                    .with("cinder_charm".to_owned(), 2),
            },
        );
        Self { tables }
    }
}

/// Loot RNG stream plus the instance id counter.
#[derive(Debug, Clone)]
pub struct LootRoller {
    rng: Pcg32,
    next_instance_id: u64,
}

impl LootRoller {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: seeded(seed, stream::LOOT),
            next_instance_id: 1,
        }
    }

    /// Continue numbering after ids already handed out (e.g. a loaded profile).
    pub fn reserve_ids_through(&mut self, highest: u64) {
        self.next_instance_id = self.next_instance_id.max(highest + 1);
    }

    pub fn roll_item(&mut self, def: &ItemDefinition) -> ItemInstance {
        let upgrade = WeightedTable::new().with(0usize, 70).with(1, 22).with(2, 7).with(3, 1);
        let steps = upgrade.sample(&mut self.rng).copied().unwrap_or(0);
        let rarity = def.base_rarity.upgraded(steps);

        let mut pool = WeightedTable::new();
        for affix_def in &def.affix_pool {
            pool.push(affix_def, affix_def.weight);
        }
        let mut affixes = Vec::new();
        while affixes.len() < rarity.affix_count() {
            let Some(affix_def) = pool.take(&mut self.rng) else {
                break;
            };
            let raw = if affix_def.max > affix_def.min {
                self.rng.gen_range(affix_def.min..=affix_def.max)
            } else {
                affix_def.min
            };
            affixes.push(Affix {
                id: affix_def.id.clone(),
                channel: affix_def.channel,
                kind: affix_def.kind,
                value: (raw * 100.0).round() / 100.0,
            });
        }

        let instance_id = self.next_instance_id;
        self.next_instance_id += 1;
        ItemInstance {
            instance_id,
            definition_id: def.id.clone(),
            slot: def.slot,
            rarity,
            implicit: def.implicit,
            affixes,
        }
    }

    /// Roll `table`: first the drop chance, then which item.
    pub fn roll_drop(&mut self, table: &LootTable, db: &ItemDatabase) -> Result<Option<ItemInstance>, SimError> {
        if self.rng.gen::<f32>() >= table.drop_chance {
            return Ok(None);
        }
        let Some(id) = table.items.sample(&mut self.rng) else {
            return Ok(None);
        };
        let def = db.get(id)?;
        Ok(Some(self.roll_item(def)))
    }
}

/// An item lying on the ground.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPickup {
    pub item: ItemInstance,
}

/// Roll drops for deaths that carry a loot table.
pub fn install(world: &mut World) {
    world.subscribe::<EntityDied, _>(|world, ev| {
        let Some(table_name) = ev.bounty.as_ref().and_then(|b| b.loot_table.as_deref()) else {
            return;
        };
        let Some(table) = world
            .resource::<LootTables>()
            .and_then(|t| t.tables.get(table_name))
            .cloned()
        else {
            tracing::warn!(table = table_name, "unknown loot table");
            return;
        };
        let rolled = world.resource_scope::<LootRoller, _>(|world, roller| -> Result<_, SimError> {
            let db = world
                .resource::<ItemDatabase>()
                .ok_or(SimError::MissingResource("ItemDatabase"))?;
            roller.roll_drop(&table, db)
        });
        match rolled {
            Some(Ok(Some(item))) => {
                tracing::debug!(item = %item.definition_id, rarity = ?item.rarity, "loot dropped");
                world
                    .commands()
                    .spawn((Position(ev.position), ItemPickup { item }), "loot drop");
            }
            Some(Ok(None)) => {}
            Some(Err(err)) => tracing::warn!(%err, "loot roll failed"),
            None => tracing::warn!("no LootRoller resource; drop skipped"),
        }
    });
}

/// Move pickups within reach into the player's inventory.
pub fn pickup_system(world: &mut World, _ctx: &FrameContext) -> Result<(), SimError> {
    let Some((player, player_pos)) = world
        .query::<(&Player, &Position)>()
        .map(|(e, (_, p))| (e, p.0))
        .next()
    else {
        return Ok(());
    };
    let in_reach: Vec<Entity> = world
        .query::<(&ItemPickup, &Position)>()
        .filter(|(_, (_, pos))| pos.0.distance(player_pos) <= PICKUP_RADIUS)
        .map(|(e, _)| e)
        .collect();
    for pickup in in_reach {
        let full = world
            .get::<Inventory>(player)
            .map_or(true, Inventory::is_full);
        if full {
            break;
        }
        if let Some(ItemPickup { item }) = world.remove::<ItemPickup>(pickup)? {
            tracing::debug!(item = %item.definition_id, "item picked up");
            if let Some(inventory) = world.get_mut::<Inventory>(player) {
                inventory.items.push(item);
            }
            world.commands().despawn(pickup, "item picked up");
        }
    }
    Ok(())
}

/// Spawn a pickup directly (debug tools, tests).
pub fn drop_item(world: &mut World, at: Vec2, item: ItemInstance) -> Result<Entity, SimError> {
    Ok(world.spawn_bundle((Position(at), ItemPickup { item }))?)
}
