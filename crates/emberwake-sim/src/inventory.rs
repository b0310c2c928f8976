//! Inventory and equipment.
//!
//! Items move between the bag and the equipment slots; they are never copied.
//! Equipping or unequipping marks the owner's stats dirty.

use std::collections::BTreeMap;

use emberwake_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::loot::{EquipSlot, ItemInstance};
use crate::stats::{self, StatModifiers};
use crate::SimError;

pub const DEFAULT_INVENTORY_CAPACITY: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub items: Vec<ItemInstance>,
    pub capacity: usize,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_INVENTORY_CAPACITY)
    }
}

impl Inventory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::new(),
            capacity,
        }
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Equipment {
    pub slots: BTreeMap<EquipSlot, ItemInstance>,
}

impl Equipment {
    pub fn get(&self, slot: EquipSlot) -> Option<&ItemInstance> {
        self.slots.get(&slot)
    }
}

pub fn equipment_modifiers(equipment: &Equipment) -> StatModifiers {
    let mut total = StatModifiers::default();
    for item in equipment.slots.values() {
        total.stack(&item.modifiers());
    }
    total
}

fn missing(entity: Entity, component: &'static str) -> SimError {
    SimError::MissingComponent { entity, component }
}

/// Move inventory item `index` into its equipment slot. Whatever occupied the
/// slot goes back into the inventory.
pub fn equip_from_inventory(world: &mut World, entity: Entity, index: usize) -> Result<(), SimError> {
    if !world.has::<Equipment>(entity) {
        return Err(missing(entity, "Equipment"));
    }
    let inventory = world
        .get_mut::<Inventory>(entity)
        .ok_or_else(|| missing(entity, "Inventory"))?;
    if index >= inventory.items.len() {
        return Err(SimError::InvalidInventoryIndex(index));
    }
    let item = inventory.items.remove(index);
    let slot = item.slot;
    let displaced = world
        .get_mut::<Equipment>(entity)
        .and_then(|equipment| equipment.slots.insert(slot, item));
    if let Some(previous) = displaced {
        if let Some(inventory) = world.get_mut::<Inventory>(entity) {
            inventory.items.push(previous);
        }
    }
    tracing::debug!(?entity, ?slot, "item equipped");
    stats::mark_dirty(world, entity);
    Ok(())
}

/// Move the item in `slot` back into the inventory. Returns `false` if the
/// slot was empty.
pub fn unequip(world: &mut World, entity: Entity, slot: EquipSlot) -> Result<bool, SimError> {
    let full = world
        .get::<Inventory>(entity)
        .ok_or_else(|| missing(entity, "Inventory"))?
        .is_full();
    let equipment = world
        .get_mut::<Equipment>(entity)
        .ok_or_else(|| missing(entity, "Equipment"))?;
    if !equipment.slots.contains_key(&slot) {
        return Ok(false);
    }
    if full {
        return Err(SimError::InventoryFull);
    }
    let Some(item) = equipment.slots.remove(&slot) else {
        return Ok(false);
    };
    if let Some(inventory) = world.get_mut::<Inventory>(entity) {
        inventory.items.push(item);
    }
    stats::mark_dirty(world, entity);
    Ok(true)
}
