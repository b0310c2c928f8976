//! Timed buffs.
//!
//! Buffs are stat modifiers with a countdown. They never deduplicate: casting
//! the same buff twice stacks two entries. When the last one expires the
//! [`ActiveBuffs`] component itself is removed.

use emberwake_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::context::FrameContext;
use crate::stats::{self, StatModifiers};
use crate::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuffType {
    Haste,
    Empower,
    Fortify,
    Frenzy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedBuff {
    pub buff_type: BuffType,
    pub duration: f32,
    pub remaining_duration: f32,
    pub modifiers: StatModifiers,
    pub source: Option<Entity>,
}

impl TimedBuff {
    pub fn new(buff_type: BuffType, duration: f32, modifiers: StatModifiers) -> Self {
        Self {
            buff_type,
            duration,
            remaining_duration: duration,
            modifiers,
            source: None,
        }
    }

    pub fn from_source(mut self, source: Entity) -> Self {
        self.source = Some(source);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActiveBuffs {
    pub buffs: Vec<TimedBuff>,
}

impl ActiveBuffs {
    pub fn has(&self, buff_type: BuffType) -> bool {
        self.buffs.iter().any(|b| b.buff_type == buff_type)
    }
}

pub fn buff_modifiers(active: &ActiveBuffs) -> StatModifiers {
    StatModifiers::combine(active.buffs.iter().map(|b| &b.modifiers))
}

pub fn has_active_buff(world: &World, entity: Entity, buff_type: BuffType) -> bool {
    world
        .get::<ActiveBuffs>(entity)
        .is_some_and(|active| active.has(buff_type))
}

/// Append `buff` to `target`'s buff list.
pub fn attach_buff(world: &mut World, target: Entity, buff: TimedBuff) -> Result<(), SimError> {
    tracing::debug!(?target, buff = ?buff.buff_type, duration = buff.duration, "buff attached");
    match world.get_mut::<ActiveBuffs>(target) {
        Some(active) => active.buffs.push(buff),
        None => {
            world.insert(target, ActiveBuffs { buffs: vec![buff] })?;
        }
    }
    stats::mark_dirty(world, target);
    Ok(())
}

/// Count down every buff and drop the expired ones.
pub fn buff_tick_system(world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
    let mut emptied = Vec::new();
    let mut changed = Vec::new();
    world.for_each_mut::<ActiveBuffs>(|entity, active| {
        let before = active.buffs.len();
        for buff in &mut active.buffs {
            buff.remaining_duration -= ctx.dt;
        }
        active.buffs.retain(|b| b.remaining_duration > 0.0);
        if active.buffs.len() != before {
            changed.push(entity);
        }
        if active.buffs.is_empty() {
            emptied.push(entity);
        }
    });
    for entity in emptied {
        world.remove::<ActiveBuffs>(entity)?;
    }
    for entity in changed {
        stats::mark_dirty(world, entity);
    }
    Ok(())
}
