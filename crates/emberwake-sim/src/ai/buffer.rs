//! Buffer: trails its allies and periodically buffs those in range.
//!
//! Allies already carrying the buffer's buff type are skipped, so one buffer
//! never stacks its own buff on a target.

use emberwake_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{active_agents, set_intent, AiBehaviorStateMachine, AiState};
use crate::buffs::{attach_buff, has_active_buff, BuffType, TimedBuff};
use crate::components::{faction_of, is_targetable, nearest_ally, Faction, Health, Position};
use crate::context::FrameContext;
use crate::stats::{StatChannel, StatModifiers};
use crate::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferConfig {
    pub buff_type: BuffType,
    pub buff_modifiers: StatModifiers,
    pub buff_duration: f32,
    pub buff_range: f32,
    pub buff_cooldown: f32,
    /// Allies are followed from up to this far away.
    pub follow_range: f32,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            buff_type: BuffType::Frenzy,
            buff_modifiers: StatModifiers::default()
                .with_mul(StatChannel::MoveSpeed, 1.3)
                .with_mul(StatChannel::Power, 1.2),
            buff_duration: 4.0,
            buff_range: 5.0,
            buff_cooldown: 3.0,
            follow_range: 15.0,
        }
    }
}

pub fn buffer_ai_system(world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
    for entity in active_agents::<BufferConfig>(world) {
        let (Some(config), Some(mut machine), Some(pos)) = (
            world.get::<BufferConfig>(entity).copied(),
            world.get::<AiBehaviorStateMachine>(entity).copied(),
            world.get::<Position>(entity).map(|p| p.0),
        ) else {
            continue;
        };
        let faction = faction_of(world, entity);

        match nearest_ally(world, pos, faction, config.follow_range, entity) {
            Some((ally, ally_pos, dist)) => {
                machine.target = Some(ally);
                let toward = (ally_pos - pos).normalize_or_zero();
                let intent = if dist > config.buff_range * 0.5 { toward } else { Vec2::ZERO };
                set_intent(world, entity, intent);
            }
            None => {
                machine.target = None;
                set_intent(world, entity, Vec2::ZERO);
            }
        }

        machine.cooldown_timer -= ctx.dt;
        if machine.cooldown_timer <= 0.0 {
            let buffed = buff_allies_in_range(world, entity, pos, faction, &config)?;
            if buffed > 0 {
                machine.cooldown_timer = config.buff_cooldown;
                machine.transition(entity, AiState::Cooldown);
            } else {
                machine.cooldown_timer = 0.0;
                machine.transition(entity, AiState::Seeking);
            }
        }

        if let Some(slot) = world.get_mut::<AiBehaviorStateMachine>(entity) {
            *slot = machine;
        }
    }
    Ok(())
}

fn buff_allies_in_range(
    world: &mut World,
    entity: Entity,
    pos: Vec2,
    faction: Faction,
    config: &BufferConfig,
) -> Result<usize, SimError> {
    let allies: Vec<Entity> = world
        .query::<(&Position, &Faction, &Health)>()
        .filter(|&(ally, (ally_pos, ally_faction, _))| {
            ally != entity
                && *ally_faction == faction
                && ally_pos.0.distance(pos) <= config.buff_range
                && is_targetable(world, ally)
                && !has_active_buff(world, ally, config.buff_type)
        })
        .map(|(ally, _)| ally)
        .collect();
    for &ally in &allies {
        attach_buff(
            world,
            ally,
            TimedBuff::new(config.buff_type, config.buff_duration, config.buff_modifiers).from_source(entity),
        )?;
    }
    if !allies.is_empty() {
        tracing::debug!(?entity, count = allies.len(), "buffer cast");
    }
    Ok(allies.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffs::ActiveBuffs;
    use crate::components::MoveIntent;

    fn spawn_buffer(world: &mut World) -> Entity {
        world
            .spawn_bundle((
                Position(Vec2::ZERO),
                MoveIntent::default(),
                Faction::Enemy,
                Health::new(20.0),
                AiBehaviorStateMachine::default(),
                BufferConfig::default(),
            ))
            .unwrap()
    }

    #[test]
    fn buffs_allies_in_range_once_per_cooldown() {
        let mut world = World::new();
        crate::register_components(&mut world);
        let buffer = spawn_buffer(&mut world);
        let near = world
            .spawn_bundle((Position(Vec2::new(2.0, 0.0)), Faction::Enemy, Health::new(10.0)))
            .unwrap();
        let far = world
            .spawn_bundle((Position(Vec2::new(9.0, 0.0)), Faction::Enemy, Health::new(10.0)))
            .unwrap();
        let player = world
            .spawn_bundle((Position(Vec2::new(1.0, 0.0)), Faction::Player, Health::new(10.0)))
            .unwrap();

        buffer_ai_system(&mut world, &FrameContext::idle(0.1)).unwrap();
        assert!(has_active_buff(&world, near, BuffType::Frenzy));
        assert!(!has_active_buff(&world, far, BuffType::Frenzy));
        assert!(!has_active_buff(&world, player, BuffType::Frenzy));
        assert!(!has_active_buff(&world, buffer, BuffType::Frenzy));
        assert_eq!(world.get::<AiBehaviorStateMachine>(buffer).unwrap().state, AiState::Cooldown);

        // Cooldown over, but the ally still has the buff: no restack.
        buffer_ai_system(&mut world, &FrameContext::idle(3.5)).unwrap();
        assert_eq!(world.get::<ActiveBuffs>(near).unwrap().buffs.len(), 1);
    }
}
