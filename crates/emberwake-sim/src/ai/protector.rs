//! Protector: picks an ally to guard, stays at its side and keeps it
//! fortified.
//!
//! `Seeking -> Guarding`, back to `Seeking` when the ward dies.

use emberwake_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{active_agents, set_intent, validate_target, AiBehaviorStateMachine, AiState};
use crate::buffs::{attach_buff, has_active_buff, BuffType, TimedBuff};
use crate::components::{faction_of, nearest_matching, position_of, Dead, Faction, Position};
use crate::context::FrameContext;
use crate::stats::{StatChannel, StatModifiers};
use crate::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProtectorConfig {
    pub guard_range: f32,
    pub follow_distance: f32,
    pub fortify_duration: f32,
    pub fortify_cooldown: f32,
    pub fortify_modifiers: StatModifiers,
}

impl Default for ProtectorConfig {
    fn default() -> Self {
        Self {
            guard_range: 12.0,
            follow_distance: 1.5,
            fortify_duration: 3.0,
            fortify_cooldown: 2.0,
            fortify_modifiers: StatModifiers::default()
                .with_add(StatChannel::Armor, 50.0)
                .with_add(StatChannel::Resist, 50.0),
        }
    }
}

/// Wards already held by a guarding protector other than `protector`.
fn claimed_wards(world: &World, protector: Entity) -> Vec<Entity> {
    world
        .query::<(&ProtectorConfig, &AiBehaviorStateMachine)>()
        .filter(|(other, _)| *other != protector && !world.has::<Dead>(*other))
        .filter(|(_, (_, machine))| machine.state == AiState::Guarding)
        .filter_map(|(_, (_, machine))| machine.target)
        .collect()
}

/// Closest ally in range that is neither a protector nor already guarded.
fn nearest_unguarded_ally(
    world: &World,
    protector: Entity,
    origin: Vec2,
    faction: Faction,
    range: f32,
) -> Option<Entity> {
    let claimed = claimed_wards(world, protector);
    nearest_matching(world, origin, range, |other, e| {
        other == faction && e != protector && !world.has::<ProtectorConfig>(e) && !claimed.contains(&e)
    })
    .map(|(ward, ..)| ward)
}

pub fn protector_ai_system(world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
    for entity in active_agents::<ProtectorConfig>(world) {
        let (Some(config), Some(mut machine), Some(pos)) = (
            world.get::<ProtectorConfig>(entity).copied(),
            world.get::<AiBehaviorStateMachine>(entity).copied(),
            world.get::<Position>(entity).map(|p| p.0),
        ) else {
            continue;
        };

        validate_target(world, &mut machine);
        if machine.state == AiState::Guarding && !machine.has_target() {
            machine.transition(entity, AiState::Seeking);
        }

        if machine.state != AiState::Guarding {
            let faction = faction_of(world, entity);
            match nearest_unguarded_ally(world, entity, pos, faction, config.guard_range) {
                Some(ally) => {
                    machine.target = Some(ally);
                    machine.cooldown_timer = 0.0;
                    machine.transition(entity, AiState::Guarding);
                }
                None => {
                    set_intent(world, entity, Vec2::ZERO);
                    machine.transition(entity, AiState::Seeking);
                }
            }
        }

        if machine.state == AiState::Guarding {
            if let Some(ward) = machine.target {
                let ward_pos = position_of(world, ward).unwrap_or(pos);
                let offset = ward_pos - pos;
                let intent = if offset.length() > config.follow_distance {
                    offset.normalize_or_zero()
                } else {
                    Vec2::ZERO
                };
                set_intent(world, entity, intent);

                machine.cooldown_timer -= ctx.dt;
                if machine.cooldown_timer <= 0.0 {
                    if !has_active_buff(world, ward, BuffType::Fortify) {
                        attach_buff(
                            world,
                            ward,
                            TimedBuff::new(BuffType::Fortify, config.fortify_duration, config.fortify_modifiers)
                                .from_source(entity),
                        )?;
                    }
                    machine.cooldown_timer = config.fortify_cooldown;
                }
            }
        }

        if let Some(slot) = world.get_mut::<AiBehaviorStateMachine>(entity) {
            *slot = machine;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Faction, Health, MoveIntent};

    fn setup_world() -> (World, Entity, Entity) {
        let mut world = World::new();
        crate::register_components(&mut world);
        let protector = world
            .spawn_bundle((
                Position(Vec2::ZERO),
                MoveIntent::default(),
                Faction::Enemy,
                Health::new(40.0),
                AiBehaviorStateMachine::default(),
                ProtectorConfig::default(),
            ))
            .unwrap();
        let ward = world
            .spawn_bundle((Position(Vec2::new(4.0, 0.0)), Faction::Enemy, Health::new(20.0)))
            .unwrap();
        (world, protector, ward)
    }

    #[test]
    fn guards_and_fortifies_nearest_ally() {
        let (mut world, protector, ward) = setup_world();
        protector_ai_system(&mut world, &FrameContext::idle(0.1)).unwrap();

        let m = *world.get::<AiBehaviorStateMachine>(protector).unwrap();
        assert_eq!(m.state, AiState::Guarding);
        assert_eq!(m.target, Some(ward));
        assert!(has_active_buff(&world, ward, BuffType::Fortify));
        assert!(world.get::<MoveIntent>(protector).unwrap().0.x > 0.0);
    }

    #[test]
    fn protectors_split_wards_and_skip_each_other() {
        let mut world = World::new();
        crate::register_components(&mut world);
        let mut protector_at = |x: f32| {
            world
                .spawn_bundle((
                    Position(Vec2::new(x, 0.0)),
                    MoveIntent::default(),
                    Faction::Enemy,
                    Health::new(40.0),
                    AiBehaviorStateMachine::default(),
                    ProtectorConfig::default(),
                ))
                .unwrap()
        };
        let first = protector_at(0.0);
        let second = protector_at(0.5);
        let ward_a = world
            .spawn_bundle((Position(Vec2::new(3.0, 0.0)), Faction::Enemy, Health::new(20.0)))
            .unwrap();
        let ward_b = world
            .spawn_bundle((Position(Vec2::new(-3.0, 0.0)), Faction::Enemy, Health::new(20.0)))
            .unwrap();

        protector_ai_system(&mut world, &FrameContext::idle(0.1)).unwrap();

        let target_of = |e| world.get::<AiBehaviorStateMachine>(e).unwrap().target;
        let (a, b) = (target_of(first), target_of(second));
        assert_ne!(a, b);
        let mut wards = vec![a.unwrap(), b.unwrap()];
        wards.sort();
        let mut expected = vec![ward_a, ward_b];
        expected.sort();
        assert_eq!(wards, expected);
    }

    #[test]
    fn lone_protectors_do_not_guard_each_other() {
        let (mut world, protector, ward) = setup_world();
        world.despawn(ward).unwrap();
        world
            .spawn_bundle((
                Position(Vec2::new(1.0, 0.0)),
                Faction::Enemy,
                Health::new(40.0),
                AiBehaviorStateMachine::default(),
                ProtectorConfig::default(),
            ))
            .unwrap();
        protector_ai_system(&mut world, &FrameContext::idle(0.1)).unwrap();
        let m = *world.get::<AiBehaviorStateMachine>(protector).unwrap();
        assert_eq!(m.state, AiState::Seeking);
        assert!(!m.has_target());
    }

    #[test]
    fn ward_death_returns_to_seeking() {
        let (mut world, protector, ward) = setup_world();
        protector_ai_system(&mut world, &FrameContext::idle(0.1)).unwrap();
        world.despawn(ward).unwrap();
        protector_ai_system(&mut world, &FrameContext::idle(0.1)).unwrap();
        let m = *world.get::<AiBehaviorStateMachine>(protector).unwrap();
        assert_eq!(m.state, AiState::Seeking);
        assert!(!m.has_target());
    }
}
