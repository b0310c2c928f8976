//! Ranged: keeps to its preferred range, aims, then fires a volley.
//!
//! A volley is one projectile plus one per ExtraProjectiles elite modifier,
//! fanned evenly across `spread` radians around the aim direction.

use emberwake_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{active_agents, set_intent, validate_target, AiBehaviorStateMachine, AiState};
use crate::combat::{spawn_projectile, Projectile};
use crate::components::{faction_of, nearest_hostile, position_of, Position};
use crate::context::FrameContext;
use crate::damage::{DamageInfo, DamageSource};
use crate::elite::extra_projectiles;
use crate::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangedConfig {
    pub detection_range: f32,
    pub preferred_range: f32,
    pub aim_duration: f32,
    pub cooldown_duration: f32,
    pub projectile_speed: f32,
    pub projectile_damage: f32,
    pub projectile_radius: f32,
    pub projectile_lifetime: f32,
    /// Total fan angle of a multi-projectile volley.
    pub spread: f32,
}

impl Default for RangedConfig {
    fn default() -> Self {
        Self {
            detection_range: 14.0,
            preferred_range: 7.0,
            aim_duration: 0.4,
            cooldown_duration: 2.0,
            projectile_speed: 9.0,
            projectile_damage: 8.0,
            projectile_radius: 0.25,
            projectile_lifetime: 2.5,
            spread: 0.5,
        }
    }
}

/// Unit directions for `count` projectiles fanned around `aim`.
pub fn volley_directions(aim: Vec2, count: usize, spread: f32) -> Vec<Vec2> {
    if count <= 1 {
        return vec![aim];
    }
    let base = aim.y.atan2(aim.x);
    let step = spread / (count - 1) as f32;
    (0..count)
        .map(|i| {
            let angle = base - spread * 0.5 + step * i as f32;
            Vec2::from_angle(angle)
        })
        .collect()
}

pub fn ranged_ai_system(world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
    for entity in active_agents::<RangedConfig>(world) {
        let (Some(config), Some(mut machine), Some(pos)) = (
            world.get::<RangedConfig>(entity).copied(),
            world.get::<AiBehaviorStateMachine>(entity).copied(),
            world.get::<Position>(entity).map(|p| p.0),
        ) else {
            continue;
        };

        match machine.state {
            AiState::Attacking => {
                set_intent(world, entity, Vec2::ZERO);
                validate_target(world, &mut machine);
                if let Some(target_pos) = machine.target.and_then(|t| position_of(world, t)) {
                    machine.aim = (target_pos - pos).normalize_or(machine.aim);
                }
                machine.state_timer -= ctx.dt;
                if machine.state_timer <= 0.0 {
                    fire(world, entity, pos, &config, machine.aim)?;
                    machine.cooldown_timer = config.cooldown_duration;
                    machine.transition(entity, AiState::Cooldown);
                }
            }
            AiState::Cooldown => {
                set_intent(world, entity, Vec2::ZERO);
                machine.cooldown_timer -= ctx.dt;
                if machine.cooldown_timer <= 0.0 {
                    machine.cooldown_timer = 0.0;
                    machine.transition(entity, AiState::Seeking);
                }
            }
            AiState::Seeking | AiState::Committing | AiState::Guarding => {
                let faction = faction_of(world, entity);
                match nearest_hostile(world, pos, faction, config.detection_range) {
                    Some((target, target_pos, dist)) => {
                        machine.target = Some(target);
                        let toward = (target_pos - pos).normalize_or_zero();
                        if dist > config.preferred_range {
                            set_intent(world, entity, toward);
                        } else {
                            set_intent(world, entity, Vec2::ZERO);
                            machine.aim = toward;
                            machine.state_timer = config.aim_duration;
                            machine.transition(entity, AiState::Attacking);
                        }
                    }
                    None => {
                        machine.target = None;
                        set_intent(world, entity, Vec2::ZERO);
                        machine.transition(entity, AiState::Seeking);
                    }
                }
            }
        }

        if let Some(slot) = world.get_mut::<AiBehaviorStateMachine>(entity) {
            *slot = machine;
        }
    }
    Ok(())
}

fn fire(world: &mut World, entity: Entity, pos: Vec2, config: &RangedConfig, aim: Vec2) -> Result<(), SimError> {
    let faction = faction_of(world, entity);
    let count = 1 + extra_projectiles(world, entity);
    for direction in volley_directions(aim, count, config.spread) {
        spawn_projectile(
            world,
            pos,
            Projectile {
                source: entity,
                faction,
                velocity: direction * config.projectile_speed,
                radius: config.projectile_radius,
                damage: DamageInfo::physical(config.projectile_damage, DamageSource::Projectile),
                remaining: config.projectile_lifetime,
            },
        )?;
    }
    tracing::debug!(?entity, count, "ranged volley");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Faction, Health, MoveIntent};
    use crate::elite::{attach_elite_modifier, EliteModifierKind};

    fn setup_world() -> (World, Entity) {
        let mut world = World::new();
        crate::register_components(&mut world);
        let shooter = world
            .spawn_bundle((
                Position(Vec2::ZERO),
                MoveIntent::default(),
                Faction::Enemy,
                Health::new(20.0),
                AiBehaviorStateMachine::default(),
                RangedConfig::default(),
            ))
            .unwrap();
        world
            .spawn_bundle((Position(Vec2::new(5.0, 0.0)), Faction::Player, Health::new(100.0)))
            .unwrap();
        (world, shooter)
    }

    #[test]
    fn aims_then_fires_single_projectile() {
        let (mut world, shooter) = setup_world();
        ranged_ai_system(&mut world, &FrameContext::idle(0.1)).unwrap();
        assert_eq!(world.get::<AiBehaviorStateMachine>(shooter).unwrap().state, AiState::Attacking);
        assert_eq!(world.count::<Projectile>(), 0);

        ranged_ai_system(&mut world, &FrameContext::idle(0.5)).unwrap();
        assert_eq!(world.count::<Projectile>(), 1);
        let m = world.get::<AiBehaviorStateMachine>(shooter).unwrap();
        assert_eq!(m.state, AiState::Cooldown);
        assert_eq!(m.cooldown_timer, RangedConfig::default().cooldown_duration);
    }

    #[test]
    fn extra_projectiles_widen_the_volley() {
        let (mut world, shooter) = setup_world();
        attach_elite_modifier(&mut world, shooter, EliteModifierKind::ExtraProjectiles).unwrap();
        attach_elite_modifier(&mut world, shooter, EliteModifierKind::ExtraProjectiles).unwrap();
        ranged_ai_system(&mut world, &FrameContext::idle(0.1)).unwrap();
        ranged_ai_system(&mut world, &FrameContext::idle(0.5)).unwrap();
        assert_eq!(world.count::<Projectile>(), 3);
    }

    #[test]
    fn volley_is_symmetric_around_aim() {
        let dirs = volley_directions(Vec2::X, 3, 0.5);
        assert_eq!(dirs.len(), 3);
        assert!((dirs[1] - Vec2::X).length() < 1e-5);
        assert!((dirs[0].y + dirs[2].y).abs() < 1e-5);
        assert_eq!(volley_directions(Vec2::Y, 1, 0.5), vec![Vec2::Y]);
    }
}
