//! Charger: closes to commit range, telegraphs, then lunges with a hitbox.
//!
//! `Seeking -> Committing -> Cooldown -> Seeking`. Commitment starts only when
//! a target sits inside `[commit_range_min, commit_range_max]`; the windup
//! always completes once started.

use emberwake_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{active_agents, set_intent, validate_target, AiBehaviorStateMachine, AiState};
use crate::combat::{spawn_hitbox, ActiveTelegraph, AttackHitbox, KNOCKBACK_DURATION};
use crate::components::{faction_of, nearest_hostile, Knockback, Position};
use crate::context::FrameContext;
use crate::damage::{DamageInfo, DamageSource};
use crate::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChargerConfig {
    pub detection_range: f32,
    pub commit_range_min: f32,
    pub commit_range_max: f32,
    pub windup_duration: f32,
    pub cooldown_duration: f32,
    pub damage: f32,
    pub hitbox_radius: f32,
    pub hitbox_duration: f32,
    /// Impulse given to targets the charge hits.
    pub knockback: f32,
    /// Forward impulse the charger gives itself on release.
    pub lunge_speed: f32,
}

impl Default for ChargerConfig {
    fn default() -> Self {
        Self {
            detection_range: 12.0,
            commit_range_min: 1.5,
            commit_range_max: 4.0,
            windup_duration: 0.6,
            cooldown_duration: 1.5,
            damage: 15.0,
            hitbox_radius: 1.2,
            hitbox_duration: 0.25,
            knockback: 9.0,
            lunge_speed: 14.0,
        }
    }
}

pub fn charger_ai_system(world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
    for entity in active_agents::<ChargerConfig>(world) {
        let (Some(config), Some(mut machine), Some(pos)) = (
            world.get::<ChargerConfig>(entity).copied(),
            world.get::<AiBehaviorStateMachine>(entity).copied(),
            world.get::<Position>(entity).map(|p| p.0),
        ) else {
            continue;
        };

        match machine.state {
            AiState::Committing => {
                set_intent(world, entity, Vec2::ZERO);
                machine.state_timer -= ctx.dt;
                if machine.state_timer <= 0.0 {
                    release(world, entity, pos, &config, machine.aim)?;
                    machine.cooldown_timer = config.cooldown_duration;
                    machine.transition(entity, AiState::Cooldown);
                }
            }
            AiState::Cooldown => {
                set_intent(world, entity, Vec2::ZERO);
                machine.cooldown_timer -= ctx.dt;
                if machine.cooldown_timer <= 0.0 {
                    machine.cooldown_timer = 0.0;
                    machine.target = None;
                    machine.transition(entity, AiState::Seeking);
                }
            }
            AiState::Seeking | AiState::Attacking | AiState::Guarding => {
                validate_target(world, &mut machine);
                let faction = faction_of(world, entity);
                match nearest_hostile(world, pos, faction, config.detection_range) {
                    Some((target, target_pos, dist)) => {
                        machine.target = Some(target);
                        let toward = (target_pos - pos).normalize_or_zero();
                        if dist < config.commit_range_min {
                            set_intent(world, entity, -toward);
                        } else if dist > config.commit_range_max {
                            set_intent(world, entity, toward);
                        } else {
                            set_intent(world, entity, Vec2::ZERO);
                            machine.aim = toward;
                            machine.state_timer = config.windup_duration;
                            world.spawn_bundle((
                                Position(pos),
                                ActiveTelegraph {
                                    owner: entity,
                                    direction: toward,
                                    radius: config.hitbox_radius,
                                    length: config.commit_range_max,
                                    remaining: config.windup_duration,
                                },
                            ))?;
                            machine.transition(entity, AiState::Committing);
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

fn release(world: &mut World, entity: Entity, pos: Vec2, config: &ChargerConfig, aim: Vec2) -> Result<(), SimError> {
    let faction = faction_of(world, entity);
    let hitbox = AttackHitbox::new(
        entity,
        faction,
        config.hitbox_radius,
        DamageInfo::physical(config.damage, DamageSource::Charge),
        config.hitbox_duration,
    )
    .with_knockback(config.knockback);
    spawn_hitbox(world, pos + aim * config.hitbox_radius, hitbox)?;
    world.insert(
        entity,
        Knockback {
            velocity: aim * config.lunge_speed,
            remaining: KNOCKBACK_DURATION,
        },
    )?;
    tracing::debug!(?entity, "charger released");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Faction, Health, MoveIntent};

    fn setup_world(target_at: Vec2) -> (World, Entity) {
        let mut world = World::new();
        crate::register_components(&mut world);
        let charger = world
            .spawn_bundle((
                Position(Vec2::ZERO),
                MoveIntent::default(),
                Faction::Enemy,
                Health::new(30.0),
                AiBehaviorStateMachine::default(),
                ChargerConfig::default(),
            ))
            .unwrap();
        world
            .spawn_bundle((Position(target_at), Faction::Player, Health::new(100.0)))
            .unwrap();
        (world, charger)
    }

    fn machine(world: &World, e: Entity) -> AiBehaviorStateMachine {
        *world.get::<AiBehaviorStateMachine>(e).unwrap()
    }

    #[test]
    fn commits_inside_range_with_one_telegraph() {
        let (mut world, charger) = setup_world(Vec2::new(3.0, 0.0));
        let ctx = FrameContext::idle(0.1);
        charger_ai_system(&mut world, &ctx).unwrap();

        let m = machine(&world, charger);
        assert_eq!(m.state, AiState::Committing);
        assert!(m.has_target());
        assert_eq!(world.count::<ActiveTelegraph>(), 1);

        charger_ai_system(&mut world, &ctx).unwrap();
        assert_eq!(world.count::<ActiveTelegraph>(), 1, "no second telegraph during windup");
    }

    #[test]
    fn windup_releases_one_hitbox_then_cools_down() {
        let (mut world, charger) = setup_world(Vec2::new(3.0, 0.0));
        let config = ChargerConfig::default();
        charger_ai_system(&mut world, &FrameContext::idle(0.1)).unwrap();

        charger_ai_system(&mut world, &FrameContext::idle(config.windup_duration / 2.0)).unwrap();
        assert_eq!(world.count::<AttackHitbox>(), 0);
        charger_ai_system(&mut world, &FrameContext::idle(config.windup_duration)).unwrap();

        assert_eq!(world.count::<AttackHitbox>(), 1);
        let m = machine(&world, charger);
        assert_eq!(m.state, AiState::Cooldown);
        assert_eq!(m.cooldown_timer, config.cooldown_duration);
        assert!(world.get::<Knockback>(charger).unwrap().velocity.x > 0.0);
    }

    #[test]
    fn approaches_from_far_and_backs_off_when_too_close() {
        let (mut world, charger) = setup_world(Vec2::new(8.0, 0.0));
        charger_ai_system(&mut world, &FrameContext::idle(0.1)).unwrap();
        assert_eq!(machine(&world, charger).state, AiState::Seeking);
        assert!(world.get::<MoveIntent>(charger).unwrap().0.x > 0.0);

        let (mut world, charger) = setup_world(Vec2::new(0.5, 0.0));
        charger_ai_system(&mut world, &FrameContext::idle(0.1)).unwrap();
        assert!(world.get::<MoveIntent>(charger).unwrap().0.x < 0.0);
    }

    #[test]
    fn cooldown_returns_to_seeking_without_target() {
        let (mut world, charger) = setup_world(Vec2::new(3.0, 0.0));
        charger_ai_system(&mut world, &FrameContext::idle(0.1)).unwrap();
        charger_ai_system(&mut world, &FrameContext::idle(1.0)).unwrap();
        charger_ai_system(&mut world, &FrameContext::idle(2.0)).unwrap();
        let m = machine(&world, charger);
        assert_eq!(m.state, AiState::Seeking);
        assert!(!m.has_target());
    }

    #[test]
    fn stunned_charger_does_nothing() {
        let (mut world, charger) = setup_world(Vec2::new(3.0, 0.0));
        crate::status::apply_status(
            &mut world,
            charger,
            &crate::damage::StatusPayload {
                kind: crate::status::StatusKind::Stun,
                duration: 1.0,
                potency: 0.0,
            },
            None,
        )
        .unwrap();
        charger_ai_system(&mut world, &FrameContext::idle(0.1)).unwrap();
        assert_eq!(machine(&world, charger).state, AiState::Seeking);
        assert_eq!(world.count::<ActiveTelegraph>(), 0);
    }
}
