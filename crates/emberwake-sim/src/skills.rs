//! Player skills bound to hotkeys 1-4.
//!
//! Each cast restarts the slot's cooldown at
//! `effective_cooldown(base, skill reduction + global reduction)`.

use emberwake_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::buffs::{attach_buff, BuffType, TimedBuff};
use crate::combat::{spawn_hitbox, spawn_projectile, AttackHitbox, Projectile};
use crate::components::{faction_of, Facing, Position};
use crate::context::{FrameContext, SKILL_SLOTS};
use crate::damage::{DamageInfo, DamageSource, StatusPayload};
use crate::stats::{self, effective_cooldown, StatChannel, StatModifiers};
use crate::status::{is_stunned, StatusKind};
use crate::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SkillKind {
    /// Arcane bolt that ignites the first enemy hit.
    Firebolt {
        damage: f32,
        speed: f32,
        radius: f32,
        burn_dps: f32,
        burn_duration: f32,
    },
    /// Arcane burst around the caster that slows.
    FrostNova {
        damage: f32,
        radius: f32,
        slow: f32,
        slow_duration: f32,
    },
    /// Self buff.
    Warcry {
        duration: f32,
        modifiers: StatModifiers,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub kind: SkillKind,
    pub base_cooldown: f32,
    /// Reduction from this skill's own upgrades, added to the global one.
    pub cooldown_reduction: f32,
    pub cooldown_remaining: f32,
}

impl Skill {
    pub fn new(kind: SkillKind, base_cooldown: f32) -> Self {
        Self {
            kind,
            base_cooldown,
            cooldown_reduction: 0.0,
            cooldown_remaining: 0.0,
        }
    }

    pub fn firebolt() -> Self {
        Self::new(
            SkillKind::Firebolt {
                damage: 10.0,
                speed: 14.0,
                radius: 0.3,
                burn_dps: 4.0,
                burn_duration: 2.0,
            },
            1.2,
        )
    }

    pub fn frost_nova() -> Self {
        Self::new(
            SkillKind::FrostNova {
                damage: 8.0,
                radius: 3.0,
                slow: 0.5,
                slow_duration: 2.5,
            },
            6.0,
        )
    }

    pub fn warcry() -> Self {
        Self::new(
            SkillKind::Warcry {
                duration: 5.0,
                modifiers: StatModifiers::default().with_mul(StatChannel::Power, 1.25),
            },
            12.0,
        )
    }

    pub fn is_ready(&self) -> bool {
        self.cooldown_remaining <= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SkillBar {
    pub slots: [Option<Skill>; SKILL_SLOTS],
}

impl SkillBar {
    pub fn starter() -> Self {
        Self {
            slots: [
                Some(Skill::firebolt()),
                Some(Skill::frost_nova()),
                Some(Skill::warcry()),
                None,
            ],
        }
    }
}

const NOVA_LIFETIME: f32 = 0.15;
const FIREBOLT_LIFETIME: f32 = 1.5;

/// Tick cooldowns and cast every pressed, ready skill.
pub fn skill_system(world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
    for entity in world.entities_with::<(&SkillBar, &Position)>() {
        if let Some(bar) = world.get_mut::<SkillBar>(entity) {
            for skill in bar.slots.iter_mut().flatten() {
                skill.cooldown_remaining = (skill.cooldown_remaining - ctx.dt).max(0.0);
            }
        }
        if is_stunned(world, entity) {
            continue;
        }
        for slot in 0..SKILL_SLOTS {
            if ctx.input.skills[slot] {
                cast(world, entity, slot)?;
            }
        }
    }
    Ok(())
}

/// Cast the skill in `slot` if it is ready. Returns whether it fired.
pub fn cast(world: &mut World, caster: Entity, slot: usize) -> Result<bool, SimError> {
    let Some(skill) = world
        .get::<SkillBar>(caster)
        .and_then(|bar| bar.slots.get(slot).copied().flatten())
    else {
        return Ok(false);
    };
    if !skill.is_ready() {
        return Ok(false);
    }
    let Some(origin) = world.get::<Position>(caster).map(|p| p.0) else {
        return Ok(false);
    };
    let global_cdr = stats::current(world, caster).map_or(0.0, |s| s.offense.cooldown_reduction);
    let faction = faction_of(world, caster);
    let facing = world.get::<Facing>(caster).map_or(Vec2::X, |f| f.0);

    match skill.kind {
        SkillKind::Firebolt {
            damage,
            speed,
            radius,
            burn_dps,
            burn_duration,
        } => {
            let info = DamageInfo::arcane(damage, DamageSource::Skill).with_status(StatusPayload {
                kind: StatusKind::Burn,
                duration: burn_duration,
                potency: burn_dps,
            });
            spawn_projectile(
                world,
                origin,
                Projectile {
                    source: caster,
                    faction,
                    velocity: facing * speed,
                    radius,
                    damage: info,
                    remaining: FIREBOLT_LIFETIME,
                },
            )?;
        }
        SkillKind::FrostNova {
            damage,
            radius,
            slow,
            slow_duration,
        } => {
            let info = DamageInfo::arcane(damage, DamageSource::Skill).with_status(StatusPayload {
                kind: StatusKind::Slow,
                duration: slow_duration,
                potency: slow,
            });
            spawn_hitbox(
                world,
                origin,
                AttackHitbox::new(caster, faction, radius, info, NOVA_LIFETIME),
            )?;
        }
        SkillKind::Warcry { duration, modifiers } => {
            attach_buff(
                world,
                caster,
                TimedBuff::new(BuffType::Empower, duration, modifiers).from_source(caster),
            )?;
        }
    }

    let cooldown = effective_cooldown(skill.base_cooldown, skill.cooldown_reduction + global_cdr);
    if let Some(live) = world
        .get_mut::<SkillBar>(caster)
        .and_then(|bar| bar.slots.get_mut(slot))
        .and_then(Option::as_mut)
    {
        live.cooldown_remaining = cooldown;
    }
    tracing::debug!(?caster, slot, cooldown, "skill cast");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Faction, Health};
    use crate::stats::{BaseStats, ComputedStats};

    fn setup_world() -> (World, Entity) {
        let mut world = World::new();
        crate::register_components(&mut world);
        let caster = world
            .spawn_bundle((
                Position(Vec2::ZERO),
                Faction::Player,
                Health::new(100.0),
                Facing::default(),
                BaseStats::default(),
                ComputedStats::dirty(),
                SkillBar::starter(),
            ))
            .unwrap();
        (world, caster)
    }

    #[test]
    fn cooldown_uses_skill_plus_global_reduction() {
        let (mut world, caster) = setup_world();
        world.get_mut::<SkillBar>(caster).unwrap().slots[0]
            .as_mut()
            .unwrap()
            .cooldown_reduction = 0.25;
        world.get_mut::<BaseStats>(caster).unwrap().offense.cooldown_reduction = 0.25;
        stats::mark_dirty(&mut world, caster);

        assert!(cast(&mut world, caster, 0).unwrap());
        let remaining = world.get::<SkillBar>(caster).unwrap().slots[0].unwrap().cooldown_remaining;
        assert!((remaining - 0.6).abs() < 1e-5);
        assert!(!cast(&mut world, caster, 0).unwrap(), "still cooling down");
        assert_eq!(world.count::<Projectile>(), 1);
    }

    #[test]
    fn reduction_cap_applies_to_skills() {
        let (mut world, caster) = setup_world();
        world.get_mut::<SkillBar>(caster).unwrap().slots[2]
            .as_mut()
            .unwrap()
            .cooldown_reduction = 0.7;
        world.get_mut::<BaseStats>(caster).unwrap().offense.cooldown_reduction = 0.5;
        stats::mark_dirty(&mut world, caster);
        assert!(cast(&mut world, caster, 2).unwrap());
        let remaining = world.get::<SkillBar>(caster).unwrap().slots[2].unwrap().cooldown_remaining;
        assert!((remaining - 12.0 * 0.2).abs() < 1e-4);
    }

    #[test]
    fn hotkeys_drive_casts_and_empty_slot_is_noop() {
        let (mut world, caster) = setup_world();
        let mut ctx = FrameContext::idle(0.016);
        ctx.input.skills = [false, true, true, true];
        skill_system(&mut world, &ctx).unwrap();
        assert_eq!(world.count::<AttackHitbox>(), 1);
        assert!(crate::buffs::has_active_buff(&world, caster, BuffType::Empower));
        assert!(!cast(&mut world, caster, 3).unwrap());
    }
}
