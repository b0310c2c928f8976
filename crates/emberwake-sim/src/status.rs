//! Status effects: damage over time, slows and stuns.
//!
//! Burn refreshes its duration on reapplication, Poison stacks up to
//! [`MAX_POISON_STACKS`], Slow scales move speed and Stun suspends AI and
//! movement. DoTs tick every [`DOT_TICK_INTERVAL`] seconds through the regular
//! damage path with crits disabled.

use emberwake_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::{faction_of, position_of, Faction};
use crate::context::FrameContext;
use crate::damage::{self, DamageInfo, DamageSource, DamageType, StatusPayload};
use crate::stats::{self, StatChannel, StatModifiers};
use crate::SimError;

pub const MAX_POISON_STACKS: u32 = 5;
pub const DOT_TICK_INTERVAL: f32 = 0.5;
/// Strongest slow allowed; a slowed entity keeps at least 10% speed.
pub const MAX_SLOW: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusKind {
    Burn,
    Poison,
    Slow,
    Stun,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub kind: StatusKind,
    pub remaining: f32,
    pub potency: f32,
    pub stacks: u32,
    pub tick_timer: f32,
    pub source: Option<Entity>,
    pub source_faction: Faction,
}

/// Active effects on one entity, at most one entry per kind.
///
/// Removed from the entity once the last effect expires.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusEffects {
    pub effects: Vec<StatusEffect>,
}

impl StatusEffects {
    pub fn get(&self, kind: StatusKind) -> Option<&StatusEffect> {
        self.effects.iter().find(|e| e.kind == kind)
    }

    pub fn has(&self, kind: StatusKind) -> bool {
        self.get(kind).is_some()
    }

    /// Merge a new application into the list.
    pub fn apply(&mut self, payload: &StatusPayload, source: Option<Entity>, source_faction: Faction) {
        if let Some(existing) = self.effects.iter_mut().find(|e| e.kind == payload.kind) {
            existing.remaining = existing.remaining.max(payload.duration);
            existing.source = source.or(existing.source);
            existing.source_faction = source_faction;
            match payload.kind {
                StatusKind::Poison => {
                    existing.stacks = (existing.stacks + 1).min(MAX_POISON_STACKS);
                    existing.potency = existing.potency.max(payload.potency);
                }
                StatusKind::Burn | StatusKind::Slow | StatusKind::Stun => {
                    existing.potency = existing.potency.max(payload.potency);
                }
            }
            return;
        }
        self.effects.push(StatusEffect {
            kind: payload.kind,
            remaining: payload.duration,
            potency: payload.potency,
            stacks: 1,
            tick_timer: 0.0,
            source,
            source_faction,
        });
    }
}

/// Move-speed modifier contributed by an active Slow.
pub fn status_modifiers(effects: &StatusEffects) -> StatModifiers {
    match effects.get(StatusKind::Slow) {
        Some(slow) => StatModifiers::default().with_mul(
            StatChannel::MoveSpeed,
            1.0 - slow.potency.clamp(0.0, MAX_SLOW),
        ),
        None => StatModifiers::default(),
    }
}

pub fn is_stunned(world: &World, entity: Entity) -> bool {
    world
        .get::<StatusEffects>(entity)
        .is_some_and(|effects| effects.has(StatusKind::Stun))
}

/// Attach or refresh a status on `target`.
pub fn apply_status(
    world: &mut World,
    target: Entity,
    payload: &StatusPayload,
    source: Option<Entity>,
) -> Result<(), SimError> {
    let source_faction = source.map_or(Faction::Neutral, |s| faction_of(world, s));
    match world.get_mut::<StatusEffects>(target) {
        Some(effects) => effects.apply(payload, source, source_faction),
        None => {
            let mut effects = StatusEffects::default();
            effects.apply(payload, source, source_faction);
            world.insert(target, effects)?;
        }
    }
    if payload.kind == StatusKind::Slow {
        stats::mark_dirty(world, target);
    }
    tracing::debug!(?target, kind = ?payload.kind, duration = payload.duration, "status applied");
    Ok(())
}

fn dot_info(effect: &StatusEffect) -> Option<DamageInfo> {
    let damage_type = match effect.kind {
        StatusKind::Burn => DamageType::Arcane,
        StatusKind::Poison => DamageType::True,
        StatusKind::Slow | StatusKind::Stun => return None,
    };
    let per_tick = effect.potency * effect.stacks as f32 * DOT_TICK_INTERVAL;
    Some(DamageInfo::new(per_tick, damage_type, DamageSource::StatusEffect).without_crit())
}

/// Tick durations and DoTs; drop expired effects and empty components.
pub fn status_effect_system(world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
    for entity in world.entities_with::<(&StatusEffects,)>() {
        let Some(effects) = world.get_mut::<StatusEffects>(entity) else {
            continue;
        };
        let mut ticks = Vec::new();
        let mut slow_changed = false;
        for effect in &mut effects.effects {
            effect.remaining -= ctx.dt;
            if let Some(info) = dot_info(effect) {
                effect.tick_timer += ctx.dt;
                while effect.tick_timer >= DOT_TICK_INTERVAL {
                    effect.tick_timer -= DOT_TICK_INTERVAL;
                    ticks.push((effect.source, effect.source_faction, info));
                }
            }
        }
        let before = effects.effects.len();
        effects.effects.retain(|e| {
            let keep = e.remaining > 0.0;
            if !keep && e.kind == StatusKind::Slow {
                slow_changed = true;
            }
            keep
        });
        let expired = before - effects.effects.len();
        let now_empty = effects.effects.is_empty();

        let position = position_of(world, entity).unwrap_or_default();
        for (source, faction, info) in ticks {
            match source.filter(|s| world.is_alive(*s)) {
                Some(source) => damage::apply_damage(world, source, entity, &info, position)?,
                None => {
                    damage::apply_environmental_damage(world, entity, &info, position, faction)?
                }
            };
        }
        if expired > 0 {
            tracing::trace!(?entity, expired, "status effects expired");
        }
        if now_empty {
            world.remove::<StatusEffects>(entity)?;
        }
        if slow_changed {
            stats::mark_dirty(world, entity);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::damage::{DamageCalculator, DamageDealt};
    use crate::stats::{BaseStats, ComputedStats};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup_world() -> World {
        let mut world = World::new();
        crate::register_components(&mut world);
        world.insert_resource(DamageCalculator::new(9));
        world
    }

    fn payload(kind: StatusKind, duration: f32, potency: f32) -> StatusPayload {
        StatusPayload {
            kind,
            duration,
            potency,
        }
    }

    #[test]
    fn poison_stacks_to_cap_and_burn_refreshes() {
        let mut effects = StatusEffects::default();
        for _ in 0..8 {
            effects.apply(&payload(StatusKind::Poison, 3.0, 2.0), None, Faction::Neutral);
        }
        assert_eq!(effects.get(StatusKind::Poison).unwrap().stacks, MAX_POISON_STACKS);

        effects.apply(&payload(StatusKind::Burn, 1.0, 4.0), None, Faction::Neutral);
        effects.effects.iter_mut().for_each(|e| e.remaining = 0.5);
        effects.apply(&payload(StatusKind::Burn, 2.0, 4.0), None, Faction::Neutral);
        let burn = effects.get(StatusKind::Burn).unwrap();
        assert_eq!(burn.stacks, 1);
        assert_eq!(burn.remaining, 2.0);
        assert_eq!(effects.effects.len(), 2);
    }

    #[test]
    fn slow_scales_move_speed() {
        let mut world = setup_world();
        let e = world
            .spawn_bundle((BaseStats::default(), ComputedStats::dirty()))
            .unwrap();
        assert_eq!(stats::current(&mut world, e).unwrap().move_speed, 5.0);
        apply_status(&mut world, e, &payload(StatusKind::Slow, 1.0, 0.4), None).unwrap();
        assert!((stats::current(&mut world, e).unwrap().move_speed - 3.0).abs() < 1e-5);

        status_effect_system(&mut world, &FrameContext::idle(1.5)).unwrap();
        assert!(!world.has::<StatusEffects>(e));
        assert_eq!(stats::current(&mut world, e).unwrap().move_speed, 5.0);
    }

    #[test]
    fn burn_ticks_through_damage_path() {
        let mut world = setup_world();
        let hits = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&hits);
        world.subscribe::<DamageDealt, _>(move |_, ev| sink.borrow_mut().push((ev.amount, ev.is_crit, ev.source)));
        let e = world.spawn();
        apply_status(&mut world, e, &payload(StatusKind::Burn, 1.0, 10.0), None).unwrap();

        // 1.25 s: two ticks of 5 damage, then expiry.
        for _ in 0..5 {
            status_effect_system(&mut world, &FrameContext::idle(0.25)).unwrap();
        }
        world.process_events().unwrap();
        let hits = hits.borrow();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|&(amount, crit, source)| {
            (amount - 5.0).abs() < 1e-4 && !crit && source == DamageSource::StatusEffect
        }));
        assert!(!world.has::<StatusEffects>(e));
    }

    #[test]
    fn stun_is_visible_until_expiry() {
        let mut world = setup_world();
        let e = world.spawn();
        apply_status(&mut world, e, &payload(StatusKind::Stun, 0.5, 0.0), None).unwrap();
        assert!(is_stunned(&world, e));
        status_effect_system(&mut world, &FrameContext::idle(0.6)).unwrap();
        assert!(!is_stunned(&world, e));
    }
}
