//! Player control: movement intent, facing, basic attack and dash.

use emberwake_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::combat::{spawn_hitbox, AttackHitbox};
use crate::components::{Facing, Faction, MoveIntent, Player, Position};
use crate::context::FrameContext;
use crate::damage::{DamageInfo, DamageSource};
use crate::stats::{self, effective_cooldown};
use crate::status::is_stunned;
use crate::SimError;

/// Melee swing in front of the player.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasicAttack {
    pub damage: f32,
    /// Distance from the player to the hitbox center.
    pub reach: f32,
    pub radius: f32,
    pub base_cooldown: f32,
    pub cooldown_remaining: f32,
}

impl Default for BasicAttack {
    fn default() -> Self {
        Self {
            damage: 12.0,
            reach: 1.0,
            radius: 0.9,
            base_cooldown: 0.45,
            cooldown_remaining: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dash {
    pub speed: f32,
    pub duration: f32,
    pub base_cooldown: f32,
    pub cooldown_remaining: f32,
    pub active_remaining: f32,
    pub direction: Vec2,
}

impl Default for Dash {
    fn default() -> Self {
        Self {
            speed: 18.0,
            duration: 0.18,
            base_cooldown: 1.5,
            cooldown_remaining: 0.0,
            active_remaining: 0.0,
            direction: Vec2::X,
        }
    }
}

/// Dash input, resolved by the dash subscriber at the next drain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DashRequested {
    pub entity: Entity,
    pub direction: Vec2,
}

/// Lifetime of a basic-attack hitbox.
const SWING_LIFETIME: f32 = 0.1;

pub fn install(world: &mut World) {
    world.subscribe::<DashRequested, _>(|world, ev| {
        let cdr = stats::current(world, ev.entity).map_or(0.0, |s| s.offense.cooldown_reduction);
        let Some(dash) = world.get_mut::<Dash>(ev.entity) else {
            return;
        };
        if dash.cooldown_remaining > 0.0 || dash.active_remaining > 0.0 {
            return;
        }
        dash.direction = ev.direction.normalize_or(Vec2::X);
        dash.active_remaining = dash.duration;
        dash.cooldown_remaining = effective_cooldown(dash.base_cooldown, cdr);
        tracing::debug!(entity = ?ev.entity, "dash started");
    });
}

/// Translate input into intent, facing, attacks and dash requests.
pub fn player_input_system(world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
    for entity in world.entities_with::<(&Player, &Position)>() {
        let Some(pos) = world.get::<Position>(entity).map(|p| p.0) else {
            continue;
        };
        if let Some(dash) = world.get_mut::<Dash>(entity) {
            dash.cooldown_remaining = (dash.cooldown_remaining - ctx.dt).max(0.0);
        }
        if let Some(attack) = world.get_mut::<BasicAttack>(entity) {
            attack.cooldown_remaining = (attack.cooldown_remaining - ctx.dt).max(0.0);
        }
        if is_stunned(world, entity) {
            if let Some(intent) = world.get_mut::<MoveIntent>(entity) {
                intent.0 = Vec2::ZERO;
            }
            continue;
        }

        let axis = ctx.input.move_axis;
        if let Some(intent) = world.get_mut::<MoveIntent>(entity) {
            intent.0 = axis;
        }
        let aim = ctx
            .mouse_world
            .map(|mouse| mouse - pos)
            .filter(|d| d.length_squared() > f32::EPSILON)
            .or_else(|| (axis.length_squared() > f32::EPSILON).then_some(axis))
            .map(Vec2::normalize);
        if let (Some(aim), Some(facing)) = (aim, world.get_mut::<Facing>(entity)) {
            facing.0 = aim;
        }
        let facing = world.get::<Facing>(entity).map_or(Vec2::X, |f| f.0);

        if ctx.input.attack {
            swing(world, entity, pos, facing)?;
        }
        if ctx.input.dash {
            let direction = if axis.length_squared() > f32::EPSILON { axis } else { facing };
            world.publish(DashRequested { entity, direction });
        }
    }
    Ok(())
}

fn swing(world: &mut World, entity: Entity, pos: Vec2, facing: Vec2) -> Result<(), SimError> {
    let cdr = stats::current(world, entity).map_or(0.0, |s| s.offense.cooldown_reduction);
    let Some(attack) = world.get_mut::<BasicAttack>(entity) else {
        return Ok(());
    };
    if attack.cooldown_remaining > 0.0 {
        return Ok(());
    }
    attack.cooldown_remaining = effective_cooldown(attack.base_cooldown, cdr);
    let attack = *attack;
    let hitbox = AttackHitbox::new(
        entity,
        Faction::Player,
        attack.radius,
        DamageInfo::physical(attack.damage, DamageSource::Melee),
        SWING_LIFETIME,
    );
    spawn_hitbox(world, pos + facing * attack.reach, hitbox)?;
    Ok(())
}
