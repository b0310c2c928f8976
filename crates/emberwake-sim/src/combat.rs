//! Attack hitboxes, telegraphs and projectiles.
//!
//! All three are short-lived entities with their own [`Position`]. Hitboxes
//! hit each target at most once over their lifetime; projectiles stop at the
//! first hostile they touch or at a static collider.

use emberwake_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::components::{
    is_targetable, position_of, Collider, Faction, Health, Knockback, Position, StaticCollider,
};
use crate::context::FrameContext;
use crate::damage::{self, DamageInfo};
use crate::movement::circle_hits_static;
use crate::SimError;

/// Seconds a knockback impulse lasts.
pub const KNOCKBACK_DURATION: f32 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackHitbox {
    pub owner: Entity,
    pub faction: Faction,
    pub radius: f32,
    pub damage: DamageInfo,
    /// Speed of the impulse given to each target hit, away from the hitbox.
    pub knockback: f32,
    pub remaining: f32,
    /// Targets already hit.
    pub hits: Vec<Entity>,
}

impl AttackHitbox {
    pub fn new(owner: Entity, faction: Faction, radius: f32, damage: DamageInfo, lifetime: f32) -> Self {
        Self {
            owner,
            faction,
            radius,
            damage,
            knockback: 0.0,
            remaining: lifetime,
            hits: Vec::new(),
        }
    }

    pub fn with_knockback(mut self, knockback: f32) -> Self {
        self.knockback = knockback;
        self
    }
}

/// Visual warning of an incoming attack. Follows its owner and expires with
/// the windup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActiveTelegraph {
    pub owner: Entity,
    pub direction: Vec2,
    pub radius: f32,
    pub length: f32,
    pub remaining: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    /// Firing entity. May die while the projectile is in flight.
    pub source: Entity,
    pub faction: Faction,
    pub velocity: Vec2,
    pub radius: f32,
    pub damage: DamageInfo,
    pub remaining: f32,
}

/// Spawn a projectile entity at `origin`.
pub fn spawn_projectile(world: &mut World, origin: Vec2, projectile: Projectile) -> Result<Entity, SimError> {
    Ok(world.spawn_bundle((Position(origin), projectile))?)
}

/// Spawn a hitbox entity at `center`.
pub fn spawn_hitbox(world: &mut World, center: Vec2, hitbox: AttackHitbox) -> Result<Entity, SimError> {
    Ok(world.spawn_bundle((Position(center), hitbox))?)
}

fn contact_radius(world: &World, entity: Entity) -> f32 {
    world.get::<Collider>(entity).map_or(0.0, Collider::radius)
}

/// Targetable entities hostile to `faction` overlapping a circle.
fn overlapping_hostiles(world: &World, center: Vec2, radius: f32, faction: Faction) -> Vec<(Entity, Vec2, f32)> {
    world
        .query::<(&Position, &Faction, &Health)>()
        .filter(|(entity, (_, other, health))| {
            faction.is_hostile_to(**other) && !health.is_depleted() && is_targetable(world, *entity)
        })
        .filter_map(|(entity, (pos, _, _))| {
            let dist = pos.0.distance(center);
            (dist <= radius + contact_radius(world, entity)).then_some((entity, pos.0, dist))
        })
        .collect()
}

/// Apply damage from a hit, attributing it to `attacker` only while alive.
fn strike(
    world: &mut World,
    attacker: Entity,
    faction: Faction,
    target: Entity,
    info: &DamageInfo,
    from: Vec2,
) -> Result<(), SimError> {
    if world.is_alive(attacker) {
        damage::apply_damage(world, attacker, target, info, from)?;
    } else {
        damage::apply_environmental_damage(world, target, info, from, faction)?;
    }
    Ok(())
}

/// Hit every new overlapping hostile, then age the hitbox.
pub fn hitbox_system(world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
    for entity in world.entities_with::<(&AttackHitbox, &Position)>() {
        let (Some(hitbox), Some(center)) = (world.get::<AttackHitbox>(entity).cloned(), position_of(world, entity)) else {
            continue;
        };
        let fresh: Vec<(Entity, Vec2)> = overlapping_hostiles(world, center, hitbox.radius, hitbox.faction)
            .into_iter()
            .filter(|(target, ..)| !hitbox.hits.contains(target))
            .map(|(target, pos, _)| (target, pos))
            .collect();

        for &(target, target_pos) in &fresh {
            strike(world, hitbox.owner, hitbox.faction, target, &hitbox.damage, center)?;
            if hitbox.knockback > 0.0 {
                let dir = (target_pos - center).normalize_or_zero();
                world.insert(
                    target,
                    Knockback {
                        velocity: dir * hitbox.knockback,
                        remaining: KNOCKBACK_DURATION,
                    },
                )?;
            }
        }

        if let Some(live) = world.get_mut::<AttackHitbox>(entity) {
            live.hits.extend(fresh.iter().map(|(target, _)| *target));
            live.remaining -= ctx.dt;
            if live.remaining <= 0.0 {
                world.commands().despawn(entity, "hitbox expired");
            }
        }
    }
    Ok(())
}

/// Move projectiles, resolve their first hit and expire them.
pub fn projectile_system(world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
    for entity in world.entities_with::<(&Projectile, &Position)>() {
        let (Some(mut projectile), Some(pos)) = (world.get::<Projectile>(entity).copied(), position_of(world, entity)) else {
            continue;
        };
        let next = pos + projectile.velocity * ctx.dt;
        projectile.remaining -= ctx.dt;
        if let Some(p) = world.get_mut::<Position>(entity) {
            p.0 = next;
        }
        if let Some(p) = world.get_mut::<Projectile>(entity) {
            p.remaining = projectile.remaining;
        }

        let first_hit = overlapping_hostiles(world, next, projectile.radius, projectile.faction)
            .into_iter()
            .min_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)));
        if let Some((target, ..)) = first_hit {
            strike(world, projectile.source, projectile.faction, target, &projectile.damage, next)?;
            world.commands().despawn(entity, "projectile hit");
            continue;
        }

        let blocked = world
            .query::<(&Position, &Collider, &StaticCollider)>()
            .any(|(_, (wall_pos, wall, _))| circle_hits_static(next, projectile.radius, wall_pos.0, wall));
        if blocked {
            world.commands().despawn(entity, "projectile blocked");
        } else if projectile.remaining <= 0.0 {
            world.commands().despawn(entity, "projectile expired");
        }
    }
    Ok(())
}

/// Keep telegraphs on their owners and drop them when the windup ends.
pub fn telegraph_system(world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
    for entity in world.entities_with::<(&ActiveTelegraph,)>() {
        let Some(telegraph) = world.get::<ActiveTelegraph>(entity).copied() else {
            continue;
        };
        let owner_pos = is_targetable(world, telegraph.owner)
            .then(|| position_of(world, telegraph.owner))
            .flatten();
        let remaining = telegraph.remaining - ctx.dt;
        match owner_pos {
            Some(owner_pos) if remaining > 0.0 => {
                if let Some(t) = world.get_mut::<ActiveTelegraph>(entity) {
                    t.remaining = remaining;
                }
                if let Some(p) = world.get_mut::<Position>(entity) {
                    p.0 = owner_pos;
                }
            }
            _ => world.commands().despawn(entity, "telegraph ended"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::damage::{DamageCalculator, DamageDealt, DamageSource, DamageType};

    fn setup_world() -> World {
        let mut world = World::new();
        crate::register_components(&mut world);
        world.insert_resource(DamageCalculator::new(11));
        world
    }

    fn true_damage(amount: f32) -> DamageInfo {
        DamageInfo::new(amount, DamageType::True, DamageSource::Melee).without_crit()
    }

    fn spawn_target(world: &mut World, at: Vec2, faction: Faction) -> Entity {
        world
            .spawn_bundle((Position(at), faction, Health::new(100.0), Collider::circle(0.5)))
            .unwrap()
    }

    #[test]
    fn hitbox_hits_each_target_once() {
        let mut world = setup_world();
        let owner = world.spawn_with(Faction::Enemy).unwrap();
        let player = spawn_target(&mut world, Vec2::new(0.5, 0.0), Faction::Player);
        spawn_target(&mut world, Vec2::new(0.2, 0.0), Faction::Enemy);
        let hb = spawn_hitbox(
            &mut world,
            Vec2::ZERO,
            AttackHitbox::new(owner, Faction::Enemy, 1.0, true_damage(5.0), 0.5).with_knockback(8.0),
        )
        .unwrap();

        for _ in 0..3 {
            hitbox_system(&mut world, &FrameContext::idle(0.1)).unwrap();
        }
        assert_eq!(world.events().pending_of::<DamageDealt>(), 1);
        assert_eq!(world.get::<AttackHitbox>(hb).unwrap().hits, vec![player]);
        let kb = world.get::<Knockback>(player).unwrap();
        assert!(kb.velocity.x > 0.0);
    }

    #[test]
    fn hitbox_despawns_after_lifetime() {
        let mut world = setup_world();
        let owner = world.spawn_with(Faction::Player).unwrap();
        let hb = spawn_hitbox(
            &mut world,
            Vec2::ZERO,
            AttackHitbox::new(owner, Faction::Player, 1.0, true_damage(5.0), 0.2),
        )
        .unwrap();
        hitbox_system(&mut world, &FrameContext::idle(0.25)).unwrap();
        world.apply_commands();
        assert!(!world.is_alive(hb));
    }

    #[test]
    fn projectile_hits_first_hostile_and_survives_dead_source() {
        let mut world = setup_world();
        let source = world.spawn_with(Faction::Enemy).unwrap();
        let near = spawn_target(&mut world, Vec2::new(1.0, 0.0), Faction::Player);
        spawn_target(&mut world, Vec2::new(1.2, 0.0), Faction::Player);
        let hits = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = std::rc::Rc::clone(&hits);
        world.subscribe::<DamageDealt, _>(move |_, ev| sink.borrow_mut().push((ev.target, ev.attacker)));

        let shot = spawn_projectile(
            &mut world,
            Vec2::ZERO,
            Projectile {
                source,
                faction: Faction::Enemy,
                velocity: Vec2::new(10.0, 0.0),
                radius: 0.1,
                damage: true_damage(4.0),
                remaining: 2.0,
            },
        )
        .unwrap();
        world.despawn(source).unwrap();

        for _ in 0..3 {
            projectile_system(&mut world, &FrameContext::idle(0.05)).unwrap();
            world.apply_commands();
        }
        world.process_events().unwrap();
        assert!(!world.is_alive(shot));
        assert_eq!(*hits.borrow(), vec![(near, None)]);
    }

    #[test]
    fn projectile_stops_at_walls() {
        let mut world = setup_world();
        let source = world.spawn_with(Faction::Player).unwrap();
        world
            .spawn_bundle((Position(Vec2::new(2.0, 0.0)), Collider::aabb(Vec2::splat(0.5)), StaticCollider))
            .unwrap();
        let shot = spawn_projectile(
            &mut world,
            Vec2::ZERO,
            Projectile {
                source,
                faction: Faction::Player,
                velocity: Vec2::new(20.0, 0.0),
                radius: 0.1,
                damage: true_damage(4.0),
                remaining: 2.0,
            },
        )
        .unwrap();
        projectile_system(&mut world, &FrameContext::idle(0.05)).unwrap();
        world.apply_commands();
        assert!(world.is_alive(shot));
        projectile_system(&mut world, &FrameContext::idle(0.05)).unwrap();
        world.apply_commands();
        assert!(!world.is_alive(shot));
    }

    #[test]
    fn telegraph_follows_owner_and_expires() {
        let mut world = setup_world();
        let owner = spawn_target(&mut world, Vec2::new(3.0, 3.0), Faction::Enemy);
        let tg = world
            .spawn_bundle((
                Position(Vec2::ZERO),
                ActiveTelegraph {
                    owner,
                    direction: Vec2::X,
                    radius: 1.0,
                    length: 3.0,
                    remaining: 0.3,
                },
            ))
            .unwrap();
        telegraph_system(&mut world, &FrameContext::idle(0.1)).unwrap();
        assert_eq!(world.get::<Position>(tg).unwrap().0, Vec2::new(3.0, 3.0));
        telegraph_system(&mut world, &FrameContext::idle(0.25)).unwrap();
        world.apply_commands();
        assert!(!world.is_alive(tg));
    }
}
