//! Movement integration and static collision.
//!
//! Velocity each frame is `normalize(MoveIntent) * move_speed`, replaced by the
//! dash velocity while dashing, plus any decaying [`Knockback`]. Stunned
//! entities keep their knockback but ignore intent. Moving circles are then
//! pushed out of every static collider.

use emberwake_ecs::prelude::*;
use glam::Vec2;

use crate::components::{Collider, ColliderShape, Knockback, MoveIntent, Position, StaticCollider, Velocity};
use crate::context::FrameContext;
use crate::player::Dash;
use crate::stats;
use crate::status::is_stunned;
use crate::SimError;

/// Does a circle at `center` overlap the static collider `wall` at `wall_pos`?
pub fn circle_hits_static(center: Vec2, radius: f32, wall_pos: Vec2, wall: &Collider) -> bool {
    push_out(center, radius, wall_pos, wall).is_some()
}

/// Minimal translation moving the circle out of `wall`, if they overlap.
fn push_out(center: Vec2, radius: f32, wall_pos: Vec2, wall: &Collider) -> Option<Vec2> {
    match wall.shape {
        ColliderShape::Circle { radius: wall_radius } => {
            let delta = center - wall_pos;
            let min = radius + wall_radius;
            let dist = delta.length();
            if dist >= min {
                return None;
            }
            let normal = if dist > f32::EPSILON { delta / dist } else { Vec2::X };
            Some(normal * (min - dist))
        }
        ColliderShape::Aabb { half_extents } => {
            let local = center - wall_pos;
            let closest = local.clamp(-half_extents, half_extents);
            let delta = local - closest;
            let dist = delta.length();
            if dist > f32::EPSILON {
                return (dist < radius).then(|| delta / dist * (radius - dist));
            }
            // Center is inside the box: leave through the nearest face.
            let to_face = half_extents - local.abs();
            if to_face.x < to_face.y {
                Some(Vec2::new((to_face.x + radius) * local.x.signum(), 0.0))
            } else {
                Some(Vec2::new(0.0, (to_face.y + radius) * local.y.signum()))
            }
        }
    }
}

pub fn movement_system(world: &mut World, ctx: &FrameContext) -> Result<(), SimError> {
    for entity in world.entities_with::<(&Position, &Velocity)>() {
        let intent = world.get::<MoveIntent>(entity).map_or(Vec2::ZERO, |m| m.0);
        let stunned = is_stunned(world, entity);
        let speed = stats::current(world, entity).map_or(0.0, |s| s.move_speed);

        let mut velocity = match world.get_mut::<Dash>(entity) {
            Some(dash) if dash.active_remaining > 0.0 && !stunned => {
                dash.active_remaining -= ctx.dt;
                dash.direction * dash.speed
            }
            _ if stunned => Vec2::ZERO,
            _ => intent.normalize_or_zero() * speed,
        };

        let mut knockback_over = false;
        if let Some(kb) = world.get_mut::<Knockback>(entity) {
            velocity += kb.velocity;
            kb.remaining -= ctx.dt;
            knockback_over = kb.remaining <= 0.0;
        }
        if knockback_over {
            world.remove::<Knockback>(entity)?;
        }

        if let Some(v) = world.get_mut::<Velocity>(entity) {
            v.0 = velocity;
        }
        if let Some(p) = world.get_mut::<Position>(entity) {
            p.0 += velocity * ctx.dt;
        }
    }
    resolve_static_collisions(world);
    Ok(())
}

/// Push every moving circle out of the static colliders it overlaps.
pub fn resolve_static_collisions(world: &mut World) {
    let walls: Vec<(Vec2, Collider)> = world
        .query::<(&Position, &Collider, &StaticCollider)>()
        .map(|(_, (pos, collider, _))| (pos.0, *collider))
        .collect();
    if walls.is_empty() {
        return;
    }
    let movers: Vec<(Entity, f32)> = world
        .query::<(&Position, &Collider, &Velocity)>()
        .filter(|(entity, _)| !world.has::<StaticCollider>(*entity))
        .map(|(entity, (_, collider, _))| (entity, collider.radius()))
        .collect();
    for (entity, radius) in movers {
        let Some(pos) = world.get_mut::<Position>(entity) else {
            continue;
        };
        for (wall_pos, wall) in &walls {
            if let Some(push) = push_out(pos.0, radius, *wall_pos, wall) {
                pos.0 += push;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{BaseStats, ComputedStats};

    fn setup_world() -> World {
        let mut world = World::new();
        crate::register_components(&mut world);
        world
    }

    fn spawn_mover(world: &mut World, at: Vec2, intent: Vec2) -> Entity {
        world
            .spawn_bundle((
                Position(at),
                Velocity::default(),
                MoveIntent(intent),
                BaseStats::default(),
                ComputedStats::dirty(),
                Collider::circle(0.5),
            ))
            .unwrap()
    }

    #[test]
    fn intent_is_normalized_and_scaled() {
        let mut world = setup_world();
        let e = spawn_mover(&mut world, Vec2::ZERO, Vec2::new(3.0, 4.0));
        movement_system(&mut world, &FrameContext::idle(1.0)).unwrap();
        let pos = world.get::<Position>(e).unwrap().0;
        assert!((pos - Vec2::new(3.0, 4.0)).length() < 1e-4);
    }

    #[test]
    fn knockback_adds_and_expires() {
        let mut world = setup_world();
        let e = spawn_mover(&mut world, Vec2::ZERO, Vec2::ZERO);
        world
            .insert(e, Knockback { velocity: Vec2::new(10.0, 0.0), remaining: 0.15 })
            .unwrap();
        movement_system(&mut world, &FrameContext::idle(0.1)).unwrap();
        assert!((world.get::<Position>(e).unwrap().0.x - 1.0).abs() < 1e-4);
        movement_system(&mut world, &FrameContext::idle(0.1)).unwrap();
        assert!(!world.has::<Knockback>(e));
        movement_system(&mut world, &FrameContext::idle(0.1)).unwrap();
        assert!((world.get::<Position>(e).unwrap().0.x - 2.0).abs() < 1e-4);
    }

    #[test]
    fn walls_push_movers_out() {
        let mut world = setup_world();
        world
            .spawn_bundle((Position(Vec2::new(2.0, 0.0)), Collider::aabb(Vec2::splat(1.0)), StaticCollider))
            .unwrap();
        let e = spawn_mover(&mut world, Vec2::ZERO, Vec2::X);
        for _ in 0..10 {
            movement_system(&mut world, &FrameContext::idle(0.1)).unwrap();
        }
        let x = world.get::<Position>(e).unwrap().0.x;
        assert!(x <= 0.5 + 1e-4, "mover must stop at the wall face, got {x}");
    }

    #[test]
    fn aabb_push_out_handles_center_inside() {
        let wall = Collider::aabb(Vec2::new(1.0, 1.0));
        let push = push_out(Vec2::new(0.8, 0.1), 0.25, Vec2::ZERO, &wall).unwrap();
        assert!((push.x - 0.45).abs() < 1e-5);
        assert_eq!(push.y, 0.0);
        assert!(!circle_hits_static(Vec2::new(3.0, 0.0), 0.5, Vec2::ZERO, &wall));
    }
}
