//! Health resolution and death.
//!
//! The [`DamageDealt`] subscriber installed here is the only code that lowers
//! health. A lethal hit marks the target [`Dead`], publishes an
//! [`EntityDied`] carrying everything death reactions need, and queues the
//! despawn for the end of the frame.

use emberwake_ecs::prelude::*;
use glam::Vec2;

use crate::components::{is_targetable, position_of, Bounty, Dead, Faction, Health, Player};
use crate::damage::DamageDealt;
use crate::elite::{EliteModifierData, EliteShield};
use crate::persistence;
use crate::status;

/// Published once per death. Self-contained so subscribers never need the
/// (soon despawned) entity's components.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDied {
    pub entity: Entity,
    pub position: Vec2,
    pub faction: Faction,
    pub killer: Option<Entity>,
    pub was_player: bool,
    pub elite: Option<EliteModifierData>,
    pub bounty: Option<Bounty>,
}

pub fn install(world: &mut World) {
    world.subscribe::<DamageDealt, _>(on_damage_dealt);
}

fn on_damage_dealt(world: &mut World, ev: &DamageDealt) {
    if !is_targetable(world, ev.target) {
        return;
    }
    let mut amount = ev.amount;
    if let Some(shield) = world.get_mut::<EliteShield>(ev.target) {
        amount = shield.absorb(amount);
    }
    let Some(health) = world.get_mut::<Health>(ev.target) else {
        return;
    };
    health.current = (health.current - amount).max(0.0);
    if health.is_depleted() {
        kill(world, ev.target, ev.attacker);
        return;
    }
    if let Some(payload) = ev.status {
        if let Err(err) = status::apply_status(world, ev.target, &payload, ev.attacker) {
            tracing::warn!(target = ?ev.target, %err, "failed to apply status from hit");
        }
    }
}

/// Mark `entity` dead, announce it and queue its despawn.
pub fn kill(world: &mut World, entity: Entity, killer: Option<Entity>) {
    if world.has::<Dead>(entity) {
        return;
    }
    if let Err(err) = world.insert(entity, Dead) {
        tracing::warn!(?entity, %err, "cannot mark entity dead");
        return;
    }
    let died = EntityDied {
        entity,
        position: position_of(world, entity).unwrap_or_default(),
        faction: world.get::<Faction>(entity).copied().unwrap_or(Faction::Neutral),
        killer,
        was_player: world.has::<Player>(entity),
        elite: world.get::<EliteModifierData>(entity).cloned(),
        bounty: world.get::<Bounty>(entity).cloned(),
    };
    if died.was_player {
        // The despawn below removes everything the profile is captured from.
        persistence::refresh_profile(world);
    }
    tracing::debug!(?entity, ?killer, "entity died");
    world.publish(died);
    world.commands().despawn(entity, "died");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::damage::{DamageSource, DamageType, StatusPayload};
    use crate::elite::{attach_elite_modifier, EliteModifierKind};
    use crate::status::{StatusEffects, StatusKind};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup_world() -> World {
        let mut world = World::new();
        crate::register_components(&mut world);
        install(&mut world);
        world
    }

    fn hit(target: Entity, amount: f32) -> DamageDealt {
        DamageDealt {
            target,
            attacker: None,
            attacker_faction: Faction::Neutral,
            amount,
            is_crit: false,
            damage_type: DamageType::True,
            source: DamageSource::Environment,
            source_position: Vec2::ZERO,
            status: None,
        }
    }

    #[test]
    fn lethal_hit_marks_dead_publishes_once_and_defers_despawn() {
        let mut world = setup_world();
        let deaths = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&deaths);
        world.subscribe::<EntityDied, _>(move |_, ev| sink.borrow_mut().push(ev.clone()));

        let e = world
            .spawn_bundle((Health::new(10.0), Faction::Enemy, Bounty { experience: 7, loot_table: None }))
            .unwrap();
        world.publish(hit(e, 6.0));
        world.publish(hit(e, 6.0));
        world.publish(hit(e, 6.0));
        world.process_events().unwrap();

        assert!(world.has::<Dead>(e));
        assert!(world.is_alive(e), "despawn waits for end of frame");
        assert_eq!(world.get::<Health>(e).unwrap().current, 0.0);

        world.process_events().unwrap();
        let deaths = deaths.borrow();
        assert_eq!(deaths.len(), 1);
        assert_eq!(deaths[0].bounty.as_ref().map(|b| b.experience), Some(7));
        assert_eq!(deaths[0].faction, Faction::Enemy);

        world.apply_commands();
        assert!(!world.is_alive(e));
    }

    #[test]
    fn shield_soaks_before_health() {
        let mut world = setup_world();
        let e = world.spawn_with(Health::new(100.0)).unwrap();
        attach_elite_modifier(&mut world, e, EliteModifierKind::Shield).unwrap();
        world.publish(hit(e, 50.0));
        world.process_events().unwrap();
        assert_eq!(world.get::<EliteShield>(e).unwrap().current, 0.0);
        assert_eq!(world.get::<Health>(e).unwrap().current, 145.0);
    }

    #[test]
    fn surviving_hit_applies_status_lethal_hit_does_not() {
        let mut world = setup_world();
        let survivor = world.spawn_with(Health::new(10.0)).unwrap();
        let victim = world.spawn_with(Health::new(1.0)).unwrap();
        let stun = StatusPayload {
            kind: StatusKind::Stun,
            duration: 1.0,
            potency: 0.0,
        };
        world.publish(DamageDealt {
            status: Some(stun),
            ..hit(survivor, 1.0)
        });
        world.publish(DamageDealt {
            status: Some(stun),
            ..hit(victim, 5.0)
        });
        world.process_events().unwrap();
        assert!(world.get::<StatusEffects>(survivor).unwrap().has(StatusKind::Stun));
        assert!(!world.has::<StatusEffects>(victim));
    }
}
