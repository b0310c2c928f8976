//! Read-only queries over component tuples.
//!
//! A query names a tuple of component references, e.g.
//! `(&Position, &Health)` or `(&Position, Option<&Faction>)`, and yields
//! `(Entity, (&Position, &Health))` for every live entity holding all of the
//! required members. The walk is driven by the smallest required table.
//!
//! Queries borrow the world immutably. Systems that need to change what they
//! read either use [`World::for_each_mut`](crate::world::World::for_each_mut)
//! style iteration, or take a snapshot with
//! [`World::entities_with`](crate::world::World::entities_with) and write back
//! through [`World::get_mut`](crate::world::World::get_mut). Spawns and
//! despawns after the snapshot never disturb the walk.

use crate::component::Component;
use crate::entity::Entity;
use crate::world::World;

/// One member of a query tuple.
pub trait QueryItem {
    type Item<'w>;
    /// Optional members never drive iteration and never filter rows out.
    const OPTIONAL: bool;
    /// Dense entity list of the backing table (empty if unregistered).
    fn entities(world: &World) -> &[Entity];
    fn fetch(world: &World, entity: Entity) -> Option<Self::Item<'_>>;
}

impl<T: Component> QueryItem for &T {
    type Item<'w> = &'w T;
    const OPTIONAL: bool = false;

    fn entities(world: &World) -> &[Entity] {
        world.storage::<T>().map_or(&[], |set| set.entities())
    }

    fn fetch(world: &World, entity: Entity) -> Option<Self::Item<'_>> {
        world.get::<T>(entity)
    }
}

impl<T: Component> QueryItem for Option<&T> {
    type Item<'w> = Option<&'w T>;
    const OPTIONAL: bool = true;

    fn entities(_world: &World) -> &[Entity] {
        &[]
    }

    fn fetch(world: &World, entity: Entity) -> Option<Self::Item<'_>> {
        Some(world.get::<T>(entity))
    }
}

/// A tuple of [`QueryItem`]s.
pub trait Query {
    type Item<'w>;
    /// The entity list the walk iterates: the smallest required table.
    fn driver(world: &World) -> &[Entity];
    fn fetch(world: &World, entity: Entity) -> Option<Self::Item<'_>>;
}

macro_rules! impl_query {
    ($($name:ident),+) => {
        impl<$($name: QueryItem),+> Query for ($($name,)+) {
            type Item<'w> = ($($name::Item<'w>,)+);

            fn driver(world: &World) -> &[Entity] {
                let mut best: Option<&[Entity]> = None;
                $(
                    if !$name::OPTIONAL {
                        let candidate = $name::entities(world);
                        if best.map_or(true, |b| candidate.len() < b.len()) {
                            best = Some(candidate);
                        }
                    }
                )+
                best.expect("a query needs at least one non-optional component")
            }

            fn fetch(world: &World, entity: Entity) -> Option<Self::Item<'_>> {
                Some(($($name::fetch(world, entity)?,)+))
            }
        }
    };
}

impl_query!(A);
impl_query!(A, B);
impl_query!(A, B, C);
impl_query!(A, B, C, D);
impl_query!(A, B, C, D, E);
