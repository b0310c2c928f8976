//! Component bundles: tuples of components attached in one call.

use crate::component::Component;
use crate::entity::Entity;
use crate::world::World;
use crate::EcsError;

/// A group of components that can be attached to an entity together.
///
/// Implemented for tuples of 1 to 12 components. [`World::spawn_bundle`]
/// checks [`Bundle::validate`] before allocating, so a bundle containing an
/// unregistered type never leaves a half-built entity behind.
pub trait Bundle {
    /// Fail if any member type is not registered on `world`.
    fn validate(world: &World) -> Result<(), EcsError>;

    /// Attach every member to `entity`.
    fn insert_into(self, world: &mut World, entity: Entity) -> Result<(), EcsError>;
}

macro_rules! impl_bundle {
    ($($name:ident),+) => {
        impl<$($name: Component),+> Bundle for ($($name,)+) {
            fn validate(world: &World) -> Result<(), EcsError> {
                $( world.ensure_registered::<$name>()?; )+
                Ok(())
            }

            #[allow(non_snake_case)]
            fn insert_into(self, world: &mut World, entity: Entity) -> Result<(), EcsError> {
                let ($($name,)+) = self;
                $( world.insert(entity, $name)?; )+
                Ok(())
            }
        }
    };
}

impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);
impl_bundle!(A, B, C, D, E, F, G, H, I);
impl_bundle!(A, B, C, D, E, F, G, H, I, J);
impl_bundle!(A, B, C, D, E, F, G, H, I, J, K);
impl_bundle!(A, B, C, D, E, F, G, H, I, J, K, L);
