//! Emberwake ECS -- sparse-set entity component system with a deferred event bus.
//!
//! Entities are generational handles; each component type lives in its own
//! sparse-set table keyed by the handle's slot index, giving O(1) lookup by
//! `(entity, type)` and dense iteration. The [`World`](world::World) also owns
//! per-session resources, a FIFO event bus that only dispatches when drained,
//! and a command buffer for structural changes deferred to end of frame.
//!
//! # Quick Start
//!
//! ```
//! use emberwake_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! struct Moved(Entity);
//!
//! let mut world = World::new();
//! world.register_component::<Position>("position");
//! world.register_component::<Velocity>("velocity");
//!
//! let entity = world
//!     .spawn_bundle((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.0 }))
//!     .unwrap();
//!
//! world.for_each_mut_with::<Position, Velocity>(|_, pos, vel| {
//!     pos.x += vel.dx;
//!     pos.y += vel.dy;
//! });
//! world.publish(Moved(entity));
//! world.subscribe::<Moved, _>(|world, moved| {
//!     world.get_mut::<Velocity>(moved.0).unwrap().dx = 0.0;
//! });
//! assert_eq!(world.process_events().unwrap(), 1);
//!
//! assert_eq!(world.get::<Position>(entity), Some(&Position { x: 1.0, y: 0.0 }));
//! assert_eq!(world.get::<Velocity>(entity).map(|v| v.dx), Some(0.0));
//! ```

#![deny(unsafe_code)]

pub mod bundle;
pub mod command;
pub mod component;
pub mod entity;
pub mod events;
pub mod query;
pub mod storage;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity was destroyed (or never existed).
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::Entity },

    /// A component type was used before being registered.
    #[error("component type '{name}' not registered. Registered components: [{registered}]")]
    UnknownComponent { name: String, registered: String },

    /// `process_events` was called from inside an event handler.
    #[error("event drain re-entered from inside an event handler")]
    ReentrantDrain,
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::bundle::Bundle;
    pub use crate::command::{ApplyReport, CommandBuffer, CommandKind};
    pub use crate::component::{Component, ComponentRegistry, ComponentTypeId};
    pub use crate::entity::Entity;
    pub use crate::events::{Event, EventBus};
    pub use crate::query::{Query, QueryItem};
    pub use crate::storage::SparseSet;
    pub use crate::world::World;
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
