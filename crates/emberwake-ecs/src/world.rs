//! The [`World`]: sole owner and mutation surface of all gameplay state.
//!
//! A world owns the entity allocator, one sparse-set table per registered
//! component type, per-session singleton resources, its [`EventBus`] and its
//! deferred [`CommandBuffer`]. Access is single-threaded; every system gets
//! `&mut World` for the duration of its update.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::bundle::Bundle;
use crate::command::{ApplyReport, CommandBuffer};
use crate::component::{Component, ComponentRegistry, ComponentTypeId};
use crate::entity::{Entity, EntityAllocator};
use crate::events::{Event, EventBus};
use crate::query::Query;
use crate::storage::{ErasedStorage, SparseSet};
use crate::EcsError;

/// The top-level ECS container.
#[derive(Default)]
pub struct World {
    allocator: EntityAllocator,
    registry: ComponentRegistry,
    /// Indexed by `ComponentTypeId.0`.
    storages: Vec<Option<Box<dyn ErasedStorage>>>,
    resources: HashMap<TypeId, Box<dyn Any>>,
    events: EventBus,
    commands: CommandBuffer,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.allocator.len())
            .field("component_types", &self.registry.len())
            .field("resources", &self.resources.len())
            .field("events", &self.events)
            .field("commands", &self.commands)
            .finish()
    }
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Register a component type and create its table. Idempotent per type.
    pub fn register_component<T: Component>(&mut self, name: &str) -> ComponentTypeId {
        let id = self.registry.register::<T>(name);
        let idx = id.0 as usize;
        if idx >= self.storages.len() {
            self.storages.resize_with(idx + 1, || None);
        }
        if self.storages[idx].is_none() {
            self.storages[idx] = Some(Box::new(SparseSet::<T>::new()));
        }
        id
    }

    /// `Ok` if `T` has been registered.
    pub fn ensure_registered<T: Component>(&self) -> Result<ComponentTypeId, EcsError> {
        self.registry
            .lookup::<T>()
            .ok_or_else(|| EcsError::UnknownComponent {
                name: std::any::type_name::<T>().to_owned(),
                registered: self.registry.registered_names().join(", "),
            })
    }

    // -- storage access -----------------------------------------------------

    /// The table for `T`, if registered.
    pub fn storage<T: Component>(&self) -> Option<&SparseSet<T>> {
        let id = self.registry.lookup::<T>()?;
        self.storages
            .get(id.0 as usize)?
            .as_ref()?
            .as_any()
            .downcast_ref::<SparseSet<T>>()
    }

    pub fn storage_mut<T: Component>(&mut self) -> Option<&mut SparseSet<T>> {
        let id = self.registry.lookup::<T>()?;
        self.storages
            .get_mut(id.0 as usize)?
            .as_mut()?
            .as_any_mut()
            .downcast_mut::<SparseSet<T>>()
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create an entity with no components.
    pub fn spawn(&mut self) -> Entity {
        self.allocator.allocate()
    }

    pub fn spawn_with<T: Component>(&mut self, component: T) -> Result<Entity, EcsError> {
        self.spawn_bundle((component,))
    }

    /// Create an entity carrying every component of `bundle`.
    ///
    /// All member types are checked before the entity is allocated.
    pub fn spawn_bundle<B: Bundle>(&mut self, bundle: B) -> Result<Entity, EcsError> {
        B::validate(self)?;
        let entity = self.allocator.allocate();
        bundle.insert_into(self, entity)?;
        Ok(entity)
    }

    /// Destroy an entity and every component attached to it.
    pub fn despawn(&mut self, entity: Entity) -> Result<(), EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::StaleEntity { entity });
        }
        for storage in self.storages.iter_mut().flatten() {
            storage.remove_entity(entity);
        }
        self.allocator.free(entity);
        Ok(())
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.allocator.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.allocator.len()
    }

    /// Every live entity in slot order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.allocator.iter()
    }

    // -- component access ---------------------------------------------------

    /// Attach `value` to `entity`, overwriting any existing `T`.
    ///
    /// Returns the overwritten value. Inserting on a dead entity or an
    /// unregistered type is a caller bug and is reported as an error.
    pub fn insert<T: Component>(&mut self, entity: Entity, value: T) -> Result<Option<T>, EcsError> {
        self.ensure_registered::<T>()?;
        if !self.allocator.is_alive(entity) {
            let component = self.registry.name_of::<T>().unwrap_or(std::any::type_name::<T>());
            tracing::error!(?entity, component, "insert on dead entity");
            return Err(EcsError::StaleEntity { entity });
        }
        let set = self
            .storage_mut::<T>()
            .expect("registered component has a table");
        Ok(set.insert(entity, value))
    }

    /// Detach and return `T` from `entity`. Removing an absent component is a
    /// no-op returning `Ok(None)`.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> Result<Option<T>, EcsError> {
        self.ensure_registered::<T>()?;
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::StaleEntity { entity });
        }
        Ok(self.storage_mut::<T>().and_then(|set| set.remove(entity)))
    }

    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.storage::<T>()?.get(entity)
    }

    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.storage_mut::<T>()?.get_mut(entity)
    }

    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.storage::<T>().is_some_and(|set| set.contains(entity))
    }

    /// Number of entities holding `T`.
    pub fn count<T: Component>(&self) -> usize {
        self.storage::<T>().map_or(0, SparseSet::len)
    }

    // -- iteration ----------------------------------------------------------

    /// Iterate rows matching `Q`, e.g. `world.query::<(&Position, &Health)>()`.
    pub fn query<Q: Query>(&self) -> impl Iterator<Item = (Entity, Q::Item<'_>)> + '_ {
        Q::driver(self)
            .iter()
            .filter_map(move |&entity| Q::fetch(self, entity).map(|item| (entity, item)))
    }

    /// Snapshot of the entities matching `Q`, for copy-modify-write loops that
    /// also spawn or despawn.
    pub fn entities_with<Q: Query>(&self) -> Vec<Entity> {
        self.query::<Q>().map(|(entity, _)| entity).collect()
    }

    /// Visit every `T` mutably.
    pub fn for_each_mut<T: Component>(&mut self, mut f: impl FnMut(Entity, &mut T)) {
        if let Some(set) = self.storage_mut::<T>() {
            for (entity, value) in set.iter_mut() {
                f(entity, value);
            }
        }
    }

    /// Visit every entity holding both `A` and `B`, with mutable access to both.
    ///
    /// # Panics
    ///
    /// Panics if `A` and `B` are the same type.
    pub fn for_each_mut2<A: Component, B: Component>(
        &mut self,
        mut f: impl FnMut(Entity, &mut A, &mut B),
    ) {
        assert_ne!(
            TypeId::of::<A>(),
            TypeId::of::<B>(),
            "for_each_mut2 needs two distinct component types"
        );
        let Some(b_id) = self.registry.lookup::<B>() else {
            return;
        };
        let Some(mut b_table) = self.storages[b_id.0 as usize].take() else {
            return;
        };
        if let (Some(a_set), Some(b_set)) = (
            self.storage_mut::<A>(),
            b_table.as_any_mut().downcast_mut::<SparseSet<B>>(),
        ) {
            for (entity, a) in a_set.iter_mut() {
                if let Some(b) = b_set.get_mut(entity) {
                    f(entity, a, b);
                }
            }
        }
        self.storages[b_id.0 as usize] = Some(b_table);
    }

    /// Visit every entity holding `A` and `R`, mutating `A` while reading `R`.
    ///
    /// # Panics
    ///
    /// Panics if `A` and `R` are the same type.
    pub fn for_each_mut_with<A: Component, R: Component>(
        &mut self,
        mut f: impl FnMut(Entity, &mut A, &R),
    ) {
        self.for_each_mut2::<A, R>(|entity, a, r| f(entity, a, r));
    }

    // -- resources ----------------------------------------------------------

    /// Store a per-session singleton, returning any previous value.
    pub fn insert_resource<R: Any>(&mut self, resource: R) -> Option<R> {
        self.resources
            .insert(TypeId::of::<R>(), Box::new(resource))
            .and_then(|old| old.downcast::<R>().ok())
            .map(|old| *old)
    }

    pub fn resource<R: Any>(&self) -> Option<&R> {
        self.resources.get(&TypeId::of::<R>())?.downcast_ref()
    }

    pub fn resource_mut<R: Any>(&mut self) -> Option<&mut R> {
        self.resources.get_mut(&TypeId::of::<R>())?.downcast_mut()
    }

    pub fn remove_resource<R: Any>(&mut self) -> Option<R> {
        self.resources
            .remove(&TypeId::of::<R>())
            .and_then(|old| old.downcast::<R>().ok())
            .map(|old| *old)
    }

    pub fn has_resource<R: Any>(&self) -> bool {
        self.resources.contains_key(&TypeId::of::<R>())
    }

    /// Run `f` with `R` temporarily lifted out of the world, so `f` can hold
    /// `&mut R` and `&mut World` at once. Returns `None` if `R` is missing.
    pub fn resource_scope<R: Any, U>(&mut self, f: impl FnOnce(&mut World, &mut R) -> U) -> Option<U> {
        let mut resource = self.remove_resource::<R>()?;
        let out = f(self, &mut resource);
        self.insert_resource(resource);
        Some(out)
    }

    // -- events -------------------------------------------------------------

    /// Queue an event for the next [`process_events`](Self::process_events).
    pub fn publish<E: Event>(&mut self, event: E) {
        self.events.publish(event);
    }

    /// Register a handler for events of type `E`.
    pub fn subscribe<E, F>(&mut self, handler: F)
    where
        E: Event,
        F: FnMut(&mut World, &E) + 'static,
    {
        self.events.subscribe(handler);
    }

    /// Drain the pending queue in FIFO order, running every subscriber.
    ///
    /// Events published by handlers during the drain are held for the next
    /// call. Returns the number of events dispatched.
    pub fn process_events(&mut self) -> Result<usize, EcsError> {
        if self.events.draining {
            tracing::error!("process_events called from inside an event handler");
            return Err(EcsError::ReentrantDrain);
        }
        let mut bus = std::mem::take(&mut self.events);
        // The stand-in bus collects publishes and subscriptions made by
        // handlers, and its flag rejects nested drains.
        self.events.draining = true;
        let count = bus.dispatch_pending(self);
        let stand_in = std::mem::replace(&mut self.events, bus);
        self.events.absorb(stand_in);
        Ok(count)
    }

    pub fn pending_events(&self) -> usize {
        self.events.pending()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // -- deferred commands --------------------------------------------------

    pub fn commands(&mut self) -> &mut CommandBuffer {
        &mut self.commands
    }

    /// Apply every queued command in FIFO order.
    pub fn apply_commands(&mut self) -> ApplyReport {
        let queued = self.commands.take();
        CommandBuffer::run(queued, self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
