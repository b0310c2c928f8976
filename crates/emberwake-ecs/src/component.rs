//! Component type registration.
//!
//! Every component type must be registered on the [`World`](crate::world::World)
//! before it is attached to an entity. Registration creates the type's
//! sparse-set storage and records a human-readable name used by logs and
//! state dumps.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

/// Marker trait for plain-data component types.
///
/// Blanket-implemented for every `'static` type; the bound exists so that
/// signatures read as "this is a component" rather than "any type".
pub trait Component: 'static {}

impl<T: 'static> Component for T {}

/// Dense identifier assigned to a component type at registration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

/// Maps Rust types to [`ComponentTypeId`]s and their registered names.
///
/// Registering the same type twice returns the original id; registering two
/// different types under one name is a programming error and panics.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentTypeId>,
    by_name: HashMap<String, ComponentTypeId>,
    /// Registered name per id.
    names: Vec<String>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `name`, returning its id.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already taken by a different type.
    pub fn register<T: Component>(&mut self, name: &str) -> ComponentTypeId {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&type_id) {
            return existing;
        }
        if self.by_name.contains_key(name) {
            panic!("component name '{name}' is already registered for a different type");
        }
        let id = ComponentTypeId(self.names.len() as u32);
        self.names.push(name.to_owned());
        self.by_type.insert(type_id, id);
        self.by_name.insert(name.to_owned(), id);
        id
    }

    pub fn lookup<T: Component>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Registered name of `T`, if any.
    pub fn name_of<T: Component>(&self) -> Option<&str> {
        self.lookup::<T>()
            .and_then(|id| self.names.get(id.0 as usize))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// All registered names, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pos;
    struct Vel;

    #[test]
    fn register_and_lookup() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Pos>("position");
        assert_eq!(reg.lookup::<Pos>(), Some(id));
        assert_eq!(reg.name_of::<Pos>(), Some("position"));
    }

    #[test]
    fn same_type_keeps_first_id() {
        let mut reg = ComponentRegistry::new();
        let a = reg.register::<Pos>("position");
        let b = reg.register::<Pos>("position_again");
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn name_clash_panics() {
        let mut reg = ComponentRegistry::new();
        reg.register::<Pos>("thing");
        reg.register::<Vel>("thing");
    }

    #[test]
    fn names_are_sorted() {
        let mut reg = ComponentRegistry::new();
        reg.register::<Vel>("velocity");
        reg.register::<Pos>("position");
        assert_eq!(reg.registered_names(), vec!["position", "velocity"]);
    }
}
