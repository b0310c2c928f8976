//! Sparse-set component storage.
//!
//! Each component type lives in its own [`SparseSet`]: a dense array of values
//! packed next to a dense array of owning entities, plus a sparse array indexed
//! by entity slot that points into the dense arrays. Lookup, insert and remove
//! are O(1); iteration walks the dense arrays only.

use std::any::Any;

use crate::entity::Entity;

/// Storage for one component type.
#[derive(Debug)]
pub struct SparseSet<T> {
    /// Entity slot index -> position in `dense`/`values`.
    sparse: Vec<Option<u32>>,
    dense: Vec<Entity>,
    values: Vec<T>,
}

impl<T> Default for SparseSet<T> {
    fn default() -> Self {
        Self {
            sparse: Vec::new(),
            dense: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<T> SparseSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, entity: Entity) -> Option<usize> {
        let pos = (*self.sparse.get(entity.index() as usize)?)? as usize;
        (self.dense[pos] == entity).then_some(pos)
    }

    /// Insert or overwrite. Returns the previous value when overwriting.
    pub fn insert(&mut self, entity: Entity, value: T) -> Option<T> {
        let index = entity.index() as usize;
        if index >= self.sparse.len() {
            self.sparse.resize(index + 1, None);
        }
        if let Some(pos) = self.sparse[index] {
            let pos = pos as usize;
            // A stale occupant of the same slot is replaced outright.
            self.dense[pos] = entity;
            return Some(std::mem::replace(&mut self.values[pos], value));
        }
        self.sparse[index] = Some(self.dense.len() as u32);
        self.dense.push(entity);
        self.values.push(value);
        None
    }

    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.slot(entity).map(|pos| &self.values[pos])
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.slot(entity).map(|pos| &mut self.values[pos])
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.slot(entity).is_some()
    }

    /// Remove by swapping the last dense element into the hole.
    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        let pos = self.slot(entity)?;
        self.sparse[entity.index() as usize] = None;
        let last = self.dense.len() - 1;
        if pos != last {
            let moved = self.dense[last];
            self.sparse[moved.index() as usize] = Some(pos as u32);
        }
        self.dense.swap_remove(pos);
        Some(self.values.swap_remove(pos))
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Owning entities in dense order.
    pub fn entities(&self) -> &[Entity] {
        &self.dense
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.dense.iter().copied().zip(self.values.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.dense.iter().copied().zip(self.values.iter_mut())
    }
}

// ---------------------------------------------------------------------------
// Type-erased access
// ---------------------------------------------------------------------------

/// Object-safe view of a [`SparseSet`] so the world can hold every component
/// table in one collection and strip an entity from all of them on despawn.
pub(crate) trait ErasedStorage: Any {
    fn remove_entity(&mut self, entity: Entity) -> bool;
    fn contains(&self, entity: Entity) -> bool;
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: 'static> ErasedStorage for SparseSet<T> {
    fn remove_entity(&mut self, entity: Entity) -> bool {
        self.remove(entity).is_some()
    }

    fn contains(&self, entity: Entity) -> bool {
        SparseSet::contains(self, entity)
    }

    fn len(&self) -> usize {
        SparseSet::len(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}
