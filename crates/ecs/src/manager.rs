use crate::{EcsError, EntityMap, RemapEntities};
use lumen_common::Entity;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::ops::{Index, IndexMut};

/// Dense storage for one component type.
///
/// References returned by `get`/`get_mut` borrow the manager, so they cannot
/// survive a structural change (create, remove, merge) of the same array.
#[derive(Debug, Clone)]
pub struct ComponentManager<T> {
    components: Vec<T>,
    entities: Vec<Entity>,
    lookup: HashMap<Entity, usize>,
}

impl<T> Default for ComponentManager<T> {
    fn default() -> Self {
        Self {
            components: Vec::new(),
            entities: Vec::new(),
            lookup: HashMap::new(),
        }
    }
}

impl<T> ComponentManager<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            components: Vec::with_capacity(capacity),
            entities: Vec::with_capacity(capacity),
            lookup: HashMap::with_capacity(capacity),
        }
    }

    /// Get-or-create: if `entity` already owns this component the existing
    /// value is returned untouched, otherwise a default one is appended.
    pub fn create(&mut self, entity: Entity) -> &mut T
    where
        T: Default,
    {
        debug_assert!(entity.is_valid(), "components cannot be attached to INVALID");
        if let Some(&index) = self.lookup.get(&entity) {
            tracing::trace!(%entity, "component already present");
            return &mut self.components[index];
        }
        self.push(entity, T::default())
    }

    /// Strict create: fails if `entity` is invalid or already owns the component.
    pub fn try_create(&mut self, entity: Entity) -> Result<&mut T, EcsError>
    where
        T: Default,
    {
        if !entity.is_valid() {
            return Err(EcsError::InvalidEntity);
        }
        if self.lookup.contains_key(&entity) {
            return Err(EcsError::AlreadyExists(entity));
        }
        Ok(self.push(entity, T::default()))
    }

    /// Add `value` for `entity`, replacing any existing component.
    pub fn insert(&mut self, entity: Entity, value: T) -> &mut T {
        if let Some(&index) = self.lookup.get(&entity) {
            self.components[index] = value;
            return &mut self.components[index];
        }
        self.push(entity, value)
    }

    fn push(&mut self, entity: Entity, value: T) -> &mut T {
        let index = self.components.len();
        self.lookup.insert(entity, index);
        self.entities.push(entity);
        self.components.push(value);
        &mut self.components[index]
    }

    /// Swap-with-last removal. O(1); the previously last element moves into
    /// the freed slot.
    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        let index = self.lookup.remove(&entity)?;
        let value = self.components.swap_remove(index);
        self.entities.swap_remove(index);
        if let Some(&moved) = self.entities.get(index) {
            self.lookup.insert(moved, index);
        }
        Some(value)
    }

    /// Order-preserving removal. O(n).
    pub fn remove_keep_sorted(&mut self, entity: Entity) -> Option<T> {
        let index = self.lookup.remove(&entity)?;
        let value = self.components.remove(index);
        self.entities.remove(index);
        self.reindex(index..self.entities.len());
        Some(value)
    }

    /// Move the element at `from` to `to`, shifting everything in between.
    pub fn move_item(&mut self, from: usize, to: usize) {
        let len = self.components.len();
        if from == to || from >= len || to >= len {
            return;
        }
        if from < to {
            self.components[from..=to].rotate_left(1);
            self.entities[from..=to].rotate_left(1);
            self.reindex(from..to + 1);
        } else {
            self.components[to..=from].rotate_right(1);
            self.entities[to..=from].rotate_right(1);
            self.reindex(to..from + 1);
        }
    }

    pub fn move_last_to(&mut self, index: usize) {
        if let Some(last) = self.components.len().checked_sub(1) {
            self.move_item(last, index);
        }
    }

    fn reindex(&mut self, range: std::ops::Range<usize>) {
        for i in range {
            self.lookup.insert(self.entities[i], i);
        }
    }

    /// Move every component of `other` into `self`. On collision the
    /// incoming component wins.
    pub fn merge(&mut self, other: &mut ComponentManager<T>) {
        self.components.reserve(other.len());
        self.entities.reserve(other.len());
        let entities = std::mem::take(&mut other.entities);
        let components = std::mem::take(&mut other.components);
        other.lookup.clear();
        for (entity, component) in entities.into_iter().zip(components) {
            if self.contains(entity) {
                tracing::warn!(%entity, "merge overwrote an existing component");
            }
            self.insert(entity, component);
        }
    }

    /// Replace the contents with a copy of `other`.
    pub fn copy_from(&mut self, other: &ComponentManager<T>)
    where
        T: Clone,
    {
        self.components.clone_from(&other.components);
        self.entities.clone_from(&other.entities);
        self.lookup.clone_from(&other.lookup);
    }

    pub fn clear(&mut self) {
        self.components.clear();
        self.entities.clear();
        self.lookup.clear();
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.lookup.contains_key(&entity)
    }

    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.lookup.get(&entity).map(|&i| &self.components[i])
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        match self.lookup.get(&entity) {
            Some(&i) => Some(&mut self.components[i]),
            None => None,
        }
    }

    pub fn get_index(&self, entity: Entity) -> Option<usize> {
        self.lookup.get(&entity).copied()
    }

    /// Entity owning the component at `index`.
    ///
    /// # Panics
    /// If `index` is out of bounds.
    pub fn entity(&self, index: usize) -> Entity {
        self.entities[index]
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn components(&self) -> &[T] {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut [T] {
        &mut self.components
    }

    /// Owning entities alongside mutable components, for tight update loops.
    pub fn split_mut(&mut self) -> (&[Entity], &mut [T]) {
        (&self.entities, &mut self.components)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.entities.iter().copied().zip(self.components.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.entities.iter().copied().zip(self.components.iter_mut())
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Rebuild a manager from parallel arrays, validating them.
    pub fn from_parts(entities: Vec<Entity>, components: Vec<T>) -> Result<Self, EcsError> {
        if entities.len() != components.len() {
            return Err(EcsError::LengthMismatch {
                entities: entities.len(),
                components: components.len(),
            });
        }
        let mut lookup = HashMap::with_capacity(entities.len());
        for (i, &entity) in entities.iter().enumerate() {
            if !entity.is_valid() {
                return Err(EcsError::InvalidEntity);
            }
            if lookup.insert(entity, i).is_some() {
                return Err(EcsError::Duplicate(entity));
            }
        }
        Ok(Self {
            components,
            entities,
            lookup,
        })
    }

    /// Translate owning entities and embedded references through `map`.
    pub fn remap(&mut self, map: &mut EntityMap)
    where
        T: RemapEntities,
    {
        for entity in &mut self.entities {
            *entity = map.get_or_create(*entity);
        }
        for component in &mut self.components {
            component.remap_entities(map);
        }
        self.lookup.clear();
        self.reindex(0..self.entities.len());
    }
}

impl<T> Index<usize> for ComponentManager<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.components[index]
    }
}

impl<T> IndexMut<usize> for ComponentManager<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.components[index]
    }
}

#[derive(Serialize)]
struct PartsRef<'a, T> {
    entities: &'a [Entity],
    components: &'a [T],
}

#[derive(Deserialize)]
struct Parts<T> {
    entities: Vec<Entity>,
    components: Vec<T>,
}

impl<T: Serialize> Serialize for ComponentManager<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PartsRef {
            entities: &self.entities,
            components: &self.components,
        }
        .serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ComponentManager<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let parts = Parts::<T>::deserialize(deserializer)?;
        Self::from_parts(parts.entities, parts.components).map_err(D::Error::custom)
    }
}
