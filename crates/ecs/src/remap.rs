use lumen_common::{Aabb, Entity};
use std::collections::HashMap;

/// Old-to-new entity translation used when loading or duplicating content.
///
/// Unknown entities are given fresh handles on first sight so that every
/// reference to the same old entity lands on the same new one.
#[derive(Debug, Clone, Default)]
pub struct EntityMap {
    map: HashMap<Entity, Entity>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate `old`, allocating a new handle if it was not seen yet.
    /// `Entity::INVALID` always maps to itself.
    pub fn get_or_create(&mut self, old: Entity) -> Entity {
        if !old.is_valid() {
            return Entity::INVALID;
        }
        *self.map.entry(old).or_insert_with(Entity::create)
    }

    pub fn insert(&mut self, old: Entity, new: Entity) {
        self.map.insert(old, new);
    }

    pub fn get(&self, old: Entity) -> Option<Entity> {
        self.map.get(&old).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Implemented by components that hold references to other entities.
pub trait RemapEntities {
    fn remap_entities(&mut self, _map: &mut EntityMap) {}
}

impl RemapEntities for Aabb {}
