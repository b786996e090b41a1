//! Parent/child links and the parents-first ordering of the hierarchy array.

use crate::SceneError;
use crate::scene::Scene;
use crate::transform::HierarchyComponent;
use lumen_common::Entity;

impl Scene {
    /// Parent `entity` under `parent`.
    ///
    /// Unless `child_already_in_local_space`, the child's locals are
    /// rewritten relative to the parent so that its world pose does not
    /// change.
    pub fn component_attach(
        &mut self,
        entity: Entity,
        parent: Entity,
        child_already_in_local_space: bool,
    ) -> Result<(), SceneError> {
        if !entity.is_valid() || !parent.is_valid() {
            return Err(SceneError::InvalidEntity);
        }
        if entity == parent {
            return Err(SceneError::SelfParent(entity));
        }
        if self.is_descendant_of(parent, entity) {
            return Err(SceneError::Cycle { entity, parent });
        }

        self.component_detach(entity);

        let child_layer = self.layers.create(entity).layer_mask;
        self.layers.create(parent);
        self.hierarchy.insert(
            entity,
            HierarchyComponent {
                parent,
                layer_mask_bind: child_layer,
            },
        );
        // The new entry is last; pull it in front of any of its own children.
        if let Some(first_child) = self.hierarchy.components().iter().position(|h| h.parent == entity) {
            self.hierarchy.move_last_to(first_child);
            if !self.hierarchy_order_valid() {
                self.hierarchy_unsorted = true;
            }
        }

        let parent_is_root = !self.hierarchy.contains(parent);
        let parent_transform = {
            let t = self.transforms.create(parent);
            if parent_is_root {
                t.update_transform();
            }
            *t
        };
        let child = self.transforms.create(entity);
        if !child_already_in_local_space {
            child.update_transform();
            child.world = parent_transform.world.inverse() * child.world;
            child.apply_transform();
        }
        child.update_transform_parented(&parent_transform);

        tracing::trace!(%entity, %parent, "attached");
        Ok(())
    }

    /// Unparent `entity`, keeping its world pose. No-op if it has no parent.
    pub fn component_detach(&mut self, entity: Entity) {
        let Some(link) = self.hierarchy.get(entity).copied() else {
            return;
        };
        if let Some(transform) = self.transforms.get_mut(entity) {
            transform.apply_transform();
        }
        if let Some(layer) = self.layers.get_mut(entity) {
            layer.layer_mask = link.layer_mask_bind;
        }
        self.hierarchy.remove_keep_sorted(entity);
        tracing::trace!(%entity, parent = %link.parent, "detached");
    }

    /// Detach every direct child of `parent`.
    pub fn component_detach_children(&mut self, parent: Entity) {
        let children: Vec<Entity> = self
            .hierarchy
            .iter()
            .filter(|(_, h)| h.parent == parent)
            .map(|(e, _)| e)
            .collect();
        for child in children {
            self.component_detach(child);
        }
    }

    pub fn parent_of(&self, entity: Entity) -> Option<Entity> {
        self.hierarchy.get(entity).map(|h| h.parent)
    }

    /// Whether `ancestor` appears on the parent chain of `entity`.
    pub fn is_descendant_of(&self, entity: Entity, ancestor: Entity) -> bool {
        let mut current = entity;
        // A corrupt (cyclic) chain can never be longer than the array.
        for _ in 0..=self.hierarchy.len() {
            match self.parent_of(current) {
                Some(parent) if parent == ancestor => return true,
                Some(parent) => current = parent,
                None => return false,
            }
        }
        false
    }

    /// True when every parent that is itself a child precedes its children.
    pub fn hierarchy_order_valid(&self) -> bool {
        self.hierarchy
            .components()
            .iter()
            .enumerate()
            .all(|(i, h)| self.hierarchy.get_index(h.parent).is_none_or(|p| p < i))
    }

    /// Stable sort of the hierarchy array by depth, parents first.
    pub(crate) fn sort_hierarchy(&mut self) {
        let len = self.hierarchy.len();
        let mut entries: Vec<(usize, Entity, HierarchyComponent)> = self
            .hierarchy
            .iter()
            .map(|(entity, h)| {
                let mut depth = 0;
                let mut current = h.parent;
                while depth < len {
                    match self.hierarchy.get(current) {
                        Some(link) => {
                            depth += 1;
                            current = link.parent;
                        }
                        None => break,
                    }
                }
                (depth, entity, *h)
            })
            .collect();
        entries.sort_by_key(|(depth, _, _)| *depth);
        self.hierarchy.clear();
        for (_, entity, h) in entries {
            self.hierarchy.insert(entity, h);
        }
        self.hierarchy_unsorted = false;
        tracing::debug!(entries = len, "hierarchy re-sorted");
    }
}
