use crate::SceneError;
use crate::animation::{AnimationComponent, AnimationDataComponent};
use crate::camera::CameraComponent;
use crate::light::{LightComponent, LightType};
use crate::material::MaterialComponent;
use crate::mesh::MeshComponent;
use crate::object::{ArmatureComponent, ObjectComponent};
use crate::physics::RigidBodyPhysicsComponent;
use crate::transform::{
    HierarchyComponent, LayerComponent, NameComponent, PreviousFrameTransformComponent,
    TransformComponent,
};
use crate::update::UpdateStats;
use glam::Vec3;
use lumen_common::{Aabb, Entity};
use lumen_ecs::{ComponentManager, EntityMap};
use std::collections::HashSet;

/// Every component array of a scene, plus the derived state of the last
/// update.
///
/// Managers are public: systems read and write them directly. The
/// `aabb_objects` and `aabb_lights` arrays are kept parallel to `objects`
/// and `lights` (same entity at the same index).
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub names: ComponentManager<NameComponent>,
    pub layers: ComponentManager<LayerComponent>,
    pub transforms: ComponentManager<TransformComponent>,
    pub prev_transforms: ComponentManager<PreviousFrameTransformComponent>,
    pub hierarchy: ComponentManager<HierarchyComponent>,
    pub materials: ComponentManager<MaterialComponent>,
    pub meshes: ComponentManager<MeshComponent>,
    pub objects: ComponentManager<ObjectComponent>,
    pub aabb_objects: ComponentManager<Aabb>,
    pub rigidbodies: ComponentManager<RigidBodyPhysicsComponent>,
    pub armatures: ComponentManager<ArmatureComponent>,
    pub lights: ComponentManager<LightComponent>,
    pub aabb_lights: ComponentManager<Aabb>,
    pub cameras: ComponentManager<CameraComponent>,
    pub animations: ComponentManager<AnimationComponent>,
    pub animation_datas: ComponentManager<AnimationDataComponent>,

    pub(crate) bounds: Aabb,
    pub(crate) stats: UpdateStats,
    /// Set when the hierarchy array may no longer be parents-first.
    pub(crate) hierarchy_unsorted: bool,
}

/// Apply `$body` to every component manager of `$scene`.
macro_rules! for_each_manager {
    ($scene:expr, |$m:ident| $body:expr) => {{
        { let $m = &mut $scene.names; $body; }
        { let $m = &mut $scene.layers; $body; }
        { let $m = &mut $scene.transforms; $body; }
        { let $m = &mut $scene.prev_transforms; $body; }
        { let $m = &mut $scene.hierarchy; $body; }
        { let $m = &mut $scene.materials; $body; }
        { let $m = &mut $scene.meshes; $body; }
        { let $m = &mut $scene.objects; $body; }
        { let $m = &mut $scene.aabb_objects; $body; }
        { let $m = &mut $scene.rigidbodies; $body; }
        { let $m = &mut $scene.armatures; $body; }
        { let $m = &mut $scene.lights; $body; }
        { let $m = &mut $scene.aabb_lights; $body; }
        { let $m = &mut $scene.cameras; $body; }
        { let $m = &mut $scene.animations; $body; }
        { let $m = &mut $scene.animation_datas; $body; }
    }};
}

/// Like [`for_each_manager`], but over the matching managers of two scenes.
macro_rules! for_each_manager_pair {
    ($a:expr, $b:expr, |$x:ident, $y:ident| $body:expr) => {{
        { let ($x, $y) = (&mut $a.names, &mut $b.names); $body; }
        { let ($x, $y) = (&mut $a.layers, &mut $b.layers); $body; }
        { let ($x, $y) = (&mut $a.transforms, &mut $b.transforms); $body; }
        { let ($x, $y) = (&mut $a.prev_transforms, &mut $b.prev_transforms); $body; }
        { let ($x, $y) = (&mut $a.hierarchy, &mut $b.hierarchy); $body; }
        { let ($x, $y) = (&mut $a.materials, &mut $b.materials); $body; }
        { let ($x, $y) = (&mut $a.meshes, &mut $b.meshes); $body; }
        { let ($x, $y) = (&mut $a.objects, &mut $b.objects); $body; }
        { let ($x, $y) = (&mut $a.aabb_objects, &mut $b.aabb_objects); $body; }
        { let ($x, $y) = (&mut $a.rigidbodies, &mut $b.rigidbodies); $body; }
        { let ($x, $y) = (&mut $a.armatures, &mut $b.armatures); $body; }
        { let ($x, $y) = (&mut $a.lights, &mut $b.lights); $body; }
        { let ($x, $y) = (&mut $a.aabb_lights, &mut $b.aabb_lights); $body; }
        { let ($x, $y) = (&mut $a.cameras, &mut $b.cameras); $body; }
        { let ($x, $y) = (&mut $a.animations, &mut $b.animations); $body; }
        { let ($x, $y) = (&mut $a.animation_datas, &mut $b.animation_datas); $body; }
    }};
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union of object and local-light bounds from the last update.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Diagnostics of the last update.
    pub fn stats(&self) -> &UpdateStats {
        &self.stats
    }

    pub fn clear(&mut self) {
        for_each_manager!(self, |m| m.clear());
        self.bounds = Aabb::EMPTY;
        self.stats = UpdateStats::default();
        self.hierarchy_unsorted = false;
    }

    /// Move every component of `other` into this scene, leaving it empty.
    ///
    /// Entity handles are globally unique, so no remapping is needed for
    /// scenes built in the same process.
    pub fn merge(&mut self, other: &mut Scene) {
        let _span = tracing::debug_span!("scene_merge").entered();
        for_each_manager_pair!(self, other, |a, b| a.merge(b));
        self.bounds = Aabb::merge(&self.bounds, &other.bounds);
        other.bounds = Aabb::EMPTY;
        self.hierarchy_unsorted = true;
    }

    /// Remove every component `entity` owns. Children keep a dangling parent.
    pub fn entity_remove(&mut self, entity: Entity) {
        for_each_manager!(self, |m| m.remove(entity));
        self.hierarchy_unsorted = true;
    }

    /// Remove `entity` and, recursively, every entity parented under it.
    pub fn entity_remove_recursive(&mut self, entity: Entity) {
        let children: Vec<Entity> = self
            .hierarchy
            .iter()
            .filter(|(_, h)| h.parent == entity)
            .map(|(e, _)| e)
            .collect();
        for child in children {
            self.entity_remove_recursive(child);
        }
        self.entity_remove(entity);
    }

    /// First entity whose name equals `name`.
    pub fn find_by_name(&self, name: &str) -> Option<Entity> {
        self.names
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(e, _)| e)
    }

    /// Clone every component of `entity` onto a fresh entity.
    ///
    /// GPU buffers are not shared with the original.
    pub fn duplicate(&mut self, entity: Entity) -> Entity {
        let copy = Entity::create();
        for_each_manager!(self, |m| {
            if let Some(component) = m.get(entity).cloned() {
                m.insert(copy, component);
            }
        });
        copy
    }

    /// Translate every entity handle (keys and references) through `map`.
    pub fn remap(&mut self, map: &mut EntityMap) {
        for_each_manager!(self, |m| m.remap(map));
        self.hierarchy_unsorted = true;
    }

    /// Force the next update to recompute everything derived from
    /// persistent state. Used after deserialization.
    pub fn invalidate(&mut self) {
        for transform in self.transforms.components_mut() {
            transform.set_dirty(true);
        }
        for material in self.materials.components_mut() {
            material.set_dirty(true);
        }
        for camera in self.cameras.components_mut() {
            camera.set_dirty();
        }
        self.hierarchy_unsorted = true;
    }

    /// Number of distinct entities that own at least one component.
    pub fn entity_count(&self) -> usize {
        let arrays: [&[Entity]; 16] = [
            self.names.entities(),
            self.layers.entities(),
            self.transforms.entities(),
            self.prev_transforms.entities(),
            self.hierarchy.entities(),
            self.materials.entities(),
            self.meshes.entities(),
            self.objects.entities(),
            self.aabb_objects.entities(),
            self.rigidbodies.entities(),
            self.armatures.entities(),
            self.lights.entities(),
            self.aabb_lights.entities(),
            self.cameras.entities(),
            self.animations.entities(),
            self.animation_datas.entities(),
        ];
        arrays
            .iter()
            .flat_map(|entities| entities.iter().copied())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn entity_create_material(&mut self, name: &str) -> Entity {
        let entity = Entity::create();
        self.names.insert(entity, NameComponent::new(name));
        self.materials.create(entity);
        entity
    }

    pub fn entity_create_mesh(&mut self, name: &str) -> Entity {
        let entity = Entity::create();
        self.names.insert(entity, NameComponent::new(name));
        self.meshes.create(entity);
        entity
    }

    /// Renderable instance with a transform and bounds, but no mesh yet.
    pub fn entity_create_object(&mut self, name: &str) -> Entity {
        let entity = Entity::create();
        self.names.insert(entity, NameComponent::new(name));
        self.layers.create(entity);
        self.transforms.create(entity);
        self.prev_transforms.create(entity);
        self.aabb_objects.create(entity);
        self.objects.create(entity);
        entity
    }

    pub fn entity_create_light(
        &mut self,
        name: &str,
        position: Vec3,
        color: Vec3,
        energy: f32,
        range: f32,
    ) -> Entity {
        let entity = Entity::create();
        self.names.insert(entity, NameComponent::new(name));
        self.layers.create(entity);
        self.transforms
            .insert(entity, TransformComponent::from_translation(position));
        self.aabb_lights.create(entity);
        self.lights.insert(
            entity,
            LightComponent {
                light_type: LightType::Point,
                color,
                energy,
                range_local: range,
                ..Default::default()
            },
        );
        entity
    }

    pub fn entity_create_camera(
        &mut self,
        name: &str,
        width: f32,
        height: f32,
        near: f32,
        far: f32,
        fov: f32,
    ) -> Result<Entity, SceneError> {
        let mut camera = CameraComponent::default();
        camera.create_perspective(width, height, near, far, fov)?;
        let entity = Entity::create();
        self.names.insert(entity, NameComponent::new(name));
        self.transforms.create(entity);
        self.cameras.insert(entity, camera);
        Ok(entity)
    }
}
