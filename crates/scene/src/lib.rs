//! Scene: component arrays, transform hierarchy and the per-frame update.
//!
//! A [`Scene`] owns one [`ComponentManager`](lumen_ecs::ComponentManager)
//! per component type. [`Scene::update`] runs the systems in a fixed order
//! (animation, transforms, hierarchy, physics, skinning, bounds, cameras,
//! lights), fanning the wide passes out over a [`JobSystem`](lumen_jobs::JobSystem).
//!
//! # Invariants
//! - After `update`, every child's world matrix equals its parent's world
//!   matrix times its local matrix.
//! - The hierarchy array is parents-first whenever the hierarchy pass runs.
//! - `aabb_objects` and `aabb_lights` are index-parallel to `objects` and
//!   `lights` after `update`.
//! - Missing component references are skipped and counted in
//!   [`UpdateStats`], never a panic.

mod animation;
mod camera;
mod hierarchy;
mod light;
mod material;
mod mesh;
mod object;
mod physics;
mod pick;
pub mod primitives;
mod scene;
mod transform;
mod update;

pub use animation::{
    AnimationChannel, AnimationComponent, AnimationDataComponent, AnimationFlags, AnimationPath,
    AnimationSample, AnimationSampler, ChannelValue, SamplerMode, apply_sample, sample_animation,
    sample_channel,
};
pub use camera::{CameraComponent, CameraFlags};
pub use light::{LightComponent, LightFlags, LightType};
pub use material::{
    AlphaMode, MaterialComponent, MaterialFlags, MaterialTextures, RenderType, ShaderMaterial,
};
pub use mesh::{
    MeshBuffers, MeshComponent, MeshFlags, MeshSubset, RenderData, VertexBoneData,
    VertexPositionNormal,
};
pub use object::{ArmatureComponent, ObjectComponent, ObjectFlags};
pub use physics::{
    CollisionShape, NullPhysics, PhysicsEngine, PhysicsError, PhysicsPose, RigidBodyFlags,
    RigidBodyPhysicsComponent,
};
pub use pick::PickResult;
pub use scene::Scene;
pub use transform::{
    HierarchyComponent, LayerComponent, NameComponent, PreviousFrameTransformComponent,
    TransformComponent, TransformFlags,
};
pub use update::UpdateStats;

use lumen_common::Entity;

/// Errors from scene operations.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("invalid entity handle")]
    InvalidEntity,
    #[error("entity {0} cannot be its own parent")]
    SelfParent(Entity),
    #[error("attaching {entity} to {parent} would create a cycle")]
    Cycle { entity: Entity, parent: Entity },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("update job failed: {0}")]
    Jobs(#[from] lumen_jobs::WaitError),
    #[error(transparent)]
    Ecs(#[from] lumen_ecs::EcsError),
    #[error(transparent)]
    Graphics(#[from] lumen_graphics::GraphicsError),
    #[error(transparent)]
    Physics(#[from] PhysicsError),
}

pub fn crate_info() -> &'static str {
    "lumen-scene v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3, Vec4};
    use lumen_jobs::{JobSystem, JobSystemConfig};
    use std::collections::HashMap;
    use std::f32::consts::FRAC_PI_3;

    fn jobs() -> JobSystem {
        JobSystem::new(JobSystemConfig {
            thread_count: Some(2),
        })
        .unwrap()
    }

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("scene"));
    }

    #[test]
    fn child_follows_parent_chain() {
        let jobs = jobs();
        let mut scene = Scene::new();
        let root = scene.entity_create_object("root");
        let mid = scene.entity_create_object("mid");
        let leaf = scene.entity_create_object("leaf");
        scene.transforms.get_mut(root).unwrap().translate(Vec3::new(0.0, 2.0, 0.0));
        scene.transforms.get_mut(mid).unwrap().translate(Vec3::new(0.0, 0.0, 3.0));
        scene.transforms.get_mut(leaf).unwrap().translate(Vec3::new(1.0, 0.0, 0.0));
        scene.component_attach(leaf, mid, true).unwrap();
        scene.component_attach(mid, root, true).unwrap();
        scene.update(1.0 / 60.0, &jobs).unwrap();

        let leaf_world = scene.transforms.get(leaf).unwrap().position();
        assert!(leaf_world.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-5), "{leaf_world}");

        // Moving the root moves the whole chain on the next update.
        scene.transforms.get_mut(root).unwrap().rotate(Quat::from_rotation_y(std::f32::consts::PI));
        scene.update(1.0 / 60.0, &jobs).unwrap();
        let leaf_world = scene.transforms.get(leaf).unwrap().position();
        assert!(leaf_world.abs_diff_eq(Vec3::new(-1.0, 2.0, -3.0), 1e-4), "{leaf_world}");
        assert_eq!(scene.stats().hierarchy_links, 2);
    }

    #[test]
    fn dangling_parent_is_counted_not_fatal() {
        let jobs = jobs();
        let mut scene = Scene::new();
        let parent = scene.entity_create_object("parent");
        let child = scene.entity_create_object("child");
        scene.transforms.get_mut(parent).unwrap().translate(Vec3::new(0.0, 2.0, 0.0));
        scene.transforms.get_mut(child).unwrap().translate(Vec3::new(0.0, 0.0, 3.0));
        scene.component_attach(child, parent, true).unwrap();
        scene.update(0.0, &jobs).unwrap();
        let world = scene.transforms.get(child).unwrap().position();
        assert!(world.abs_diff_eq(Vec3::new(0.0, 2.0, 3.0), 1e-5), "{world}");

        scene.entity_remove(parent);
        scene.update(0.0, &jobs).unwrap();
        assert_eq!(scene.stats().dangling_parents, 1);
        // The child now resolves as a root at its local pose.
        let world = scene.transforms.get(child).unwrap().position();
        assert!(world.abs_diff_eq(Vec3::new(0.0, 0.0, 3.0), 1e-5), "{world}");
    }

    #[test]
    fn object_bounds_follow_mesh_and_transform() {
        let jobs = jobs();
        let mut scene = Scene::new();
        let mesh = scene.entity_create_mesh("cube");
        *scene.meshes.get_mut(mesh).unwrap() = primitives::cube(1.0);
        let object = scene.entity_create_object("box");
        scene.objects.get_mut(object).unwrap().mesh_id = mesh;
        scene.transforms.get_mut(object).unwrap().translate(Vec3::new(10.0, 0.0, 0.0));
        let orphan = scene.entity_create_object("no mesh");

        scene.update(1.0 / 60.0, &jobs).unwrap();
        let aabb = *scene.aabb_objects.get(object).unwrap();
        assert_eq!(aabb.min, Vec3::new(9.0, -1.0, -1.0));
        assert_eq!(aabb.max, Vec3::new(11.0, 1.0, 1.0));
        assert!(!scene.aabb_objects.get(orphan).unwrap().is_valid());
        assert_eq!(scene.stats().skipped_objects, 1);
        assert_eq!(scene.bounds(), aabb);
        assert_eq!(
            scene.objects.get(object).unwrap().rendertype_mask,
            RenderType::OPAQUE
        );
    }

    #[test]
    fn transparent_material_marks_object() {
        let jobs = JobSystem::inline();
        let mut scene = Scene::new();
        let material = scene.entity_create_material("glass");
        scene
            .materials
            .get_mut(material)
            .unwrap()
            .set_base_color(Vec4::new(1.0, 1.0, 1.0, 0.3));
        let mesh = scene.entity_create_mesh("cube");
        let mut cube = primitives::cube(0.5);
        cube.subsets[0].material_id = material;
        *scene.meshes.get_mut(mesh).unwrap() = cube;
        let object = scene.entity_create_object("window");
        scene.objects.get_mut(object).unwrap().mesh_id = mesh;

        scene.update(0.0, &jobs).unwrap();
        assert_eq!(
            scene.objects.get(object).unwrap().rendertype_mask,
            RenderType::TRANSPARENT
        );
        assert!(!scene.materials.get(material).unwrap().is_dirty());
    }

    #[test]
    fn animation_drives_target_transform() {
        let jobs = jobs();
        let mut scene = Scene::new();
        let target = scene.entity_create_object("mover");
        let data = Entity::create();
        scene.animation_datas.insert(
            data,
            AnimationDataComponent {
                keyframe_times: vec![0.0, 1.0],
                keyframe_data: vec![0.0, 0.0, 0.0, 10.0, 0.0, 0.0],
            },
        );
        let clip = Entity::create();
        let mut animation = AnimationComponent {
            channels: vec![AnimationChannel {
                target,
                sampler_index: 0,
                path: AnimationPath::Translation,
            }],
            samplers: vec![AnimationSampler {
                data,
                mode: SamplerMode::Linear,
            }],
            ..Default::default()
        };
        animation.update_range(&scene.animation_datas);
        animation.play();
        animation.timer = 0.5;
        scene.animations.insert(clip, animation);

        scene.update(0.25, &jobs).unwrap();
        let p = scene.transforms.get(target).unwrap().position();
        assert!(p.abs_diff_eq(Vec3::new(5.0, 0.0, 0.0), 1e-5), "{p}");
        assert_eq!(scene.animations.get(clip).unwrap().timer, 0.75);
        assert_eq!(scene.stats().animations_sampled, 1);
    }

    #[test]
    fn lights_get_bounds_and_directional_is_excluded_from_scene_bounds() {
        let jobs = jobs();
        let mut scene = Scene::new();
        let point = scene.entity_create_light("bulb", Vec3::new(0.0, 5.0, 0.0), Vec3::ONE, 1.0, 2.0);
        let sun = scene.entity_create_light("sun", Vec3::ZERO, Vec3::ONE, 3.0, 1.0);
        scene.lights.get_mut(sun).unwrap().light_type = LightType::Directional;

        scene.update(0.0, &jobs).unwrap();
        assert_eq!(
            *scene.aabb_lights.get(point).unwrap(),
            lumen_common::Aabb::new(Vec3::new(-2.0, 3.0, -2.0), Vec3::new(2.0, 7.0, 2.0))
        );
        assert!(scene.aabb_lights.get(sun).unwrap().is_infinite());
        assert_eq!(scene.bounds(), *scene.aabb_lights.get(point).unwrap());
    }

    #[test]
    fn camera_follows_its_transform() {
        let jobs = JobSystem::inline();
        let mut scene = Scene::new();
        let cam = scene
            .entity_create_camera("main", 1280.0, 720.0, 0.1, 100.0, FRAC_PI_3)
            .unwrap();
        scene.transforms.get_mut(cam).unwrap().translate(Vec3::new(0.0, 1.0, 5.0));
        scene.update(0.0, &jobs).unwrap();
        let camera = scene.cameras.get(cam).unwrap();
        assert!(camera.eye.abs_diff_eq(Vec3::new(0.0, 1.0, 5.0), 1e-6));
        assert!(camera.frustum.check_point(Vec3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn previous_transform_lags_one_frame() {
        let jobs = JobSystem::inline();
        let mut scene = Scene::new();
        let e = scene.entity_create_object("e");
        scene.update(0.0, &jobs).unwrap();
        scene.transforms.get_mut(e).unwrap().translate(Vec3::X);
        scene.update(0.0, &jobs).unwrap();
        let prev = scene.prev_transforms.get(e).unwrap().world_prev;
        assert_eq!(prev.w_axis.truncate(), Vec3::ZERO);
        scene.update(0.0, &jobs).unwrap();
        let prev = scene.prev_transforms.get(e).unwrap().world_prev;
        assert_eq!(prev.w_axis.truncate(), Vec3::X);
    }

    #[test]
    fn negative_dt_is_rejected() {
        let mut scene = Scene::new();
        let err = scene.update(-1.0, &JobSystem::inline()).unwrap_err();
        assert!(matches!(err, SceneError::InvalidParameter(_)));
    }

    /// Falls at constant speed along -Y.
    #[derive(Default)]
    struct FallingBodies {
        bodies: HashMap<Entity, PhysicsPose>,
        kinematic_updates: usize,
    }

    impl PhysicsEngine for FallingBodies {
        fn register_object(
            &mut self,
            entity: Entity,
            _body: &RigidBodyPhysicsComponent,
            transform: &TransformComponent,
            _mesh: Option<&MeshComponent>,
        ) -> Result<(), PhysicsError> {
            self.bodies.insert(entity, PhysicsPose::from_world(transform));
            Ok(())
        }

        fn remove_object(&mut self, entity: Entity) {
            self.bodies.remove(&entity);
        }

        fn is_registered(&self, entity: Entity) -> bool {
            self.bodies.contains_key(&entity)
        }

        fn registered_entities(&self) -> Vec<Entity> {
            self.bodies.keys().copied().collect()
        }

        fn set_kinematic_pose(&mut self, entity: Entity, pose: PhysicsPose) {
            self.kinematic_updates += 1;
            self.bodies.insert(entity, pose);
        }

        fn update(&mut self, dt: f32) {
            for pose in self.bodies.values_mut() {
                pose.translation.y -= dt;
            }
        }

        fn pose(&self, entity: Entity) -> Option<PhysicsPose> {
            self.bodies.get(&entity).copied()
        }
    }

    #[test]
    fn physics_writes_back_and_moves_children() {
        let jobs = jobs();
        let mut scene = Scene::new();
        let body = scene.entity_create_object("body");
        scene.transforms.get_mut(body).unwrap().translate(Vec3::new(0.0, 10.0, 0.0));
        scene.rigidbodies.create(body);
        let rider = scene.entity_create_object("rider");
        scene.transforms.get_mut(rider).unwrap().translate(Vec3::new(0.0, 1.0, 0.0));
        scene.component_attach(rider, body, true).unwrap();
        let platform = scene.entity_create_object("platform");
        scene.rigidbodies.create(platform).set_kinematic(true);

        let mut physics = FallingBodies::default();
        scene.update_with_physics(1.0, &jobs, &mut physics).unwrap();
        let body_world = scene.transforms.get(body).unwrap().position();
        assert!(body_world.abs_diff_eq(Vec3::new(0.0, 9.0, 0.0), 1e-5));
        let rider_world = scene.transforms.get(rider).unwrap().position();
        assert!(rider_world.abs_diff_eq(Vec3::new(0.0, 10.0, 0.0), 1e-5));
        assert_eq!(scene.stats().physics_writebacks, 1);
        assert_eq!(physics.kinematic_updates, 1);

        scene.rigidbodies.remove(body);
        scene.update_with_physics(1.0, &jobs, &mut physics).unwrap();
        assert!(!physics.is_registered(body));
    }

    #[test]
    fn skinned_object_uses_armature_bounds() {
        let jobs = JobSystem::inline();
        let mut scene = Scene::new();
        let bone = scene.entity_create_object("bone");
        scene.transforms.get_mut(bone).unwrap().translate(Vec3::new(0.0, 0.0, 20.0));
        let armature = Entity::create();
        scene.armatures.insert(
            armature,
            ArmatureComponent {
                bone_collection: vec![bone],
                inverse_bind_matrices: vec![glam::Mat4::IDENTITY],
                ..Default::default()
            },
        );
        let mesh = scene.entity_create_mesh("skin");
        let mut cube = primitives::cube(1.0);
        cube.armature_id = armature;
        cube.vertex_boneindices = vec![[0, 0, 0, 0]; cube.vertex_count()];
        cube.vertex_boneweights = vec![Vec4::new(1.0, 0.0, 0.0, 0.0); cube.vertex_count()];
        *scene.meshes.get_mut(mesh).unwrap() = cube;
        let object = scene.entity_create_object("skinned");
        scene.objects.get_mut(object).unwrap().mesh_id = mesh;

        scene.update(0.0, &jobs).unwrap();
        let aabb = scene.aabb_objects.get(object).unwrap();
        assert!(aabb.center().abs_diff_eq(Vec3::new(0.0, 0.0, 20.0), 1e-5));
        assert_eq!(scene.armatures.get(armature).unwrap().bone_matrices.len(), 1);
    }
}
