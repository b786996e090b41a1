//! Per-frame scene update.
//!
//! Systems run in a fixed order; each one only reads state produced by the
//! ones before it. Parallel passes borrow disjoint component arrays through
//! a job scope and are complete before the next system starts.

use crate::SceneError;
use crate::animation::{AnimationSample, apply_sample, sample_animation};
use crate::material::RenderType;
use crate::mesh::MeshComponent;
use crate::object::{ArmatureComponent, ObjectComponent};
use crate::physics::{NullPhysics, PhysicsEngine, PhysicsPose};
use crate::scene::Scene;
use crate::transform::TransformComponent;
use glam::Mat4;
use lumen_common::{Aabb, Entity};
use lumen_ecs::ComponentManager;
use lumen_jobs::JobSystem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

const TRANSFORM_GROUP_SIZE: usize = 256;
const OBJECT_GROUP_SIZE: usize = 64;

/// Counters from the most recent [`Scene::update`].
///
/// Missing component references are skipped and counted here rather than
/// treated as errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateStats {
    pub frame: u64,
    pub dt: f32,
    pub transforms: usize,
    pub hierarchy_links: usize,
    pub hierarchy_resorted: bool,
    pub dangling_parents: usize,
    pub animations_sampled: usize,
    pub missing_animation_targets: usize,
    pub physics_failures: usize,
    pub physics_writebacks: usize,
    pub missing_bones: usize,
    pub objects: usize,
    pub skipped_objects: usize,
    pub lights: usize,
    pub skipped_lights: usize,
    pub update_time: Duration,
}

impl Scene {
    /// Advance the scene by `dt` seconds without a physics backend.
    pub fn update(&mut self, dt: f32, jobs: &JobSystem) -> Result<(), SceneError> {
        self.update_with_physics(dt, jobs, &mut NullPhysics)
    }

    pub fn update_with_physics(
        &mut self,
        dt: f32,
        jobs: &JobSystem,
        physics: &mut dyn PhysicsEngine,
    ) -> Result<(), SceneError> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(SceneError::InvalidParameter(format!(
                "delta time must be finite and non-negative, got {dt}"
            )));
        }
        let _span = tracing::info_span!("scene_update", dt).entered();
        let started = Instant::now();
        let mut stats = UpdateStats {
            frame: self.stats.frame + 1,
            dt,
            ..Default::default()
        };

        self.update_previous_transforms();
        self.run_animations(dt, jobs, &mut stats)?;
        self.update_local_transforms(jobs, &mut stats)?;
        self.update_hierarchy(&mut stats);
        self.run_physics(dt, physics, &mut stats);
        self.update_armatures(&mut stats);
        self.update_meshes();
        self.update_materials();
        self.update_objects(jobs, &mut stats)?;
        self.update_cameras();
        self.update_lights(&mut stats);
        self.update_bounds();

        stats.update_time = started.elapsed();
        tracing::debug!(
            frame = stats.frame,
            objects = stats.objects,
            skipped = stats.skipped_objects,
            dangling = stats.dangling_parents,
            elapsed_us = stats.update_time.as_micros() as u64,
            "scene updated"
        );
        self.stats = stats;
        Ok(())
    }

    fn update_previous_transforms(&mut self) {
        for (entity, prev) in self.prev_transforms.iter_mut() {
            if let Some(transform) = self.transforms.get(entity) {
                prev.world_prev = transform.world;
            }
        }
    }

    /// Sample every playing animation in parallel, then blend the samples
    /// into their targets serially.
    fn run_animations(
        &mut self,
        dt: f32,
        jobs: &JobSystem,
        stats: &mut UpdateStats,
    ) -> Result<(), SceneError> {
        if self.animations.is_empty() {
            return Ok(());
        }
        let animations = &self.animations;
        let datas = &self.animation_datas;
        let mut samples: Vec<Vec<AnimationSample>> = vec![Vec::new(); animations.len()];
        let slots = samples.as_mut_slice();
        jobs.scope(|s| {
            s.for_each_mut(slots, 1, |args, out| {
                let animation = &animations[args.job_index as usize];
                if animation.is_playing() {
                    *out = sample_animation(animation, datas);
                }
                Ok(())
            })
        })?;

        for (animation, samples) in self.animations.components_mut().iter_mut().zip(samples) {
            if animation.is_playing() {
                stats.animations_sampled += 1;
            }
            for sample in samples {
                match self.transforms.get_mut(sample.target) {
                    Some(transform) => apply_sample(transform, sample.value, animation.amount),
                    None => {
                        stats.missing_animation_targets += 1;
                        tracing::debug!(target = %sample.target, "animation target has no transform");
                    }
                }
            }
            animation.advance(dt);
        }
        Ok(())
    }

    fn update_local_transforms(
        &mut self,
        jobs: &JobSystem,
        stats: &mut UpdateStats,
    ) -> Result<(), SceneError> {
        stats.transforms = self.transforms.len();
        let transforms = self.transforms.components_mut();
        jobs.scope(|s| {
            s.for_each_mut(transforms, TRANSFORM_GROUP_SIZE, |_, transform| {
                transform.update_transform();
                Ok(())
            })
        })?;
        Ok(())
    }

    /// Resolve parented world matrices and layers, parents first.
    pub(crate) fn update_hierarchy(&mut self, stats: &mut UpdateStats) {
        if self.hierarchy_unsorted || !self.hierarchy_order_valid() {
            self.sort_hierarchy();
            stats.hierarchy_resorted = true;
        }
        let mut dangling = 0;
        for i in 0..self.hierarchy.len() {
            let child = self.hierarchy.entity(i);
            let link = self.hierarchy[i];
            let Some(parent) = self.transforms.get(link.parent).copied() else {
                dangling += 1;
                tracing::debug!(%child, parent = %link.parent, "dangling parent");
                // Resolves as a root: world falls back to the local pose.
                if let Some(transform) = self.transforms.get_mut(child) {
                    transform.world = transform.local_matrix();
                }
                continue;
            };
            if let Some(transform) = self.transforms.get_mut(child) {
                transform.update_transform_parented(&parent);
            }
            let parent_layer = self.layers.get(link.parent).map(|l| l.layer_mask);
            if let (Some(mask), Some(layer)) = (parent_layer, self.layers.get_mut(child)) {
                layer.layer_mask = mask & link.layer_mask_bind;
            }
        }
        stats.hierarchy_links = self.hierarchy.len();
        stats.dangling_parents = dangling;
    }

    fn run_physics(&mut self, dt: f32, physics: &mut dyn PhysicsEngine, stats: &mut UpdateStats) {
        for (entity, body) in self.rigidbodies.iter() {
            if physics.is_registered(entity) {
                continue;
            }
            let Some(transform) = self.transforms.get(entity) else {
                continue;
            };
            let mesh = self
                .objects
                .get(entity)
                .and_then(|object| self.meshes.get(object.mesh_id));
            if let Err(err) = physics.register_object(entity, body, transform, mesh) {
                stats.physics_failures += 1;
                tracing::warn!(%entity, %err, "rigid body registration failed");
            }
        }
        for entity in physics.registered_entities() {
            if !self.rigidbodies.contains(entity) {
                physics.remove_object(entity);
            }
        }
        for (entity, body) in self.rigidbodies.iter() {
            if body.is_kinematic()
                && let Some(transform) = self.transforms.get(entity)
            {
                physics.set_kinematic_pose(entity, PhysicsPose::from_world(transform));
            }
        }

        physics.update(dt);

        let mut written = 0;
        for (entity, body) in self.rigidbodies.iter() {
            if body.is_kinematic() {
                continue;
            }
            if let (Some(pose), Some(transform)) = (physics.pose(entity), self.transforms.get_mut(entity)) {
                transform.translation_local = pose.translation;
                transform.rotation_local = pose.rotation;
                transform.set_dirty(true);
                transform.update_transform();
                written += 1;
            }
        }
        stats.physics_writebacks = written;
        if written > 0 {
            self.update_hierarchy(stats);
        }
    }

    fn update_armatures(&mut self, stats: &mut UpdateStats) {
        for armature in self.armatures.components_mut() {
            let matrices: Vec<Mat4> = armature
                .bone_collection
                .iter()
                .enumerate()
                .map(|(i, bone)| {
                    let inverse_bind = armature
                        .inverse_bind_matrices
                        .get(i)
                        .copied()
                        .unwrap_or(Mat4::IDENTITY);
                    match self.transforms.get(*bone) {
                        Some(transform) => armature.remap_matrix * transform.world * inverse_bind,
                        None => {
                            stats.missing_bones += 1;
                            Mat4::IDENTITY
                        }
                    }
                })
                .collect();
            armature.bone_matrices = matrices;
            armature.aabb = Aabb::EMPTY;
        }
        for mesh in self.meshes.components() {
            if !mesh.is_skinned() {
                continue;
            }
            if let Some(armature) = self.armatures.get_mut(mesh.armature_id) {
                let skinned = mesh.skinned_bounds(&armature.bone_matrices);
                armature.aabb = Aabb::merge(&armature.aabb, &skinned);
            }
        }
    }

    fn update_meshes(&mut self) {
        for mesh in self.meshes.components_mut() {
            if !mesh.aabb.is_valid() && !mesh.vertex_positions.is_empty() {
                mesh.compute_bounds();
            }
        }
    }

    fn update_materials(&mut self) {
        for material in self.materials.components_mut() {
            if material.is_dirty() {
                material.update_shader_data();
            }
        }
    }

    fn update_objects(&mut self, jobs: &JobSystem, stats: &mut UpdateStats) -> Result<(), SceneError> {
        sync_parallel(&self.objects, &mut self.aabb_objects);

        let objects = &self.objects;
        let transforms = &self.transforms;
        let meshes = &self.meshes;
        let armatures = &self.armatures;
        let skipped = AtomicUsize::new(0);
        let aabbs = self.aabb_objects.components_mut();
        jobs.scope(|s| {
            s.for_each_mut(aabbs, OBJECT_GROUP_SIZE, |args, aabb| {
                let index = args.job_index as usize;
                let entity = objects.entity(index);
                *aabb = match object_bounds(entity, &objects[index], transforms, meshes, armatures) {
                    Some(bounds) => bounds,
                    None => {
                        skipped.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(%entity, "object skipped: missing mesh or transform");
                        Aabb::EMPTY
                    }
                };
                Ok(())
            })
        })?;

        for (i, object) in self.objects.components_mut().iter_mut().enumerate() {
            let aabb = self.aabb_objects[i];
            object.center = if aabb.is_valid() { aabb.center() } else { glam::Vec3::ZERO };
            object.rendertype_mask = render_type_of(object, &self.meshes, &self.materials);
        }
        stats.objects = self.objects.len();
        stats.skipped_objects = skipped.into_inner();
        Ok(())
    }

    fn update_cameras(&mut self) {
        for (entity, camera) in self.cameras.iter_mut() {
            if let Some(transform) = self.transforms.get(entity) {
                camera.transform_camera(transform);
            }
            camera.update_camera();
        }
    }

    fn update_lights(&mut self, stats: &mut UpdateStats) {
        sync_parallel(&self.lights, &mut self.aabb_lights);
        for i in 0..self.lights.len() {
            let entity = self.lights.entity(i);
            let light = &mut self.lights[i];
            match self.transforms.get(entity) {
                Some(transform) => light.update_from_transform(transform),
                None => {
                    stats.skipped_lights += 1;
                    tracing::debug!(%entity, "light has no transform");
                }
            }
            self.aabb_lights[i] = light.aabb();
        }
        stats.lights = self.lights.len();
    }

    fn update_bounds(&mut self) {
        let objects = self.aabb_objects.components().iter().filter(|b| b.is_valid());
        let lights = self
            .aabb_lights
            .components()
            .iter()
            .filter(|b| b.is_valid() && !b.is_infinite());
        self.bounds = objects
            .chain(lights)
            .fold(Aabb::EMPTY, |acc, b| Aabb::merge(&acc, b));
    }
}

/// World bounds of one object, or `None` if a reference is missing.
fn object_bounds(
    entity: Entity,
    object: &ObjectComponent,
    transforms: &ComponentManager<TransformComponent>,
    meshes: &ComponentManager<MeshComponent>,
    armatures: &ComponentManager<ArmatureComponent>,
) -> Option<Aabb> {
    let mesh = meshes.get(object.mesh_id)?;
    let transform = transforms.get(entity)?;
    if mesh.is_skinned()
        && let Some(armature) = armatures.get(mesh.armature_id)
        && armature.aabb.is_valid()
    {
        // Skinned vertices are already in world space.
        return Some(armature.aabb);
    }
    if !mesh.aabb.is_valid() {
        return None;
    }
    Some(mesh.aabb.transform(&transform.world))
}

fn render_type_of(
    object: &ObjectComponent,
    meshes: &ComponentManager<MeshComponent>,
    materials: &ComponentManager<crate::material::MaterialComponent>,
) -> RenderType {
    let Some(mesh) = meshes.get(object.mesh_id) else {
        return RenderType::empty();
    };
    let mask = mesh.subsets.iter().fold(RenderType::empty(), |acc, subset| {
        acc | materials
            .get(subset.material_id)
            .map_or(RenderType::OPAQUE, |m| m.render_type())
    });
    if mask.is_empty() { RenderType::OPAQUE } else { mask }
}

/// Rebuild `aabbs` so that it holds exactly one box per owner, in the
/// owner's order.
fn sync_parallel<T>(owners: &ComponentManager<T>, aabbs: &mut ComponentManager<Aabb>) {
    if aabbs.entities() == owners.entities() {
        return;
    }
    tracing::debug!(owners = owners.len(), boxes = aabbs.len(), "re-syncing bounds array");
    let mut rebuilt = ComponentManager::with_capacity(owners.len());
    for &entity in owners.entities() {
        rebuilt.insert(entity, aabbs.get(entity).copied().unwrap_or(Aabb::EMPTY));
    }
    *aabbs = rebuilt;
}
