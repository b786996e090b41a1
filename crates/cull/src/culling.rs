use crate::CullError;
use crate::grid::SpatialGrid;
use lumen_common::{Aabb, Entity, Frustum, Intersection};
use lumen_scene::{LightType, Scene};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CullingConfig {
    pub cell_size: f32,
    pub max_cells_per_object: usize,
    /// Brute-force every object when false.
    pub use_grid: bool,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            cell_size: 32.0,
            max_cells_per_object: 64,
            use_grid: true,
        }
    }
}

/// Visible instances sharing one mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderBatch {
    pub mesh: Entity,
    /// Object indices, ascending.
    pub objects: Vec<u32>,
}

impl RenderBatch {
    pub fn instance_count(&self) -> usize {
        self.objects.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CullStats {
    /// Objects eligible for the frustum test.
    pub tested: usize,
    pub visible: usize,
    pub culled: usize,
    /// Not renderable, mesh missing, outside the layer mask or without bounds.
    pub skipped: usize,
    pub lights_visible: usize,
    pub frame_time: Duration,
}

/// Result of one culling pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Visibility {
    pub layer_mask: u32,
    /// Object indices, ascending.
    pub visible_objects: Vec<u32>,
    /// Ascending mesh-entity order.
    pub batches: Vec<RenderBatch>,
    /// Light indices, ascending.
    pub visible_lights: Vec<u32>,
    pub stats: CullStats,
}

impl Visibility {
    pub fn is_object_visible(&self, index: u32) -> bool {
        self.visible_objects.binary_search(&index).is_ok()
    }

    pub fn is_light_visible(&self, index: u32) -> bool {
        self.visible_lights.binary_search(&index).is_ok()
    }

    pub fn clear(&mut self) {
        self.visible_objects.clear();
        self.batches.clear();
        self.visible_lights.clear();
        self.stats = CullStats::default();
    }
}

/// Frustum culling over a scene's object and light bounds.
///
/// Reads the bounds written by `Scene::update`; call it after the update.
#[derive(Debug, Clone)]
pub struct CullingSystem {
    config: CullingConfig,
    grid: SpatialGrid,
    eligible: Vec<bool>,
    candidates: Vec<u32>,
}

impl CullingSystem {
    pub fn new(config: CullingConfig) -> Result<Self, CullError> {
        let grid = SpatialGrid::new(config.cell_size, config.max_cells_per_object)?;
        Ok(Self {
            config,
            grid,
            eligible: Vec::new(),
            candidates: Vec::new(),
        })
    }

    pub fn config(&self) -> &CullingConfig {
        &self.config
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn cull(&mut self, scene: &Scene, frustum: &Frustum, layer_mask: u32) -> Visibility {
        let _span = tracing::info_span!("cull").entered();
        let start = Instant::now();
        let mut stats = CullStats::default();

        let aabbs = scene.aabb_objects.components();
        self.eligible.clear();
        self.eligible.reserve(scene.objects.len());
        for (index, (entity, object)) in scene.objects.iter().enumerate() {
            let eligible = is_drawable(scene, index, entity, object.mesh_id, object.is_renderable())
                && scene
                    .layers
                    .get(entity)
                    .map_or(u32::MAX, |l| l.layer_mask)
                    & layer_mask
                    != 0;
            self.eligible.push(eligible);
            if eligible {
                stats.tested += 1;
            } else {
                stats.skipped += 1;
            }
        }

        if self.config.use_grid {
            self.grid.refit(aabbs);
            self.grid.query(frustum, aabbs, &mut self.candidates);
        } else {
            self.candidates.clear();
            self.candidates.extend(
                aabbs
                    .iter()
                    .enumerate()
                    .filter(|(_, aabb)| frustum.check_box_fast(aabb))
                    .map(|(i, _)| i as u32),
            );
        }

        let visible_objects: Vec<u32> = self
            .candidates
            .iter()
            .copied()
            .filter(|&i| self.eligible.get(i as usize).copied().unwrap_or(false))
            .collect();
        stats.visible = visible_objects.len();
        stats.culled = stats.tested - stats.visible;

        let batches = batch_objects(scene, &visible_objects);

        let visible_lights: Vec<u32> = scene
            .lights
            .iter()
            .enumerate()
            .filter(|(index, (entity, light))| {
                let in_layer =
                    scene.layers.get(*entity).map_or(u32::MAX, |l| l.layer_mask) & layer_mask != 0;
                in_layer
                    && (light.light_type == LightType::Directional
                        || scene
                            .aabb_lights
                            .components()
                            .get(*index)
                            .is_some_and(|aabb| frustum.check_box_fast(aabb)))
            })
            .map(|(index, _)| index as u32)
            .collect();
        stats.lights_visible = visible_lights.len();
        stats.frame_time = start.elapsed();

        tracing::debug!(
            tested = stats.tested,
            visible = stats.visible,
            skipped = stats.skipped,
            lights = stats.lights_visible,
            "cull complete"
        );
        Visibility {
            layer_mask,
            visible_objects,
            batches,
            visible_lights,
            stats,
        }
    }
}

fn is_drawable(scene: &Scene, index: usize, entity: Entity, mesh_id: Entity, renderable: bool) -> bool {
    if !renderable {
        return false;
    }
    match scene.meshes.get(mesh_id) {
        Some(mesh) if mesh.is_renderable() => {}
        Some(_) => return false,
        None => {
            tracing::debug!(%entity, mesh = %mesh_id, "object skipped: mesh missing");
            return false;
        }
    }
    scene
        .aabb_objects
        .components()
        .get(index)
        .is_some_and(Aabb::is_valid)
}

/// Group object indices by mesh, ascending mesh entity then object index.
pub fn batch_objects(scene: &Scene, objects: &[u32]) -> Vec<RenderBatch> {
    let mut groups: BTreeMap<Entity, Vec<u32>> = BTreeMap::new();
    for &index in objects {
        let Some(object) = scene.objects.components().get(index as usize) else {
            continue;
        };
        groups.entry(object.mesh_id).or_default().push(index);
    }
    groups
        .into_iter()
        .map(|(mesh, mut objects)| {
            objects.sort_unstable();
            RenderBatch { mesh, objects }
        })
        .collect()
}

/// Shadow-casting objects a light can reach, as ascending object indices.
///
/// Directional lights reach every caster; other lights test against their
/// bounds. An out-of-range light index yields nothing.
pub fn shadow_casters(scene: &Scene, light_index: usize) -> Vec<u32> {
    let Some(light) = scene.lights.components().get(light_index) else {
        return Vec::new();
    };
    let directional = light.light_type == LightType::Directional;
    let light_bounds = scene
        .aabb_lights
        .components()
        .get(light_index)
        .copied()
        .unwrap_or_else(|| light.aabb());

    scene
        .objects
        .iter()
        .enumerate()
        .filter(|(index, (entity, object))| {
            object.is_cast_shadow()
                && is_drawable(scene, *index, *entity, object.mesh_id, object.is_renderable())
                && (directional
                    || scene.aabb_objects.components()[*index].intersects(&light_bounds)
                        != Intersection::Outside)
        })
        .map(|(index, _)| index as u32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use lumen_jobs::{JobSystem, JobSystemConfig};
    use lumen_scene::{CameraComponent, primitives};

    fn jobs() -> JobSystem {
        JobSystem::new(JobSystemConfig {
            thread_count: Some(2),
        })
        .unwrap()
    }

    fn camera_at(eye: Vec3) -> CameraComponent {
        let mut camera = CameraComponent::default();
        camera.eye = eye;
        camera
            .create_perspective(1280.0, 720.0, 0.1, 200.0, 60f32.to_radians())
            .unwrap();
        camera
    }

    fn object_with_mesh(scene: &mut Scene, name: &str, mesh: Entity, position: Vec3) -> Entity {
        let e = scene.entity_create_object(name);
        scene.objects.get_mut(e).unwrap().mesh_id = mesh;
        scene.transforms.get_mut(e).unwrap().translate(position);
        e
    }

    #[test]
    fn child_object_is_visible_and_distant_object_is_culled() {
        let jobs = jobs();
        let mut scene = Scene::new();
        let mesh = scene.entity_create_mesh("cube");
        *scene.meshes.get_mut(mesh).unwrap() = primitives::cube(0.5);

        let e1 = object_with_mesh(&mut scene, "e1", mesh, Vec3::new(0.0, 2.0, 0.0));
        let e2 = object_with_mesh(&mut scene, "e2", mesh, Vec3::new(0.0, 0.0, 3.0));
        let e3 = object_with_mesh(&mut scene, "e3", mesh, Vec3::new(100.0, 100.0, 100.0));
        scene.component_attach(e2, e1, true).unwrap();
        scene.update(1.0 / 60.0, &jobs).unwrap();

        let e2_world = scene.transforms.get(e2).unwrap().position();
        assert!(e2_world.abs_diff_eq(Vec3::new(0.0, 2.0, 3.0), 1e-5), "{e2_world}");

        let camera = camera_at(Vec3::new(0.0, 2.0, 10.0));
        let mut culling = CullingSystem::new(CullingConfig::default()).unwrap();
        let vis = culling.cull(&scene, &camera.frustum, u32::MAX);

        let index = |e| scene.objects.get_index(e).unwrap() as u32;
        assert!(vis.is_object_visible(index(e1)));
        assert!(vis.is_object_visible(index(e2)));
        assert!(!vis.is_object_visible(index(e3)));
        assert_eq!(vis.stats.visible, 2);
        assert_eq!(vis.stats.culled, 1);
        assert_eq!(vis.batches.len(), 1);
        assert_eq!(vis.batches[0].mesh, mesh);
        assert_eq!(vis.batches[0].objects, vis.visible_objects);
    }

    #[test]
    fn grid_and_brute_force_agree() {
        let jobs = jobs();
        let mut scene = Scene::new();
        let mesh = scene.entity_create_mesh("cube");
        *scene.meshes.get_mut(mesh).unwrap() = primitives::cube(0.5);
        for i in 0..200 {
            let p = Vec3::new((i % 20) as f32 * 4.0 - 40.0, 0.0, -((i / 20) as f32) * 12.0);
            object_with_mesh(&mut scene, "o", mesh, p);
        }
        scene.update(1.0 / 60.0, &jobs).unwrap();

        let camera = camera_at(Vec3::new(0.0, 1.0, 5.0));
        let mut grid = CullingSystem::new(CullingConfig::default()).unwrap();
        let mut brute = CullingSystem::new(CullingConfig {
            use_grid: false,
            ..CullingConfig::default()
        })
        .unwrap();
        let a = grid.cull(&scene, &camera.frustum, u32::MAX);
        let b = brute.cull(&scene, &camera.frustum, u32::MAX);
        assert!(a.stats.visible > 0);
        assert!(a.stats.culled > 0);
        // Everything the grid reports, brute force reports too; objects
        // fully in view are found by both.
        assert!(a.visible_objects.iter().all(|i| b.is_object_visible(*i)));
        for (i, aabb) in scene.aabb_objects.components().iter().enumerate() {
            if camera.frustum.check_box(aabb) == Intersection::Inside {
                assert!(a.is_object_visible(i as u32));
            }
            if camera.frustum.check_box(aabb) == Intersection::Outside {
                assert!(!a.is_object_visible(i as u32));
            }
        }
    }

    #[test]
    fn skipped_objects_are_counted() {
        let jobs = jobs();
        let mut scene = Scene::new();
        let mesh = scene.entity_create_mesh("cube");
        *scene.meshes.get_mut(mesh).unwrap() = primitives::cube(0.5);

        let no_mesh = scene.entity_create_object("no-mesh");
        let hidden = object_with_mesh(&mut scene, "hidden", mesh, Vec3::ZERO);
        scene.objects.get_mut(hidden).unwrap().flags = lumen_scene::ObjectFlags::empty();
        let other_layer = object_with_mesh(&mut scene, "layer", mesh, Vec3::ZERO);
        scene.layers.get_mut(other_layer).unwrap().layer_mask = 0b10;
        let shown = object_with_mesh(&mut scene, "shown", mesh, Vec3::ZERO);
        scene.update(1.0 / 60.0, &jobs).unwrap();

        let camera = camera_at(Vec3::new(0.0, 0.0, 10.0));
        let mut culling = CullingSystem::new(CullingConfig::default()).unwrap();
        let vis = culling.cull(&scene, &camera.frustum, 0b01);
        assert_eq!(vis.visible_objects, vec![scene.objects.get_index(shown).unwrap() as u32]);
        assert_eq!(vis.stats.skipped, 3);
        assert_eq!(vis.stats.tested, 1);
        assert!(scene.objects.contains(no_mesh));
    }

    #[test]
    fn batches_are_grouped_by_mesh_in_entity_order() {
        let jobs = jobs();
        let mut scene = Scene::new();
        let mesh_a = scene.entity_create_mesh("a");
        let mesh_b = scene.entity_create_mesh("b");
        *scene.meshes.get_mut(mesh_a).unwrap() = primitives::cube(0.5);
        *scene.meshes.get_mut(mesh_b).unwrap() = primitives::cube(0.25);
        object_with_mesh(&mut scene, "b0", mesh_b, Vec3::new(-1.0, 0.0, 0.0));
        object_with_mesh(&mut scene, "a0", mesh_a, Vec3::new(0.0, 0.0, 0.0));
        object_with_mesh(&mut scene, "b1", mesh_b, Vec3::new(1.0, 0.0, 0.0));
        scene.update(1.0 / 60.0, &jobs).unwrap();

        let camera = camera_at(Vec3::new(0.0, 0.0, 10.0));
        let mut culling = CullingSystem::new(CullingConfig::default()).unwrap();
        let vis = culling.cull(&scene, &camera.frustum, u32::MAX);
        assert_eq!(
            vis.batches,
            vec![
                RenderBatch { mesh: mesh_a, objects: vec![1] },
                RenderBatch { mesh: mesh_b, objects: vec![0, 2] },
            ]
        );
    }

    #[test]
    fn lights_are_culled_except_directional() {
        let jobs = jobs();
        let mut scene = Scene::new();
        scene.entity_create_light("near", Vec3::new(0.0, 0.0, -5.0), Vec3::ONE, 1.0, 2.0);
        scene.entity_create_light("far", Vec3::new(0.0, 0.0, 500.0), Vec3::ONE, 1.0, 2.0);
        let sun = scene.entity_create_light("sun", Vec3::new(0.0, 0.0, 500.0), Vec3::ONE, 1.0, 2.0);
        scene.lights.get_mut(sun).unwrap().light_type = LightType::Directional;
        scene.update(1.0 / 60.0, &jobs).unwrap();

        let camera = camera_at(Vec3::ZERO);
        let mut culling = CullingSystem::new(CullingConfig::default()).unwrap();
        let vis = culling.cull(&scene, &camera.frustum, u32::MAX);
        assert_eq!(vis.visible_lights, vec![0, 2]);
    }

    #[test]
    fn shadow_casters_respect_light_reach() {
        let jobs = jobs();
        let mut scene = Scene::new();
        let mesh = scene.entity_create_mesh("cube");
        *scene.meshes.get_mut(mesh).unwrap() = primitives::cube(0.5);
        let near = object_with_mesh(&mut scene, "near", mesh, Vec3::new(1.0, 0.0, 0.0));
        let far = object_with_mesh(&mut scene, "far", mesh, Vec3::new(50.0, 0.0, 0.0));
        let no_shadow = object_with_mesh(&mut scene, "no-shadow", mesh, Vec3::new(0.5, 0.0, 0.0));
        scene.objects.get_mut(no_shadow).unwrap().set_cast_shadow(false);
        scene.entity_create_light("point", Vec3::ZERO, Vec3::ONE, 1.0, 5.0);
        let sun = scene.entity_create_light("sun", Vec3::ZERO, Vec3::ONE, 1.0, 5.0);
        scene.lights.get_mut(sun).unwrap().light_type = LightType::Directional;
        scene.update(1.0 / 60.0, &jobs).unwrap();

        let idx = |e| scene.objects.get_index(e).unwrap() as u32;
        assert_eq!(shadow_casters(&scene, 0), vec![idx(near)]);
        assert_eq!(shadow_casters(&scene, 1), vec![idx(near), idx(far)]);
        assert!(shadow_casters(&scene, 7).is_empty());
    }

    #[test]
    fn fully_outside_never_visible_fully_inside_always_visible() {
        let jobs = jobs();
        let mut scene = Scene::new();
        let mesh = scene.entity_create_mesh("cube");
        *scene.meshes.get_mut(mesh).unwrap() = primitives::cube(0.5);
        let inside = object_with_mesh(&mut scene, "in", mesh, Vec3::new(0.0, 0.0, -10.0));
        let behind = object_with_mesh(&mut scene, "behind", mesh, Vec3::new(0.0, 0.0, 10.0));
        let beyond = object_with_mesh(&mut scene, "beyond", mesh, Vec3::new(0.0, 0.0, -1000.0));
        scene.update(1.0 / 60.0, &jobs).unwrap();

        let camera = camera_at(Vec3::ZERO);
        for use_grid in [true, false] {
            let mut culling = CullingSystem::new(CullingConfig {
                use_grid,
                ..CullingConfig::default()
            })
            .unwrap();
            let vis = culling.cull(&scene, &camera.frustum, u32::MAX);
            let idx = |e| scene.objects.get_index(e).unwrap() as u32;
            assert!(vis.is_object_visible(idx(inside)));
            assert!(!vis.is_object_visible(idx(behind)));
            assert!(!vis.is_object_visible(idx(beyond)));
        }
    }
}
