//! Ray picking against object triangles.

use crate::material::RenderType;
use crate::scene::Scene;
use glam::{Mat4, Vec3};
use lumen_common::{Entity, Ray};

/// Closest triangle hit found by [`Scene::pick`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickResult {
    pub entity: Entity,
    /// World-space hit point.
    pub position: Vec3,
    /// World-space face normal, facing the ray origin.
    pub normal: Vec3,
    /// World-space distance from the ray origin.
    pub distance: f32,
    pub subset_index: usize,
    /// Vertex indices of the hit triangle.
    pub triangle: [u32; 3],
}

impl Scene {
    /// Closest object triangle hit by `ray`.
    ///
    /// Objects are prefiltered by the bounds of the last update, then by
    /// `render_types` and `layer_mask`. Objects with a missing mesh are
    /// skipped. Skinned meshes are tested in their current pose.
    pub fn pick(&self, ray: &Ray, render_types: RenderType, layer_mask: u32) -> Option<PickResult> {
        let direction = ray.direction.normalize_or_zero();
        if direction == Vec3::ZERO {
            return None;
        }
        // Unit direction so box and triangle distances compare directly.
        let ray = Ray::new(ray.origin, direction);
        let mut best: Option<PickResult> = None;
        for (entity, object) in self.objects.iter() {
            let Some(near) = self.aabb_objects.get(entity).and_then(|b| ray.hit_distance(b)) else {
                continue;
            };
            if best.is_some_and(|b| near > b.distance) {
                continue;
            }
            if !object.rendertype_mask.intersects(render_types) {
                continue;
            }
            if self.layers.get(entity).is_some_and(|l| l.layer_mask & layer_mask == 0) {
                continue;
            }
            let Some(mesh) = self.meshes.get(object.mesh_id) else {
                continue;
            };
            let world = self.transforms.get(entity).map_or(Mat4::IDENTITY, |t| t.world);
            if world.determinant().abs() <= f32::EPSILON {
                continue;
            }
            let inverse = world.inverse();
            let origin_local = inverse.transform_point3(ray.origin);
            let direction_local = inverse.transform_vector3(direction).normalize_or_zero();
            let bones: &[Mat4] = if mesh.is_skinned() {
                self.armatures
                    .get(mesh.armature_id)
                    .map(|a| a.bone_matrices.as_slice())
                    .unwrap_or_default()
            } else {
                &[]
            };
            let vertex = |i: u32| {
                let i = i as usize;
                (i < mesh.vertex_positions.len()).then(|| mesh.skinned_position(i, bones))
            };

            for (subset_index, subset) in mesh.subsets.iter().enumerate() {
                let start = subset.index_offset as usize;
                let end = start + subset.index_count as usize;
                let Some(indices) = mesh.indices.get(start..end) else {
                    tracing::debug!(%entity, subset_index, "subset indices out of range");
                    continue;
                };
                for tri in indices.chunks_exact(3) {
                    let (Some(p0), Some(p1), Some(p2)) = (vertex(tri[0]), vertex(tri[1]), vertex(tri[2]))
                    else {
                        continue;
                    };
                    let Some(t) = ray_triangle(origin_local, direction_local, p0, p1, p2) else {
                        continue;
                    };
                    let position = world.transform_point3(origin_local + direction_local * t);
                    let distance = position.distance(ray.origin);
                    if best.is_some_and(|b| distance >= b.distance) {
                        continue;
                    }
                    let mut normal = world.transform_vector3((p1 - p0).cross(p2 - p0)).normalize_or_zero();
                    if normal.dot(direction) > 0.0 {
                        normal = -normal;
                    }
                    best = Some(PickResult {
                        entity,
                        position,
                        normal,
                        distance,
                        subset_index,
                        triangle: [tri[0], tri[1], tri[2]],
                    });
                }
            }
        }
        best
    }
}

/// Two-sided Möller-Trumbore test; distance along `direction` on a hit.
fn ray_triangle(origin: Vec3, direction: Vec3, p0: Vec3, p1: Vec3, p2: Vec3) -> Option<f32> {
    const EPSILON: f32 = 1e-7;
    let e1 = p1 - p0;
    let e2 = p2 - p0;
    let h = direction.cross(e2);
    let det = e1.dot(h);
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = origin - p0;
    let u = s.dot(h) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv_det;
    (t >= 0.0).then_some(t)
}
