use crate::mesh::{MeshComponent, MeshSubset};
use glam::{Vec2, Vec3};
use lumen_common::Entity;

/// Axis-aligned cube centred on the origin with flat-shaded faces.
///
/// Four vertices per face so that normals and UVs stay per-face; one subset
/// with no material covers all 36 indices.
pub fn cube(half_extent: f32) -> MeshComponent {
    let faces = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];
    let mut mesh = MeshComponent::default();
    for (normal, right, up) in faces {
        let base = mesh.vertex_positions.len() as u32;
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        for (u, v) in corners {
            let p = (normal + right * u + up * v) * half_extent;
            mesh.vertex_positions.push(p);
            mesh.vertex_normals.push(normal);
            mesh.vertex_uvs.push(Vec2::new((u + 1.0) * 0.5, 1.0 - (v + 1.0) * 0.5));
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh.subsets.push(MeshSubset {
        material_id: Entity::INVALID,
        index_offset: 0,
        index_count: mesh.indices.len() as u32,
    });
    mesh.compute_bounds();
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_common::Aabb;

    #[test]
    fn cube_layout() {
        let mesh = cube(0.5);
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.indices.len(), 36);
        assert_eq!(mesh.subsets[0].index_count, 36);
        assert_eq!(mesh.aabb, Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)));
    }

    #[test]
    fn faces_wind_counter_clockwise_outward() {
        let mut mesh = cube(1.0);
        let authored = mesh.vertex_normals.clone();
        mesh.compute_normals(false);
        for (a, b) in authored.iter().zip(&mesh.vertex_normals) {
            assert!(a.abs_diff_eq(*b, 1e-5), "{a} vs {b}");
        }
    }
}
