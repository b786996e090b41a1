use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};
use lumen_common::{Aabb, Entity};
use lumen_ecs::{EntityMap, RemapEntities};
use lumen_graphics::{
    BindFlags, GpuBuffer, GpuBufferDesc, GraphicsDevice, GraphicsError, IndexFormat,
    ResourceMiscFlags,
};
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MeshFlags: u32 {
        const RENDERABLE = 1 << 0;
        const DOUBLE_SIDED = 1 << 1;
        const DYNAMIC = 1 << 2;
    }
}

/// Range of indices drawn with one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MeshSubset {
    pub material_id: Entity,
    pub index_offset: u32,
    pub index_count: u32,
}

/// Interleaved position + normal vertex as uploaded to the GPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct VertexPositionNormal {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// Per-vertex skinning influences.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct VertexBoneData {
    pub indices: [u32; 4],
    pub weights: [f32; 4],
}

/// GPU buffers created from a mesh's CPU streams.
#[derive(Debug)]
pub struct MeshBuffers {
    pub index_buffer: GpuBuffer,
    pub index_format: IndexFormat,
    pub position_normal: GpuBuffer,
    pub uvs: Option<GpuBuffer>,
    pub colors: Option<GpuBuffer>,
    pub bone_data: Option<GpuBuffer>,
}

/// Slot for GPU-side data owned by exactly one component.
///
/// Cloning produces an empty slot, so duplicated components create their
/// own buffers instead of aliasing the original's.
#[derive(Debug)]
pub struct RenderData<T>(Option<T>);

impl<T> Default for RenderData<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> Clone for RenderData<T> {
    fn clone(&self) -> Self {
        Self(None)
    }
}

impl<T> RenderData<T> {
    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn set(&mut self, value: T) {
        self.0 = Some(value);
    }

    pub fn take(&mut self) -> Option<T> {
        self.0.take()
    }

    pub fn is_some(&self) -> bool {
        self.0.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshComponent {
    pub flags: MeshFlags,
    pub vertex_positions: Vec<Vec3>,
    pub vertex_normals: Vec<Vec3>,
    pub vertex_uvs: Vec<Vec2>,
    pub vertex_boneindices: Vec<[u32; 4]>,
    pub vertex_boneweights: Vec<Vec4>,
    /// Packed RGBA8.
    pub vertex_colors: Vec<u32>,
    pub indices: Vec<u32>,
    pub subsets: Vec<MeshSubset>,
    pub armature_id: Entity,
    pub aabb: Aabb,

    #[serde(skip)]
    pub buffers: RenderData<MeshBuffers>,
}

impl Default for MeshComponent {
    fn default() -> Self {
        Self {
            flags: MeshFlags::RENDERABLE,
            vertex_positions: Vec::new(),
            vertex_normals: Vec::new(),
            vertex_uvs: Vec::new(),
            vertex_boneindices: Vec::new(),
            vertex_boneweights: Vec::new(),
            vertex_colors: Vec::new(),
            indices: Vec::new(),
            subsets: Vec::new(),
            armature_id: Entity::INVALID,
            aabb: Aabb::EMPTY,
            buffers: RenderData::default(),
        }
    }
}

impl MeshComponent {
    pub fn is_renderable(&self) -> bool {
        self.flags.contains(MeshFlags::RENDERABLE)
    }

    pub fn is_double_sided(&self) -> bool {
        self.flags.contains(MeshFlags::DOUBLE_SIDED)
    }

    pub fn is_skinned(&self) -> bool {
        self.armature_id.is_valid()
            && !self.vertex_boneindices.is_empty()
            && self.vertex_boneindices.len() == self.vertex_boneweights.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn compute_bounds(&mut self) {
        self.aabb = Aabb::from_points(self.vertex_positions.iter().copied());
    }

    /// Recompute vertex normals from triangle faces.
    ///
    /// With `smooth`, face normals are accumulated (area weighted) into
    /// every shared vertex. Otherwise each vertex takes the normal of the
    /// last face that references it.
    pub fn compute_normals(&mut self, smooth: bool) {
        let mut normals = vec![Vec3::ZERO; self.vertex_positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let (Some(&pa), Some(&pb), Some(&pc)) = (
                self.vertex_positions.get(a),
                self.vertex_positions.get(b),
                self.vertex_positions.get(c),
            ) else {
                continue;
            };
            let face = (pb - pa).cross(pc - pa);
            for i in [a, b, c] {
                if smooth {
                    normals[i] += face;
                } else {
                    normals[i] = face;
                }
            }
        }
        self.vertex_normals = normals.into_iter().map(|n| n.normalize_or_zero()).collect();
    }

    /// Reverse triangle winding.
    pub fn flip_culling(&mut self) {
        for tri in self.indices.chunks_exact_mut(3) {
            tri.swap(1, 2);
        }
    }

    pub fn index_format(&self) -> IndexFormat {
        if self.vertex_positions.len() <= usize::from(u16::MAX) + 1 {
            IndexFormat::U16
        } else {
            IndexFormat::U32
        }
    }

    /// Bounds of the vertices after skinning with `bone_matrices`.
    pub fn skinned_bounds(&self, bone_matrices: &[Mat4]) -> Aabb {
        if !self.is_skinned() || bone_matrices.is_empty() {
            return self.aabb;
        }
        Aabb::from_points(
            (0..self.vertex_positions.len()).map(|i| self.skinned_position(i, bone_matrices)),
        )
    }

    /// Position of vertex `index` after skinning. Unskinned meshes and
    /// vertices without weights keep their bind position.
    pub fn skinned_position(&self, index: usize, bone_matrices: &[Mat4]) -> Vec3 {
        let p = self.vertex_positions[index];
        let (Some(indices), Some(weights)) = (
            self.vertex_boneindices.get(index),
            self.vertex_boneweights.get(index),
        ) else {
            return p;
        };
        let mut out = Vec3::ZERO;
        let mut total = 0.0;
        for (k, &bone) in indices.iter().enumerate() {
            let w = weights[k];
            if w <= 0.0 {
                continue;
            }
            if let Some(m) = bone_matrices.get(bone as usize) {
                out += m.transform_point3(p) * w;
                total += w;
            }
        }
        if total > 0.0 { out / total } else { p }
    }

    /// Upload the CPU streams into freshly created GPU buffers.
    pub fn create_render_data(&mut self, device: &dyn GraphicsDevice) -> Result<(), GraphicsError> {
        if self.vertex_positions.is_empty() || self.indices.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "mesh has no vertices or indices".into(),
            ));
        }
        if self.vertex_normals.len() != self.vertex_positions.len() {
            self.compute_normals(true);
        }

        let index_format = self.index_format();
        let index_bytes: Vec<u8> = match index_format {
            IndexFormat::U16 => {
                let narrow: Vec<u16> = self.indices.iter().map(|&i| i as u16).collect();
                bytemuck::cast_slice(&narrow).to_vec()
            }
            IndexFormat::U32 => bytemuck::cast_slice(&self.indices).to_vec(),
        };
        let index_buffer = create_stream(device, &index_bytes, BindFlags::INDEX_BUFFER, 0)?;

        let vertices: Vec<VertexPositionNormal> = self
            .vertex_positions
            .iter()
            .zip(&self.vertex_normals)
            .map(|(p, n)| VertexPositionNormal {
                position: p.to_array(),
                normal: n.to_array(),
            })
            .collect();
        let position_normal = create_stream(
            device,
            bytemuck::cast_slice(&vertices),
            BindFlags::VERTEX_BUFFER | BindFlags::SHADER_RESOURCE,
            std::mem::size_of::<VertexPositionNormal>() as u32,
        )?;

        let uvs = if self.vertex_uvs.is_empty() {
            None
        } else {
            let data: Vec<[f32; 2]> = self.vertex_uvs.iter().map(|uv| uv.to_array()).collect();
            Some(create_stream(device, bytemuck::cast_slice(&data), BindFlags::VERTEX_BUFFER, 8)?)
        };
        let colors = if self.vertex_colors.is_empty() {
            None
        } else {
            Some(create_stream(
                device,
                bytemuck::cast_slice(&self.vertex_colors),
                BindFlags::VERTEX_BUFFER,
                4,
            )?)
        };
        let bone_data = if self.is_skinned() {
            let data: Vec<VertexBoneData> = self
                .vertex_boneindices
                .iter()
                .zip(&self.vertex_boneweights)
                .map(|(i, w)| VertexBoneData {
                    indices: *i,
                    weights: w.to_array(),
                })
                .collect();
            Some(create_stream(
                device,
                bytemuck::cast_slice(&data),
                BindFlags::SHADER_RESOURCE,
                std::mem::size_of::<VertexBoneData>() as u32,
            )?)
        } else {
            None
        };

        tracing::debug!(
            vertices = self.vertex_positions.len(),
            indices = self.indices.len(),
            ?index_format,
            "mesh render data created"
        );
        self.buffers.set(MeshBuffers {
            index_buffer,
            index_format,
            position_normal,
            uvs,
            colors,
            bone_data,
        });
        Ok(())
    }
}

fn create_stream(
    device: &dyn GraphicsDevice,
    data: &[u8],
    bind_flags: BindFlags,
    stride: u32,
) -> Result<GpuBuffer, GraphicsError> {
    let misc_flags = if stride > 0 && bind_flags.contains(BindFlags::SHADER_RESOURCE) {
        ResourceMiscFlags::BUFFER_STRUCTURED
    } else {
        ResourceMiscFlags::empty()
    };
    let desc = GpuBufferDesc {
        size: data.len() as u64,
        bind_flags,
        misc_flags,
        stride,
        ..Default::default()
    };
    device.create_buffer(&desc, Some(data))
}

impl RemapEntities for MeshComponent {
    fn remap_entities(&mut self, map: &mut EntityMap) {
        self.armature_id = map.get_or_create(self.armature_id);
        for subset in &mut self.subsets {
            subset.material_id = map.get_or_create(subset.material_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives;
    use lumen_graphics::{HeadlessConfig, HeadlessDevice};

    fn triangle() -> MeshComponent {
        MeshComponent {
            vertex_positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            indices: vec![0, 1, 2],
            ..Default::default()
        }
    }

    #[test]
    fn bounds_cover_positions() {
        let mut mesh = triangle();
        mesh.compute_bounds();
        assert_eq!(mesh.aabb, Aabb::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0)));
    }

    #[test]
    fn normals_follow_winding() {
        let mut mesh = triangle();
        mesh.compute_normals(true);
        assert!(mesh.vertex_normals.iter().all(|n| n.abs_diff_eq(Vec3::Z, 1e-6)));
        mesh.flip_culling();
        assert_eq!(mesh.indices, vec![0, 2, 1]);
        mesh.compute_normals(false);
        assert!(mesh.vertex_normals.iter().all(|n| n.abs_diff_eq(Vec3::NEG_Z, 1e-6)));
    }

    #[test]
    fn index_format_depends_on_vertex_count() {
        let mut mesh = triangle();
        assert_eq!(mesh.index_format(), IndexFormat::U16);
        mesh.vertex_positions = vec![Vec3::ZERO; 70_000];
        assert_eq!(mesh.index_format(), IndexFormat::U32);
    }

    #[test]
    fn clone_does_not_share_buffers() {
        let device = HeadlessDevice::new(HeadlessConfig::default()).unwrap();
        let mut mesh = primitives::cube(1.0);
        mesh.create_render_data(&device).unwrap();
        let buffers = mesh.buffers.get().unwrap();
        assert_eq!(buffers.index_format, IndexFormat::U16);
        assert_eq!(buffers.index_buffer.desc.size, 36 * 2);
        assert!(buffers.uvs.is_some());

        let copy = mesh.clone();
        assert!(!copy.buffers.is_some());
        assert_eq!(copy.indices, mesh.indices);
    }

    #[test]
    fn empty_mesh_render_data_fails() {
        let device = HeadlessDevice::new(HeadlessConfig::default()).unwrap();
        let mut mesh = MeshComponent::default();
        assert!(mesh.create_render_data(&device).is_err());
    }

    #[test]
    fn skinning_moves_bounds() {
        let mut mesh = triangle();
        mesh.armature_id = Entity::create();
        mesh.vertex_boneindices = vec![[0, 0, 0, 0]; 3];
        mesh.vertex_boneweights = vec![Vec4::new(1.0, 0.0, 0.0, 0.0); 3];
        mesh.compute_bounds();
        let shifted = mesh.skinned_bounds(&[Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0))]);
        assert_eq!(shifted.min.z, 5.0);
        assert_eq!(shifted.max.x, 1.0);
    }
}
