use crate::material::RenderType;
use bitflags::bitflags;
use glam::{Mat4, Vec3, Vec4};
use lumen_common::{Aabb, Entity};
use lumen_ecs::{EntityMap, RemapEntities};
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ObjectFlags: u32 {
        const RENDERABLE = 1 << 0;
        const CAST_SHADOW = 1 << 1;
        const DYNAMIC = 1 << 2;
    }
}

/// A placed instance of a mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectComponent {
    pub flags: ObjectFlags,
    /// Weak reference; a missing mesh is skipped, never an error.
    pub mesh_id: Entity,
    pub color: Vec4,
    pub emissive_color: Vec4,
    /// Shadow cascades this object is excluded from.
    pub cascade_mask: u32,
    pub user_stencil_ref: u8,

    /// Union of the render types of the mesh's materials. Runtime only.
    #[serde(skip)]
    pub rendertype_mask: RenderType,
    /// World-space centre of the object's bounds. Runtime only.
    #[serde(skip)]
    pub center: Vec3,
}

impl Default for ObjectComponent {
    fn default() -> Self {
        Self {
            flags: ObjectFlags::RENDERABLE | ObjectFlags::CAST_SHADOW,
            mesh_id: Entity::INVALID,
            color: Vec4::ONE,
            emissive_color: Vec4::ONE,
            cascade_mask: 0,
            user_stencil_ref: 0,
            rendertype_mask: RenderType::empty(),
            center: Vec3::ZERO,
        }
    }
}

impl ObjectComponent {
    pub fn is_renderable(&self) -> bool {
        self.flags.contains(ObjectFlags::RENDERABLE)
    }

    pub fn is_cast_shadow(&self) -> bool {
        self.flags.contains(ObjectFlags::CAST_SHADOW)
    }

    pub fn is_dynamic(&self) -> bool {
        self.flags.contains(ObjectFlags::DYNAMIC)
    }

    pub fn set_cast_shadow(&mut self, value: bool) {
        self.flags.set(ObjectFlags::CAST_SHADOW, value);
    }
}

impl RemapEntities for ObjectComponent {
    fn remap_entities(&mut self, map: &mut EntityMap) {
        self.mesh_id = map.get_or_create(self.mesh_id);
    }
}

/// Skeleton: an ordered set of bone entities with their bind poses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmatureComponent {
    pub bone_collection: Vec<Entity>,
    pub inverse_bind_matrices: Vec<Mat4>,
    pub remap_matrix: Mat4,

    /// `remap * bone.world * inverse_bind`, one per bone. Runtime only.
    #[serde(skip)]
    pub bone_matrices: Vec<Mat4>,
    /// Bounds of the skinned vertices. Runtime only.
    #[serde(skip)]
    pub aabb: Aabb,
}

impl Default for ArmatureComponent {
    fn default() -> Self {
        Self {
            bone_collection: Vec::new(),
            inverse_bind_matrices: Vec::new(),
            remap_matrix: Mat4::IDENTITY,
            bone_matrices: Vec::new(),
            aabb: Aabb::EMPTY,
        }
    }
}

impl RemapEntities for ArmatureComponent {
    fn remap_entities(&mut self, map: &mut EntityMap) {
        for bone in &mut self.bone_collection {
            *bone = map.get_or_create(*bone);
        }
    }
}
