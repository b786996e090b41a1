use bitflags::bitflags;
use glam::{Mat4, Quat, Vec3};
use lumen_common::Entity;
use lumen_ecs::{EntityMap, RemapEntities};
use serde::{Deserialize, Serialize};

/// Human-readable entity name. Not required to be unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameComponent(pub String);

impl NameComponent {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Layer bits used to filter rendering and picking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerComponent {
    pub layer_mask: u32,
}

impl Default for LayerComponent {
    fn default() -> Self {
        Self { layer_mask: u32::MAX }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TransformFlags: u32 {
        /// Locals changed since `world` was last derived from them.
        const DIRTY = 1 << 0;
    }
}

/// Local scale/rotation/translation plus the derived world matrix.
///
/// `world` is only rewritten by [`update_transform`](Self::update_transform)
/// (when dirty) or by the hierarchy pass for parented entities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformComponent {
    pub flags: TransformFlags,
    pub scale_local: Vec3,
    pub rotation_local: Quat,
    pub translation_local: Vec3,
    pub world: Mat4,
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self {
            flags: TransformFlags::DIRTY,
            scale_local: Vec3::ONE,
            rotation_local: Quat::IDENTITY,
            translation_local: Vec3::ZERO,
            world: Mat4::IDENTITY,
        }
    }
}

impl TransformComponent {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation_local: translation,
            ..Self::default()
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(TransformFlags::DIRTY)
    }

    pub fn set_dirty(&mut self, value: bool) {
        self.flags.set(TransformFlags::DIRTY, value);
    }

    /// Scale, then rotate, then translate.
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            self.scale_local,
            self.rotation_local,
            self.translation_local,
        )
    }

    /// Recompute `world` from the locals if they changed.
    pub fn update_transform(&mut self) {
        if self.is_dirty() {
            self.set_dirty(false);
            self.world = self.local_matrix();
        }
    }

    pub fn update_transform_parented(&mut self, parent: &TransformComponent) {
        self.world = parent.world * self.local_matrix();
    }

    /// Bake the current world matrix into the locals.
    pub fn apply_transform(&mut self) {
        self.set_dirty(true);
        let (s, r, t) = self.world.to_scale_rotation_translation();
        self.scale_local = s;
        self.rotation_local = r.normalize();
        self.translation_local = t;
    }

    pub fn clear_transform(&mut self) {
        self.set_dirty(true);
        self.scale_local = Vec3::ONE;
        self.rotation_local = Quat::IDENTITY;
        self.translation_local = Vec3::ZERO;
    }

    pub fn translate(&mut self, value: Vec3) {
        self.set_dirty(true);
        self.translation_local += value;
    }

    /// Apply `quaternion` after the current local rotation.
    pub fn rotate(&mut self, quaternion: Quat) {
        self.set_dirty(true);
        self.rotation_local = (quaternion * self.rotation_local).normalize();
    }

    /// Euler angles in radians: x is pitch, y is yaw, z is roll.
    pub fn rotate_roll_pitch_yaw(&mut self, value: Vec3) {
        self.set_dirty(true);
        let x = Quat::from_rotation_x(value.x);
        let y = Quat::from_rotation_y(value.y);
        let z = Quat::from_rotation_z(value.z);
        self.rotation_local = (y * self.rotation_local * x * z).normalize();
    }

    pub fn scale(&mut self, value: Vec3) {
        self.set_dirty(true);
        self.scale_local *= value;
    }

    /// Pre-multiply the local matrix by `matrix` and decompose the result.
    pub fn matrix_transform(&mut self, matrix: &Mat4) {
        self.set_dirty(true);
        let (s, r, t) = (*matrix * self.local_matrix()).to_scale_rotation_translation();
        self.scale_local = s;
        self.rotation_local = r.normalize();
        self.translation_local = t;
    }

    /// Interpolate between the world poses of `a` and `b` into the locals.
    pub fn lerp(&mut self, a: &TransformComponent, b: &TransformComponent, t: f32) {
        self.set_dirty(true);
        let (sa, ra, ta) = a.world.to_scale_rotation_translation();
        let (sb, rb, tb) = b.world.to_scale_rotation_translation();
        self.scale_local = sa.lerp(sb, t);
        self.rotation_local = ra.slerp(rb, t).normalize();
        self.translation_local = ta.lerp(tb, t);
    }

    /// World-space position.
    pub fn position(&self) -> Vec3 {
        self.world.w_axis.truncate()
    }

    /// World-space rotation.
    pub fn rotation(&self) -> Quat {
        self.world.to_scale_rotation_translation().1
    }

    /// World-space scale.
    pub fn scale_world(&self) -> Vec3 {
        self.world.to_scale_rotation_translation().0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreviousFrameTransformComponent {
    pub world_prev: Mat4,
}

impl Default for PreviousFrameTransformComponent {
    fn default() -> Self {
        Self {
            world_prev: Mat4::IDENTITY,
        }
    }
}

/// Parent link of a child entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyComponent {
    pub parent: Entity,
    /// The child's own layer mask, restored on detach.
    pub layer_mask_bind: u32,
}

impl Default for HierarchyComponent {
    fn default() -> Self {
        Self {
            parent: Entity::INVALID,
            layer_mask_bind: u32::MAX,
        }
    }
}

impl RemapEntities for NameComponent {}
impl RemapEntities for LayerComponent {}
impl RemapEntities for TransformComponent {}
impl RemapEntities for PreviousFrameTransformComponent {}

impl RemapEntities for HierarchyComponent {
    fn remap_entities(&mut self, map: &mut EntityMap) {
        self.parent = map.get_or_create(self.parent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn approx(a: Vec3, b: Vec3) -> bool {
        a.abs_diff_eq(b, 1e-4)
    }

    #[test]
    fn update_only_when_dirty() {
        let mut t = TransformComponent::from_translation(Vec3::new(1.0, 2.0, 3.0));
        t.update_transform();
        assert!(!t.is_dirty());
        assert!(approx(t.position(), Vec3::new(1.0, 2.0, 3.0)));

        // Changing locals without marking dirty leaves world alone.
        t.translation_local = Vec3::ZERO;
        t.update_transform();
        assert!(approx(t.position(), Vec3::new(1.0, 2.0, 3.0)));

        t.translate(Vec3::X);
        t.update_transform();
        assert!(approx(t.position(), Vec3::X));
    }

    #[test]
    fn parented_world_composes_parent_first() {
        let mut parent = TransformComponent::default();
        parent.rotate(Quat::from_rotation_y(FRAC_PI_2));
        parent.translate(Vec3::new(0.0, 2.0, 0.0));
        parent.update_transform();

        let mut child = TransformComponent::from_translation(Vec3::new(0.0, 0.0, 3.0));
        child.update_transform_parented(&parent);
        // +Z rotated a quarter turn about +Y points along +X.
        assert!(approx(child.position(), Vec3::new(3.0, 2.0, 0.0)));
    }

    #[test]
    fn apply_transform_round_trips_world() {
        let mut t = TransformComponent::default();
        t.scale(Vec3::splat(2.0));
        t.rotate(Quat::from_rotation_z(0.3));
        t.translate(Vec3::new(4.0, -1.0, 0.5));
        t.update_transform();
        let world = t.world;

        t.apply_transform();
        assert!(t.is_dirty());
        t.update_transform();
        assert!(t.world.abs_diff_eq(world, 1e-4));
    }

    #[test]
    fn matrix_transform_premultiplies() {
        let mut t = TransformComponent::from_translation(Vec3::X);
        t.matrix_transform(&Mat4::from_translation(Vec3::Y));
        assert!(approx(t.translation_local, Vec3::new(1.0, 1.0, 0.0)));
    }

    #[test]
    fn lerp_interpolates_world_poses() {
        let mut a = TransformComponent::default();
        a.update_transform();
        let mut b = TransformComponent::from_translation(Vec3::new(10.0, 0.0, 0.0));
        b.scale(Vec3::splat(3.0));
        b.update_transform();

        let mut t = TransformComponent::default();
        t.lerp(&a, &b, 0.5);
        t.update_transform();
        assert!(approx(t.position(), Vec3::new(5.0, 0.0, 0.0)));
        assert!(approx(t.scale_world(), Vec3::splat(2.0)));
    }

    #[test]
    fn clear_resets_to_identity() {
        let mut t = TransformComponent::from_translation(Vec3::ONE);
        t.rotate_roll_pitch_yaw(Vec3::new(0.1, 0.2, 0.3));
        t.clear_transform();
        t.update_transform();
        assert_eq!(t.world, Mat4::IDENTITY);
    }

    #[test]
    fn hierarchy_parent_is_remapped() {
        let mut map = EntityMap::new();
        let old = Entity::create();
        let mut h = HierarchyComponent {
            parent: old,
            layer_mask_bind: 1,
        };
        h.remap_entities(&mut map);
        assert_eq!(Some(h.parent), map.get(old));
    }
}
