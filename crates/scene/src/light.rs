use crate::transform::TransformComponent;
use bitflags::bitflags;
use glam::Vec3;
use lumen_common::Aabb;
use lumen_ecs::RemapEntities;
use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_4;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct LightFlags: u32 {
        const CAST_SHADOW = 1 << 0;
        const VOLUMETRICS = 1 << 1;
        const STATIC = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LightType {
    Directional,
    #[default]
    Point,
    Spot,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightComponent {
    pub flags: LightFlags,
    pub light_type: LightType,
    pub color: Vec3,
    pub energy: f32,
    pub range_local: f32,
    /// Full cone angle of a spot light, radians.
    pub fov: f32,
    pub shadow_bias: f32,

    /// World-space position. Runtime only.
    #[serde(skip)]
    pub position: Vec3,
    /// Unit vector pointing towards the light (its local +Y). Runtime only.
    #[serde(skip, default = "up")]
    pub direction: Vec3,
    /// `range_local` scaled by the largest world scale axis. Runtime only.
    #[serde(skip)]
    pub range_global: f32,
}

fn up() -> Vec3 {
    Vec3::Y
}

impl Default for LightComponent {
    fn default() -> Self {
        Self {
            flags: LightFlags::empty(),
            light_type: LightType::Point,
            color: Vec3::ONE,
            energy: 1.0,
            range_local: 10.0,
            fov: FRAC_PI_4,
            shadow_bias: 0.0001,
            position: Vec3::ZERO,
            direction: Vec3::Y,
            range_global: 10.0,
        }
    }
}

impl LightComponent {
    pub fn is_cast_shadow(&self) -> bool {
        self.flags.contains(LightFlags::CAST_SHADOW)
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(LightFlags::STATIC)
    }

    /// Refresh the runtime fields from a world transform.
    pub fn update_from_transform(&mut self, transform: &TransformComponent) {
        let (scale, rotation, translation) = transform.world.to_scale_rotation_translation();
        self.position = translation;
        self.direction = (rotation * Vec3::Y).normalize_or_zero();
        self.range_global = self.range_local * scale.max_element();
    }

    /// World-space bounds of the lit volume.
    pub fn aabb(&self) -> Aabb {
        match self.light_type {
            LightType::Directional => Aabb::INFINITE,
            LightType::Point | LightType::Spot => {
                Aabb::from_half_width(self.position, Vec3::splat(self.range_global))
            }
        }
    }
}

impl RemapEntities for LightComponent {}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;
    use std::f32::consts::PI;

    #[test]
    fn point_light_bounds_follow_transform() {
        let mut t = TransformComponent::from_translation(Vec3::new(1.0, 2.0, 3.0));
        t.scale(Vec3::new(1.0, 2.0, 1.0));
        t.update_transform();
        let mut light = LightComponent {
            range_local: 5.0,
            ..Default::default()
        };
        light.update_from_transform(&t);
        assert_eq!(light.range_global, 10.0);
        let aabb = light.aabb();
        assert!(aabb.min.abs_diff_eq(Vec3::new(-9.0, -8.0, -7.0), 1e-4));
    }

    #[test]
    fn directional_light_is_infinite() {
        let light = LightComponent {
            light_type: LightType::Directional,
            ..Default::default()
        };
        assert!(light.aabb().is_infinite());
    }

    #[test]
    fn direction_rotates_with_transform() {
        let mut t = TransformComponent::default();
        t.rotate(Quat::from_rotation_x(PI));
        t.update_transform();
        let mut light = LightComponent::default();
        light.update_from_transform(&t);
        assert!(light.direction.abs_diff_eq(Vec3::NEG_Y, 1e-5));
    }
}
