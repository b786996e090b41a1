use crate::SceneError;
use crate::transform::TransformComponent;
use bitflags::bitflags;
use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};
use lumen_common::Frustum;
use lumen_ecs::RemapEntities;
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_3, PI};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CameraFlags: u32 {
        const DIRTY = 1 << 0;
        /// `projection` was supplied by the caller and is not rebuilt.
        const CUSTOM_PROJECTION = 1 << 1;
    }
}

/// Perspective camera. `at` is a look direction, not a target point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraComponent {
    pub flags: CameraFlags,
    pub width: f32,
    pub height: f32,
    pub z_near: f32,
    pub z_far: f32,
    /// Vertical field of view, radians.
    pub fov: f32,
    pub eye: Vec3,
    pub at: Vec3,
    pub up: Vec3,

    #[serde(skip)]
    pub view: Mat4,
    #[serde(skip)]
    pub projection: Mat4,
    #[serde(skip)]
    pub view_projection: Mat4,
    #[serde(skip)]
    pub inv_view: Mat4,
    #[serde(skip)]
    pub inv_projection: Mat4,
    #[serde(skip)]
    pub inv_view_projection: Mat4,
    #[serde(skip)]
    pub frustum: Frustum,
}

impl Default for CameraComponent {
    fn default() -> Self {
        Self {
            flags: CameraFlags::DIRTY,
            width: 0.0,
            height: 0.0,
            z_near: 0.1,
            z_far: 800.0,
            fov: FRAC_PI_3,
            eye: Vec3::ZERO,
            at: Vec3::NEG_Z,
            up: Vec3::Y,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
            inv_view: Mat4::IDENTITY,
            inv_projection: Mat4::IDENTITY,
            inv_view_projection: Mat4::IDENTITY,
            frustum: Frustum::default(),
        }
    }
}

impl CameraComponent {
    /// Set up a perspective projection and recompute every derived matrix.
    pub fn create_perspective(
        &mut self,
        width: f32,
        height: f32,
        near: f32,
        far: f32,
        fov: f32,
    ) -> Result<(), SceneError> {
        if !(width > 0.0 && height > 0.0) {
            return Err(SceneError::InvalidParameter(format!(
                "camera dimensions must be positive, got {width}x{height}"
            )));
        }
        if !(near > 0.0 && far > near) {
            return Err(SceneError::InvalidParameter(format!(
                "camera clip range must satisfy 0 < near < far, got {near}..{far}"
            )));
        }
        if !(fov > 0.0 && fov < PI) {
            return Err(SceneError::InvalidParameter(format!(
                "camera fov must be in (0, pi), got {fov}"
            )));
        }
        self.width = width;
        self.height = height;
        self.z_near = near;
        self.z_far = far;
        self.fov = fov;
        self.flags.remove(CameraFlags::CUSTOM_PROJECTION);
        self.update_camera();
        Ok(())
    }

    pub fn aspect(&self) -> f32 {
        if self.height > 0.0 { self.width / self.height } else { 1.0 }
    }

    pub fn set_dirty(&mut self) {
        self.flags.insert(CameraFlags::DIRTY);
    }

    pub fn set_custom_projection(&mut self, projection: Mat4) {
        self.projection = projection;
        self.flags.insert(CameraFlags::CUSTOM_PROJECTION);
        self.update_camera();
    }

    /// Rebuild view, projection, their inverses and the frustum.
    pub fn update_camera(&mut self) {
        if !self.flags.contains(CameraFlags::CUSTOM_PROJECTION) {
            self.projection = Mat4::perspective_rh(self.fov, self.aspect(), self.z_near, self.z_far);
        }
        let dir = if self.at.length_squared() > 0.0 {
            self.at.normalize()
        } else {
            Vec3::NEG_Z
        };
        self.view = Mat4::look_to_rh(self.eye, dir, self.up);
        self.view_projection = self.projection * self.view;
        self.inv_view = self.view.inverse();
        self.inv_projection = self.projection.inverse();
        self.inv_view_projection = self.view_projection.inverse();
        self.frustum = Frustum::from_view_projection(&self.view_projection);
        self.flags.remove(CameraFlags::DIRTY);
    }

    /// Place the camera at a world transform looking down its local -Z.
    pub fn transform_camera(&mut self, transform: &TransformComponent) {
        let (_, rotation, translation) = transform.world.to_scale_rotation_translation();
        self.eye = translation;
        self.at = (rotation * Vec3::NEG_Z).normalize();
        self.up = (rotation * Vec3::Y).normalize();
        self.set_dirty();
    }

    /// Mirror the camera about `plane` (`xyz` normal, `w` distance).
    pub fn reflect(&mut self, plane: Vec4) {
        let len = plane.xyz().length();
        if len <= 0.0 {
            return;
        }
        let plane = plane / len;
        let n = plane.xyz();
        let reflect_point = |p: Vec3| p - 2.0 * (n.dot(p) + plane.w) * n;
        let reflect_vector = |v: Vec3| v - 2.0 * n.dot(v) * n;
        self.eye = reflect_point(self.eye);
        self.at = reflect_vector(self.at);
        self.up = reflect_vector(self.up);
        self.update_camera();
    }

    /// Near-plane size at unit distance, used to size screen-space effects.
    pub fn view_extent(&self) -> (f32, f32) {
        let h = 2.0 * (self.fov * 0.5).tan();
        (h * self.aspect(), h)
    }
}

impl RemapEntities for CameraComponent {}
