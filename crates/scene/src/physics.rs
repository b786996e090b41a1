use crate::mesh::MeshComponent;
use crate::transform::TransformComponent;
use bitflags::bitflags;
use glam::{Quat, Vec3};
use lumen_common::Entity;
use lumen_ecs::RemapEntities;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct RigidBodyFlags: u32 {
        /// Driven by its transform instead of the simulation.
        const KINEMATIC = 1 << 0;
        const DISABLE_DEACTIVATION = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CollisionShape {
    #[default]
    Box,
    Sphere,
    Capsule,
    ConvexHull,
    TriangleMesh,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidBodyPhysicsComponent {
    pub flags: RigidBodyFlags,
    pub shape: CollisionShape,
    pub mass: f32,
    pub friction: f32,
    pub restitution: f32,
    pub damping: f32,
    pub box_half_extents: Vec3,
    pub radius: f32,
    pub height: f32,
}

impl Default for RigidBodyPhysicsComponent {
    fn default() -> Self {
        Self {
            flags: RigidBodyFlags::empty(),
            shape: CollisionShape::Box,
            mass: 1.0,
            friction: 0.5,
            restitution: 0.0,
            damping: 0.0,
            box_half_extents: Vec3::ONE,
            radius: 1.0,
            height: 1.0,
        }
    }
}

impl RigidBodyPhysicsComponent {
    pub fn is_kinematic(&self) -> bool {
        self.flags.contains(RigidBodyFlags::KINEMATIC)
    }

    pub fn set_kinematic(&mut self, value: bool) {
        self.flags.set(RigidBodyFlags::KINEMATIC, value);
    }
}

impl RemapEntities for RigidBodyPhysicsComponent {}

/// Rigid pose exchanged with a physics backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsPose {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl PhysicsPose {
    pub fn from_world(transform: &TransformComponent) -> Self {
        let (_, rotation, translation) = transform.world.to_scale_rotation_translation();
        Self { translation, rotation }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PhysicsError {
    #[error("entity {0} is already registered")]
    AlreadyRegistered(Entity),
    #[error("collision shape {0:?} is not supported by this backend")]
    UnsupportedShape(CollisionShape),
    #[error("physics backend error: {0}")]
    Backend(String),
}

/// Simulation backend driven by the scene update.
///
/// Bodies are keyed by the entity that owns the rigid body component.
pub trait PhysicsEngine: Send {
    fn register_object(
        &mut self,
        entity: Entity,
        body: &RigidBodyPhysicsComponent,
        transform: &TransformComponent,
        mesh: Option<&MeshComponent>,
    ) -> Result<(), PhysicsError>;

    fn remove_object(&mut self, entity: Entity);

    fn is_registered(&self, entity: Entity) -> bool;

    fn registered_entities(&self) -> Vec<Entity>;

    fn set_kinematic_pose(&mut self, entity: Entity, pose: PhysicsPose);

    /// Step the simulation.
    fn update(&mut self, dt: f32);

    /// Simulated pose of a dynamic body.
    fn pose(&self, entity: Entity) -> Option<PhysicsPose>;
}

/// Backend that simulates nothing and never reports a pose.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPhysics;

impl PhysicsEngine for NullPhysics {
    fn register_object(
        &mut self,
        _entity: Entity,
        _body: &RigidBodyPhysicsComponent,
        _transform: &TransformComponent,
        _mesh: Option<&MeshComponent>,
    ) -> Result<(), PhysicsError> {
        Ok(())
    }

    fn remove_object(&mut self, _entity: Entity) {}

    fn is_registered(&self, _entity: Entity) -> bool {
        false
    }

    fn registered_entities(&self) -> Vec<Entity> {
        Vec::new()
    }

    fn set_kinematic_pose(&mut self, _entity: Entity, _pose: PhysicsPose) {}

    fn update(&mut self, _dt: f32) {}

    fn pose(&self, _entity: Entity) -> Option<PhysicsPose> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_physics_reports_nothing() {
        let mut physics = NullPhysics;
        let e = Entity::create();
        physics
            .register_object(e, &RigidBodyPhysicsComponent::default(), &TransformComponent::default(), None)
            .unwrap();
        physics.update(1.0 / 60.0);
        assert!(!physics.is_registered(e));
        assert!(physics.pose(e).is_none());
    }

    #[test]
    fn pose_reads_world_transform() {
        let mut t = TransformComponent::from_translation(Vec3::new(1.0, 2.0, 3.0));
        t.update_transform();
        let pose = PhysicsPose::from_world(&t);
        assert_eq!(pose.translation, Vec3::new(1.0, 2.0, 3.0));
        assert!(pose.rotation.abs_diff_eq(Quat::IDENTITY, 1e-6));
    }
}
