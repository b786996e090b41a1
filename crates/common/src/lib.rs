//! Shared types: entity handles and geometry primitives.
//!
//! # Invariants
//! - `Entity::INVALID` (zero) never names a live entity.
//! - `Entity::create` never returns the same handle twice within a process.
//! - An empty `Aabb` (min > max) intersects nothing.

mod entity;
mod geometry;

pub use entity::Entity;
pub use geometry::{Aabb, Frustum, Intersection, Ray};

pub fn crate_info() -> &'static str {
    "lumen-common v0.1.0"
}
