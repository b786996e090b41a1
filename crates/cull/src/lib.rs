//! Culling: a coarse spatial grid and frustum tests over scene bounds.
//!
//! [`CullingSystem::cull`] turns the object and light bounds produced by
//! `Scene::update` into a [`Visibility`]: visible object indices, the same
//! indices grouped into per-mesh [`RenderBatch`]es, and visible lights.
//!
//! # Invariants
//! - A box entirely outside the frustum is never reported visible.
//! - A box entirely inside the frustum is always reported visible.
//! - Output order is stable: objects and lights ascend by index, batches
//!   ascend by mesh entity.
//! - Objects with missing or non-renderable meshes are skipped and counted,
//!   never a panic.

mod culling;
mod grid;

pub use culling::{
    CullStats, CullingConfig, CullingSystem, RenderBatch, Visibility, batch_objects,
    shadow_casters,
};
pub use grid::{CellCoord, SpatialGrid};

#[derive(Debug, thiserror::Error)]
pub enum CullError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub fn crate_info() -> &'static str {
    "lumen-cull v0.1.0"
}
