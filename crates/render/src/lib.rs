//! Render path: per-frame pass recording over the graphics device.
//!
//! [`RenderPath3D`] owns the render targets, pipelines and culling state of
//! one view. `update` picks the camera and culls; `render` records a shadow
//! command list and a main command list in parallel; `compose` draws the
//! final image onto a swap chain.
//!
//! # Invariants
//! - Render state derives from scene state and view; passes never mutate
//!   the scene.
//! - The shadow list is begun before the main list, so it is submitted
//!   first.
//! - Every render target rests in `SHADER_RESOURCE` between passes.
//! - A mesh without GPU buffers is skipped and counted, never drawn.

mod config;
mod context;
mod passes;
mod path;
mod pipelines;
mod targets;

pub use config::{RenderFeatures, RenderPathConfig, RenderTechnique};
pub use context::{
    FrameConstants, ReflectionView, RenderContext, RenderStats, ShaderLight, ShaderMeshInstance,
    ShadowView,
};
pub use passes::{RenderPass, build_pass_list, compose};
pub use path::RenderPath3D;
pub use pipelines::{RenderPipelines, SHADER_NAMES};
pub use targets::{RenderTargets, SHADOW_ATLAS_TILES, SHADOW_ATLAS_TILES_PER_ROW};

use lumen_cull::CullError;
use lumen_graphics::GraphicsError;
use lumen_jobs::WaitError;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("render targets have not been created; call resize_buffers first")]
    MissingTargets,
    #[error(transparent)]
    Graphics(#[from] GraphicsError),
    #[error("recording jobs failed: {0}")]
    Jobs(#[from] WaitError),
    #[error(transparent)]
    Cull(#[from] CullError),
}

impl RenderError {
    /// Whether the device can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RenderError::Graphics(err) if err.is_fatal())
    }
}

pub fn crate_info() -> &'static str {
    "lumen-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }

    #[test]
    fn only_device_loss_is_fatal() {
        assert!(RenderError::Graphics(GraphicsError::DeviceLost).is_fatal());
        assert!(!RenderError::MissingTargets.is_fatal());
    }
}
