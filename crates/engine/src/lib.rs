//! Engine context and frame loop.
//!
//! [`EngineContext`] owns the services every subsystem shares (job system,
//! graphics device, default textures, frame timer) and is passed
//! explicitly; there is no global engine state. [`EngineConfig`] is read
//! from YAML with a default for every field.
//!
//! # Invariants
//! - A frame runs in a fixed order: tick, scene update, mesh upload, cull,
//!   record, compose, submit.
//! - Delta time handed to systems never exceeds `timer.max_delta_seconds`.
//! - Only device loss is fatal; every other frame error leaves the context
//!   usable for the next frame.

mod config;
mod context;
mod timer;

pub use config::{EngineConfig, GraphicsConfig, JobsConfig, TimerConfig};
pub use context::{EngineContext, FrameReport};
pub use timer::FrameTimer;

use lumen_graphics::GraphicsError;
use lumen_jobs::JobSystemError;
use lumen_render::RenderError;
use lumen_scene::SceneError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Jobs(#[from] JobSystemError),
    #[error(transparent)]
    Graphics(#[from] GraphicsError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl EngineError {
    /// Whether the application has to shut down.
    pub fn is_fatal(&self) -> bool {
        match self {
            EngineError::Graphics(err) => err.is_fatal(),
            EngineError::Render(err) => err.is_fatal(),
            EngineError::Scene(SceneError::Graphics(err)) => err.is_fatal(),
            _ => false,
        }
    }
}

pub fn crate_info() -> &'static str {
    "lumen-engine v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("engine"));
    }

    #[test]
    fn device_loss_is_fatal_wherever_it_surfaces() {
        assert!(EngineError::Graphics(GraphicsError::DeviceLost).is_fatal());
        assert!(EngineError::Render(RenderError::Graphics(GraphicsError::DeviceLost)).is_fatal());
        assert!(!EngineError::InvalidConfig("x".into()).is_fatal());
        assert!(!EngineError::Render(RenderError::MissingTargets).is_fatal());
    }
}
