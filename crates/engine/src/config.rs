//! YAML engine configuration. Every field has a default, so an empty
//! document is a valid configuration.

use crate::EngineError;
use lumen_cull::CullingConfig;
use lumen_graphics::{GraphicsCapabilities, HeadlessConfig, ShaderFormat};
use lumen_jobs::JobSystemConfig;
use lumen_render::RenderPathConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub jobs: JobsConfig,
    pub graphics: GraphicsConfig,
    pub render: RenderPathConfig,
    pub culling: CullingConfig,
    pub timer: TimerConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Worker threads; absent means one less than the core count, 0 runs
    /// every job on the caller.
    pub thread_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub shader_format: ShaderFormat,
    /// Fail submission on validation messages.
    pub debug_device: bool,
    pub explicit_barriers: bool,
    pub frames_in_flight: u32,
    pub memory_budget_mb: u64,
    pub upload_buffer_kb: u64,
    /// Root of `<format>/<name>.<ext>` shader files.
    pub shader_dir: Option<PathBuf>,
    pub capabilities: GraphicsCapabilities,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        let headless = HeadlessConfig::default();
        Self {
            shader_format: headless.shader_format,
            debug_device: headless.debug,
            explicit_barriers: headless.explicit_barriers,
            frames_in_flight: headless.frames_in_flight,
            memory_budget_mb: headless.memory_budget / (1024 * 1024),
            upload_buffer_kb: headless.upload_buffer_size / 1024,
            shader_dir: None,
            capabilities: headless.capabilities,
        }
    }
}

impl GraphicsConfig {
    pub fn headless(&self) -> HeadlessConfig {
        HeadlessConfig {
            explicit_barriers: self.explicit_barriers,
            debug: self.debug_device,
            frames_in_flight: self.frames_in_flight,
            memory_budget: self.memory_budget_mb * 1024 * 1024,
            upload_buffer_size: self.upload_buffer_kb * 1024,
            shader_format: self.shader_format,
            capabilities: self.capabilities,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Upper bound of a frame's delta time, so a stall does not turn into
    /// one huge simulation step.
    pub max_delta_seconds: f32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            max_delta_seconds: 0.1,
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&contents)?;
        tracing::info!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, EngineError> {
        // An empty document deserializes as unit, not as an empty map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String, EngineError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn jobs_config(&self) -> JobSystemConfig {
        JobSystemConfig {
            thread_count: self.jobs.thread_count,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.graphics.frames_in_flight == 0 {
            return Err(EngineError::InvalidConfig(
                "graphics.frames_in_flight must be at least 1".into(),
            ));
        }
        if self.graphics.upload_buffer_kb == 0 {
            return Err(EngineError::InvalidConfig(
                "graphics.upload_buffer_kb must be non-zero".into(),
            ));
        }
        let max_delta = self.timer.max_delta_seconds;
        if !(max_delta.is_finite() && max_delta > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "timer.max_delta_seconds must be positive, got {max_delta}"
            )));
        }
        let cell = self.culling.cell_size;
        if !(cell.is_finite() && cell > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "culling.cell_size must be positive, got {cell}"
            )));
        }
        self.render.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_render::{RenderFeatures, RenderTechnique};

    #[test]
    fn empty_document_is_default() {
        assert_eq!(EngineConfig::from_yaml_str("").unwrap(), EngineConfig::default());
        assert_eq!(EngineConfig::from_yaml_str("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = r#"
jobs:
  thread_count: 3
graphics:
  shader_format: spirv
  debug_device: true
  capabilities: RAYTRACING
render:
  technique: deferred
  width: 640
  height: 480
  features: SHADOWS | SSAO
timer:
  max_delta_seconds: 0.05
"#;
        let config = EngineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.jobs.thread_count, Some(3));
        assert_eq!(config.graphics.shader_format, ShaderFormat::Spirv);
        assert!(config.graphics.debug_device);
        assert_eq!(config.graphics.capabilities, GraphicsCapabilities::RAYTRACING);
        assert_eq!(config.graphics.frames_in_flight, 2);
        assert_eq!(config.render.technique, RenderTechnique::Deferred);
        assert_eq!((config.render.width, config.render.height), (640, 480));
        assert_eq!(config.render.features, RenderFeatures::SHADOWS | RenderFeatures::SSAO);
        assert_eq!(config.render.msaa_samples, 1);
        assert_eq!(config.culling, CullingConfig::default());
        assert_eq!(config.timer.max_delta_seconds, 0.05);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for yaml in [
            "graphics: { frames_in_flight: 0 }",
            "timer: { max_delta_seconds: -1.0 }",
            "culling: { cell_size: 0.0 }",
            "render: { msaa_samples: 3 }",
        ] {
            assert!(
                matches!(
                    EngineConfig::from_yaml_str(yaml),
                    Err(EngineError::InvalidConfig(_) | EngineError::Render(_))
                ),
                "{yaml}"
            );
        }
        assert!(matches!(
            EngineConfig::from_yaml_str("jobs: 5"),
            Err(EngineError::Yaml(_))
        ));
    }

    #[test]
    fn yaml_round_trip_and_file_load() {
        let mut config = EngineConfig::default();
        config.render.technique = RenderTechnique::PathTraced;
        config.graphics.shader_dir = Some(PathBuf::from("shaders"));
        let yaml = config.to_yaml_string().unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("engine.yaml");
        std::fs::write(&path, yaml).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
        assert!(matches!(
            EngineConfig::load(tmp.path().join("missing.yaml")),
            Err(EngineError::Io(_))
        ));
    }

    #[test]
    fn headless_config_follows_graphics_section() {
        let graphics = GraphicsConfig {
            memory_budget_mb: 64,
            upload_buffer_kb: 256,
            ..GraphicsConfig::default()
        };
        let headless = graphics.headless();
        assert_eq!(headless.memory_budget, 64 * 1024 * 1024);
        assert_eq!(headless.upload_buffer_size, 256 * 1024);
        assert_eq!(GraphicsConfig::default().headless().frames_in_flight, 2);
    }
}
