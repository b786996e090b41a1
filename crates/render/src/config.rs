use crate::RenderError;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// How the main image is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderTechnique {
    #[default]
    Forward,
    Deferred,
    /// Needs a device with raytracing; falls back to `Forward` otherwise.
    PathTraced,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct RenderFeatures: u32 {
        const SHADOWS = 1 << 0;
        const REFLECTIONS = 1 << 1;
        const SSAO = 1 << 2;
        const SSR = 1 << 3;
        const BLOOM = 1 << 4;
        const FXAA = 1 << 5;
        const TEMPORAL_AA = 1 << 6;
        const TRANSPARENTS = 1 << 7;
        const POSTPROCESS = 1 << 8;
    }
}

impl Default for RenderFeatures {
    fn default() -> Self {
        RenderFeatures::SHADOWS
            | RenderFeatures::TRANSPARENTS
            | RenderFeatures::POSTPROCESS
            | RenderFeatures::FXAA
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderPathConfig {
    pub technique: RenderTechnique,
    pub features: RenderFeatures,
    pub msaa_samples: u32,
    pub width: u32,
    pub height: u32,
    /// Edge length of one shadow atlas tile.
    pub shadow_map_resolution: u32,
    pub exposure: f32,
    pub layer_mask: u32,
}

impl Default for RenderPathConfig {
    fn default() -> Self {
        Self {
            technique: RenderTechnique::Forward,
            features: RenderFeatures::default(),
            msaa_samples: 1,
            width: 1280,
            height: 720,
            shadow_map_resolution: 512,
            exposure: 1.0,
            layer_mask: u32::MAX,
        }
    }
}

impl RenderPathConfig {
    pub fn validate(&self) -> Result<(), RenderError> {
        if !matches!(self.msaa_samples, 1 | 2 | 4 | 8) {
            return Err(RenderError::InvalidParameter(format!(
                "msaa_samples must be 1, 2, 4 or 8, got {}",
                self.msaa_samples
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::InvalidParameter(format!(
                "resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.features.contains(RenderFeatures::SHADOWS) && self.shadow_map_resolution == 0 {
            return Err(RenderError::InvalidParameter(
                "shadow_map_resolution must be non-zero when shadows are enabled".into(),
            ));
        }
        if !(self.exposure.is_finite() && self.exposure > 0.0) {
            return Err(RenderError::InvalidParameter(format!(
                "exposure must be positive, got {}",
                self.exposure
            )));
        }
        Ok(())
    }

    pub fn has(&self, feature: RenderFeatures) -> bool {
        self.features.contains(feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        RenderPathConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_values() {
        let bad = [
            RenderPathConfig { msaa_samples: 3, ..Default::default() },
            RenderPathConfig { width: 0, ..Default::default() },
            RenderPathConfig { shadow_map_resolution: 0, ..Default::default() },
            RenderPathConfig { exposure: f32::NAN, ..Default::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?}");
        }
        // Shadow resolution only matters with shadows on.
        RenderPathConfig {
            shadow_map_resolution: 0,
            features: RenderFeatures::empty(),
            ..Default::default()
        }
        .validate()
        .unwrap();
    }

    #[test]
    fn deserializes_partial_config() {
        let config: RenderPathConfig =
            serde_json::from_str(r#"{"technique":"deferred","msaa_samples":4}"#).unwrap();
        assert_eq!(config.technique, RenderTechnique::Deferred);
        assert_eq!(config.msaa_samples, 4);
        assert_eq!(config.width, 1280);
        assert_eq!(config.features, RenderFeatures::default());
    }
}
