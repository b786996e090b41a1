use crate::RenderError;
use crate::config::{RenderFeatures, RenderPathConfig, RenderTechnique};
use lumen_graphics::{
    BindFlags, DefaultTexture, DefaultTextures, Format, GraphicsDevice, ResourceState, Texture,
    TextureDesc, texture_or_default,
};

/// Shadow atlas is this many tiles wide and high.
pub const SHADOW_ATLAS_TILES_PER_ROW: u32 = 4;
pub const SHADOW_ATLAS_TILES: u32 = SHADOW_ATLAS_TILES_PER_ROW * SHADOW_ATLAS_TILES_PER_ROW;

pub const HDR_FORMAT: Format = Format::R16G16B16A16Float;
pub const LDR_FORMAT: Format = Format::R8G8B8A8Unorm;
pub const DEPTH_FORMAT: Format = Format::D32Float;

/// Every texture a render path draws into. All of them rest in
/// `SHADER_RESOURCE` between passes.
#[derive(Debug, Clone)]
pub struct RenderTargets {
    pub width: u32,
    pub height: u32,
    pub color: Texture,
    /// Multisampled color, resolved into `color`.
    pub color_msaa: Option<Texture>,
    pub depth: Texture,
    /// Albedo, normal, surface.
    pub gbuffer: Vec<Texture>,
    pub ssao: Option<Texture>,
    pub reflection: Option<Texture>,
    pub reflection_depth: Option<Texture>,
    pub shadow_atlas: Option<Texture>,
    pub post: Option<Texture>,
    /// Targets replaced by a default texture after a creation failure.
    pub fallbacks: usize,
}

impl RenderTargets {
    pub fn create(
        device: &dyn GraphicsDevice,
        config: &RenderPathConfig,
        technique: RenderTechnique,
        textures: &DefaultTextures,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidParameter(format!(
                "render target size must be non-zero, got {width}x{height}"
            )));
        }
        let _span = tracing::info_span!("resize_buffers", width, height).entered();
        let mut fallbacks = 0usize;
        let mut make = |desc: TextureDesc, name: &str, fallback: DefaultTexture| {
            match device.create_texture(&desc, None) {
                Ok(texture) => {
                    device.set_name(&texture, name);
                    Ok(texture)
                }
                Err(err) if err.is_fatal() => Err(RenderError::Graphics(err)),
                Err(err) => {
                    fallbacks += 1;
                    tracing::warn!(target_name = name, "render target creation failed");
                    Ok(texture_or_default(Err(err), textures, fallback))
                }
            }
        };

        let msaa = match technique {
            RenderTechnique::Forward => config.msaa_samples,
            RenderTechnique::Deferred | RenderTechnique::PathTraced => 1,
        };
        let half_w = (width / 2).max(1);
        let half_h = (height / 2).max(1);

        let color = make(storage_target(width, height, HDR_FORMAT), "main_color", DefaultTexture::Black)?;
        let color_msaa = if msaa > 1 {
            let desc = TextureDesc {
                sample_count: msaa,
                ..TextureDesc::render_target(width, height, HDR_FORMAT)
            };
            Some(make(desc, "main_color_msaa", DefaultTexture::Black)?)
        } else {
            None
        };
        let depth = make(depth_target(width, height, msaa), "main_depth", DefaultTexture::White)?;

        let mut gbuffer = Vec::new();
        if technique == RenderTechnique::Deferred {
            for (name, format) in [
                ("gbuffer_albedo", LDR_FORMAT),
                ("gbuffer_normal", Format::R16G16B16A16Float),
                ("gbuffer_surface", LDR_FORMAT),
            ] {
                gbuffer.push(make(
                    TextureDesc::render_target(width, height, format),
                    name,
                    DefaultTexture::Black,
                )?);
            }
        }

        let ssao = if config.has(RenderFeatures::SSAO) && technique != RenderTechnique::PathTraced {
            Some(make(storage_target(width, height, Format::R8Unorm), "ssao", DefaultTexture::White)?)
        } else {
            None
        };

        let (reflection, reflection_depth) =
            if config.has(RenderFeatures::REFLECTIONS) && technique != RenderTechnique::PathTraced {
                (
                    Some(make(
                        TextureDesc::render_target(half_w, half_h, HDR_FORMAT),
                        "reflection",
                        DefaultTexture::Black,
                    )?),
                    Some(make(depth_target(half_w, half_h, 1), "reflection_depth", DefaultTexture::White)?),
                )
            } else {
                (None, None)
            };

        let shadow_atlas = if config.has(RenderFeatures::SHADOWS) && technique != RenderTechnique::PathTraced {
            let size = config.shadow_map_resolution.saturating_mul(SHADOW_ATLAS_TILES_PER_ROW);
            Some(make(depth_target(size, size, 1), "shadow_atlas", DefaultTexture::White)?)
        } else {
            None
        };

        let post = if config.has(RenderFeatures::POSTPROCESS) {
            Some(make(storage_target(width, height, LDR_FORMAT), "postprocess", DefaultTexture::Black)?)
        } else {
            None
        };

        tracing::debug!(fallbacks, "render targets created");
        Ok(Self {
            width,
            height,
            color,
            color_msaa,
            depth,
            gbuffer,
            ssao,
            reflection,
            reflection_depth,
            shadow_atlas,
            post,
            fallbacks,
        })
    }

    /// Image that compose presents.
    pub fn final_output(&self) -> &Texture {
        self.post.as_ref().unwrap_or(&self.color)
    }

    /// Pixel size of one shadow atlas tile.
    pub fn shadow_tile_size(&self) -> u32 {
        self.shadow_atlas
            .as_ref()
            .map_or(0, |atlas| atlas.desc.width / SHADOW_ATLAS_TILES_PER_ROW)
    }
}

fn storage_target(width: u32, height: u32, format: Format) -> TextureDesc {
    let mut desc = TextureDesc::render_target(width, height, format);
    desc.bind_flags |= BindFlags::UNORDERED_ACCESS;
    desc
}

fn depth_target(width: u32, height: u32, samples: u32) -> TextureDesc {
    TextureDesc {
        sample_count: samples,
        layout: ResourceState::SHADER_RESOURCE,
        ..TextureDesc::depth_target(width, height, DEPTH_FORMAT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_graphics::{DeviceChild, HeadlessConfig, HeadlessDevice};

    fn device(budget: u64) -> HeadlessDevice {
        HeadlessDevice::new(HeadlessConfig {
            memory_budget: budget,
            upload_buffer_size: 1024,
            ..HeadlessConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn forward_with_msaa_creates_multisampled_color() {
        let device = device(512 * 1024 * 1024);
        let textures = DefaultTextures::create(&device).unwrap();
        let config = RenderPathConfig {
            msaa_samples: 4,
            ..Default::default()
        };
        let targets =
            RenderTargets::create(&device, &config, RenderTechnique::Forward, &textures, 320, 200).unwrap();
        assert_eq!(targets.color_msaa.as_ref().unwrap().desc.sample_count, 4);
        assert_eq!(targets.depth.desc.sample_count, 4);
        assert!(targets.gbuffer.is_empty());
        assert_eq!(targets.shadow_tile_size(), 512);
        assert_eq!(targets.fallbacks, 0);
        assert_eq!(targets.final_output(), targets.post.as_ref().unwrap());
    }

    #[test]
    fn deferred_creates_gbuffer() {
        let device = device(512 * 1024 * 1024);
        let textures = DefaultTextures::create(&device).unwrap();
        let targets = RenderTargets::create(
            &device,
            &RenderPathConfig::default(),
            RenderTechnique::Deferred,
            &textures,
            64,
            64,
        )
        .unwrap();
        assert_eq!(targets.gbuffer.len(), 3);
        assert!(targets.color_msaa.is_none());
    }

    #[test]
    fn zero_size_is_rejected() {
        let device = device(512 * 1024 * 1024);
        let textures = DefaultTextures::create(&device).unwrap();
        let err = RenderTargets::create(
            &device,
            &RenderPathConfig::default(),
            RenderTechnique::Forward,
            &textures,
            0,
            720,
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::InvalidParameter(_)));
    }

    #[test]
    fn exhausted_memory_falls_back_to_defaults() {
        // Room for the upload rings and default textures only.
        let device = device(4096);
        let textures = DefaultTextures::create(&device).unwrap();
        let targets = RenderTargets::create(
            &device,
            &RenderPathConfig::default(),
            RenderTechnique::Forward,
            &textures,
            1920,
            1080,
        )
        .unwrap();
        assert!(targets.fallbacks > 0);
        assert_eq!(targets.color, textures.black);
        assert!(targets.depth.is_valid());
    }
}
