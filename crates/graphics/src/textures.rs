use crate::GraphicsError;
use crate::descriptors::{Format, TextureDesc};
use crate::device::GraphicsDevice;
use crate::resources::{DeviceChild, Texture};

/// Which built-in texture to substitute for a missing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultTexture {
    White,
    Black,
    Transparent,
    /// Flat tangent-space normal (0.5, 0.5, 1).
    Normal,
}

/// 1x1 fallback textures created once per device.
#[derive(Debug, Clone)]
pub struct DefaultTextures {
    pub white: Texture,
    pub black: Texture,
    pub transparent: Texture,
    pub normal: Texture,
}

impl DefaultTextures {
    pub fn create(device: &dyn GraphicsDevice) -> Result<Self, GraphicsError> {
        let make = |name: &str, rgba: [u8; 4]| -> Result<Texture, GraphicsError> {
            let desc = TextureDesc::sampled_2d(1, 1, Format::R8G8B8A8Unorm);
            let texture = device.create_texture(&desc, Some(rgba.as_slice()))?;
            device.set_name(&texture, name);
            Ok(texture)
        };
        Ok(Self {
            white: make("default_white", [255, 255, 255, 255])?,
            black: make("default_black", [0, 0, 0, 255])?,
            transparent: make("default_transparent", [0, 0, 0, 0])?,
            normal: make("default_normal", [128, 128, 255, 255])?,
        })
    }

    pub fn get(&self, which: DefaultTexture) -> &Texture {
        match which {
            DefaultTexture::White => &self.white,
            DefaultTexture::Black => &self.black,
            DefaultTexture::Transparent => &self.transparent,
            DefaultTexture::Normal => &self.normal,
        }
    }

    /// `texture` if it is present and valid, otherwise the fallback.
    pub fn resolve<'a>(&'a self, texture: Option<&'a Texture>, fallback: DefaultTexture) -> &'a Texture {
        match texture {
            Some(t) if t.is_valid() => t,
            _ => self.get(fallback),
        }
    }
}

/// Unwrap a texture creation result, substituting a default on failure.
pub fn texture_or_default(
    result: Result<Texture, GraphicsError>,
    defaults: &DefaultTextures,
    fallback: DefaultTexture,
) -> Texture {
    match result {
        Ok(texture) => texture,
        Err(err) => {
            tracing::warn!(%err, ?fallback, "texture creation failed, using default texture");
            defaults.get(fallback).clone()
        }
    }
}
