use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use lumen_ecs::RemapEntities;
use lumen_graphics::Texture;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MaterialFlags: u32 {
        /// Shader constants need repacking.
        const DIRTY = 1 << 0;
        const CAST_SHADOW = 1 << 1;
        const PLANAR_REFLECTION = 1 << 2;
        const WATER = 1 << 3;
        const FLIP_NORMALMAP = 1 << 4;
        const USE_VERTEXCOLORS = 1 << 5;
        const DOUBLE_SIDED = 1 << 6;
    }
}

bitflags! {
    /// Which render queues a material (or object) participates in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct RenderType: u32 {
        const OPAQUE = 1 << 0;
        const TRANSPARENT = 1 << 1;
        const WATER = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Blend,
    Additive,
}

/// Texture handles resolved for a material. Runtime only.
#[derive(Debug, Clone, Default)]
pub struct MaterialTextures {
    pub base_color: Option<Texture>,
    pub normal: Option<Texture>,
    pub surface: Option<Texture>,
    pub emissive: Option<Texture>,
    pub occlusion: Option<Texture>,
}

/// Material constants as laid out for the GPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ShaderMaterial {
    pub base_color: [f32; 4],
    pub emissive_color: [f32; 4],
    pub roughness: f32,
    pub reflectance: f32,
    pub metalness: f32,
    pub refraction_index: f32,
    pub alpha_ref: f32,
    pub normal_map_strength: f32,
    pub options: u32,
    pub padding: u32,
}

impl ShaderMaterial {
    pub const OPTION_USE_VERTEXCOLORS: u32 = 1 << 0;
    pub const OPTION_FLIP_NORMALMAP: u32 = 1 << 1;
    pub const OPTION_DOUBLE_SIDED: u32 = 1 << 2;
    pub const OPTION_HAS_NORMALMAP: u32 = 1 << 3;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialComponent {
    pub flags: MaterialFlags,
    pub alpha_mode: AlphaMode,
    pub base_color: Vec4,
    /// RGB colour, `w` is intensity.
    pub emissive_color: Vec4,
    pub roughness: f32,
    pub reflectance: f32,
    pub metalness: f32,
    pub refraction_index: f32,
    pub normal_map_strength: f32,
    pub alpha_ref: f32,

    pub base_color_map_name: String,
    pub normal_map_name: String,
    pub surface_map_name: String,
    pub emissive_map_name: String,
    pub occlusion_map_name: String,

    #[serde(skip)]
    pub textures: MaterialTextures,
    #[serde(skip)]
    pub shader_data: ShaderMaterial,
}

impl Default for MaterialComponent {
    fn default() -> Self {
        Self {
            flags: MaterialFlags::DIRTY | MaterialFlags::CAST_SHADOW,
            alpha_mode: AlphaMode::Opaque,
            base_color: Vec4::ONE,
            emissive_color: Vec4::new(1.0, 1.0, 1.0, 0.0),
            roughness: 0.2,
            reflectance: 0.02,
            metalness: 0.0,
            refraction_index: 0.0,
            normal_map_strength: 1.0,
            alpha_ref: 1.0,
            base_color_map_name: String::new(),
            normal_map_name: String::new(),
            surface_map_name: String::new(),
            emissive_map_name: String::new(),
            occlusion_map_name: String::new(),
            textures: MaterialTextures::default(),
            shader_data: ShaderMaterial::default(),
        }
    }
}

impl MaterialComponent {
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(MaterialFlags::DIRTY)
    }

    pub fn set_dirty(&mut self, value: bool) {
        self.flags.set(MaterialFlags::DIRTY, value);
    }

    pub fn is_cast_shadow(&self) -> bool {
        self.flags.contains(MaterialFlags::CAST_SHADOW)
    }

    pub fn is_double_sided(&self) -> bool {
        self.flags.contains(MaterialFlags::DOUBLE_SIDED)
    }

    pub fn is_transparent(&self) -> bool {
        self.alpha_mode != AlphaMode::Opaque || self.base_color.w < 1.0
    }

    pub fn render_type(&self) -> RenderType {
        if self.flags.contains(MaterialFlags::WATER) {
            RenderType::TRANSPARENT | RenderType::WATER
        } else if self.is_transparent() {
            RenderType::TRANSPARENT
        } else {
            RenderType::OPAQUE
        }
    }

    pub fn set_base_color(&mut self, color: Vec4) {
        self.base_color = color;
        self.set_dirty(true);
    }

    pub fn set_roughness(&mut self, value: f32) {
        self.roughness = value;
        self.set_dirty(true);
    }

    pub fn set_metalness(&mut self, value: f32) {
        self.metalness = value;
        self.set_dirty(true);
    }

    /// Repack `shader_data` from the parameters and clear the dirty flag.
    pub fn update_shader_data(&mut self) {
        let mut options = 0;
        if self.flags.contains(MaterialFlags::USE_VERTEXCOLORS) {
            options |= ShaderMaterial::OPTION_USE_VERTEXCOLORS;
        }
        if self.flags.contains(MaterialFlags::FLIP_NORMALMAP) {
            options |= ShaderMaterial::OPTION_FLIP_NORMALMAP;
        }
        if self.is_double_sided() {
            options |= ShaderMaterial::OPTION_DOUBLE_SIDED;
        }
        if self.textures.normal.is_some() || !self.normal_map_name.is_empty() {
            options |= ShaderMaterial::OPTION_HAS_NORMALMAP;
        }
        self.shader_data = ShaderMaterial {
            base_color: self.base_color.to_array(),
            emissive_color: self.emissive_color.to_array(),
            roughness: self.roughness,
            reflectance: self.reflectance,
            metalness: self.metalness,
            refraction_index: self.refraction_index,
            alpha_ref: self.alpha_ref,
            normal_map_strength: self.normal_map_strength,
            options,
            padding: 0,
        };
        self.set_dirty(false);
    }
}

impl RemapEntities for MaterialComponent {}
