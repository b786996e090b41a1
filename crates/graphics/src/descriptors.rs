use crate::resources::{GpuBuffer, Shader, Texture};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Texel / element formats understood by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Format {
    #[default]
    Unknown,
    R32G32B32A32Float,
    R32G32B32Float,
    R16G16B16A16Float,
    R16G16B16A16Unorm,
    R32G32Float,
    R10G10B10A2Unorm,
    R11G11B10Float,
    R8G8B8A8Unorm,
    R8G8B8A8UnormSrgb,
    B8G8R8A8Unorm,
    R16G16Float,
    R32Float,
    R32Uint,
    R16Float,
    R16Uint,
    R8Unorm,
    D32Float,
    D32FloatS8X24Uint,
    D24UnormS8Uint,
    D16Unorm,
    Bc1Unorm,
    Bc3Unorm,
    Bc5Unorm,
}

impl Format {
    /// Bytes per element, or per 4x4 block for block-compressed formats.
    pub fn stride(self) -> u32 {
        match self {
            Format::Unknown => 0,
            Format::R32G32B32A32Float => 16,
            Format::R32G32B32Float => 12,
            Format::R16G16B16A16Float | Format::R16G16B16A16Unorm | Format::R32G32Float => 8,
            Format::D32FloatS8X24Uint => 8,
            Format::R10G10B10A2Unorm
            | Format::R11G11B10Float
            | Format::R8G8B8A8Unorm
            | Format::R8G8B8A8UnormSrgb
            | Format::B8G8R8A8Unorm
            | Format::R16G16Float
            | Format::R32Float
            | Format::R32Uint
            | Format::D32Float
            | Format::D24UnormS8Uint => 4,
            Format::R16Float | Format::R16Uint | Format::D16Unorm => 2,
            Format::R8Unorm => 1,
            Format::Bc1Unorm => 8,
            Format::Bc3Unorm | Format::Bc5Unorm => 16,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Format::D32Float | Format::D32FloatS8X24Uint | Format::D24UnormS8Uint | Format::D16Unorm
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Format::D32FloatS8X24Uint | Format::D24UnormS8Uint)
    }

    pub fn is_unorm(self) -> bool {
        matches!(
            self,
            Format::R16G16B16A16Unorm
                | Format::R10G10B10A2Unorm
                | Format::R8G8B8A8Unorm
                | Format::R8G8B8A8UnormSrgb
                | Format::B8G8R8A8Unorm
                | Format::R8Unorm
                | Format::D16Unorm
                | Format::Bc1Unorm
                | Format::Bc3Unorm
                | Format::Bc5Unorm
        )
    }

    pub fn is_block_compressed(self) -> bool {
        matches!(self, Format::Bc1Unorm | Format::Bc3Unorm | Format::Bc5Unorm)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BindFlags: u32 {
        const VERTEX_BUFFER = 1 << 0;
        const INDEX_BUFFER = 1 << 1;
        const CONSTANT_BUFFER = 1 << 2;
        const SHADER_RESOURCE = 1 << 3;
        const RENDER_TARGET = 1 << 4;
        const DEPTH_STENCIL = 1 << 5;
        const UNORDERED_ACCESS = 1 << 6;
        const SHADING_RATE = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceMiscFlags: u32 {
        const SHARED = 1 << 0;
        const TEXTURECUBE = 1 << 1;
        const INDIRECT_ARGS = 1 << 2;
        const BUFFER_RAW = 1 << 3;
        const BUFFER_STRUCTURED = 1 << 4;
        const RAY_TRACING = 1 << 5;
    }
}

bitflags! {
    /// Tracked usage state of a texture or buffer.
    ///
    /// Read states may be combined; write states are exclusive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceState: u32 {
        const UNDEFINED = 0;
        const SHADER_RESOURCE = 1 << 0;
        const SHADER_RESOURCE_COMPUTE = 1 << 1;
        const UNORDERED_ACCESS = 1 << 2;
        const COPY_SRC = 1 << 3;
        const COPY_DST = 1 << 4;
        const RENDERTARGET = 1 << 5;
        const DEPTHSTENCIL = 1 << 6;
        const DEPTHSTENCIL_READONLY = 1 << 7;
        const VERTEX_BUFFER = 1 << 8;
        const INDEX_BUFFER = 1 << 9;
        const CONSTANT_BUFFER = 1 << 10;
        const INDIRECT_ARGUMENT = 1 << 11;
        const RAYTRACING_ACCELERATION_STRUCTURE = 1 << 12;
    }
}

impl ResourceState {
    /// States that may not be combined with any other state.
    pub const EXCLUSIVE: Self = Self::RENDERTARGET
        .union(Self::DEPTHSTENCIL)
        .union(Self::UNORDERED_ACCESS)
        .union(Self::COPY_DST);

    pub const SHADER_READ: Self = Self::SHADER_RESOURCE.union(Self::SHADER_RESOURCE_COMPUTE);

    pub fn is_write(self) -> bool {
        self.intersects(Self::EXCLUSIVE)
    }

    /// Read states implied by a buffer's bind flags.
    pub fn for_buffer(bind: BindFlags) -> Self {
        let mut state = Self::empty();
        if bind.contains(BindFlags::VERTEX_BUFFER) {
            state |= Self::VERTEX_BUFFER;
        }
        if bind.contains(BindFlags::INDEX_BUFFER) {
            state |= Self::INDEX_BUFFER;
        }
        if bind.contains(BindFlags::CONSTANT_BUFFER) {
            state |= Self::CONSTANT_BUFFER;
        }
        if bind.contains(BindFlags::SHADER_RESOURCE) || state.is_empty() {
            state |= Self::SHADER_READ;
        }
        state
    }
}

bitflags! {
    /// Optional device features.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct GraphicsCapabilities: u32 {
        const TESSELLATION = 1 << 0;
        const CONSERVATIVE_RASTERIZATION = 1 << 1;
        const RASTERIZER_ORDERED_VIEWS = 1 << 2;
        const UAV_LOAD_FORMAT_COMMON = 1 << 3;
        const RAYTRACING = 1 << 4;
        const RAYTRACING_INLINE = 1 << 5;
        const VARIABLE_RATE_SHADING = 1 << 6;
        const MESH_SHADER = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Usage {
    #[default]
    Default,
    Upload,
    Readback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ShaderStage {
    Ms,
    As,
    #[default]
    Vs,
    Hs,
    Ds,
    Gs,
    Ps,
    Cs,
    Lib,
}

/// Bytecode flavour a device consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderFormat {
    Hlsl5,
    #[default]
    Hlsl6,
    Spirv,
    Ps5,
    Xbox,
}

impl ShaderFormat {
    pub fn dir_name(self) -> &'static str {
        match self {
            ShaderFormat::Hlsl5 => "hlsl5",
            ShaderFormat::Hlsl6 => "hlsl6",
            ShaderFormat::Spirv => "spirv",
            ShaderFormat::Ps5 => "ps5",
            ShaderFormat::Xbox => "xbox",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ShaderFormat::Spirv => "spv",
            ShaderFormat::Ps5 => "pssl",
            ShaderFormat::Hlsl5 | ShaderFormat::Hlsl6 | ShaderFormat::Xbox => "cso",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureKind {
    Texture1D,
    #[default]
    Texture2D,
    Texture3D,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearValue {
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub array_size: u32,
    pub mip_levels: u32,
    pub format: Format,
    pub sample_count: u32,
    pub usage: Usage,
    pub bind_flags: BindFlags,
    pub misc_flags: ResourceMiscFlags,
    /// State the texture is in right after creation.
    pub layout: ResourceState,
    pub clear: ClearValue,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            kind: TextureKind::Texture2D,
            width: 0,
            height: 0,
            depth: 1,
            array_size: 1,
            mip_levels: 1,
            format: Format::R8G8B8A8Unorm,
            sample_count: 1,
            usage: Usage::Default,
            bind_flags: BindFlags::SHADER_RESOURCE,
            misc_flags: ResourceMiscFlags::empty(),
            layout: ResourceState::SHADER_RESOURCE,
            clear: ClearValue::default(),
        }
    }
}

impl TextureDesc {
    pub fn sampled_2d(width: u32, height: u32, format: Format) -> Self {
        Self {
            width,
            height,
            format,
            ..Self::default()
        }
    }

    pub fn render_target(width: u32, height: u32, format: Format) -> Self {
        Self {
            width,
            height,
            format,
            bind_flags: BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE,
            layout: ResourceState::SHADER_RESOURCE,
            ..Self::default()
        }
    }

    pub fn depth_target(width: u32, height: u32, format: Format) -> Self {
        Self {
            width,
            height,
            format,
            bind_flags: BindFlags::DEPTH_STENCIL | BindFlags::SHADER_RESOURCE,
            layout: ResourceState::DEPTHSTENCIL,
            clear: ClearValue {
                depth: 1.0,
                ..ClearValue::default()
            },
            ..Self::default()
        }
    }

    /// Bytes occupied by the whole mip chain of every array slice.
    pub fn byte_size(&self) -> u64 {
        let stride = u64::from(self.format.stride());
        let block = if self.format.is_block_compressed() { 4 } else { 1 };
        let mut total = 0u64;
        let (mut w, mut h, mut d) = (self.width, self.height, self.depth.max(1));
        for _ in 0..self.mip_levels.max(1) {
            let bw = u64::from(w.div_ceil(block));
            let bh = u64::from(h.div_ceil(block));
            total += bw * bh * u64::from(d) * stride;
            w = (w / 2).max(1);
            h = (h / 2).max(1);
            d = (d / 2).max(1);
        }
        total * u64::from(self.array_size.max(1)) * u64::from(self.sample_count.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GpuBufferDesc {
    pub size: u64,
    pub usage: Usage,
    pub bind_flags: BindFlags,
    pub misc_flags: ResourceMiscFlags,
    /// Element stride for structured buffers.
    pub stride: u32,
    pub format: Format,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    Point,
    #[default]
    Linear,
    Anisotropic,
    ComparisonLinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    #[default]
    Wrap,
    Mirror,
    Clamp,
    Border,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComparisonFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    #[default]
    Always,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub comparison: ComparisonFunc,
    pub border_color: [f32; 4],
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: Filter::Linear,
            address_u: AddressMode::Wrap,
            address_v: AddressMode::Wrap,
            address_w: AddressMode::Wrap,
            mip_lod_bias: 0.0,
            max_anisotropy: 1,
            comparison: ComparisonFunc::Never,
            border_color: [0.0; 4],
            min_lod: 0.0,
            max_lod: f32::MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleStrip,
    PointList,
    LineList,
    LineStrip,
    PatchList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerState {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip_enable: bool,
    pub conservative_rasterization: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::Back,
            front_counter_clockwise: true,
            depth_bias: 0,
            slope_scaled_depth_bias: 0.0,
            depth_clip_enable: true,
            conservative_rasterization: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilState {
    pub depth_enable: bool,
    pub depth_write: bool,
    pub depth_func: ComparisonFunc,
    pub stencil_enable: bool,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write: true,
            depth_func: ComparisonFunc::Less,
            stencil_enable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Opaque,
    Alpha,
    Premultiplied,
    Additive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlendState {
    pub mode: BlendMode,
    pub alpha_to_coverage: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineStateDesc {
    pub vs: Option<Shader>,
    pub ps: Option<Shader>,
    pub hs: Option<Shader>,
    pub ds: Option<Shader>,
    pub gs: Option<Shader>,
    pub ms: Option<Shader>,
    pub r#as: Option<Shader>,
    pub rasterizer: RasterizerState,
    pub depth_stencil: DepthStencilState,
    pub blend: BlendState,
    pub topology: PrimitiveTopology,
    pub sample_count: u32,
}

impl PipelineStateDesc {
    pub fn shaders(&self) -> impl Iterator<Item = &Shader> {
        [&self.vs, &self.ps, &self.hs, &self.ds, &self.gs, &self.ms, &self.r#as]
            .into_iter()
            .flatten()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryType {
    #[default]
    Timestamp,
    Occlusion,
    OcclusionBinary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryHeapDesc {
    pub query_type: QueryType,
    pub query_count: u32,
}

#[derive(Debug, Clone)]
pub struct RaytracingGeometry {
    pub vertex_buffer: GpuBuffer,
    pub vertex_count: u32,
    pub vertex_stride: u32,
    pub index_buffer: GpuBuffer,
    pub index_count: u32,
}

#[derive(Debug, Clone)]
pub enum RaytracingAsDesc {
    BottomLevel { geometries: Vec<RaytracingGeometry> },
    TopLevel { instance_count: u32 },
}

impl Default for RaytracingAsDesc {
    fn default() -> Self {
        RaytracingAsDesc::TopLevel { instance_count: 0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapChainDesc {
    pub width: u32,
    pub height: u32,
    pub buffer_count: u32,
    pub format: Format,
    pub vsync: bool,
    pub fullscreen: bool,
    pub clear_color: [f32; 4],
}

impl Default for SwapChainDesc {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            buffer_count: 2,
            format: Format::R10G10B10A2Unorm,
            vsync: true,
            fullscreen: false,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexFormat {
    U16,
    #[default]
    U32,
}

impl IndexFormat {
    pub fn stride(self) -> u32 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPassImageKind {
    RenderTarget,
    DepthStencil,
    Resolve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadOp {
    #[default]
    Load,
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreOp {
    #[default]
    Store,
    DontCare,
}

/// One attachment of a render pass together with its layout before, during
/// and after the pass.
#[derive(Debug, Clone)]
pub struct RenderPassImage {
    pub kind: RenderPassImageKind,
    pub texture: Texture,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub layout_before: ResourceState,
    pub layout: ResourceState,
    pub layout_after: ResourceState,
}

impl RenderPassImage {
    pub fn render_target(texture: &Texture, load_op: LoadOp) -> Self {
        Self {
            kind: RenderPassImageKind::RenderTarget,
            texture: texture.clone(),
            load_op,
            store_op: StoreOp::Store,
            layout_before: ResourceState::SHADER_RESOURCE,
            layout: ResourceState::RENDERTARGET,
            layout_after: ResourceState::SHADER_RESOURCE,
        }
    }

    pub fn depth_stencil(texture: &Texture, load_op: LoadOp, store_op: StoreOp) -> Self {
        Self {
            kind: RenderPassImageKind::DepthStencil,
            texture: texture.clone(),
            load_op,
            store_op,
            layout_before: ResourceState::DEPTHSTENCIL,
            layout: ResourceState::DEPTHSTENCIL,
            layout_after: ResourceState::DEPTHSTENCIL,
        }
    }

    pub fn resolve(texture: &Texture) -> Self {
        Self {
            kind: RenderPassImageKind::Resolve,
            texture: texture.clone(),
            load_op: LoadOp::DontCare,
            store_op: StoreOp::Store,
            layout_before: ResourceState::SHADER_RESOURCE,
            layout: ResourceState::COPY_DST,
            layout_after: ResourceState::SHADER_RESOURCE,
        }
    }

    pub fn with_layouts(
        mut self,
        before: ResourceState,
        during: ResourceState,
        after: ResourceState,
    ) -> Self {
        self.layout_before = before;
        self.layout = during;
        self.layout_after = after;
        self
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RenderPassFlags: u32 {
        const ALLOW_UAV_WRITES = 1 << 0;
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderPassDesc {
    pub images: Vec<RenderPassImage>,
    pub flags: RenderPassFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_properties() {
        assert_eq!(Format::R8G8B8A8Unorm.stride(), 4);
        assert_eq!(Format::R32G32B32A32Float.stride(), 16);
        assert!(Format::D32Float.is_depth());
        assert!(!Format::D32Float.has_stencil());
        assert!(Format::D24UnormS8Uint.has_stencil());
        assert!(Format::R8G8B8A8Unorm.is_unorm());
        assert!(!Format::R16G16B16A16Float.is_unorm());
    }

    #[test]
    fn texture_byte_size_includes_mips() {
        let mut desc = TextureDesc::sampled_2d(4, 4, Format::R8G8B8A8Unorm);
        assert_eq!(desc.byte_size(), 64);
        desc.mip_levels = 3;
        assert_eq!(desc.byte_size(), 64 + 16 + 4);
    }

    #[test]
    fn buffer_state_from_bind_flags() {
        let s = ResourceState::for_buffer(BindFlags::VERTEX_BUFFER | BindFlags::INDEX_BUFFER);
        assert!(s.contains(ResourceState::VERTEX_BUFFER | ResourceState::INDEX_BUFFER));
        assert!(!s.is_write());
        assert!(ResourceState::for_buffer(BindFlags::empty()).contains(ResourceState::SHADER_RESOURCE));
    }

    #[test]
    fn shader_format_paths() {
        assert_eq!(ShaderFormat::Spirv.extension(), "spv");
        assert_eq!(ShaderFormat::Hlsl6.dir_name(), "hlsl6");
    }
}
