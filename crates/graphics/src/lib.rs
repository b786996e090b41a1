//! Graphics device abstraction.
//!
//! Resources are created through a [`GraphicsDevice`] and referenced by
//! reference-counted handles. Commands are recorded into [`CommandList`]s
//! (one per recording thread) and submitted together in begin order. The
//! [`HeadlessDevice`] implements the trait by recording and validating
//! instead of talking to a GPU.
//!
//! # Invariants
//! - Creation either returns a valid handle or an `Err`; it never hands out
//!   an invalid handle.
//! - Write states (render target, depth, UAV, copy destination) are never
//!   combined with other states.
//! - A resource referenced by a submitted frame stays alive until that
//!   frame slot is reused `frames_in_flight` submissions later.

mod command;
mod descriptors;
mod device;
mod headless;
mod resources;
mod shader;
mod state;
mod textures;

pub use command::{Command, CommandList, GpuBarrier};
pub use descriptors::{
    AddressMode, BindFlags, BlendMode, BlendState, ClearValue, ComparisonFunc, CullMode,
    DepthStencilState, FillMode, Filter, Format, GpuBufferDesc, GraphicsCapabilities,
    IndexFormat, LoadOp, PipelineStateDesc, PrimitiveTopology, QueryHeapDesc, QueryType,
    RasterizerState, RaytracingAsDesc, RaytracingGeometry, Rect, RenderPassDesc,
    RenderPassFlags, RenderPassImage, RenderPassImageKind, ResourceMiscFlags, ResourceState,
    SamplerDesc, ShaderFormat, ShaderStage, StoreOp, SwapChainDesc, TextureDesc, TextureKind,
    Usage, Viewport,
};
pub use device::GraphicsDevice;
pub use headless::{HeadlessConfig, HeadlessDevice, RecordedCommandList, SubmittedFrame};
pub use resources::{
    DeviceChild, GpuAllocation, GpuBuffer, GpuResourceRef, InternalHandle, PipelineState,
    QueryHeap, RaytracingAccelerationStructure, ResourceId, Sampler, Shader, ShaderInfo,
    SwapChain, Texture,
};
pub use shader::{EmbeddedShaders, ShaderLibrary, ShaderSource, load_shader};
pub use state::{is_shader_readable, validate_transition};
pub use textures::{DefaultTexture, DefaultTextures, texture_or_default};

use std::path::PathBuf;

/// Errors from device creation, validation and shader loading.
#[derive(Debug, thiserror::Error)]
pub enum GraphicsError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("out of GPU memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: u64, available: u64 },
    #[error("resource creation failed: {0}")]
    CreationFailed(String),
    #[error("device lost")]
    DeviceLost,
    #[error("invalid resource transition {before:?} -> {after:?}")]
    InvalidTransition {
        before: ResourceState,
        after: ResourceState,
    },
    #[error("validation failed with {} message(s): {}", .0.len(), .0.join("; "))]
    Validation(Vec<String>),
    #[error("command list {0} was not begun this frame")]
    InvalidCommandList(u32),
    #[error("shader {name} not found at {}", .path.display())]
    ShaderNotFound { name: String, path: PathBuf },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphicsError {
    /// Errors after which the device cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GraphicsError::DeviceLost)
    }
}

pub fn crate_info() -> &'static str {
    "lumen-graphics v0.1.0"
}
