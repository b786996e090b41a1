use crate::descriptors::{
    IndexFormat, LoadOp, Rect, RenderPassImageKind, ResourceState, ShaderStage, Viewport,
};
use crate::resources::{DeviceChild, GpuBuffer, ResourceId, Texture};
use std::fmt;

/// Recording slot handed out by `begin_command_list`. One per recording
/// thread; lists are submitted in the order they were begun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandList(pub u32);

impl fmt::Display for CommandList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd{}", self.0)
    }
}

/// Explicit synchronisation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuBarrier {
    /// Wait for outstanding writes to `resource` (or all resources).
    Memory { resource: Option<ResourceId> },
    Image {
        texture: ResourceId,
        before: ResourceState,
        after: ResourceState,
    },
    Buffer {
        buffer: ResourceId,
        before: ResourceState,
        after: ResourceState,
    },
}

impl GpuBarrier {
    pub fn memory(resource: Option<&dyn DeviceChild>) -> Self {
        GpuBarrier::Memory {
            resource: resource.and_then(DeviceChild::id),
        }
    }

    /// Returns `None` for an invalid texture handle.
    pub fn image(texture: &Texture, before: ResourceState, after: ResourceState) -> Option<Self> {
        Some(GpuBarrier::Image {
            texture: texture.id()?,
            before,
            after,
        })
    }

    pub fn buffer(buffer: &GpuBuffer, before: ResourceState, after: ResourceState) -> Option<Self> {
        Some(GpuBarrier::Buffer {
            buffer: buffer.id()?,
            before,
            after,
        })
    }
}

/// A command as recorded by a recording backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    RenderPassBegin {
        attachments: Vec<(ResourceId, RenderPassImageKind, LoadOp)>,
    },
    RenderPassBeginSwapChain {
        swap_chain: ResourceId,
    },
    RenderPassEnd,
    Barrier {
        resource: ResourceId,
        before: ResourceState,
        after: ResourceState,
    },
    MemoryBarrier {
        resource: Option<ResourceId>,
    },
    BindViewports(Vec<Viewport>),
    BindScissorRects(Vec<Rect>),
    BindResource {
        stage: ShaderStage,
        slot: u32,
        resource: ResourceId,
    },
    BindUav {
        stage: ShaderStage,
        slot: u32,
        resource: ResourceId,
    },
    BindSampler {
        stage: ShaderStage,
        slot: u32,
        sampler: ResourceId,
    },
    BindConstantBuffer {
        stage: ShaderStage,
        slot: u32,
        buffer: ResourceId,
        offset: u64,
    },
    BindVertexBuffers {
        slot: u32,
        buffers: Vec<ResourceId>,
        offsets: Vec<u64>,
    },
    BindIndexBuffer {
        buffer: ResourceId,
        format: IndexFormat,
        offset: u64,
    },
    BindPipelineState(ResourceId),
    BindStencilRef(u32),
    Draw {
        vertex_count: u32,
        start_vertex: u32,
    },
    DrawIndexed {
        index_count: u32,
        start_index: u32,
        base_vertex: i32,
    },
    DrawInstanced {
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    },
    DrawIndexedInstanced {
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    UpdateBuffer {
        buffer: ResourceId,
        size: u64,
    },
    CopyResource {
        dst: ResourceId,
        src: ResourceId,
    },
    BuildAccelerationStructure {
        dst: ResourceId,
    },
    QueryBegin {
        heap: ResourceId,
        index: u32,
    },
    QueryEnd {
        heap: ResourceId,
        index: u32,
    },
    QueryResolve {
        heap: ResourceId,
        index: u32,
        count: u32,
        dst: ResourceId,
    },
    EventBegin(String),
    EventEnd,
    Marker(String),
}

impl Command {
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Command::Draw { .. }
                | Command::DrawIndexed { .. }
                | Command::DrawInstanced { .. }
                | Command::DrawIndexedInstanced { .. }
        )
    }
}
