use crate::GraphicsError;
use crate::command::{CommandList, GpuBarrier};
use crate::descriptors::{
    Format, GpuBufferDesc, GraphicsCapabilities, IndexFormat, PipelineStateDesc, QueryHeapDesc,
    RaytracingAsDesc, Rect, RenderPassDesc, SamplerDesc, ShaderFormat, ShaderStage, SwapChainDesc,
    TextureDesc, Viewport,
};
use crate::resources::{
    DeviceChild, GpuAllocation, GpuBuffer, GpuResourceRef, PipelineState, QueryHeap,
    RaytracingAccelerationStructure, Sampler, Shader, SwapChain, Texture,
};

/// Backend-neutral graphics device.
///
/// Creation is fallible and returns `Err` instead of an invalid handle.
/// Recording methods take the [`CommandList`] they append to; each list is
/// owned by one recording thread at a time. Recording problems (bad state,
/// unknown list) never panic: they are reported through [`diagnostics`].
///
/// [`diagnostics`]: GraphicsDevice::diagnostics
pub trait GraphicsDevice: Send + Sync {
    // Creation

    fn create_swap_chain(&self, desc: &SwapChainDesc) -> Result<SwapChain, GraphicsError>;
    fn create_buffer(
        &self,
        desc: &GpuBufferDesc,
        initial_data: Option<&[u8]>,
    ) -> Result<GpuBuffer, GraphicsError>;
    fn create_texture(
        &self,
        desc: &TextureDesc,
        initial_data: Option<&[u8]>,
    ) -> Result<Texture, GraphicsError>;
    fn create_shader(&self, stage: ShaderStage, bytecode: &[u8]) -> Result<Shader, GraphicsError>;
    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Sampler, GraphicsError>;
    fn create_pipeline_state(
        &self,
        desc: &PipelineStateDesc,
    ) -> Result<PipelineState, GraphicsError>;
    fn create_raytracing_acceleration_structure(
        &self,
        desc: &RaytracingAsDesc,
    ) -> Result<RaytracingAccelerationStructure, GraphicsError>;
    fn create_query_heap(&self, desc: &QueryHeapDesc) -> Result<QueryHeap, GraphicsError>;
    fn set_name(&self, resource: &dyn DeviceChild, name: &str);

    // Command lists

    fn begin_command_list(&self) -> CommandList;
    /// Submit every begun list in begin order, present swap chains and
    /// advance to the next frame.
    fn submit_command_lists(&self) -> Result<(), GraphicsError>;
    fn wait_for_gpu(&self);

    // Render passes

    fn render_pass_begin(&self, desc: &RenderPassDesc, cmd: CommandList);
    fn render_pass_begin_swap_chain(&self, swap_chain: &SwapChain, cmd: CommandList);
    fn render_pass_end(&self, cmd: CommandList);

    // Binding

    fn bind_viewports(&self, viewports: &[Viewport], cmd: CommandList);
    fn bind_scissor_rects(&self, rects: &[Rect], cmd: CommandList);
    fn bind_resource(
        &self,
        stage: ShaderStage,
        resource: GpuResourceRef<'_>,
        slot: u32,
        cmd: CommandList,
    );
    fn bind_uav(&self, stage: ShaderStage, resource: GpuResourceRef<'_>, slot: u32, cmd: CommandList);
    fn bind_sampler(&self, stage: ShaderStage, sampler: &Sampler, slot: u32, cmd: CommandList);
    fn bind_constant_buffer(
        &self,
        stage: ShaderStage,
        buffer: &GpuBuffer,
        slot: u32,
        offset: u64,
        cmd: CommandList,
    );
    fn bind_vertex_buffers(
        &self,
        buffers: &[&GpuBuffer],
        slot: u32,
        offsets: &[u64],
        cmd: CommandList,
    );
    fn bind_index_buffer(
        &self,
        buffer: &GpuBuffer,
        format: IndexFormat,
        offset: u64,
        cmd: CommandList,
    );
    fn bind_pipeline_state(&self, pso: &PipelineState, cmd: CommandList);
    fn bind_stencil_ref(&self, value: u32, cmd: CommandList);

    // Work

    fn draw(&self, vertex_count: u32, start_vertex: u32, cmd: CommandList);
    fn draw_indexed(&self, index_count: u32, start_index: u32, base_vertex: i32, cmd: CommandList);
    fn draw_instanced(
        &self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
        cmd: CommandList,
    );
    fn draw_indexed_instanced(
        &self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
        cmd: CommandList,
    );
    fn dispatch(&self, x: u32, y: u32, z: u32, cmd: CommandList);

    // Transfers and synchronisation

    fn barrier(&self, barriers: &[GpuBarrier], cmd: CommandList);
    fn update_buffer(&self, buffer: &GpuBuffer, data: &[u8], cmd: CommandList);
    fn copy_resource(&self, dst: GpuResourceRef<'_>, src: GpuResourceRef<'_>, cmd: CommandList);
    /// Copy `data` into the per-frame upload ring and return where it landed.
    fn allocate_gpu(&self, data: &[u8], cmd: CommandList) -> Result<GpuAllocation, GraphicsError>;
    fn build_raytracing_acceleration_structure(
        &self,
        dst: &RaytracingAccelerationStructure,
        cmd: CommandList,
    );

    // Queries

    fn query_begin(&self, heap: &QueryHeap, index: u32, cmd: CommandList);
    fn query_end(&self, heap: &QueryHeap, index: u32, cmd: CommandList);
    fn query_resolve(
        &self,
        heap: &QueryHeap,
        index: u32,
        count: u32,
        dst: &GpuBuffer,
        cmd: CommandList,
    );

    // Debug annotations

    fn event_begin(&self, name: &str, cmd: CommandList);
    fn event_end(&self, cmd: CommandList);
    fn set_marker(&self, name: &str, cmd: CommandList);

    // Properties

    fn frame_count(&self) -> u64;
    fn shader_format(&self) -> ShaderFormat;
    fn capabilities(&self) -> GraphicsCapabilities;
    fn requires_explicit_barriers(&self) -> bool;
    fn frames_in_flight(&self) -> u32;
    fn is_debug_device(&self) -> bool;
    /// Validation messages collected since the device was created.
    fn diagnostics(&self) -> Vec<String>;

    fn check_capability(&self, capability: GraphicsCapabilities) -> bool {
        self.capabilities().contains(capability)
    }

    fn format_stride(&self, format: Format) -> u32 {
        format.stride()
    }
}
