use crate::GraphicsError;
use crate::command::{Command, CommandList, GpuBarrier};
use crate::descriptors::{
    Format, GpuBufferDesc, GraphicsCapabilities, IndexFormat, PipelineStateDesc, QueryHeapDesc,
    RaytracingAsDesc, Rect, RenderPassDesc, ResourceState, SamplerDesc, ShaderFormat, ShaderStage,
    SwapChainDesc, TextureDesc, Usage, Viewport, BindFlags,
};
use crate::device::GraphicsDevice;
use crate::resources::{
    DeviceChild, GpuAllocation, GpuBuffer, GpuResourceRef, InternalHandle, PipelineState,
    QueryHeap, RaytracingAccelerationStructure, ResourceId, Sampler, Shader, ShaderInfo,
    SwapChain, Texture,
};
use crate::state::{is_shader_readable, validate_transition};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

const UPLOAD_ALIGNMENT: u64 = 256;
const BLAS_BYTES_PER_GEOMETRY: u64 = 4096;
const TLAS_BYTES_PER_INSTANCE: u64 = 64;
const MAX_STORED_DIAGNOSTICS: usize = 1024;

/// Behaviour switches of the recording backend.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Behave like an explicit-barrier API: render passes record their own
    /// layout transitions.
    pub explicit_barriers: bool,
    /// Fail `submit_command_lists` when the frame produced validation
    /// messages.
    pub debug: bool,
    pub frames_in_flight: u32,
    /// Bytes of resource memory the device may hand out.
    pub memory_budget: u64,
    /// Bytes of the per-frame upload ring.
    pub upload_buffer_size: u64,
    pub shader_format: ShaderFormat,
    pub capabilities: GraphicsCapabilities,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            explicit_barriers: true,
            debug: false,
            frames_in_flight: 2,
            memory_budget: 512 * 1024 * 1024,
            upload_buffer_size: 4 * 1024 * 1024,
            shader_format: ShaderFormat::Hlsl6,
            capabilities: GraphicsCapabilities::RAYTRACING | GraphicsCapabilities::UAV_LOAD_FORMAT_COMMON,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryLedger {
    used: AtomicU64,
    live: AtomicUsize,
}

/// Backend object behind every headless handle; returns its bytes to the
/// ledger when the last reference goes away.
#[derive(Debug)]
struct Allocation {
    size: u64,
    ledger: Arc<MemoryLedger>,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.ledger.used.fetch_sub(self.size, Ordering::AcqRel);
        self.ledger.live.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCommandList {
    pub id: CommandList,
    pub commands: Vec<Command>,
}

/// Everything one `submit_command_lists` call consumed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmittedFrame {
    pub frame_index: u64,
    /// In submission (= begin) order.
    pub command_lists: Vec<RecordedCommandList>,
    pub presented: Vec<ResourceId>,
    pub diagnostics: Vec<String>,
}

impl SubmittedFrame {
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.command_lists.iter().flat_map(|l| l.commands.iter())
    }

    pub fn draw_count(&self) -> usize {
        self.commands().filter(|c| c.is_draw()).count()
    }

    /// Names of debug events in submission order.
    pub fn events(&self) -> Vec<&str> {
        self.commands()
            .filter_map(|c| match c {
                Command::EventBegin(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

struct ActivePass {
    /// (texture, state during the pass, state after the pass)
    images: Vec<(ResourceId, ResourceState, ResourceState)>,
}

#[derive(Default)]
struct ListState {
    commands: Vec<Command>,
    states: HashMap<ResourceId, ResourceState>,
    references: HashMap<ResourceId, InternalHandle>,
    pass: Option<ActivePass>,
    presents: Vec<ResourceId>,
    diagnostics: Vec<String>,
    event_depth: u32,
}

impl ListState {
    fn state_of(&self, global: &HashMap<ResourceId, ResourceState>, id: ResourceId) -> ResourceState {
        self.states
            .get(&id)
            .or_else(|| global.get(&id))
            .copied()
            .unwrap_or(ResourceState::UNDEFINED)
    }

    fn reference(&mut self, handle: Option<&InternalHandle>) -> Option<ResourceId> {
        let handle = handle?;
        self.references
            .entry(handle.id())
            .or_insert_with(|| handle.clone());
        Some(handle.id())
    }

    fn report(&mut self, message: String) {
        tracing::debug!(%message, "graphics validation");
        self.diagnostics.push(message);
    }

    fn require_state(
        &mut self,
        global: &HashMap<ResourceId, ResourceState>,
        id: ResourceId,
        required: ResourceState,
        usage: &str,
    ) {
        let state = self.state_of(global, id);
        if !state.intersects(required) {
            self.report(format!("{id} used as {usage} while in {state:?}"));
        }
    }
}

struct Inner {
    states: HashMap<ResourceId, ResourceState>,
    names: HashMap<ResourceId, String>,
    lists: Vec<ListState>,
    in_flight: Vec<Vec<InternalHandle>>,
    upload_rings: Vec<GpuBuffer>,
    upload_offset: u64,
    last_frame: Option<SubmittedFrame>,
    diagnostics: Vec<String>,
}

/// Software backend that records commands instead of executing them.
///
/// It tracks resource states per command list, validates transitions and
/// bindings, accounts memory against a budget and keeps resources used by a
/// frame alive until that frame slot is reused.
pub struct HeadlessDevice {
    config: HeadlessConfig,
    next_id: AtomicU64,
    frame_count: AtomicU64,
    ledger: Arc<MemoryLedger>,
    inner: Mutex<Inner>,
}

impl HeadlessDevice {
    pub fn new(config: HeadlessConfig) -> Result<Self, GraphicsError> {
        if config.frames_in_flight == 0 {
            return Err(GraphicsError::InvalidParameter(
                "frames_in_flight must be at least 1".into(),
            ));
        }
        let frames = config.frames_in_flight as usize;
        let device = Self {
            next_id: AtomicU64::new(1),
            frame_count: AtomicU64::new(0),
            ledger: Arc::new(MemoryLedger::default()),
            inner: Mutex::new(Inner {
                states: HashMap::new(),
                names: HashMap::new(),
                lists: Vec::new(),
                in_flight: vec![Vec::new(); frames],
                upload_rings: Vec::with_capacity(frames),
                upload_offset: 0,
                last_frame: None,
                diagnostics: Vec::new(),
            }),
            config,
        };
        let ring_desc = GpuBufferDesc {
            size: device.config.upload_buffer_size,
            usage: Usage::Upload,
            bind_flags: BindFlags::VERTEX_BUFFER
                | BindFlags::INDEX_BUFFER
                | BindFlags::CONSTANT_BUFFER
                | BindFlags::SHADER_RESOURCE,
            ..GpuBufferDesc::default()
        };
        let mut rings = Vec::with_capacity(frames);
        for i in 0..frames {
            let ring = device.create_buffer(&ring_desc, None)?;
            device.set_name(&ring, &format!("upload_ring_{i}"));
            rings.push(ring);
        }
        device.inner.lock().upload_rings = rings;
        tracing::info!(
            explicit_barriers = device.config.explicit_barriers,
            debug = device.config.debug,
            frames_in_flight = frames,
            "headless graphics device created"
        );
        Ok(device)
    }

    pub fn config(&self) -> &HeadlessConfig {
        &self.config
    }

    /// Bytes currently held by live resources.
    pub fn memory_usage(&self) -> u64 {
        self.ledger.used.load(Ordering::Acquire)
    }

    pub fn live_resources(&self) -> usize {
        self.ledger.live.load(Ordering::Acquire)
    }

    /// State as of the last submission.
    pub fn resource_state(&self, resource: &dyn DeviceChild) -> Option<ResourceState> {
        let id = resource.id()?;
        self.inner.lock().states.get(&id).copied()
    }

    pub fn resource_name(&self, resource: &dyn DeviceChild) -> Option<String> {
        let id = resource.id()?;
        self.inner.lock().names.get(&id).cloned()
    }

    pub fn last_submitted_frame(&self) -> Option<SubmittedFrame> {
        self.inner.lock().last_frame.clone()
    }

    fn allocate_handle(&self, size: u64) -> Result<InternalHandle, GraphicsError> {
        let budget = self.config.memory_budget;
        self.ledger
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size).filter(|total| *total <= budget)
            })
            .map_err(|used| GraphicsError::OutOfMemory {
                requested: size,
                available: budget.saturating_sub(used),
            })?;
        self.ledger.live.fetch_add(1, Ordering::AcqRel);
        let id = ResourceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let state = Arc::new(Allocation {
            size,
            ledger: Arc::clone(&self.ledger),
        });
        Ok(InternalHandle::new(id, state))
    }

    fn track(&self, id: ResourceId, state: ResourceState) {
        self.inner.lock().states.insert(id, state);
    }

    fn with_list(
        &self,
        cmd: CommandList,
        f: impl FnOnce(&mut ListState, &HashMap<ResourceId, ResourceState>),
    ) {
        let mut inner = self.inner.lock();
        let Inner {
            lists,
            states,
            diagnostics,
            ..
        } = &mut *inner;
        match lists.get_mut(cmd.0 as usize) {
            Some(list) => f(list, states),
            None => {
                let message = format!("{cmd} was not begun this frame");
                tracing::warn!(%message, "graphics validation");
                push_capped(diagnostics, message);
            }
        }
    }

    fn push(&self, cmd: CommandList, command: Command) {
        self.with_list(cmd, |list, _| list.commands.push(command));
    }
}

fn push_capped(diagnostics: &mut Vec<String>, message: String) {
    if diagnostics.len() < MAX_STORED_DIAGNOSTICS {
        diagnostics.push(message);
    }
}

fn invalid_handle(list: &mut ListState, operation: &str) {
    list.report(format!("{operation} called with an invalid handle"));
}

impl GraphicsDevice for HeadlessDevice {
    fn create_swap_chain(&self, desc: &SwapChainDesc) -> Result<SwapChain, GraphicsError> {
        if desc.width == 0 || desc.height == 0 || desc.buffer_count == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "swap chain {}x{} with {} buffers",
                desc.width, desc.height, desc.buffer_count
            )));
        }
        let size = u64::from(desc.width)
            * u64::from(desc.height)
            * u64::from(desc.format.stride())
            * u64::from(desc.buffer_count);
        let handle = self.allocate_handle(size)?;
        Ok(SwapChain::new(handle, desc.clone()))
    }

    fn create_buffer(
        &self,
        desc: &GpuBufferDesc,
        initial_data: Option<&[u8]>,
    ) -> Result<GpuBuffer, GraphicsError> {
        if desc.size == 0 {
            return Err(GraphicsError::InvalidParameter("buffer size is zero".into()));
        }
        if let Some(data) = initial_data
            && data.len() as u64 > desc.size
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "initial data of {} bytes exceeds buffer size {}",
                data.len(),
                desc.size
            )));
        }
        let handle = self.allocate_handle(desc.size)?;
        self.track(handle.id(), ResourceState::for_buffer(desc.bind_flags));
        Ok(GpuBuffer::new(handle, desc.clone()))
    }

    fn create_texture(
        &self,
        desc: &TextureDesc,
        initial_data: Option<&[u8]>,
    ) -> Result<Texture, GraphicsError> {
        if desc.width == 0
            || desc.height == 0
            || desc.depth == 0
            || desc.array_size == 0
            || desc.mip_levels == 0
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture dimensions {}x{}x{} (array {}, mips {})",
                desc.width, desc.height, desc.depth, desc.array_size, desc.mip_levels
            )));
        }
        if desc.format == Format::Unknown {
            return Err(GraphicsError::InvalidParameter("texture format is unknown".into()));
        }
        if let Some(data) = initial_data {
            let first = TextureDesc {
                mip_levels: 1,
                array_size: 1,
                sample_count: 1,
                ..desc.clone()
            };
            if (data.len() as u64) < first.byte_size() {
                return Err(GraphicsError::InvalidParameter(format!(
                    "initial data of {} bytes is smaller than the first subresource ({})",
                    data.len(),
                    first.byte_size()
                )));
            }
        }
        let handle = self.allocate_handle(desc.byte_size())?;
        self.track(handle.id(), desc.layout);
        tracing::trace!(id = %handle.id(), w = desc.width, h = desc.height, "texture created");
        Ok(Texture::new(handle, desc.clone()))
    }

    fn create_shader(&self, stage: ShaderStage, bytecode: &[u8]) -> Result<Shader, GraphicsError> {
        if bytecode.is_empty() {
            return Err(GraphicsError::InvalidParameter("shader bytecode is empty".into()));
        }
        let handle = self.allocate_handle(bytecode.len() as u64)?;
        Ok(Shader::new(
            handle,
            ShaderInfo {
                stage,
                bytecode_len: bytecode.len(),
            },
        ))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Sampler, GraphicsError> {
        if desc.max_anisotropy == 0 || desc.max_anisotropy > 16 {
            return Err(GraphicsError::InvalidParameter(format!(
                "max_anisotropy {} outside 1..=16",
                desc.max_anisotropy
            )));
        }
        let handle = self.allocate_handle(0)?;
        Ok(Sampler::new(handle, desc.clone()))
    }

    fn create_pipeline_state(
        &self,
        desc: &PipelineStateDesc,
    ) -> Result<PipelineState, GraphicsError> {
        if desc.shaders().next().is_none() {
            return Err(GraphicsError::InvalidParameter(
                "pipeline state without shaders".into(),
            ));
        }
        if desc.shaders().any(|s| !s.is_valid()) {
            return Err(GraphicsError::CreationFailed(
                "pipeline state references an invalid shader".into(),
            ));
        }
        let handle = self.allocate_handle(0)?;
        Ok(PipelineState::new(handle, desc.clone()))
    }

    fn create_raytracing_acceleration_structure(
        &self,
        desc: &RaytracingAsDesc,
    ) -> Result<RaytracingAccelerationStructure, GraphicsError> {
        if !self.check_capability(GraphicsCapabilities::RAYTRACING) {
            return Err(GraphicsError::CreationFailed(
                "raytracing is not supported by this device".into(),
            ));
        }
        let size = match desc {
            RaytracingAsDesc::BottomLevel { geometries } => {
                if geometries.is_empty() {
                    return Err(GraphicsError::InvalidParameter(
                        "bottom level acceleration structure without geometry".into(),
                    ));
                }
                geometries.len() as u64 * BLAS_BYTES_PER_GEOMETRY
            }
            RaytracingAsDesc::TopLevel { instance_count } => {
                u64::from((*instance_count).max(1)) * TLAS_BYTES_PER_INSTANCE
            }
        };
        let handle = self.allocate_handle(size)?;
        self.track(handle.id(), ResourceState::RAYTRACING_ACCELERATION_STRUCTURE);
        Ok(RaytracingAccelerationStructure::new(handle, desc.clone()))
    }

    fn create_query_heap(&self, desc: &QueryHeapDesc) -> Result<QueryHeap, GraphicsError> {
        if desc.query_count == 0 {
            return Err(GraphicsError::InvalidParameter("query heap with zero queries".into()));
        }
        let handle = self.allocate_handle(u64::from(desc.query_count) * 8)?;
        Ok(QueryHeap::new(handle, *desc))
    }

    fn set_name(&self, resource: &dyn DeviceChild, name: &str) {
        if let Some(id) = resource.id() {
            self.inner.lock().names.insert(id, name.to_string());
        }
    }

    fn begin_command_list(&self) -> CommandList {
        let mut inner = self.inner.lock();
        inner.lists.push(ListState::default());
        CommandList((inner.lists.len() - 1) as u32)
    }

    fn submit_command_lists(&self) -> Result<(), GraphicsError> {
        let _span = tracing::info_span!("submit").entered();
        let frame_index = self.frame_count.load(Ordering::Acquire);
        let mut inner = self.inner.lock();
        let lists = std::mem::take(&mut inner.lists);
        let mut frame = SubmittedFrame {
            frame_index,
            ..SubmittedFrame::default()
        };
        let mut retained = Vec::new();
        for (i, mut list) in lists.into_iter().enumerate() {
            let id = CommandList(i as u32);
            if list.pass.is_some() {
                list.report(format!("{id}: render pass was not ended before submit"));
            }
            if list.event_depth != 0 {
                list.report(format!("{id}: {} debug event(s) left open", list.event_depth));
            }
            inner.states.extend(list.states);
            retained.extend(list.references.into_values());
            frame.presented.extend(list.presents);
            frame.diagnostics.extend(list.diagnostics);
            frame.command_lists.push(RecordedCommandList {
                id,
                commands: list.commands,
            });
        }

        let slot = (frame_index % u64::from(self.config.frames_in_flight)) as usize;
        let released = std::mem::replace(&mut inner.in_flight[slot], retained);
        tracing::debug!(
            frame = frame_index,
            lists = frame.command_lists.len(),
            released = released.len(),
            "frame submitted"
        );
        drop(released);
        inner.upload_offset = 0;
        for message in &frame.diagnostics {
            push_capped(&mut inner.diagnostics, message.clone());
        }
        let diagnostics = frame.diagnostics.clone();
        inner.last_frame = Some(frame);
        drop(inner);
        self.frame_count.fetch_add(1, Ordering::AcqRel);

        if self.config.debug && !diagnostics.is_empty() {
            return Err(GraphicsError::Validation(diagnostics));
        }
        Ok(())
    }

    fn wait_for_gpu(&self) {
        let mut inner = self.inner.lock();
        for slot in &mut inner.in_flight {
            slot.clear();
        }
    }

    fn render_pass_begin(&self, desc: &RenderPassDesc, cmd: CommandList) {
        let explicit = self.config.explicit_barriers;
        self.with_list(cmd, |list, global| {
            if list.pass.is_some() {
                list.report(format!("{cmd}: render pass begun inside another render pass"));
            }
            let mut attachments = Vec::with_capacity(desc.images.len());
            let mut images = Vec::with_capacity(desc.images.len());
            for image in &desc.images {
                let Some(id) = list.reference(image.texture.internal()) else {
                    invalid_handle(list, "render_pass_begin");
                    continue;
                };
                let current = list.state_of(global, id);
                if current != image.layout_before {
                    list.report(format!(
                        "{id}: render pass expects {:?} but the resource is in {current:?}",
                        image.layout_before
                    ));
                }
                if explicit && current != image.layout {
                    list.commands.push(Command::Barrier {
                        resource: id,
                        before: current,
                        after: image.layout,
                    });
                }
                list.states.insert(id, image.layout);
                attachments.push((id, image.kind, image.load_op));
                images.push((id, image.layout, image.layout_after));
            }
            list.commands.push(Command::RenderPassBegin { attachments });
            list.pass = Some(ActivePass { images });
        });
    }

    fn render_pass_begin_swap_chain(&self, swap_chain: &SwapChain, cmd: CommandList) {
        self.with_list(cmd, |list, _| {
            let Some(id) = list.reference(swap_chain.internal()) else {
                invalid_handle(list, "render_pass_begin_swap_chain");
                return;
            };
            if list.pass.is_some() {
                list.report(format!("{cmd}: render pass begun inside another render pass"));
            }
            list.commands.push(Command::RenderPassBeginSwapChain { swap_chain: id });
            if !list.presents.contains(&id) {
                list.presents.push(id);
            }
            list.pass = Some(ActivePass { images: Vec::new() });
        });
    }

    fn render_pass_end(&self, cmd: CommandList) {
        let explicit = self.config.explicit_barriers;
        self.with_list(cmd, |list, _| {
            let Some(pass) = list.pass.take() else {
                list.report(format!("{cmd}: render_pass_end without an active render pass"));
                return;
            };
            list.commands.push(Command::RenderPassEnd);
            for (id, during, after) in pass.images {
                if explicit && during != after {
                    list.commands.push(Command::Barrier {
                        resource: id,
                        before: during,
                        after,
                    });
                }
                list.states.insert(id, after);
            }
        });
    }

    fn bind_viewports(&self, viewports: &[Viewport], cmd: CommandList) {
        self.push(cmd, Command::BindViewports(viewports.to_vec()));
    }

    fn bind_scissor_rects(&self, rects: &[Rect], cmd: CommandList) {
        self.push(cmd, Command::BindScissorRects(rects.to_vec()));
    }

    fn bind_resource(
        &self,
        stage: ShaderStage,
        resource: GpuResourceRef<'_>,
        slot: u32,
        cmd: CommandList,
    ) {
        self.with_list(cmd, |list, global| {
            let Some(id) = list.reference(resource.internal()) else {
                invalid_handle(list, "bind_resource");
                return;
            };
            let state = list.state_of(global, id);
            let readable = matches!(resource, GpuResourceRef::AccelerationStructure(_))
                || is_shader_readable(state);
            if !readable {
                list.report(format!(
                    "{id} bound as shader resource ({stage:?} slot {slot}) while in {state:?}"
                ));
            }
            list.commands.push(Command::BindResource {
                stage,
                slot,
                resource: id,
            });
        });
    }

    fn bind_uav(&self, stage: ShaderStage, resource: GpuResourceRef<'_>, slot: u32, cmd: CommandList) {
        self.with_list(cmd, |list, global| {
            let Some(id) = list.reference(resource.internal()) else {
                invalid_handle(list, "bind_uav");
                return;
            };
            list.require_state(global, id, ResourceState::UNORDERED_ACCESS, "unordered access view");
            list.commands.push(Command::BindUav {
                stage,
                slot,
                resource: id,
            });
        });
    }

    fn bind_sampler(&self, stage: ShaderStage, sampler: &Sampler, slot: u32, cmd: CommandList) {
        self.with_list(cmd, |list, _| {
            let Some(id) = list.reference(sampler.internal()) else {
                invalid_handle(list, "bind_sampler");
                return;
            };
            list.commands.push(Command::BindSampler {
                stage,
                slot,
                sampler: id,
            });
        });
    }

    fn bind_constant_buffer(
        &self,
        stage: ShaderStage,
        buffer: &GpuBuffer,
        slot: u32,
        offset: u64,
        cmd: CommandList,
    ) {
        self.with_list(cmd, |list, global| {
            let Some(id) = list.reference(buffer.internal()) else {
                invalid_handle(list, "bind_constant_buffer");
                return;
            };
            list.require_state(global, id, ResourceState::CONSTANT_BUFFER, "constant buffer");
            list.commands.push(Command::BindConstantBuffer {
                stage,
                slot,
                buffer: id,
                offset,
            });
        });
    }

    fn bind_vertex_buffers(
        &self,
        buffers: &[&GpuBuffer],
        slot: u32,
        offsets: &[u64],
        cmd: CommandList,
    ) {
        self.with_list(cmd, |list, global| {
            let mut ids = Vec::with_capacity(buffers.len());
            for buffer in buffers {
                let Some(id) = list.reference(buffer.internal()) else {
                    invalid_handle(list, "bind_vertex_buffers");
                    return;
                };
                list.require_state(global, id, ResourceState::VERTEX_BUFFER, "vertex buffer");
                ids.push(id);
            }
            let mut offsets = offsets.to_vec();
            offsets.resize(ids.len(), 0);
            list.commands.push(Command::BindVertexBuffers {
                slot,
                buffers: ids,
                offsets,
            });
        });
    }

    fn bind_index_buffer(
        &self,
        buffer: &GpuBuffer,
        format: IndexFormat,
        offset: u64,
        cmd: CommandList,
    ) {
        self.with_list(cmd, |list, global| {
            let Some(id) = list.reference(buffer.internal()) else {
                invalid_handle(list, "bind_index_buffer");
                return;
            };
            list.require_state(global, id, ResourceState::INDEX_BUFFER, "index buffer");
            list.commands.push(Command::BindIndexBuffer {
                buffer: id,
                format,
                offset,
            });
        });
    }

    fn bind_pipeline_state(&self, pso: &PipelineState, cmd: CommandList) {
        self.with_list(cmd, |list, _| {
            let Some(id) = list.reference(pso.internal()) else {
                invalid_handle(list, "bind_pipeline_state");
                return;
            };
            list.commands.push(Command::BindPipelineState(id));
        });
    }

    fn bind_stencil_ref(&self, value: u32, cmd: CommandList) {
        self.push(cmd, Command::BindStencilRef(value));
    }

    fn draw(&self, vertex_count: u32, start_vertex: u32, cmd: CommandList) {
        self.with_list(cmd, |list, _| {
            record_draw(
                list,
                Command::Draw {
                    vertex_count,
                    start_vertex,
                },
            )
        });
    }

    fn draw_indexed(&self, index_count: u32, start_index: u32, base_vertex: i32, cmd: CommandList) {
        self.with_list(cmd, |list, _| {
            record_draw(
                list,
                Command::DrawIndexed {
                    index_count,
                    start_index,
                    base_vertex,
                },
            )
        });
    }

    fn draw_instanced(
        &self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
        cmd: CommandList,
    ) {
        self.with_list(cmd, |list, _| {
            record_draw(
                list,
                Command::DrawInstanced {
                    vertex_count,
                    instance_count,
                    start_vertex,
                    start_instance,
                },
            )
        });
    }

    fn draw_indexed_instanced(
        &self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
        cmd: CommandList,
    ) {
        self.with_list(cmd, |list, _| {
            record_draw(
                list,
                Command::DrawIndexedInstanced {
                    index_count,
                    instance_count,
                    start_index,
                    base_vertex,
                    start_instance,
                },
            )
        });
    }

    fn dispatch(&self, x: u32, y: u32, z: u32, cmd: CommandList) {
        self.with_list(cmd, |list, _| {
            if list.pass.is_some() {
                list.report(format!("{cmd}: dispatch inside a render pass"));
            }
            list.commands.push(Command::Dispatch { x, y, z });
        });
    }

    fn barrier(&self, barriers: &[GpuBarrier], cmd: CommandList) {
        self.with_list(cmd, |list, global| {
            for barrier in barriers {
                let (id, before, after) = match *barrier {
                    GpuBarrier::Memory { resource } => {
                        list.commands.push(Command::MemoryBarrier { resource });
                        continue;
                    }
                    GpuBarrier::Image {
                        texture,
                        before,
                        after,
                    } => (texture, before, after),
                    GpuBarrier::Buffer {
                        buffer,
                        before,
                        after,
                    } => (buffer, before, after),
                };
                if let Err(err) = validate_transition(before, after) {
                    list.report(format!("{id}: {err}"));
                    continue;
                }
                let current = list.state_of(global, id);
                if current != before && !before.is_empty() {
                    list.report(format!(
                        "{id}: barrier expects {before:?} but the resource is in {current:?}"
                    ));
                }
                list.states.insert(id, after);
                list.commands.push(Command::Barrier {
                    resource: id,
                    before,
                    after,
                });
            }
        });
    }

    fn update_buffer(&self, buffer: &GpuBuffer, data: &[u8], cmd: CommandList) {
        self.with_list(cmd, |list, _| {
            let Some(id) = list.reference(buffer.internal()) else {
                invalid_handle(list, "update_buffer");
                return;
            };
            if data.len() as u64 > buffer.desc.size {
                list.report(format!(
                    "{id}: update of {} bytes exceeds buffer size {}",
                    data.len(),
                    buffer.desc.size
                ));
                return;
            }
            list.commands.push(Command::UpdateBuffer {
                buffer: id,
                size: data.len() as u64,
            });
        });
    }

    fn copy_resource(&self, dst: GpuResourceRef<'_>, src: GpuResourceRef<'_>, cmd: CommandList) {
        self.with_list(cmd, |list, _| {
            let (Some(dst), Some(src)) = (
                list.reference(dst.internal()),
                list.reference(src.internal()),
            ) else {
                invalid_handle(list, "copy_resource");
                return;
            };
            list.commands.push(Command::CopyResource { dst, src });
        });
    }

    fn allocate_gpu(&self, data: &[u8], cmd: CommandList) -> Result<GpuAllocation, GraphicsError> {
        let frame = self.frame_count.load(Ordering::Acquire);
        let mut inner = self.inner.lock();
        let index = cmd.0 as usize;
        if index >= inner.lists.len() {
            return Err(GraphicsError::InvalidCommandList(cmd.0));
        }
        let slot = (frame % u64::from(self.config.frames_in_flight)) as usize;
        let ring = inner
            .upload_rings
            .get(slot)
            .cloned()
            .ok_or_else(|| GraphicsError::CreationFailed("upload ring is missing".into()))?;
        let size = data.len() as u64;
        let offset = inner.upload_offset.next_multiple_of(UPLOAD_ALIGNMENT);
        if offset + size > ring.desc.size {
            return Err(GraphicsError::OutOfMemory {
                requested: size,
                available: ring.desc.size.saturating_sub(offset),
            });
        }
        inner.upload_offset = offset + size;
        inner.lists[index].reference(ring.internal());
        Ok(GpuAllocation {
            buffer: ring,
            offset,
            size,
        })
    }

    fn build_raytracing_acceleration_structure(
        &self,
        dst: &RaytracingAccelerationStructure,
        cmd: CommandList,
    ) {
        let supported = self.check_capability(GraphicsCapabilities::RAYTRACING);
        self.with_list(cmd, |list, _| {
            let Some(id) = list.reference(dst.internal()) else {
                invalid_handle(list, "build_raytracing_acceleration_structure");
                return;
            };
            if !supported {
                list.report(format!("{id}: raytracing is not supported by this device"));
                return;
            }
            list.commands.push(Command::BuildAccelerationStructure { dst: id });
        });
    }

    fn query_begin(&self, heap: &QueryHeap, index: u32, cmd: CommandList) {
        self.with_list(cmd, |list, _| {
            if let Some(id) = check_query(list, heap, index, 1) {
                list.commands.push(Command::QueryBegin { heap: id, index });
            }
        });
    }

    fn query_end(&self, heap: &QueryHeap, index: u32, cmd: CommandList) {
        self.with_list(cmd, |list, _| {
            if let Some(id) = check_query(list, heap, index, 1) {
                list.commands.push(Command::QueryEnd { heap: id, index });
            }
        });
    }

    fn query_resolve(
        &self,
        heap: &QueryHeap,
        index: u32,
        count: u32,
        dst: &GpuBuffer,
        cmd: CommandList,
    ) {
        self.with_list(cmd, |list, _| {
            let Some(heap_id) = check_query(list, heap, index, count) else {
                return;
            };
            let Some(dst) = list.reference(dst.internal()) else {
                invalid_handle(list, "query_resolve");
                return;
            };
            list.commands.push(Command::QueryResolve {
                heap: heap_id,
                index,
                count,
                dst,
            });
        });
    }

    fn event_begin(&self, name: &str, cmd: CommandList) {
        self.with_list(cmd, |list, _| {
            list.event_depth += 1;
            list.commands.push(Command::EventBegin(name.to_string()));
        });
    }

    fn event_end(&self, cmd: CommandList) {
        self.with_list(cmd, |list, _| {
            if list.event_depth == 0 {
                list.report(format!("{cmd}: event_end without event_begin"));
                return;
            }
            list.event_depth -= 1;
            list.commands.push(Command::EventEnd);
        });
    }

    fn set_marker(&self, name: &str, cmd: CommandList) {
        self.push(cmd, Command::Marker(name.to_string()));
    }

    fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Acquire)
    }

    fn shader_format(&self) -> ShaderFormat {
        self.config.shader_format
    }

    fn capabilities(&self) -> GraphicsCapabilities {
        self.config.capabilities
    }

    fn requires_explicit_barriers(&self) -> bool {
        self.config.explicit_barriers
    }

    fn frames_in_flight(&self) -> u32 {
        self.config.frames_in_flight
    }

    fn is_debug_device(&self) -> bool {
        self.config.debug
    }

    fn diagnostics(&self) -> Vec<String> {
        self.inner.lock().diagnostics.clone()
    }
}

fn record_draw(list: &mut ListState, command: Command) {
    if list.pass.is_none() {
        list.report("draw recorded outside of a render pass".to_string());
    }
    list.commands.push(command);
}

fn check_query(list: &mut ListState, heap: &QueryHeap, index: u32, count: u32) -> Option<ResourceId> {
    let Some(id) = list.reference(heap.internal()) else {
        invalid_handle(list, "query");
        return None;
    };
    if index.saturating_add(count) > heap.desc.query_count {
        list.report(format!(
            "{id}: queries {index}..{} outside heap of {}",
            index.saturating_add(count),
            heap.desc.query_count
        ));
        return None;
    }
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::{LoadOp, RenderPassImage, StoreOp};

    fn device(explicit: bool) -> HeadlessDevice {
        HeadlessDevice::new(HeadlessConfig {
            explicit_barriers: explicit,
            ..HeadlessConfig::default()
        })
        .unwrap()
    }

    fn color_target(dev: &HeadlessDevice) -> Texture {
        dev.create_texture(&TextureDesc::render_target(64, 64, Format::R8G8B8A8Unorm), None)
            .unwrap()
    }

    fn pass(target: &Texture) -> RenderPassDesc {
        RenderPassDesc {
            images: vec![RenderPassImage::render_target(target, LoadOp::Clear)],
            ..RenderPassDesc::default()
        }
    }

    #[test]
    fn zero_sized_resources_are_rejected() {
        let dev = device(true);
        let err = dev
            .create_texture(&TextureDesc::sampled_2d(0, 4, Format::R8G8B8A8Unorm), None)
            .unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidParameter(_)));
        let err = dev.create_buffer(&GpuBufferDesc::default(), None).unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidParameter(_)));
    }

    #[test]
    fn memory_budget_is_enforced() {
        let dev = HeadlessDevice::new(HeadlessConfig {
            memory_budget: 64 * 1024,
            upload_buffer_size: 1024,
            ..HeadlessConfig::default()
        })
        .unwrap();
        let desc = GpuBufferDesc {
            size: 60 * 1024,
            ..GpuBufferDesc::default()
        };
        let first = dev.create_buffer(&desc, None).unwrap();
        let err = dev.create_buffer(&desc, None).unwrap_err();
        assert!(matches!(err, GraphicsError::OutOfMemory { .. }));
        drop(first);
        assert!(dev.create_buffer(&desc, None).is_ok());
    }

    #[test]
    fn explicit_backend_inserts_pass_barriers() {
        let dev = device(true);
        let target = color_target(&dev);
        let id = target.id().unwrap();
        let cmd = dev.begin_command_list();
        dev.render_pass_begin(&pass(&target), cmd);
        dev.render_pass_end(cmd);
        dev.submit_command_lists().unwrap();

        let frame = dev.last_submitted_frame().unwrap();
        let commands = &frame.command_lists[0].commands;
        assert_eq!(
            commands[0],
            Command::Barrier {
                resource: id,
                before: ResourceState::SHADER_RESOURCE,
                after: ResourceState::RENDERTARGET
            }
        );
        assert!(matches!(commands[1], Command::RenderPassBegin { .. }));
        assert_eq!(commands[2], Command::RenderPassEnd);
        assert_eq!(
            commands[3],
            Command::Barrier {
                resource: id,
                before: ResourceState::RENDERTARGET,
                after: ResourceState::SHADER_RESOURCE
            }
        );
        assert_eq!(dev.resource_state(&target), Some(ResourceState::SHADER_RESOURCE));
        assert!(frame.diagnostics.is_empty());
    }

    #[test]
    fn implicit_backend_tracks_without_barriers() {
        let dev = device(false);
        let target = color_target(&dev);
        let cmd = dev.begin_command_list();
        dev.render_pass_begin(&pass(&target), cmd);
        dev.render_pass_end(cmd);
        dev.submit_command_lists().unwrap();
        let frame = dev.last_submitted_frame().unwrap();
        assert!(!frame.commands().any(|c| matches!(c, Command::Barrier { .. })));
        assert_eq!(dev.resource_state(&target), Some(ResourceState::SHADER_RESOURCE));
    }

    #[test]
    fn binding_a_render_target_as_texture_is_reported() {
        let dev = device(true);
        let target = color_target(&dev);
        let cmd = dev.begin_command_list();
        dev.render_pass_begin(&pass(&target), cmd);
        dev.bind_resource(ShaderStage::Ps, (&target).into(), 0, cmd);
        dev.render_pass_end(cmd);
        dev.submit_command_lists().unwrap();
        let frame = dev.last_submitted_frame().unwrap();
        assert_eq!(frame.diagnostics.len(), 1);
        assert!(frame.diagnostics[0].contains("RENDERTARGET"));
        assert_eq!(dev.diagnostics().len(), 1);
    }

    #[test]
    fn debug_device_fails_submit_on_validation_errors() {
        let dev = HeadlessDevice::new(HeadlessConfig {
            debug: true,
            ..HeadlessConfig::default()
        })
        .unwrap();
        let cmd = dev.begin_command_list();
        dev.draw(3, 0, cmd);
        let err = dev.submit_command_lists().unwrap_err();
        assert!(matches!(err, GraphicsError::Validation(ref d) if d.len() == 1));
        // the frame still advanced
        assert_eq!(dev.frame_count(), 1);
    }

    #[test]
    fn invalid_barrier_is_reported_and_skipped() {
        let dev = device(true);
        let target = color_target(&dev);
        let cmd = dev.begin_command_list();
        let bad = GpuBarrier::image(
            &target,
            ResourceState::SHADER_RESOURCE,
            ResourceState::RENDERTARGET | ResourceState::COPY_SRC,
        )
        .unwrap();
        dev.barrier(&[bad], cmd);
        dev.submit_command_lists().unwrap();
        let frame = dev.last_submitted_frame().unwrap();
        assert!(frame.command_lists[0].commands.is_empty());
        assert_eq!(frame.diagnostics.len(), 1);
        assert_eq!(dev.resource_state(&target), Some(ResourceState::SHADER_RESOURCE));
    }

    #[test]
    fn lists_submit_in_begin_order() {
        let dev = device(true);
        let shadow = dev.begin_command_list();
        let main = dev.begin_command_list();
        // record out of order
        dev.event_begin("main", main);
        dev.event_end(main);
        dev.event_begin("shadow", shadow);
        dev.event_end(shadow);
        dev.submit_command_lists().unwrap();
        let frame = dev.last_submitted_frame().unwrap();
        assert_eq!(frame.events(), vec!["shadow", "main"]);
    }

    #[test]
    fn resources_stay_alive_while_in_flight() {
        let dev = device(true);
        let baseline = dev.live_resources();
        let buffer = dev
            .create_buffer(
                &GpuBufferDesc {
                    size: 1024,
                    bind_flags: BindFlags::CONSTANT_BUFFER,
                    ..GpuBufferDesc::default()
                },
                None,
            )
            .unwrap();
        let cmd = dev.begin_command_list();
        dev.bind_constant_buffer(ShaderStage::Vs, &buffer, 0, 0, cmd);
        drop(buffer);
        assert_eq!(dev.live_resources(), baseline + 1);

        dev.submit_command_lists().unwrap();
        assert_eq!(dev.live_resources(), baseline + 1);
        dev.submit_command_lists().unwrap();
        assert_eq!(dev.live_resources(), baseline + 1);
        dev.submit_command_lists().unwrap();
        assert_eq!(dev.live_resources(), baseline);
    }

    #[test]
    fn wait_for_gpu_releases_in_flight_resources() {
        let dev = device(true);
        let baseline = dev.live_resources();
        let target = color_target(&dev);
        let cmd = dev.begin_command_list();
        dev.render_pass_begin(&pass(&target), cmd);
        dev.render_pass_end(cmd);
        drop(target);
        dev.submit_command_lists().unwrap();
        assert_eq!(dev.live_resources(), baseline + 1);
        dev.wait_for_gpu();
        assert_eq!(dev.live_resources(), baseline);
    }

    #[test]
    fn upload_ring_aligns_and_resets_per_frame() {
        let dev = HeadlessDevice::new(HeadlessConfig {
            upload_buffer_size: 1024,
            ..HeadlessConfig::default()
        })
        .unwrap();
        let cmd = dev.begin_command_list();
        let a = dev.allocate_gpu(&[0u8; 100], cmd).unwrap();
        let b = dev.allocate_gpu(&[0u8; 100], cmd).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 256);
        let err = dev.allocate_gpu(&[0u8; 800], cmd).unwrap_err();
        assert!(matches!(err, GraphicsError::OutOfMemory { .. }));
        dev.submit_command_lists().unwrap();

        let cmd = dev.begin_command_list();
        let c = dev.allocate_gpu(&[0u8; 800], cmd).unwrap();
        assert_eq!(c.offset, 0);
        assert_ne!(c.buffer, a.buffer);
    }

    #[test]
    fn unknown_command_list_is_diagnosed() {
        let dev = device(true);
        dev.draw(3, 0, CommandList(7));
        assert_eq!(dev.diagnostics().len(), 1);
        assert!(matches!(
            dev.allocate_gpu(&[1, 2, 3], CommandList(7)),
            Err(GraphicsError::InvalidCommandList(7))
        ));
    }

    #[test]
    fn depth_pass_without_layout_change_records_no_barrier() {
        let dev = device(true);
        let depth = dev
            .create_texture(&TextureDesc::depth_target(32, 32, Format::D32Float), None)
            .unwrap();
        let cmd = dev.begin_command_list();
        dev.render_pass_begin(
            &RenderPassDesc {
                images: vec![RenderPassImage::depth_stencil(&depth, LoadOp::Clear, StoreOp::Store)],
                ..RenderPassDesc::default()
            },
            cmd,
        );
        dev.render_pass_end(cmd);
        dev.submit_command_lists().unwrap();
        let frame = dev.last_submitted_frame().unwrap();
        assert_eq!(frame.command_lists[0].commands.len(), 2);
    }

    #[test]
    fn set_name_is_recorded() {
        let dev = device(true);
        let target = color_target(&dev);
        dev.set_name(&target, "main_color");
        assert_eq!(dev.resource_name(&target).as_deref(), Some("main_color"));
    }
}
