use crate::descriptors::{
    GpuBufferDesc, PipelineStateDesc, QueryHeapDesc, RaytracingAsDesc, SamplerDesc, ShaderStage,
    SwapChainDesc, TextureDesc,
};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Device-unique identifier of a created object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res#{}", self.0)
    }
}

/// Backend-owned state behind a handle. Cloning shares it; the backend
/// object is released when the last clone (including the ones the device
/// keeps for in-flight frames) is dropped.
#[derive(Clone)]
pub struct InternalHandle {
    id: ResourceId,
    state: Arc<dyn Any + Send + Sync>,
}

impl InternalHandle {
    pub fn new(id: ResourceId, state: Arc<dyn Any + Send + Sync>) -> Self {
        Self { id, state }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn downcast<T: Any>(&self) -> Option<&T> {
        self.state.downcast_ref::<T>()
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.state)
    }
}

impl fmt::Debug for InternalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalHandle")
            .field("id", &self.id)
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// Common surface of every device-created object.
pub trait DeviceChild {
    fn internal(&self) -> Option<&InternalHandle>;

    fn is_valid(&self) -> bool {
        self.internal().is_some()
    }

    fn id(&self) -> Option<ResourceId> {
        self.internal().map(InternalHandle::id)
    }
}

/// Descriptor of a created shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShaderInfo {
    pub stage: ShaderStage,
    pub bytecode_len: usize,
}

macro_rules! device_child {
    ($($(#[$meta:meta])* $name:ident => $desc:ty),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Default)]
            pub struct $name {
                pub internal: Option<InternalHandle>,
                pub desc: $desc,
            }

            impl $name {
                pub fn new(internal: InternalHandle, desc: $desc) -> Self {
                    Self {
                        internal: Some(internal),
                        desc,
                    }
                }
            }

            impl DeviceChild for $name {
                fn internal(&self) -> Option<&InternalHandle> {
                    self.internal.as_ref()
                }
            }

            impl PartialEq for $name {
                fn eq(&self, other: &Self) -> bool {
                    self.id() == other.id()
                }
            }
        )*
    };
}

device_child! {
    Texture => TextureDesc,
    GpuBuffer => GpuBufferDesc,
    Shader => ShaderInfo,
    PipelineState => PipelineStateDesc,
    Sampler => SamplerDesc,
    RaytracingAccelerationStructure => RaytracingAsDesc,
    /// Presentable surface; its back buffer is the target of
    /// `render_pass_begin_swap_chain`.
    SwapChain => SwapChainDesc,
    QueryHeap => QueryHeapDesc,
}

/// Borrowed reference to any bindable GPU resource.
#[derive(Debug, Clone, Copy)]
pub enum GpuResourceRef<'a> {
    Texture(&'a Texture),
    Buffer(&'a GpuBuffer),
    AccelerationStructure(&'a RaytracingAccelerationStructure),
}

impl GpuResourceRef<'_> {
    pub fn internal(&self) -> Option<&InternalHandle> {
        match self {
            GpuResourceRef::Texture(t) => t.internal(),
            GpuResourceRef::Buffer(b) => b.internal(),
            GpuResourceRef::AccelerationStructure(a) => a.internal(),
        }
    }

    pub fn id(&self) -> Option<ResourceId> {
        self.internal().map(InternalHandle::id)
    }
}

impl<'a> From<&'a Texture> for GpuResourceRef<'a> {
    fn from(value: &'a Texture) -> Self {
        GpuResourceRef::Texture(value)
    }
}

impl<'a> From<&'a GpuBuffer> for GpuResourceRef<'a> {
    fn from(value: &'a GpuBuffer) -> Self {
        GpuResourceRef::Buffer(value)
    }
}

impl<'a> From<&'a RaytracingAccelerationStructure> for GpuResourceRef<'a> {
    fn from(value: &'a RaytracingAccelerationStructure) -> Self {
        GpuResourceRef::AccelerationStructure(value)
    }
}

/// Region of the per-frame upload ring. Valid only for the frame it was
/// allocated in.
#[derive(Debug, Clone)]
pub struct GpuAllocation {
    pub buffer: GpuBuffer,
    pub offset: u64,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_handles_are_invalid() {
        assert!(!Texture::default().is_valid());
        assert!(GpuBuffer::default().id().is_none());
    }

    #[test]
    fn handle_equality_follows_identity() {
        let state: Arc<dyn Any + Send + Sync> = Arc::new(());
        let a = Texture::new(InternalHandle::new(ResourceId(1), state.clone()), TextureDesc::default());
        let b = a.clone();
        let c = Texture::new(InternalHandle::new(ResourceId(2), state), TextureDesc::default());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(GpuResourceRef::from(&a).id(), Some(ResourceId(1)));
    }
}
