use std::mem::ManuallyDrop;

use windows::Win32::Graphics::Direct3D12::*;

use crate::gpu::driver::{
    AllocatorPool, BufferDesc, ClearDepthStencilFlags, CommandSink, ResourceKind, ResourceState,
    StateRecord, SubresourceExtent, TrackedResource, TrackedView,
};
use crate::gpu::{Backend, Result};
use crate::sync::{Barrier, Subresource};

pub mod fence;

pub use fence::Dx12Fence;

pub struct Dx12Backend;

impl Backend for Dx12Backend {
    type RawResource = ID3D12Resource;
    type RawView = Dx12View;
    type RawPipeline = ID3D12PipelineState;
    type Allocator = ID3D12CommandAllocator;
    type Submission = ID3D12GraphicsCommandList;
    type CommandList = Dx12CommandList;
}

/// Descriptor handles of one view. `gpu` is only needed for UAV clears and
/// may be zero otherwise.
#[derive(Debug, Copy, Clone)]
pub struct Dx12View {
    pub cpu: D3D12_CPU_DESCRIPTOR_HANDLE,
    pub gpu: D3D12_GPU_DESCRIPTOR_HANDLE,
}

const STATE_TO_D3D12: &[(ResourceState, D3D12_RESOURCE_STATES)] = &[
    (ResourceState::VERTEX_BUFFER, D3D12_RESOURCE_STATE_VERTEX_AND_CONSTANT_BUFFER),
    (ResourceState::CONSTANT_BUFFER, D3D12_RESOURCE_STATE_VERTEX_AND_CONSTANT_BUFFER),
    (ResourceState::INDEX_BUFFER, D3D12_RESOURCE_STATE_INDEX_BUFFER),
    (ResourceState::RENDER_TARGET, D3D12_RESOURCE_STATE_RENDER_TARGET),
    (ResourceState::UNORDERED_ACCESS, D3D12_RESOURCE_STATE_UNORDERED_ACCESS),
    (ResourceState::DEPTH_WRITE, D3D12_RESOURCE_STATE_DEPTH_WRITE),
    (ResourceState::DEPTH_READ, D3D12_RESOURCE_STATE_DEPTH_READ),
    (
        ResourceState::SHADER_RESOURCE,
        D3D12_RESOURCE_STATES(
            D3D12_RESOURCE_STATE_NON_PIXEL_SHADER_RESOURCE.0
                | D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE.0,
        ),
    ),
    (ResourceState::STREAM_OUT, D3D12_RESOURCE_STATE_STREAM_OUT),
    (ResourceState::INDIRECT_ARGUMENT, D3D12_RESOURCE_STATE_INDIRECT_ARGUMENT),
    (ResourceState::COPY_DEST, D3D12_RESOURCE_STATE_COPY_DEST),
    (ResourceState::COPY_SOURCE, D3D12_RESOURCE_STATE_COPY_SOURCE),
    (ResourceState::RESOLVE_DEST, D3D12_RESOURCE_STATE_RESOLVE_DEST),
    (ResourceState::RESOLVE_SOURCE, D3D12_RESOURCE_STATE_RESOLVE_SOURCE),
    (ResourceState::PRESENT, D3D12_RESOURCE_STATE_PRESENT),
];

/// Native state flags for `state`. `UNKNOWN` and `UNDEFINED` map to `COMMON`.
pub fn state_to_d3d12(state: ResourceState) -> D3D12_RESOURCE_STATES {
    let mut flags = D3D12_RESOURCE_STATE_COMMON;
    for (s, native) in STATE_TO_D3D12 {
        if state.contains(*s) {
            flags |= *native;
        }
    }
    flags
}

fn borrow_resource(resource: &ID3D12Resource) -> ManuallyDrop<Option<ID3D12Resource>> {
    // The barrier only lives until ResourceBarrier returns; no reference is taken.
    unsafe { std::mem::transmute_copy(resource) }
}

fn native_barrier(barrier: &Barrier<ID3D12Resource>) -> D3D12_RESOURCE_BARRIER {
    match barrier {
        Barrier::Transition {
            resource,
            subresource,
            before,
            after,
            ..
        } => D3D12_RESOURCE_BARRIER {
            Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
            Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
            Anonymous: D3D12_RESOURCE_BARRIER_0 {
                Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                    pResource: borrow_resource(resource),
                    Subresource: match subresource {
                        Subresource::All => D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                        Subresource::Index(index) => *index,
                    },
                    StateBefore: state_to_d3d12(*before),
                    StateAfter: state_to_d3d12(*after),
                }),
            },
        },
        Barrier::UnorderedAccess { resource } => D3D12_RESOURCE_BARRIER {
            Type: D3D12_RESOURCE_BARRIER_TYPE_UAV,
            Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
            Anonymous: D3D12_RESOURCE_BARRIER_0 {
                UAV: ManuallyDrop::new(D3D12_RESOURCE_UAV_BARRIER {
                    pResource: borrow_resource(resource),
                }),
            },
        },
        Barrier::Aliasing { before, after } => D3D12_RESOURCE_BARRIER {
            Type: D3D12_RESOURCE_BARRIER_TYPE_ALIASING,
            Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
            Anonymous: D3D12_RESOURCE_BARRIER_0 {
                Aliasing: ManuallyDrop::new(D3D12_RESOURCE_ALIASING_BARRIER {
                    pResourceBefore: before
                        .as_ref()
                        .map_or(ManuallyDrop::new(None), borrow_resource),
                    pResourceAfter: after
                        .as_ref()
                        .map_or(ManuallyDrop::new(None), borrow_resource),
                }),
            },
        },
    }
}

pub struct Dx12CommandList {
    list: ID3D12GraphicsCommandList,
}

impl Dx12CommandList {
    pub fn raw(&self) -> &ID3D12GraphicsCommandList {
        &self.list
    }
}

impl CommandSink<Dx12Backend> for Dx12CommandList {
    fn reset(&mut self, allocator: &ID3D12CommandAllocator) -> Result<()> {
        unsafe { self.list.Reset(allocator, None::<&ID3D12PipelineState>)? };
        Ok(())
    }

    fn resource_barriers(&mut self, barriers: &[Barrier<ID3D12Resource>]) {
        let native: Vec<D3D12_RESOURCE_BARRIER> = barriers.iter().map(native_barrier).collect();
        unsafe { self.list.ResourceBarrier(&native) };
    }

    fn bind_pipeline(&mut self, pipeline: &ID3D12PipelineState) {
        unsafe { self.list.SetPipelineState(pipeline) };
    }

    fn set_render_targets(&mut self, render_targets: &[Option<Dx12View>], depth: Option<&Dx12View>) {
        // Empty slots get a null descriptor so later slots keep their index.
        let rtvs: Vec<D3D12_CPU_DESCRIPTOR_HANDLE> = render_targets
            .iter()
            .map(|v| v.map_or(D3D12_CPU_DESCRIPTOR_HANDLE { ptr: 0 }, |v| v.cpu))
            .collect();
        let dsv = depth.map(|v| v.cpu);
        unsafe {
            self.list.OMSetRenderTargets(
                rtvs.len() as u32,
                if rtvs.is_empty() {
                    None
                } else {
                    Some(rtvs.as_ptr())
                },
                false,
                dsv.as_ref().map(|d| d as *const _),
            );
        }
    }

    fn clear_render_target(&mut self, view: &Dx12View, color: [f32; 4]) {
        unsafe {
            self.list
                .ClearRenderTargetView(view.cpu, color.as_ptr(), None)
        };
    }

    fn clear_depth_stencil(
        &mut self,
        view: &Dx12View,
        flags: ClearDepthStencilFlags,
        depth: f32,
        stencil: u8,
    ) {
        let mut native = D3D12_CLEAR_FLAGS(0);
        if flags.contains(ClearDepthStencilFlags::DEPTH) {
            native |= D3D12_CLEAR_FLAG_DEPTH;
        }
        if flags.contains(ClearDepthStencilFlags::STENCIL) {
            native |= D3D12_CLEAR_FLAG_STENCIL;
        }
        unsafe {
            self.list
                .ClearDepthStencilView(view.cpu, native, depth, stencil, None)
        };
    }

    fn clear_uav_float(&mut self, view: &Dx12View, resource: &ID3D12Resource, values: [f32; 4]) {
        unsafe {
            self.list.ClearUnorderedAccessViewFloat(
                view.gpu,
                view.cpu,
                resource,
                values.as_ptr(),
                None,
            )
        };
    }

    fn clear_uav_uint(&mut self, view: &Dx12View, resource: &ID3D12Resource, values: [u32; 4]) {
        unsafe {
            self.list.ClearUnorderedAccessViewUint(
                view.gpu,
                view.cpu,
                resource,
                values.as_ptr(),
                None,
            )
        };
    }

    fn copy_buffer_region(
        &mut self,
        dst: &ID3D12Resource,
        dst_offset: u64,
        src: &ID3D12Resource,
        src_offset: u64,
        size: u64,
    ) {
        unsafe {
            self.list
                .CopyBufferRegion(dst, dst_offset, src, src_offset, size)
        };
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.list
                .DrawInstanced(vertex_count, instance_count, first_vertex, first_instance)
        };
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        unsafe { self.list.Dispatch(x, y, z) };
    }

    fn close(&mut self) -> Result<ID3D12GraphicsCommandList> {
        unsafe { self.list.Close()? };
        Ok(self.list.clone())
    }
}

/// Command allocators for one command-list type, recycled once the GPU is
/// done with them.
pub struct Dx12AllocatorPool {
    device: ID3D12Device,
    list_type: D3D12_COMMAND_LIST_TYPE,
    free: Vec<ID3D12CommandAllocator>,
}

impl Dx12AllocatorPool {
    pub fn new(device: ID3D12Device, list_type: D3D12_COMMAND_LIST_TYPE) -> Self {
        Self {
            device,
            list_type,
            free: Vec::new(),
        }
    }

    /// Return an allocator whose submission has finished executing.
    pub fn recycle(&mut self, allocator: ID3D12CommandAllocator) -> Result<()> {
        unsafe { allocator.Reset()? };
        self.free.push(allocator);
        Ok(())
    }
}

impl AllocatorPool<Dx12Backend> for Dx12AllocatorPool {
    fn request_allocator(&mut self) -> Result<ID3D12CommandAllocator> {
        if let Some(allocator) = self.free.pop() {
            return Ok(allocator);
        }
        let allocator = unsafe { self.device.CreateCommandAllocator(self.list_type)? };
        Ok(allocator)
    }

    fn create_command_list(&mut self) -> Result<(Dx12CommandList, ID3D12CommandAllocator)> {
        let allocator = self.request_allocator()?;
        let list: ID3D12GraphicsCommandList = unsafe {
            self.device.CreateCommandList(
                0,
                self.list_type,
                &allocator,
                None::<&ID3D12PipelineState>,
            )?
        };
        Ok((Dx12CommandList { list }, allocator))
    }
}

/// Resource created elsewhere, wrapped for state tracking.
pub struct Dx12Resource {
    resource: ID3D12Resource,
    kind: ResourceKind,
    name: String,
    state: StateRecord,
}

impl Dx12Resource {
    pub fn texture(
        resource: ID3D12Resource,
        extent: SubresourceExtent,
        name: &str,
        initial_state: ResourceState,
    ) -> Self {
        Self {
            resource,
            kind: ResourceKind::Texture(extent),
            name: name.to_string(),
            state: StateRecord::new(initial_state),
        }
    }

    pub fn buffer(
        resource: ID3D12Resource,
        desc: BufferDesc,
        name: &str,
        initial_state: ResourceState,
    ) -> Self {
        Self {
            resource,
            kind: ResourceKind::Buffer(desc),
            name: name.to_string(),
            state: StateRecord::new(initial_state),
        }
    }
}

impl TrackedResource<Dx12Backend> for Dx12Resource {
    fn state_record(&self) -> &StateRecord {
        &self.state
    }

    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn raw(&self) -> ID3D12Resource {
        self.resource.clone()
    }

    fn debug_name(&self) -> &str {
        &self.name
    }
}

pub struct Dx12TextureView<'a> {
    pub texture: &'a Dx12Resource,
    pub view: Dx12View,
}

impl TrackedView<Dx12Backend> for Dx12TextureView<'_> {
    fn resource(&self) -> &dyn TrackedResource<Dx12Backend> {
        self.texture
    }

    fn raw_view(&self) -> Dx12View {
        self.view
    }
}
