//! Headless backend that records instead of executing.
//!
//! Command lists keep every call they receive so tests and tools can inspect
//! exactly what the barrier engine produced. [`NullQueue`] stands in for a
//! device with no CPU-visible fence: submissions complete one per
//! [`DeviceTick::device_tick`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use super::driver::{
    AllocatorPool, BufferDesc, ClearDepthStencilFlags, CommandSink, ResourceKind, ResourceState,
    StateRecord, SubresourceExtent, TrackedResource, TrackedView,
};
use super::error::{GPUError, Result};
use super::Backend;
use crate::sync::{Barrier, DeviceTick, Fence, FenceDesc, SyncPoint};
use crate::utils::{Handle, HandleAllocator};

#[derive(Debug)]
pub struct NullResource;

#[derive(Debug)]
pub struct NullView;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NullAllocator {
    pub id: u32,
}

/// Everything a [`NullCommandList`] recorded between reset and close.
#[derive(Debug, Clone, Default)]
pub struct NullSubmission {
    pub commands: Vec<NullCommand>,
}

pub struct NullBackend;

impl Backend for NullBackend {
    type RawResource = Handle<NullResource>;
    type RawView = Handle<NullView>;
    type RawPipeline = u32;
    type Allocator = NullAllocator;
    type Submission = NullSubmission;
    type CommandList = NullCommandList;
}

#[derive(Debug, Clone, PartialEq)]
pub enum NullCommand {
    Barriers(Vec<Barrier<Handle<NullResource>>>),
    BindPipeline(u32),
    SetRenderTargets {
        render_targets: Vec<Option<Handle<NullView>>>,
        depth: Option<Handle<NullView>>,
    },
    ClearRenderTarget {
        view: Handle<NullView>,
        color: [f32; 4],
    },
    ClearDepthStencil {
        view: Handle<NullView>,
        flags: ClearDepthStencilFlags,
        depth: f32,
        stencil: u8,
    },
    ClearUavFloat {
        view: Handle<NullView>,
        resource: Handle<NullResource>,
        values: [f32; 4],
    },
    ClearUavUint {
        view: Handle<NullView>,
        resource: Handle<NullResource>,
        values: [u32; 4],
    },
    CopyBufferRegion {
        dst: Handle<NullResource>,
        dst_offset: u64,
        src: Handle<NullResource>,
        src_offset: u64,
        size: u64,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
}

#[derive(Debug, Default)]
pub struct NullCommandList {
    commands: Vec<NullCommand>,
    allocator: Option<NullAllocator>,
    fail_close: bool,
}

impl NullCommandList {
    /// Calls recorded since the last reset.
    pub fn commands(&self) -> &[NullCommand] {
        &self.commands
    }

    /// Allocator the current recording runs on.
    pub fn allocator(&self) -> Option<NullAllocator> {
        self.allocator
    }

    /// Make the next close fail the way a lost device would.
    pub fn set_fail_close(&mut self, fail: bool) {
        self.fail_close = fail;
    }

    /// Barrier batches recorded since the last reset, in order.
    pub fn barrier_batches(&self) -> impl Iterator<Item = &[Barrier<Handle<NullResource>>]> {
        self.commands.iter().filter_map(|c| match c {
            NullCommand::Barriers(b) => Some(b.as_slice()),
            _ => None,
        })
    }
}

impl CommandSink<NullBackend> for NullCommandList {
    fn reset(&mut self, allocator: &NullAllocator) -> Result<()> {
        self.commands.clear();
        self.allocator = Some(*allocator);
        Ok(())
    }

    fn resource_barriers(&mut self, barriers: &[Barrier<Handle<NullResource>>]) {
        self.commands.push(NullCommand::Barriers(barriers.to_vec()));
    }

    fn bind_pipeline(&mut self, pipeline: &u32) {
        self.commands.push(NullCommand::BindPipeline(*pipeline));
    }

    fn set_render_targets(
        &mut self,
        render_targets: &[Option<Handle<NullView>>],
        depth: Option<&Handle<NullView>>,
    ) {
        self.commands.push(NullCommand::SetRenderTargets {
            render_targets: render_targets.to_vec(),
            depth: depth.copied(),
        });
    }

    fn clear_render_target(&mut self, view: &Handle<NullView>, color: [f32; 4]) {
        self.commands.push(NullCommand::ClearRenderTarget { view: *view, color });
    }

    fn clear_depth_stencil(
        &mut self,
        view: &Handle<NullView>,
        flags: ClearDepthStencilFlags,
        depth: f32,
        stencil: u8,
    ) {
        self.commands.push(NullCommand::ClearDepthStencil {
            view: *view,
            flags,
            depth,
            stencil,
        });
    }

    fn clear_uav_float(
        &mut self,
        view: &Handle<NullView>,
        resource: &Handle<NullResource>,
        values: [f32; 4],
    ) {
        self.commands.push(NullCommand::ClearUavFloat {
            view: *view,
            resource: *resource,
            values,
        });
    }

    fn clear_uav_uint(
        &mut self,
        view: &Handle<NullView>,
        resource: &Handle<NullResource>,
        values: [u32; 4],
    ) {
        self.commands.push(NullCommand::ClearUavUint {
            view: *view,
            resource: *resource,
            values,
        });
    }

    fn copy_buffer_region(
        &mut self,
        dst: &Handle<NullResource>,
        dst_offset: u64,
        src: &Handle<NullResource>,
        src_offset: u64,
        size: u64,
    ) {
        self.commands.push(NullCommand::CopyBufferRegion {
            dst: *dst,
            dst_offset,
            src: *src,
            src_offset,
            size,
        });
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.commands.push(NullCommand::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(NullCommand::Dispatch { x, y, z });
    }

    fn close(&mut self) -> Result<NullSubmission> {
        if self.fail_close {
            return Err(GPUError::Submission("null command list failed to close".into()));
        }
        Ok(NullSubmission {
            commands: std::mem::take(&mut self.commands),
        })
    }
}

/// Hands out resource handles and command allocators.
#[derive(Debug, Default)]
pub struct NullDevice {
    handles: HandleAllocator,
    next_allocator: u32,
}

impl NullDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocators handed out so far.
    pub fn allocators_created(&self) -> u32 {
        self.next_allocator
    }

    pub fn create_texture(
        &mut self,
        name: &str,
        extent: SubresourceExtent,
        initial_state: ResourceState,
    ) -> NullTexture {
        NullTexture {
            handle: self.handles.allocate(),
            name: name.to_string(),
            extent,
            state: StateRecord::new(initial_state),
        }
    }

    pub fn create_buffer(
        &mut self,
        name: &str,
        desc: BufferDesc,
        initial_state: ResourceState,
    ) -> NullBuffer {
        NullBuffer {
            handle: self.handles.allocate(),
            name: name.to_string(),
            desc,
            state: StateRecord::new(initial_state),
        }
    }

    pub fn create_view<'a>(&mut self, texture: &'a NullTexture) -> NullTextureView<'a> {
        NullTextureView {
            texture,
            handle: self.handles.allocate(),
        }
    }
}

impl AllocatorPool<NullBackend> for NullDevice {
    fn request_allocator(&mut self) -> Result<NullAllocator> {
        let allocator = NullAllocator {
            id: self.next_allocator,
        };
        self.next_allocator += 1;
        Ok(allocator)
    }

    fn create_command_list(&mut self) -> Result<(NullCommandList, NullAllocator)> {
        let allocator = self.request_allocator()?;
        let mut list = NullCommandList::default();
        list.reset(&allocator)?;
        Ok((list, allocator))
    }
}

#[derive(Debug)]
pub struct NullTexture {
    handle: Handle<NullResource>,
    name: String,
    extent: SubresourceExtent,
    state: StateRecord,
}

impl NullTexture {
    pub fn handle(&self) -> Handle<NullResource> {
        self.handle
    }
}

impl TrackedResource<NullBackend> for NullTexture {
    fn state_record(&self) -> &StateRecord {
        &self.state
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Texture(self.extent)
    }

    fn raw(&self) -> Handle<NullResource> {
        self.handle
    }

    fn debug_name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug)]
pub struct NullBuffer {
    handle: Handle<NullResource>,
    name: String,
    desc: BufferDesc,
    state: StateRecord,
}

impl NullBuffer {
    pub fn handle(&self) -> Handle<NullResource> {
        self.handle
    }
}

impl TrackedResource<NullBackend> for NullBuffer {
    fn state_record(&self) -> &StateRecord {
        &self.state
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Buffer(self.desc)
    }

    fn raw(&self) -> Handle<NullResource> {
        self.handle
    }

    fn debug_name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug)]
pub struct NullTextureView<'a> {
    texture: &'a NullTexture,
    handle: Handle<NullView>,
}

impl NullTextureView<'_> {
    pub fn handle(&self) -> Handle<NullView> {
        self.handle
    }
}

impl TrackedView<NullBackend> for NullTextureView<'_> {
    fn resource(&self) -> &dyn TrackedResource<NullBackend> {
        self.texture
    }

    fn raw_view(&self) -> Handle<NullView> {
        self.handle
    }
}

/// Queue without a CPU-visible fence. Each submission is handed a
/// [`SyncPoint`]; every pump tick completes the oldest one still in flight.
#[derive(Debug, Default)]
pub struct NullQueue {
    in_flight: Mutex<VecDeque<SyncPoint>>,
    ticks: AtomicU64,
}

impl NullQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&self, submission: NullSubmission) -> SyncPoint {
        let point = SyncPoint::new();
        log::trace!(
            "Null queue accepted a submission of {} command(s)",
            submission.commands.len()
        );
        self.in_flight.lock().push_back(point.clone());
        point
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl DeviceTick for NullQueue {
    fn device_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if let Some(point) = self.in_flight.lock().pop_front() {
            point.trigger();
        }
    }
}

/// Fence with a host-side blocking primitive, the way native timeline
/// fences behave.
#[derive(Debug)]
pub struct HostFence {
    desc: FenceDesc,
    value: Mutex<u64>,
    signaled: Condvar,
}

impl HostFence {
    pub fn new(desc: FenceDesc) -> Self {
        Self {
            desc,
            value: Mutex::new(0),
            signaled: Condvar::new(),
        }
    }
}

impl Fence for HostFence {
    fn desc(&self) -> &FenceDesc {
        &self.desc
    }

    fn completed_value(&self) -> u64 {
        *self.value.lock()
    }

    fn signal(&self, value: u64) -> Result<()> {
        let mut current = self.value.lock();
        if value > *current {
            *current = value;
            self.signaled.notify_all();
        }
        Ok(())
    }

    fn wait(&self, value: u64) -> Result<()> {
        let mut current = self.value.lock();
        while *current < value {
            self.signaled.wait(&mut current);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn close_hands_back_recorded_commands() {
        let mut device = NullDevice::new();
        let (mut list, allocator) = device.create_command_list().unwrap();
        assert_eq!(list.allocator(), Some(allocator));

        list.dispatch(4, 2, 1);
        let submission = list.close().unwrap();
        assert_eq!(submission.commands, vec![NullCommand::Dispatch { x: 4, y: 2, z: 1 }]);
        assert!(list.commands().is_empty());
    }

    #[test]
    fn failing_close_reports_submission_error() {
        let mut list = NullCommandList::default();
        list.set_fail_close(true);
        assert!(matches!(list.close(), Err(GPUError::Submission(_))));
    }

    #[test]
    fn queue_completes_oldest_submission_per_tick() {
        let queue = NullQueue::new();
        let first = queue.submit(NullSubmission::default());
        let second = queue.submit(NullSubmission::default());

        queue.device_tick();
        assert!(first.is_triggered());
        assert!(!second.is_triggered());
        assert_eq!(queue.in_flight(), 1);
    }

    #[test]
    fn host_fence_wakes_waiter() {
        let fence = Arc::new(HostFence::new(FenceDesc::new("host")));
        let waiter = {
            let fence = fence.clone();
            std::thread::spawn(move || fence.wait(3))
        };
        fence.signal(1).unwrap();
        fence.signal(3).unwrap();
        waiter.join().unwrap().unwrap();
        assert_eq!(fence.completed_value(), 3);

        fence.signal(2).unwrap();
        assert_eq!(fence.completed_value(), 3);
    }
}
