use super::types::ClearDepthStencilFlags;
use crate::gpu::{Backend, Result};
use crate::sync::Barrier;

/// Native command list a [`CommandContext`](crate::gpu::CommandContext) records into.
///
/// Recording methods are infallible the way native command lists are; errors
/// surface when the list is closed.
pub trait CommandSink<B: Backend> {
    /// Start a fresh recording backed by `allocator`. Legal while a previous
    /// recording of this list is still executing on the GPU.
    fn reset(&mut self, allocator: &B::Allocator) -> Result<()>;

    /// Record the whole batch as one native barrier call.
    fn resource_barriers(&mut self, barriers: &[Barrier<B::RawResource>]);

    fn bind_pipeline(&mut self, pipeline: &B::RawPipeline);

    /// `render_targets` is indexed by slot; `None` leaves that slot empty.
    fn set_render_targets(
        &mut self,
        render_targets: &[Option<B::RawView>],
        depth: Option<&B::RawView>,
    );

    fn clear_render_target(&mut self, view: &B::RawView, color: [f32; 4]);

    fn clear_depth_stencil(
        &mut self,
        view: &B::RawView,
        flags: ClearDepthStencilFlags,
        depth: f32,
        stencil: u8,
    );

    fn clear_uav_float(&mut self, view: &B::RawView, resource: &B::RawResource, values: [f32; 4]);

    fn clear_uav_uint(&mut self, view: &B::RawView, resource: &B::RawResource, values: [u32; 4]);

    fn copy_buffer_region(
        &mut self,
        dst: &B::RawResource,
        dst_offset: u64,
        src: &B::RawResource,
        src_offset: u64,
        size: u64,
    );

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    /// Finish recording and hand back the submittable sequence.
    fn close(&mut self) -> Result<B::Submission>;
}

/// Source of command allocators and fresh command lists.
pub trait AllocatorPool<B: Backend> {
    fn request_allocator(&mut self) -> Result<B::Allocator>;

    /// Create a new command list already recording into a new allocator.
    fn create_command_list(&mut self) -> Result<(B::CommandList, B::Allocator)>;
}
