use ash::{vk, Device};

use crate::gpu::driver::{
    BufferDesc, ClearDepthStencilFlags, CommandSink, ResourceKind, ResourceState, StateRecord,
    SubresourceExtent, TrackedResource, TrackedView,
};
use crate::gpu::{Backend, Result};
use crate::sync::Barrier;

pub mod command_pool;
pub mod conversions;
pub mod fence;

pub use command_pool::CommandAllocatorPool;
pub use conversions::*;
pub use fence::TimelineFence;

pub struct VulkanBackend;

impl Backend for VulkanBackend {
    type RawResource = VkResource;
    type RawView = VkView;
    type RawPipeline = VkPipeline;
    type Allocator = VkAllocator;
    type Submission = VkSubmission;
    type CommandList = VkCommandList;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VkResource {
    Image {
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
    },
    Buffer(vk::Buffer),
}

#[derive(Debug, Copy, Clone)]
pub struct VkView {
    pub view: vk::ImageView,
    pub image: vk::Image,
    pub range: vk::ImageSubresourceRange,
    pub extent: vk::Extent2D,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VkPipeline {
    pub raw: vk::Pipeline,
    pub bind_point: vk::PipelineBindPoint,
}

/// One transient command pool and the primary command buffer it backs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VkAllocator {
    pub pool: vk::CommandPool,
    pub cmd_buf: vk::CommandBuffer,
}

/// Ended command buffer ready for `vkQueueSubmit`.
#[derive(Debug, Copy, Clone)]
pub struct VkSubmission {
    pub cmd_buf: vk::CommandBuffer,
}

/// Command list recording into whatever allocator it was last reset with.
///
/// Vulkan has no equivalent of binding render targets outside a pass, so the
/// bound attachments are remembered and dynamic rendering is opened lazily
/// by the first draw and closed before anything that cannot run inside it.
pub struct VkCommandList {
    device: Device,
    cmd_buf: vk::CommandBuffer,
    render_targets: Vec<Option<VkView>>,
    depth: Option<VkView>,
    rendering: bool,
}

impl VkCommandList {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            cmd_buf: vk::CommandBuffer::null(),
            render_targets: Vec::new(),
            depth: None,
            rendering: false,
        }
    }

    pub fn raw(&self) -> vk::CommandBuffer {
        self.cmd_buf
    }

    fn end_rendering(&mut self) {
        if self.rendering {
            unsafe { self.device.cmd_end_rendering(self.cmd_buf) };
            self.rendering = false;
        }
    }

    fn begin_rendering(&mut self) {
        if self.rendering {
            return;
        }
        let Some(extent) = self
            .render_targets
            .iter()
            .flatten()
            .next()
            .or(self.depth.as_ref())
            .map(|v| v.extent)
        else {
            return;
        };

        let colors: Vec<vk::RenderingAttachmentInfo> = self
            .render_targets
            .iter()
            .map(|v| {
                // A null view leaves the slot unused without shifting the rest.
                vk::RenderingAttachmentInfo::builder()
                    .image_view(v.map_or(vk::ImageView::null(), |v| v.view))
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::LOAD)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .build()
            })
            .collect();
        let depth = self.depth.map(|v| {
            vk::RenderingAttachmentInfo::builder()
                .image_view(v.view)
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::LOAD)
                .store_op(vk::AttachmentStoreOp::STORE)
                .build()
        });

        let mut info = vk::RenderingInfo::builder()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            })
            .layer_count(1)
            .color_attachments(&colors);
        if let Some(depth) = depth.as_ref() {
            info = info.depth_attachment(depth);
        }

        unsafe { self.device.cmd_begin_rendering(self.cmd_buf, &info) };
        self.rendering = true;
    }

    /// Move `view` between an attachment layout and `TRANSFER_DST` around a
    /// clear.
    fn layout_barrier(
        &self,
        view: &VkView,
        from: (vk::ImageLayout, vk::AccessFlags, vk::PipelineStageFlags),
        to: (vk::ImageLayout, vk::AccessFlags, vk::PipelineStageFlags),
    ) {
        let barrier = vk::ImageMemoryBarrier::builder()
            .src_access_mask(from.1)
            .dst_access_mask(to.1)
            .old_layout(from.0)
            .new_layout(to.0)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(view.image)
            .subresource_range(view.range)
            .build();
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.cmd_buf,
                from.2,
                to.2,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            )
        };
    }
}

const TRANSFER_DST: (vk::ImageLayout, vk::AccessFlags, vk::PipelineStageFlags) = (
    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    vk::AccessFlags::TRANSFER_WRITE,
    vk::PipelineStageFlags::TRANSFER,
);

impl CommandSink<VulkanBackend> for VkCommandList {
    fn reset(&mut self, allocator: &VkAllocator) -> Result<()> {
        self.cmd_buf = allocator.cmd_buf;
        self.render_targets.clear();
        self.depth = None;
        self.rendering = false;
        unsafe {
            self.device.begin_command_buffer(
                self.cmd_buf,
                &vk::CommandBufferBeginInfo::builder()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
                    .build(),
            )?;
        }
        Ok(())
    }

    fn resource_barriers(&mut self, barriers: &[Barrier<VkResource>]) {
        self.end_rendering();

        let mut src_stage = vk::PipelineStageFlags::empty();
        let mut dst_stage = vk::PipelineStageFlags::empty();
        let mut memory = Vec::new();
        let mut buffers = Vec::new();
        let mut images = Vec::new();

        for barrier in barriers {
            match barrier {
                Barrier::Transition {
                    resource,
                    kind,
                    subresource,
                    before,
                    after,
                } => {
                    src_stage |= state_to_stages(*before);
                    dst_stage |= state_to_stages(*after);
                    match (resource, kind) {
                        (VkResource::Image { image, aspect }, ResourceKind::Texture(extent)) => {
                            images.push(
                                vk::ImageMemoryBarrier::builder()
                                    .src_access_mask(state_to_access(*before))
                                    .dst_access_mask(state_to_access(*after))
                                    .old_layout(state_to_layout(*before))
                                    .new_layout(state_to_layout(*after))
                                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                                    .image(*image)
                                    .subresource_range(subresource_range(
                                        *subresource,
                                        *extent,
                                        *aspect,
                                    ))
                                    .build(),
                            );
                        }
                        (VkResource::Buffer(buffer), _) => {
                            buffers.push(
                                vk::BufferMemoryBarrier::builder()
                                    .src_access_mask(state_to_access(*before))
                                    .dst_access_mask(state_to_access(*after))
                                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                                    .buffer(*buffer)
                                    .offset(0)
                                    .size(vk::WHOLE_SIZE)
                                    .build(),
                            );
                        }
                        (VkResource::Image { .. }, ResourceKind::Buffer(_)) => {
                            log::error!("Image barrier carries a buffer description; skipped");
                        }
                    }
                }
                Barrier::UnorderedAccess { .. } => {
                    src_stage |= STATE_TO_STAGE_UAV;
                    dst_stage |= STATE_TO_STAGE_UAV;
                    memory.push(
                        vk::MemoryBarrier::builder()
                            .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                            .dst_access_mask(
                                vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
                            )
                            .build(),
                    );
                }
                Barrier::Aliasing { .. } => {
                    src_stage |= vk::PipelineStageFlags::ALL_COMMANDS;
                    dst_stage |= vk::PipelineStageFlags::ALL_COMMANDS;
                    memory.push(
                        vk::MemoryBarrier::builder()
                            .src_access_mask(vk::AccessFlags::MEMORY_WRITE)
                            .dst_access_mask(
                                vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                            )
                            .build(),
                    );
                }
            }
        }

        if src_stage.is_empty() {
            return;
        }

        unsafe {
            self.device.cmd_pipeline_barrier(
                self.cmd_buf,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &memory,
                &buffers,
                &images,
            );
        }
    }

    fn bind_pipeline(&mut self, pipeline: &VkPipeline) {
        if pipeline.bind_point == vk::PipelineBindPoint::COMPUTE {
            self.end_rendering();
        }
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd_buf, pipeline.bind_point, pipeline.raw)
        };
    }

    fn set_render_targets(&mut self, render_targets: &[Option<VkView>], depth: Option<&VkView>) {
        self.end_rendering();
        self.render_targets.clear();
        self.render_targets.extend_from_slice(render_targets);
        self.depth = depth.copied();
    }

    fn clear_render_target(&mut self, view: &VkView, color: [f32; 4]) {
        self.end_rendering();
        let attachment = (
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        );
        self.layout_barrier(view, attachment, TRANSFER_DST);
        unsafe {
            self.device.cmd_clear_color_image(
                self.cmd_buf,
                view.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &vk::ClearColorValue { float32: color },
                &[view.range],
            );
        }
        self.layout_barrier(view, TRANSFER_DST, attachment);
    }

    fn clear_depth_stencil(
        &mut self,
        view: &VkView,
        flags: ClearDepthStencilFlags,
        depth: f32,
        stencil: u8,
    ) {
        self.end_rendering();
        let mut aspect = vk::ImageAspectFlags::empty();
        if flags.contains(ClearDepthStencilFlags::DEPTH) {
            aspect |= vk::ImageAspectFlags::DEPTH;
        }
        if flags.contains(ClearDepthStencilFlags::STENCIL) {
            aspect |= vk::ImageAspectFlags::STENCIL;
        }
        let mut range = view.range;
        range.aspect_mask &= aspect;
        if range.aspect_mask.is_empty() {
            return;
        }

        let attachment = (
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        );
        self.layout_barrier(view, attachment, TRANSFER_DST);
        unsafe {
            self.device.cmd_clear_depth_stencil_image(
                self.cmd_buf,
                view.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &vk::ClearDepthStencilValue {
                    depth,
                    stencil: stencil as u32,
                },
                &[range],
            );
        }
        self.layout_barrier(view, TRANSFER_DST, attachment);
    }

    fn clear_uav_float(&mut self, view: &VkView, resource: &VkResource, values: [f32; 4]) {
        self.end_rendering();
        match resource {
            VkResource::Image { image, .. } => unsafe {
                self.device.cmd_clear_color_image(
                    self.cmd_buf,
                    *image,
                    vk::ImageLayout::GENERAL,
                    &vk::ClearColorValue { float32: values },
                    &[view.range],
                );
            },
            VkResource::Buffer(buffer) => unsafe {
                self.device.cmd_fill_buffer(
                    self.cmd_buf,
                    *buffer,
                    0,
                    vk::WHOLE_SIZE,
                    values[0].to_bits(),
                );
            },
        }
    }

    fn clear_uav_uint(&mut self, view: &VkView, resource: &VkResource, values: [u32; 4]) {
        self.end_rendering();
        match resource {
            VkResource::Image { image, .. } => unsafe {
                self.device.cmd_clear_color_image(
                    self.cmd_buf,
                    *image,
                    vk::ImageLayout::GENERAL,
                    &vk::ClearColorValue { uint32: values },
                    &[view.range],
                );
            },
            VkResource::Buffer(buffer) => unsafe {
                self.device
                    .cmd_fill_buffer(self.cmd_buf, *buffer, 0, vk::WHOLE_SIZE, values[0]);
            },
        }
    }

    fn copy_buffer_region(
        &mut self,
        dst: &VkResource,
        dst_offset: u64,
        src: &VkResource,
        src_offset: u64,
        size: u64,
    ) {
        let (VkResource::Buffer(dst), VkResource::Buffer(src)) = (dst, src) else {
            log::error!("copy_buffer_region called with an image; copy skipped");
            return;
        };
        self.end_rendering();
        let region = vk::BufferCopy {
            src_offset,
            dst_offset,
            size,
        };
        unsafe {
            self.device
                .cmd_copy_buffer(self.cmd_buf, *src, *dst, &[region])
        };
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.begin_rendering();
        unsafe {
            self.device.cmd_draw(
                self.cmd_buf,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.end_rendering();
        unsafe { self.device.cmd_dispatch(self.cmd_buf, x, y, z) };
    }

    fn close(&mut self) -> Result<VkSubmission> {
        self.end_rendering();
        unsafe { self.device.end_command_buffer(self.cmd_buf)? };
        Ok(VkSubmission {
            cmd_buf: self.cmd_buf,
        })
    }
}

const STATE_TO_STAGE_UAV: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::VERTEX_SHADER.as_raw()
        | vk::PipelineStageFlags::FRAGMENT_SHADER.as_raw()
        | vk::PipelineStageFlags::COMPUTE_SHADER.as_raw(),
);

/// Image created elsewhere, wrapped for state tracking.
pub struct VkTexture {
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    extent: SubresourceExtent,
    name: String,
    state: StateRecord,
}

impl VkTexture {
    pub fn from_raw(
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        extent: SubresourceExtent,
        name: &str,
        initial_state: ResourceState,
    ) -> Self {
        Self {
            image,
            aspect,
            extent,
            name: name.to_string(),
            state: StateRecord::new(initial_state),
        }
    }
}

impl TrackedResource<VulkanBackend> for VkTexture {
    fn state_record(&self) -> &StateRecord {
        &self.state
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Texture(self.extent)
    }

    fn raw(&self) -> VkResource {
        VkResource::Image {
            image: self.image,
            aspect: self.aspect,
        }
    }

    fn debug_name(&self) -> &str {
        &self.name
    }
}

pub struct VkBuffer {
    buffer: vk::Buffer,
    desc: BufferDesc,
    name: String,
    state: StateRecord,
}

impl VkBuffer {
    pub fn from_raw(
        buffer: vk::Buffer,
        desc: BufferDesc,
        name: &str,
        initial_state: ResourceState,
    ) -> Self {
        Self {
            buffer,
            desc,
            name: name.to_string(),
            state: StateRecord::new(initial_state),
        }
    }
}

impl TrackedResource<VulkanBackend> for VkBuffer {
    fn state_record(&self) -> &StateRecord {
        &self.state
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Buffer(self.desc)
    }

    fn raw(&self) -> VkResource {
        VkResource::Buffer(self.buffer)
    }

    fn debug_name(&self) -> &str {
        &self.name
    }
}

pub struct VkTextureView<'a> {
    pub texture: &'a VkTexture,
    pub view: VkView,
}

impl TrackedView<VulkanBackend> for VkTextureView<'_> {
    fn resource(&self) -> &dyn TrackedResource<VulkanBackend> {
        self.texture
    }

    fn raw_view(&self) -> VkView {
        self.view
    }
}
