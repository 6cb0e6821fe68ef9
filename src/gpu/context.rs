use std::thread::ThreadId;

use super::config::ContextConfig;
use super::driver::{
    calc_subresource, verify_resource_state, AllocatorPool, ClearDepthStencilFlags, CommandSink,
    RenderTargetFlags, ResourceKind, ResourceState, StateTransition, TrackedResource, TrackedView,
};
use super::error::{violation, ContractViolation, Result};
use super::Backend;
use crate::sync::{Barrier, BarrierBatch, Subresource};

/// What [`CommandContext::close`] hands back: the recorded sequence and the
/// allocator that backs it. The allocator must not be reused until the
/// submission has finished executing.
pub struct ClosedCommandList<B: Backend> {
    pub submission: B::Submission,
    pub allocator: B::Allocator,
}

/// Single-threaded recording session over one native command list.
///
/// The context owns its allocator from [`CommandContext::reset`] (or
/// construction) until [`CommandContext::close`], and batches every barrier
/// it is asked for until an operation needs resource states to be in effect.
///
/// Contexts are handed out and reclaimed by an external manager and are
/// never shared: once a recording starts, it stays on the thread that
/// started it. A freshly created or reset context may be moved first.
pub struct CommandContext<B: Backend> {
    name: String,
    list: B::CommandList,
    allocator: Option<B::Allocator>,
    barriers: BarrierBatch<B::RawResource>,
    pipeline: Option<B::RawPipeline>,
    config: ContextConfig,
    /// Thread of the current recording, bound on first use.
    owner: Option<ThreadId>,
}

impl<B: Backend> CommandContext<B> {
    /// Create a context with a fresh command list that is already recording.
    pub fn new<P>(name: &str, pool: &mut P, config: &ContextConfig) -> Result<Self>
    where
        P: AllocatorPool<B> + ?Sized,
    {
        let (list, allocator) = pool.create_command_list()?;
        Ok(Self {
            name: name.to_string(),
            list,
            allocator: Some(allocator),
            barriers: BarrierBatch::new(config.max_pending_barriers),
            pipeline: None,
            config: *config,
            owner: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// True between a reset and the following close.
    pub fn owns_allocator(&self) -> bool {
        self.allocator.is_some()
    }

    pub fn pending_barriers(&self) -> usize {
        self.barriers.len()
    }

    pub fn command_list(&self) -> &B::CommandList {
        &self.list
    }

    /// Native list, for calls the context does not wrap. Barriers recorded
    /// through it bypass state tracking.
    pub fn command_list_mut(&mut self) -> &mut B::CommandList {
        &mut self.list
    }

    /// Start a new recording on a fresh allocator from `pool`.
    ///
    /// Only legal on a closed context. Cached pipeline state and the pending
    /// batch are cleared.
    pub fn reset<P>(&mut self, pool: &mut P) -> Result<()>
    where
        P: AllocatorPool<B> + ?Sized,
    {
        if self.allocator.is_some() {
            return Err(violation(ContractViolation::AllocatorNotReleased));
        }

        let allocator = pool.request_allocator()?;
        // The list may still be executing; native lists allow a reset anyway.
        self.list.reset(&allocator)?;
        self.allocator = Some(allocator);

        self.pipeline = None;
        self.barriers.clear();
        self.owner = None;
        log::trace!("Reset command context '{}'", self.name);
        Ok(())
    }

    /// Flush, finish recording and transfer the allocator out.
    ///
    /// If the native close fails the context keeps its allocator; the device
    /// is considered lost at that point.
    pub fn close(&mut self) -> Result<ClosedCommandList<B>> {
        self.ensure_recording()?;
        self.flush_resource_barriers();

        let submission = self.list.close()?;
        let allocator = self
            .allocator
            .take()
            .ok_or_else(|| violation(ContractViolation::ContextClosed))?;
        log::trace!("Closed command context '{}'", self.name);
        Ok(ClosedCommandList {
            submission,
            allocator,
        })
    }

    /// Submit every pending barrier as one native call. Returns how many were
    /// submitted.
    pub fn flush_resource_barriers(&mut self) -> usize {
        let list = &mut self.list;
        let flushed = self.barriers.flush_with(|barriers| list.resource_barriers(barriers));
        if flushed > 0 {
            log::debug!(
                "Context '{}' flushed {} resource barrier(s)",
                self.name,
                flushed
            );
        }
        flushed
    }

    /// Transition the whole resource to `new_state` using its tracked state.
    pub fn transition_resource(
        &mut self,
        resource: &dyn TrackedResource<B>,
        new_state: ResourceState,
    ) -> Result<()> {
        self.ensure_recording()?;
        self.transition(&StateTransition::new(resource, new_state))
    }

    /// Apply `transitions` in order. Stops at the first rejected one; the ones
    /// before it stay enqueued.
    pub fn transition_resources(&mut self, transitions: &[StateTransition<'_, B>]) -> Result<()> {
        self.ensure_recording()?;
        for transition in transitions {
            self.transition(transition)?;
        }
        Ok(())
    }

    /// Order every unordered access to `resource` before any later one.
    pub fn insert_uav_barrier(&mut self, resource: &dyn TrackedResource<B>) -> Result<()> {
        self.ensure_recording()?;
        self.enqueue(Barrier::UnorderedAccess {
            resource: resource.raw(),
        });
        Ok(())
    }

    /// Declare that `after` reuses the memory of `before`. `None` stands for
    /// any resource placed in the same heap.
    pub fn insert_alias_barrier(
        &mut self,
        before: Option<&dyn TrackedResource<B>>,
        after: Option<&dyn TrackedResource<B>>,
        flush_immediate: bool,
    ) -> Result<()> {
        self.ensure_recording()?;
        self.enqueue(Barrier::Aliasing {
            before: before.map(|r| r.raw()),
            after: after.map(|r| r.raw()),
        });
        if flush_immediate {
            self.flush_resource_barriers();
        }
        Ok(())
    }

    /// Bind color targets and an optional depth target.
    ///
    /// Slot positions are kept: a `None` slot reaches the sink as an empty
    /// slot. With a `TRANSITION_*` flag, a known state that does not
    /// satisfy the target's role is transitioned; otherwise `VERIFY_STATES`
    /// (honoured when `verify_states` is configured) only reports mismatches.
    pub fn set_render_targets(
        &mut self,
        render_targets: &[Option<&dyn TrackedView<B>>],
        depth: Option<&dyn TrackedView<B>>,
        flags: RenderTargetFlags,
    ) -> Result<()> {
        self.ensure_recording()?;

        let mut views = Vec::with_capacity(render_targets.len());
        for (slot, rtv) in render_targets.iter().enumerate() {
            let Some(rtv) = rtv else {
                views.push(None);
                continue;
            };
            let texture = rtv.resource();
            if flags.contains(RenderTargetFlags::TRANSITION_COLOR) {
                self.require_state(texture, ResourceState::RENDER_TARGET)?;
            } else if self.should_verify(flags) {
                if let Some(mismatch) =
                    verify_resource_state(texture, ResourceState::RENDER_TARGET)
                {
                    log::warn!(
                        "{mismatch} (render target slot {slot}). Use RenderTargetFlags::TRANSITION_COLOR \
                         or transition the resource explicitly."
                    );
                }
            }
            views.push(Some(rtv.raw_view()));
        }

        let depth_view = match depth {
            Some(dsv) => {
                let texture = dsv.resource();
                if flags.contains(RenderTargetFlags::TRANSITION_DEPTH) {
                    self.require_state(texture, ResourceState::DEPTH_WRITE)?;
                } else if self.should_verify(flags) {
                    if let Some(mismatch) =
                        verify_resource_state(texture, ResourceState::DEPTH_WRITE)
                    {
                        log::warn!(
                            "{mismatch} (depth-stencil). Use RenderTargetFlags::TRANSITION_DEPTH \
                             or transition the resource explicitly."
                        );
                    }
                }
                Some(dsv.raw_view())
            }
            None => None,
        };

        if views.iter().all(Option::is_none) && depth_view.is_none() {
            return Ok(());
        }

        self.flush_resource_barriers();
        self.list.set_render_targets(&views, depth_view.as_ref());
        Ok(())
    }

    pub fn clear_render_target(&mut self, rtv: &dyn TrackedView<B>, color: [f32; 4]) -> Result<()> {
        self.ensure_recording()?;
        self.require_state(rtv.resource(), ResourceState::RENDER_TARGET)?;
        self.flush_resource_barriers();
        self.list.clear_render_target(&rtv.raw_view(), color);
        Ok(())
    }

    pub fn clear_depth_stencil(
        &mut self,
        dsv: &dyn TrackedView<B>,
        flags: ClearDepthStencilFlags,
        depth: f32,
        stencil: u8,
    ) -> Result<()> {
        self.ensure_recording()?;
        self.require_state(dsv.resource(), ResourceState::DEPTH_WRITE)?;
        self.flush_resource_barriers();
        self.list
            .clear_depth_stencil(&dsv.raw_view(), flags, depth, stencil);
        Ok(())
    }

    pub fn clear_uav_float(&mut self, uav: &dyn TrackedView<B>, values: [f32; 4]) -> Result<()> {
        self.ensure_recording()?;
        let resource = uav.resource();
        self.require_state(resource, ResourceState::UNORDERED_ACCESS)?;
        self.flush_resource_barriers();
        self.list
            .clear_uav_float(&uav.raw_view(), &resource.raw(), values);
        Ok(())
    }

    pub fn clear_uav_uint(&mut self, uav: &dyn TrackedView<B>, values: [u32; 4]) -> Result<()> {
        self.ensure_recording()?;
        let resource = uav.resource();
        self.require_state(resource, ResourceState::UNORDERED_ACCESS)?;
        self.flush_resource_barriers();
        self.list
            .clear_uav_uint(&uav.raw_view(), &resource.raw(), values);
        Ok(())
    }

    /// Copy `size` bytes between buffers, moving both into copy states first.
    pub fn copy_buffer_region(
        &mut self,
        dst: &dyn TrackedResource<B>,
        dst_offset: u64,
        src: &dyn TrackedResource<B>,
        src_offset: u64,
        size: u64,
    ) -> Result<()> {
        self.ensure_recording()?;
        self.require_state(src, ResourceState::COPY_SOURCE)?;
        self.require_state(dst, ResourceState::COPY_DEST)?;
        self.flush_resource_barriers();
        self.list
            .copy_buffer_region(&dst.raw(), dst_offset, &src.raw(), src_offset, size);
        Ok(())
    }

    /// Bind `pipeline` unless it is already the bound one.
    pub fn set_pipeline_state(&mut self, pipeline: &B::RawPipeline) -> Result<()> {
        self.ensure_recording()?;
        if self.pipeline.as_ref() == Some(pipeline) {
            return Ok(());
        }
        self.list.bind_pipeline(pipeline);
        self.pipeline = Some(pipeline.clone());
        Ok(())
    }

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()> {
        self.ensure_recording()?;
        self.flush_resource_barriers();
        self.list
            .draw(vertex_count, instance_count, first_vertex, first_instance);
        Ok(())
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.ensure_recording()?;
        self.flush_resource_barriers();
        self.list.dispatch(x, y, z);
        Ok(())
    }

    fn ensure_recording(&mut self) -> Result<()> {
        let current = std::thread::current().id();
        let owner = *self.owner.get_or_insert(current);
        debug_assert_eq!(owner, current, "CommandContext used from wrong thread");
        if self.allocator.is_none() {
            return Err(violation(ContractViolation::ContextClosed));
        }
        Ok(())
    }

    fn should_verify(&self, flags: RenderTargetFlags) -> bool {
        self.config.verify_states && flags.contains(RenderTargetFlags::VERIFY_STATES)
    }

    /// Transition `resource` into `state` if its state is known and does not
    /// satisfy it yet. Untracked resources are the application's business.
    fn require_state(
        &mut self,
        resource: &dyn TrackedResource<B>,
        state: ResourceState,
    ) -> Result<()> {
        let record = resource.state_record();
        if record.is_known() && !record.check(state) {
            self.transition(&StateTransition::new(resource, state))?;
        }
        Ok(())
    }

    fn enqueue(&mut self, barrier: Barrier<B::RawResource>) {
        log::trace!("Context '{}' enqueued {:?}", self.name, barrier);
        if self.barriers.push(barrier) {
            self.flush_resource_barriers();
        }
    }

    fn transition(&mut self, t: &StateTransition<'_, B>) -> Result<()> {
        let resource = t.resource;
        let name = resource.debug_name();
        let kind = resource.kind();

        if t.new_state.is_unknown() {
            return Err(violation(ContractViolation::UnknownTargetState {
                resource: name.to_string(),
            }));
        }

        if let ResourceKind::Buffer(desc) = kind {
            if desc.is_upload_only() {
                // The record must sit inside GENERIC_READ before and after.
                let current = if resource.state().is_known() {
                    resource.state()
                } else {
                    t.old_state
                };
                let stays_readable = t.update_state
                    && ResourceState::GENERIC_READ.contains(t.new_state)
                    && current.is_known()
                    && ResourceState::GENERIC_READ.contains(current);
                if !stays_readable {
                    return Err(violation(ContractViolation::DynamicBufferState {
                        resource: name.to_string(),
                        current,
                        requested: t.new_state,
                        tracked: t.update_state,
                    }));
                }
            }
        }

        let tracked = resource.state();
        let old_state = if tracked.is_unknown() {
            if t.old_state.is_unknown() {
                return Err(violation(ContractViolation::UnknownOldState {
                    resource: name.to_string(),
                }));
            }
            t.old_state
        } else {
            if t.old_state.is_known() && t.old_state != tracked {
                return Err(violation(ContractViolation::OldStateMismatch {
                    resource: name.to_string(),
                    tracked,
                    supplied: t.old_state,
                }));
            }
            tracked
        };

        // Per-subresource split, resolved before anything is enqueued.
        let split = match kind {
            ResourceKind::Texture(extent) if !t.range.covers(extent) => {
                let (mips, slices) = t.range.resolve(extent).ok_or_else(|| {
                    violation(ContractViolation::InvalidSubresourceRange {
                        resource: name.to_string(),
                        range: t.range,
                        extent,
                    })
                })?;
                Some((mips, slices, extent))
            }
            _ => None,
        };

        if !old_state.satisfies(t.new_state) {
            let mut new_state = t.new_state;
            if old_state.is_read_only() && new_state.is_read_only() {
                new_state |= old_state;
            }

            let raw = resource.raw();
            match split {
                None => self.enqueue(Barrier::Transition {
                    resource: raw,
                    kind,
                    subresource: Subresource::All,
                    before: old_state,
                    after: new_state,
                }),
                Some((mips, slices, extent)) => {
                    for mip in mips {
                        for slice in slices.clone() {
                            self.enqueue(Barrier::Transition {
                                resource: raw.clone(),
                                kind,
                                subresource: Subresource::Index(calc_subresource(
                                    mip, slice, 0, extent,
                                )),
                                before: old_state,
                                after: new_state,
                            });
                        }
                    }
                }
            }

            resource.state_record().set(if t.update_state {
                new_state
            } else {
                ResourceState::UNKNOWN
            });
        }

        if old_state == ResourceState::UNORDERED_ACCESS
            && t.new_state == ResourceState::UNORDERED_ACCESS
        {
            self.enqueue(Barrier::UnorderedAccess {
                resource: resource.raw(),
            });
        }

        Ok(())
    }
}

impl<B: Backend> Drop for CommandContext<B> {
    fn drop(&mut self) {
        if self.allocator.is_some() {
            log::warn!(
                "Command context '{}' destroyed while still owning its allocator; \
                 close it before releasing the context",
                self.name
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::driver::{BindFlags, BufferDesc, SubresourceExtent, SubresourceRange, Usage};
    use crate::gpu::error::GPUError;
    use crate::gpu::null::{NullBackend, NullCommand, NullDevice};

    fn context(device: &mut NullDevice) -> CommandContext<NullBackend> {
        CommandContext::new("test", device, &ContextConfig::default()).unwrap()
    }

    #[test]
    fn satisfied_state_is_a_no_op() {
        let mut device = NullDevice::new();
        let mut ctx = context(&mut device);
        let tex = device.create_texture(
            "rt",
            SubresourceExtent::new(1, 1),
            ResourceState::RENDER_TARGET | ResourceState::SHADER_RESOURCE,
        );

        ctx.transition_resource(&tex, ResourceState::RENDER_TARGET)
            .unwrap();
        assert_eq!(ctx.pending_barriers(), 0);
        assert_eq!(
            tex.state(),
            ResourceState::RENDER_TARGET | ResourceState::SHADER_RESOURCE
        );
    }

    #[test]
    fn unknown_target_is_rejected_without_side_effects() {
        let mut device = NullDevice::new();
        let mut ctx = context(&mut device);
        let tex = device.create_texture("tex", SubresourceExtent::new(1, 1), ResourceState::COPY_DEST);

        let err = ctx
            .transition_resource(&tex, ResourceState::UNKNOWN)
            .unwrap_err();
        assert!(matches!(
            err.as_violation(),
            Some(ContractViolation::UnknownTargetState { .. })
        ));
        assert_eq!(ctx.pending_barriers(), 0);
        assert_eq!(tex.state(), ResourceState::COPY_DEST);
    }

    #[test]
    fn untracked_resource_needs_an_old_state() {
        let mut device = NullDevice::new();
        let mut ctx = context(&mut device);
        let tex = device.create_texture(
            "app-managed",
            SubresourceExtent::new(1, 1),
            ResourceState::UNKNOWN,
        );

        let err = ctx
            .transition_resource(&tex, ResourceState::SHADER_RESOURCE)
            .unwrap_err();
        assert!(matches!(
            err.as_violation(),
            Some(ContractViolation::UnknownOldState { .. })
        ));

        ctx.transition_resources(&[
            StateTransition::<NullBackend>::new(&tex, ResourceState::SHADER_RESOURCE)
                .with_old_state(ResourceState::COPY_DEST)
                .untracked(),
        ])
        .unwrap();
        assert_eq!(ctx.pending_barriers(), 1);
        assert_eq!(tex.state(), ResourceState::UNKNOWN);
    }

    #[test]
    fn mismatching_old_state_is_rejected() {
        let mut device = NullDevice::new();
        let mut ctx = context(&mut device);
        let tex = device.create_texture("tex", SubresourceExtent::new(1, 1), ResourceState::COPY_DEST);

        let err = ctx
            .transition_resources(&[
                StateTransition::<NullBackend>::new(&tex, ResourceState::SHADER_RESOURCE)
                    .with_old_state(ResourceState::RENDER_TARGET),
            ])
            .unwrap_err();
        assert_eq!(
            err.as_violation(),
            Some(&ContractViolation::OldStateMismatch {
                resource: "tex".into(),
                tracked: ResourceState::COPY_DEST,
                supplied: ResourceState::RENDER_TARGET,
            })
        );
        assert_eq!(ctx.pending_barriers(), 0);
    }

    #[test]
    fn out_of_extent_range_is_rejected() {
        let mut device = NullDevice::new();
        let mut ctx = context(&mut device);
        let tex = device.create_texture("tex", SubresourceExtent::new(2, 1), ResourceState::COPY_DEST);

        let err = ctx
            .transition_resources(&[
                StateTransition::<NullBackend>::new(&tex, ResourceState::SHADER_RESOURCE)
                    .with_range(SubresourceRange::new(1, 2, 0, 1)),
            ])
            .unwrap_err();
        assert!(matches!(
            err.as_violation(),
            Some(ContractViolation::InvalidSubresourceRange { .. })
        ));
        assert_eq!(tex.state(), ResourceState::COPY_DEST);
    }

    #[test]
    fn dynamic_constant_buffer_stays_readable() {
        let mut device = NullDevice::new();
        let mut ctx = context(&mut device);
        let cb = device.create_buffer(
            "cb",
            BufferDesc {
                usage: Usage::Dynamic,
                bind_flags: BindFlags::UNIFORM_BUFFER,
            },
            ResourceState::GENERIC_READ,
        );

        let err = ctx
            .transition_resource(&cb, ResourceState::COPY_DEST)
            .unwrap_err();
        assert!(matches!(
            err.as_violation(),
            Some(ContractViolation::DynamicBufferState { .. })
        ));
        assert_eq!(cb.state(), ResourceState::GENERIC_READ);
    }

    #[test]
    fn pipeline_binds_are_elided_until_reset() {
        let mut device = NullDevice::new();
        let mut ctx = context(&mut device);
        let binds = |ctx: &CommandContext<NullBackend>| {
            ctx.command_list()
                .commands()
                .iter()
                .filter(|c| matches!(c, NullCommand::BindPipeline(_)))
                .count()
        };

        ctx.set_pipeline_state(&7).unwrap();
        ctx.set_pipeline_state(&7).unwrap();
        ctx.set_pipeline_state(&8).unwrap();
        assert_eq!(binds(&ctx), 2);

        ctx.close().unwrap();
        ctx.reset(&mut device).unwrap();
        ctx.set_pipeline_state(&8).unwrap();
        assert_eq!(binds(&ctx), 1);
    }

    #[test]
    fn draw_flushes_pending_barriers_first() {
        let mut device = NullDevice::new();
        let mut ctx = context(&mut device);
        let tex = device.create_texture("tex", SubresourceExtent::new(1, 1), ResourceState::COPY_DEST);

        ctx.transition_resource(&tex, ResourceState::SHADER_RESOURCE)
            .unwrap();
        ctx.draw(3, 1, 0, 0).unwrap();

        let commands = ctx.command_list().commands();
        assert!(matches!(&commands[0], NullCommand::Barriers(b) if b.len() == 1));
        assert!(matches!(commands[1], NullCommand::Draw { .. }));
        assert_eq!(ctx.pending_barriers(), 0);
    }

    #[test]
    fn closed_context_rejects_recording() {
        let mut device = NullDevice::new();
        let mut ctx = context(&mut device);
        ctx.close().unwrap();

        let err = ctx.dispatch(1, 1, 1).unwrap_err();
        assert!(matches!(
            err,
            GPUError::ContractViolation(ContractViolation::ContextClosed)
        ));
        assert!(ctx.close().is_err());
    }
}
