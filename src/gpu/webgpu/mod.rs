//! WebGPU has no CPU-observable fence and tracks resource usage itself, so
//! this backend only contributes the synchronization half: submissions are
//! tagged with [`SyncPoint`]s and completion is observed through a
//! [`PolledFence`] pumped by [`WebGpuPump`].

use std::sync::Arc;

use crate::gpu::config::FenceConfig;
use crate::gpu::Result;
use crate::sync::{DeviceTick, FenceDesc, PolledFence, SyncPoint};

/// Drives `wgpu`'s completion callbacks.
pub struct WebGpuPump {
    device: wgpu::Device,
}

impl WebGpuPump {
    pub fn new(device: wgpu::Device) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }
}

impl DeviceTick for WebGpuPump {
    fn device_tick(&self) {
        let _ = self.device.poll(wgpu::Maintain::Poll);
    }
}

/// Queue wrapper that hands out a [`SyncPoint`] per submission.
pub struct WebGpuQueue {
    queue: wgpu::Queue,
}

impl WebGpuQueue {
    pub fn new(queue: wgpu::Queue) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Submit and return a point that triggers once the GPU finished the work.
    pub fn submit<I>(&self, command_buffers: I) -> (wgpu::SubmissionIndex, SyncPoint)
    where
        I: IntoIterator<Item = wgpu::CommandBuffer>,
    {
        let index = self.queue.submit(command_buffers);
        let point = SyncPoint::new();
        let signal = point.clone();
        self.queue.on_submitted_work_done(move || signal.trigger());
        (index, point)
    }

    /// Submit and register the work under `value` on `fence`.
    pub fn submit_with_fence<I>(
        &self,
        command_buffers: I,
        fence: &PolledFence,
        value: u64,
    ) -> Result<wgpu::SubmissionIndex>
    where
        I: IntoIterator<Item = wgpu::CommandBuffer>,
    {
        let (index, point) = self.submit(command_buffers);
        fence.append_sync_points(vec![point], value)?;
        Ok(index)
    }
}

/// Create a fence whose blocking wait pumps `pump`.
pub fn create_fence(
    pump: Arc<WebGpuPump>,
    desc: FenceDesc,
    config: &FenceConfig,
) -> Result<PolledFence> {
    PolledFence::new(desc, pump, config)
}
