use std::sync::atomic::{AtomicU64, Ordering};

use ash::{vk, Device};

use crate::gpu::Result;
use crate::sync::{Fence, FenceDesc};

/// Fence backed by a Vulkan timeline semaphore. Supports host signal and a
/// native blocking wait.
pub struct TimelineFence {
    device: Device,
    semaphore: vk::Semaphore,
    desc: FenceDesc,
    last_completed: AtomicU64,
}

impl TimelineFence {
    pub fn new(device: Device, desc: FenceDesc) -> Result<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::builder()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let ci = vk::SemaphoreCreateInfo::builder().push_next(&mut type_info);
        let semaphore = unsafe { device.create_semaphore(&ci, None)? };
        Ok(Self {
            device,
            semaphore,
            desc,
            last_completed: AtomicU64::new(0),
        })
    }

    /// Semaphore to signal from a queue submission.
    pub fn raw(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Fence for TimelineFence {
    fn desc(&self) -> &FenceDesc {
        &self.desc
    }

    fn completed_value(&self) -> u64 {
        match unsafe { self.device.get_semaphore_counter_value(self.semaphore) } {
            Ok(value) => {
                self.last_completed.fetch_max(value, Ordering::AcqRel);
                value
            }
            Err(err) => {
                log::error!(
                    "Failed to query completed value of fence '{}': {}",
                    self.desc.name,
                    err
                );
                self.last_completed.load(Ordering::Acquire)
            }
        }
    }

    fn signal(&self, value: u64) -> Result<()> {
        let info = vk::SemaphoreSignalInfo::builder()
            .semaphore(self.semaphore)
            .value(value);
        unsafe { self.device.signal_semaphore(&info)? };
        Ok(())
    }

    fn wait(&self, value: u64) -> Result<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let info = vk::SemaphoreWaitInfo::builder()
            .semaphores(&semaphores)
            .values(&values);
        unsafe { self.device.wait_semaphores(&info, u64::MAX)? };
        Ok(())
    }
}

impl Drop for TimelineFence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}
