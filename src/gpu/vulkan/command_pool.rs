use ash::{vk, Device};
use std::{cell::UnsafeCell, marker::PhantomData, thread::ThreadId};

use super::{VkAllocator, VkCommandList, VulkanBackend};
use crate::gpu::driver::{AllocatorPool, CommandSink};
use crate::gpu::Result;

/// Pool of command allocators for one queue family.
///
/// Each allocator is a transient Vulkan command pool with a single primary
/// command buffer, so resetting one never touches a recording that is still
/// in flight on another. The pool may be moved to another thread after
/// creation but must not be shared across threads.
pub struct CommandAllocatorPool {
    device: Device,
    family: u32,
    free: Vec<VkAllocator>,
    owned: Vec<vk::CommandPool>,
    owner: ThreadId,
    // make !Sync
    _not_sync: PhantomData<UnsafeCell<()>>,
}

unsafe impl Send for CommandAllocatorPool {}

impl CommandAllocatorPool {
    pub fn new(device: Device, family: u32) -> Self {
        Self {
            device,
            family,
            free: Vec::new(),
            owned: Vec::new(),
            owner: std::thread::current().id(),
            _not_sync: PhantomData,
        }
    }

    fn assert_owner(&self) {
        debug_assert_eq!(
            self.owner,
            std::thread::current().id(),
            "CommandAllocatorPool used from wrong thread"
        );
    }

    fn create_allocator(&mut self) -> Result<VkAllocator> {
        let ci = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(self.family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .build();
        let pool = unsafe { self.device.create_command_pool(&ci, None)? };
        self.owned.push(pool);

        let cmd = unsafe {
            self.device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::builder()
                    .command_pool(pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1)
                    .build(),
            )?
        };
        Ok(VkAllocator {
            pool,
            cmd_buf: cmd[0],
        })
    }

    /// Return an allocator whose submission has finished executing.
    pub fn recycle(&mut self, allocator: VkAllocator) -> Result<()> {
        self.assert_owner();
        unsafe {
            self.device
                .reset_command_pool(allocator.pool, vk::CommandPoolResetFlags::empty())?;
        }
        self.free.push(allocator);
        Ok(())
    }

    pub fn free_allocators(&self) -> usize {
        self.free.len()
    }

    /// Destroy every Vulkan command pool created by this pool. Allocators
    /// still held elsewhere become invalid after this call.
    pub fn destroy(&mut self) {
        self.assert_owner();
        for pool in self.owned.drain(..) {
            unsafe {
                self.device.destroy_command_pool(pool, None);
            }
        }
        self.free.clear();
    }
}

impl AllocatorPool<VulkanBackend> for CommandAllocatorPool {
    fn request_allocator(&mut self) -> Result<VkAllocator> {
        self.assert_owner();
        match self.free.pop() {
            Some(allocator) => Ok(allocator),
            None => self.create_allocator(),
        }
    }

    fn create_command_list(&mut self) -> Result<(VkCommandList, VkAllocator)> {
        let allocator = self.request_allocator()?;
        let mut list = VkCommandList::new(self.device.clone());
        list.reset(&allocator)?;
        Ok((list, allocator))
    }
}
