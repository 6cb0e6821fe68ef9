use windows::core::PCWSTR;
use windows::Win32::Foundation::CloseHandle;
use windows::Win32::Graphics::Direct3D12::{ID3D12Device, ID3D12Fence, D3D12_FENCE_FLAG_NONE};
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject, INFINITE};

use crate::gpu::Result;
use crate::sync::{Fence, FenceDesc};

/// Fence backed by `ID3D12Fence`.
pub struct Dx12Fence {
    fence: ID3D12Fence,
    desc: FenceDesc,
}

// ID3D12Fence is free-threaded.
unsafe impl Send for Dx12Fence {}
unsafe impl Sync for Dx12Fence {}

impl Dx12Fence {
    pub fn new(device: &ID3D12Device, desc: FenceDesc) -> Result<Self> {
        let fence: ID3D12Fence = unsafe { device.CreateFence(0, D3D12_FENCE_FLAG_NONE)? };
        Ok(Self { fence, desc })
    }

    /// Fence to signal from `ID3D12CommandQueue::Signal`.
    pub fn raw(&self) -> &ID3D12Fence {
        &self.fence
    }
}

impl Fence for Dx12Fence {
    fn desc(&self) -> &FenceDesc {
        &self.desc
    }

    fn completed_value(&self) -> u64 {
        unsafe { self.fence.GetCompletedValue() }
    }

    fn signal(&self, value: u64) -> Result<()> {
        unsafe { self.fence.Signal(value)? };
        Ok(())
    }

    fn wait(&self, value: u64) -> Result<()> {
        if self.completed_value() >= value {
            return Ok(());
        }
        unsafe {
            // One event per wait so concurrent waiters never share it.
            let event = CreateEventW(None, false, false, PCWSTR::null())?;
            let armed = self.fence.SetEventOnCompletion(value, event);
            if armed.is_ok() {
                WaitForSingleObject(event, INFINITE);
            }
            CloseHandle(event)?;
            armed?;
        }
        Ok(())
    }
}
