use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::sync_point::{SyncGroup, SyncPoint};
use crate::gpu::config::{FenceConfig, HostModel};
use crate::gpu::error::{violation, ContractViolation, GPUError, Result};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum FenceType {
    /// Only the CPU observes and waits on the fence.
    #[default]
    CpuWaitOnly,
    /// The fence may also be waited on or signaled by GPU queues.
    General,
}

#[derive(Debug, Clone, Default)]
pub struct FenceDesc {
    pub name: String,
    pub fence_type: FenceType,
}

impl FenceDesc {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fence_type: FenceType::CpuWaitOnly,
        }
    }
}

/// Drives a backend's internal event/completion processing one step.
///
/// Used only by polling waits on backends without a blocking primitive.
pub trait DeviceTick: Send + Sync {
    fn device_tick(&self);
}

/// Backend-agnostic fence: a monotonically advancing "last completed" value.
pub trait Fence: Send + Sync {
    fn desc(&self) -> &FenceDesc;

    /// Highest value known to be complete.
    fn completed_value(&self) -> u64;

    /// Set the fence to `value` from the host.
    fn signal(&self, value: u64) -> Result<()>;

    /// Block the calling thread until [`Fence::completed_value`] reaches `value`.
    /// There is no timeout; poll `completed_value` against a deadline instead.
    fn wait(&self, value: u64) -> Result<()>;
}

#[derive(Debug, Default)]
struct PendingGroups {
    queue: VecDeque<SyncGroup>,
    last_appended: Option<u64>,
}

/// Fence for backends with no CPU-observable GPU fence.
///
/// Submissions register [`SyncPoint`]s under a logical value. Groups retire
/// strictly oldest first, and the completed value only advances when the
/// oldest group has every point triggered. Completion is observed lazily:
/// reading the value is what retires groups.
pub struct PolledFence {
    desc: FenceDesc,
    pending: Mutex<PendingGroups>,
    last_completed: AtomicU64,
    pump: Arc<dyn DeviceTick>,
    host: HostModel,
}

impl PolledFence {
    pub fn new(desc: FenceDesc, pump: Arc<dyn DeviceTick>, config: &FenceConfig) -> Result<Self> {
        if desc.fence_type != FenceType::CpuWaitOnly {
            log::error!(
                "Description of fence '{}' is invalid: {:?} fences are not supported without native fences",
                desc.name,
                desc.fence_type
            );
            return Err(GPUError::Unsupported("general fences"));
        }

        Ok(Self {
            desc,
            pending: Mutex::new(PendingGroups::default()),
            last_completed: AtomicU64::new(0),
            pump,
            host: config.host,
        })
    }

    /// Register `points` as the work that must finish before `value` is
    /// complete. `value` must exceed every value appended before.
    pub fn append_sync_points(&self, points: Vec<SyncPoint>, value: u64) -> Result<()> {
        {
            let mut pending = self.pending.lock();
            if let Some(previous) = pending.last_appended {
                if value <= previous {
                    return Err(violation(ContractViolation::NonMonotonicFenceValue {
                        previous,
                        value,
                    }));
                }
            }
            pending.last_appended = Some(value);
            pending.queue.push_back(SyncGroup::new(value, points));
        }

        self.process_sync_points();
        Ok(())
    }

    /// Retire every leading group whose points have all triggered.
    pub fn process_sync_points(&self) {
        let mut pending = self.pending.lock();
        while let Some(group) = pending.queue.front_mut() {
            if !group.retire_triggered() {
                break;
            }
            let value = group.value;
            pending.queue.pop_front();
            self.last_completed.fetch_max(value, Ordering::AcqRel);
            log::debug!("Fence '{}' reached {}", self.desc.name, value);
        }
    }

    /// Number of groups not yet retired.
    pub fn pending_groups(&self) -> usize {
        self.pending.lock().queue.len()
    }
}

impl Fence for PolledFence {
    fn desc(&self) -> &FenceDesc {
        &self.desc
    }

    fn completed_value(&self) -> u64 {
        self.process_sync_points();
        self.last_completed.load(Ordering::Acquire)
    }

    fn signal(&self, _value: u64) -> Result<()> {
        log::error!(
            "Fence '{}': signal() is not supported on backends without native fences",
            self.desc.name
        );
        Err(GPUError::Unsupported("Fence::signal"))
    }

    fn wait(&self, value: u64) -> Result<()> {
        if self.host == HostModel::Cooperative {
            log::error!(
                "Fence '{}': wait() is not supported on cooperative hosts; poll completed_value() instead",
                self.desc.name
            );
            return Err(GPUError::Unsupported("blocking Fence::wait on a cooperative host"));
        }

        while self.completed_value() < value {
            self.pump.device_tick();
            std::thread::yield_now();
        }
        Ok(())
    }
}

impl std::fmt::Debug for PolledFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolledFence")
            .field("desc", &self.desc)
            .field("last_completed", &self.last_completed.load(Ordering::Relaxed))
            .field("host", &self.host)
            .finish()
    }
}
