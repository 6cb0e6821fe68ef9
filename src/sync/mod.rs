pub mod barrier_builder;
pub mod fence;
pub mod sync_point;

pub use barrier_builder::{Barrier, BarrierBatch, Subresource};
pub use fence::{DeviceTick, Fence, FenceDesc, FenceType, PolledFence};
pub use sync_point::{SyncGroup, SyncPoint};
