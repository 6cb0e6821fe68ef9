pub mod gpu;
pub mod sync;
pub mod utils;

pub use gpu::*;
pub use sync::{Fence, FenceDesc, FenceType, PolledFence, SyncPoint};
