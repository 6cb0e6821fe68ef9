use std::fmt;

/// Defines the native types a backend plugs into the barrier engine.
///
/// The engine never looks inside these types; it only moves them between
/// the [`CommandContext`] and the backend's [`CommandSink`].
///
/// # Examples
/// ```ignore
/// use dashi_sync::gpu::{Backend, CommandContext};
/// fn record<B: Backend>(ctx: &mut CommandContext<B>) {
///     ctx.flush_resource_barriers();
/// }
/// ```
pub trait Backend: Sized + 'static {
    /// Identity of a native resource as it appears inside a barrier.
    type RawResource: Clone + PartialEq + fmt::Debug;
    /// Descriptor used to bind or clear a view.
    type RawView: Clone + fmt::Debug;
    type RawPipeline: Clone + PartialEq + fmt::Debug;
    /// Backing memory for one recording; owned by exactly one context at a time.
    type Allocator;
    /// Closed, ready-to-submit command sequence.
    type Submission;
    type CommandList: CommandSink<Self>;
}

pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod null;

#[cfg(feature = "dashi-vulkan")]
pub mod vulkan;

#[cfg(feature = "dashi-dx12")]
pub mod dx12;

#[cfg(feature = "dashi-webgpu")]
pub mod webgpu;

pub use config::{ContextConfig, FenceConfig, HostModel, SyncConfig};
pub use context::{ClosedCommandList, CommandContext};
pub use driver::*;
pub use error::{ContractViolation, GPUError, Result};
