pub mod command;
pub mod state;
pub mod types;

pub use command::{AllocatorPool, CommandSink};
pub use state::{
    calc_subresource, verify_resource_state, ResourceKind, StateMismatch, StateRecord,
    StateTransition, SubresourceExtent, SubresourceRange, TrackedResource, TrackedView,
};
pub use types::{
    BindFlags, BufferDesc, ClearDepthStencilFlags, Handle, RenderTargetFlags, ResourceState,
    Usage,
};
