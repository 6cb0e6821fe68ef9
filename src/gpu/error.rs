use thiserror::Error;

use super::driver::{ResourceState, SubresourceExtent, SubresourceRange};

/// Programmer errors caught by the barrier engine and the fence layer.
///
/// Nothing is recorded and no tracked state changes when one is reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("new state of resource '{resource}' can't be UNKNOWN")]
    UnknownTargetState { resource: String },

    #[error(
        "state of resource '{resource}' is unknown (managed by the application) \
         and no old state was supplied"
    )]
    UnknownOldState { resource: String },

    #[error(
        "state of resource '{resource}' is known ({tracked}) and does not match the \
         supplied old state ({supplied}); leave the old state UNKNOWN to use the tracked state"
    )]
    OldStateMismatch {
        resource: String,
        tracked: ResourceState,
        supplied: ResourceState,
    },

    #[error("subresource range ({range}) of '{resource}' lies outside its {extent:?}")]
    InvalidSubresourceRange {
        resource: String,
        range: SubresourceRange,
        extent: SubresourceExtent,
    },

    #[error(
        "dynamic buffer '{resource}' without SRV/UAV bind flags must stay tracked in a \
         GENERIC_READ state (current {current}, requested {requested}, tracked: {tracked})"
    )]
    DynamicBufferState {
        resource: String,
        current: ResourceState,
        requested: ResourceState,
        tracked: bool,
    },

    #[error("sync points must be appended in strictly increasing order ({value} <= {previous})")]
    NonMonotonicFenceValue { previous: u64, value: u64 },

    #[error("command context still owns an allocator awaiting submission")]
    AllocatorNotReleased,

    #[error("command context has no allocator; reset it before recording or closing")]
    ContextClosed,
}

#[derive(Debug, Error)]
pub enum GPUError {
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
    #[error("native submission failed: {0}")]
    Submission(String),
    #[cfg(feature = "dashi-vulkan")]
    #[error("Vulkan Error: {0}")]
    VulkanError(#[from] ash::vk::Result),
    #[cfg(feature = "dashi-dx12")]
    #[error("Direct3D 12 Error: {0}")]
    DirectX(#[from] windows::core::Error),
    #[cfg(feature = "dashi-serde")]
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),
}

/// Convenient crate-wide result type.
pub type Result<T, E = GPUError> = std::result::Result<T, E>;

/// Log a contract violation where it is detected and turn it into an error.
pub(crate) fn violation(v: ContractViolation) -> GPUError {
    log::error!("{v}");
    GPUError::ContractViolation(v)
}

impl GPUError {
    pub fn as_violation(&self) -> Option<&ContractViolation> {
        match self {
            GPUError::ContractViolation(v) => Some(v),
            _ => None,
        }
    }
}
