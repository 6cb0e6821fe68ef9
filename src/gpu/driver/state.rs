use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use super::types::{BufferDesc, ResourceState};
use crate::gpu::Backend;

/// Mip/array extent a texture was allocated with.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubresourceExtent {
    pub mip_levels: u32,
    pub array_size: u32,
}

impl SubresourceExtent {
    pub fn new(mip_levels: u32, array_size: u32) -> Self {
        Self {
            mip_levels,
            array_size,
        }
    }

    pub fn subresource_count(&self) -> u32 {
        self.mip_levels * self.array_size
    }
}

/// Flattened subresource index, plane-major then slice-major then mip.
pub fn calc_subresource(mip: u32, slice: u32, plane: u32, extent: SubresourceExtent) -> u32 {
    mip + slice * extent.mip_levels + plane * extent.mip_levels * extent.array_size
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubresourceRange {
    pub base_mip: u32,
    pub level_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl SubresourceRange {
    pub const REMAINING_MIP_LEVELS: u32 = u32::MAX;
    pub const REMAINING_ARRAY_SLICES: u32 = u32::MAX;

    pub fn new(base_mip: u32, level_count: u32, base_layer: u32, layer_count: u32) -> Self {
        Self {
            base_mip,
            level_count,
            base_layer,
            layer_count,
        }
    }

    /// Every subresource of the resource.
    pub fn all() -> Self {
        Self::new(
            0,
            Self::REMAINING_MIP_LEVELS,
            0,
            Self::REMAINING_ARRAY_SLICES,
        )
    }

    /// Resolve "remaining" sentinels against `extent`, returning the
    /// half-open mip and slice ranges or `None` if the range leaves the
    /// allocated extent.
    pub fn resolve(
        &self,
        extent: SubresourceExtent,
    ) -> Option<(std::ops::Range<u32>, std::ops::Range<u32>)> {
        if self.base_mip >= extent.mip_levels || self.base_layer >= extent.array_size {
            return None;
        }

        let end_mip = if self.level_count == Self::REMAINING_MIP_LEVELS {
            extent.mip_levels
        } else {
            self.base_mip.checked_add(self.level_count)?
        };
        let end_slice = if self.layer_count == Self::REMAINING_ARRAY_SLICES {
            extent.array_size
        } else {
            self.base_layer.checked_add(self.layer_count)?
        };

        if end_mip > extent.mip_levels
            || end_slice > extent.array_size
            || end_mip <= self.base_mip
            || end_slice <= self.base_layer
        {
            return None;
        }

        Some((self.base_mip..end_mip, self.base_layer..end_slice))
    }

    /// True when the range names every subresource of `extent`.
    pub fn covers(&self, extent: SubresourceExtent) -> bool {
        self.base_mip == 0
            && (self.level_count == Self::REMAINING_MIP_LEVELS
                || self.level_count == extent.mip_levels)
            && self.base_layer == 0
            && (self.layer_count == Self::REMAINING_ARRAY_SLICES
                || self.layer_count == extent.array_size)
    }
}

impl Default for SubresourceRange {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for SubresourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = |n: u32| {
            if n == u32::MAX {
                "remaining".to_string()
            } else {
                n.to_string()
            }
        };
        write!(
            f,
            "mips {}+{}, slices {}+{}",
            self.base_mip,
            count(self.level_count),
            self.base_layer,
            count(self.layer_count)
        )
    }
}

/// Per-resource state tag.
///
/// Only the barrier engine writes it. The record is not a synchronization
/// point: two contexts transitioning the same resource concurrently get an
/// unspecified final state, so callers order such work externally.
#[derive(Debug, Default)]
pub struct StateRecord {
    bits: AtomicU32,
}

impl StateRecord {
    pub fn new(initial: ResourceState) -> Self {
        Self {
            bits: AtomicU32::new(initial.bits()),
        }
    }

    pub fn get(&self) -> ResourceState {
        ResourceState::from_bits_retain(self.bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set(&self, state: ResourceState) {
        self.bits.store(state.bits(), Ordering::Relaxed);
    }

    pub fn is_known(&self) -> bool {
        self.get().is_known()
    }

    pub fn check(&self, required: ResourceState) -> bool {
        self.get().satisfies(required)
    }
}

/// What kind of native object sits behind a [`TrackedResource`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Texture(SubresourceExtent),
    Buffer(BufferDesc),
}

impl ResourceKind {
    pub fn extent(&self) -> Option<SubresourceExtent> {
        match self {
            ResourceKind::Texture(extent) => Some(*extent),
            ResourceKind::Buffer(_) => None,
        }
    }
}

/// Capability the barrier engine drives every resource through.
///
/// Textures and buffers are both expressed through this one interface; the
/// engine only looks at [`ResourceKind`] when it has to shape a barrier.
pub trait TrackedResource<B: Backend> {
    fn state_record(&self) -> &StateRecord;
    fn kind(&self) -> ResourceKind;
    fn raw(&self) -> B::RawResource;
    fn debug_name(&self) -> &str {
        ""
    }

    fn state(&self) -> ResourceState {
        self.state_record().get()
    }
}

/// A view of a texture that can be bound as a render target, depth target or
/// unordered-access view.
pub trait TrackedView<B: Backend> {
    fn resource(&self) -> &dyn TrackedResource<B>;
    fn raw_view(&self) -> B::RawView;
}

/// One requested state change.
pub struct StateTransition<'a, B: Backend> {
    pub resource: &'a dyn TrackedResource<B>,
    /// State the caller knows the resource is in. Must be supplied when the
    /// resource's record is `UNKNOWN`; otherwise leave it `UNKNOWN` or make
    /// it match the record.
    pub old_state: ResourceState,
    pub new_state: ResourceState,
    pub range: SubresourceRange,
    /// When false the record is set to `UNKNOWN` after the transition and the
    /// application keeps tracking the resource itself.
    pub update_state: bool,
}

impl<'a, B: Backend> StateTransition<'a, B> {
    pub fn new(resource: &'a dyn TrackedResource<B>, new_state: ResourceState) -> Self {
        Self {
            resource,
            old_state: ResourceState::UNKNOWN,
            new_state,
            range: SubresourceRange::all(),
            update_state: true,
        }
    }

    pub fn with_old_state(mut self, old_state: ResourceState) -> Self {
        self.old_state = old_state;
        self
    }

    pub fn with_range(mut self, range: SubresourceRange) -> Self {
        self.range = range;
        self
    }

    pub fn untracked(mut self) -> Self {
        self.update_state = false;
        self
    }
}

/// Diagnostic produced when a resource is used in a state other than the one
/// an operation requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMismatch {
    pub resource: String,
    pub required: ResourceState,
    pub actual: ResourceState,
}

impl fmt::Display for StateMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resource '{}' is not transitioned to {} state; actual state: {}",
            self.resource, self.required, self.actual
        )
    }
}

/// Returns a mismatch when the resource's tracked state is known and does not
/// satisfy `required`. Untracked resources are never reported.
pub fn verify_resource_state<B: Backend>(
    resource: &dyn TrackedResource<B>,
    required: ResourceState,
) -> Option<StateMismatch> {
    let actual = resource.state();
    if actual.is_known() && !actual.satisfies(required) {
        Some(StateMismatch {
            resource: resource.debug_name().to_string(),
            required,
            actual,
        })
    } else {
        None
    }
}
