use ash::vk;

use crate::gpu::driver::{ResourceState, SubresourceExtent};
use crate::sync::Subresource;

pub(super) const STATE_TO_STAGE: &[(ResourceState, vk::PipelineStageFlags)] = &[
    (ResourceState::VERTEX_BUFFER, vk::PipelineStageFlags::VERTEX_INPUT),
    (ResourceState::INDEX_BUFFER, vk::PipelineStageFlags::VERTEX_INPUT),
    (ResourceState::CONSTANT_BUFFER, SHADER_STAGES),
    (ResourceState::RENDER_TARGET, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT),
    (ResourceState::UNORDERED_ACCESS, SHADER_STAGES),
    (ResourceState::DEPTH_WRITE, DEPTH_STAGES),
    (ResourceState::DEPTH_READ, DEPTH_STAGES),
    (ResourceState::SHADER_RESOURCE, SHADER_STAGES),
    (ResourceState::STREAM_OUT, vk::PipelineStageFlags::TRANSFORM_FEEDBACK_EXT),
    (ResourceState::INDIRECT_ARGUMENT, vk::PipelineStageFlags::DRAW_INDIRECT),
    (ResourceState::COPY_DEST, vk::PipelineStageFlags::TRANSFER),
    (ResourceState::COPY_SOURCE, vk::PipelineStageFlags::TRANSFER),
    (ResourceState::RESOLVE_DEST, vk::PipelineStageFlags::TRANSFER),
    (ResourceState::RESOLVE_SOURCE, vk::PipelineStageFlags::TRANSFER),
    (ResourceState::PRESENT, vk::PipelineStageFlags::BOTTOM_OF_PIPE),
];

pub(super) const STATE_TO_ACCESS: &[(ResourceState, vk::AccessFlags)] = &[
    (ResourceState::VERTEX_BUFFER, vk::AccessFlags::VERTEX_ATTRIBUTE_READ),
    (ResourceState::INDEX_BUFFER, vk::AccessFlags::INDEX_READ),
    (ResourceState::CONSTANT_BUFFER, vk::AccessFlags::UNIFORM_READ),
    (
        ResourceState::RENDER_TARGET,
        vk::AccessFlags::from_raw(
            vk::AccessFlags::COLOR_ATTACHMENT_READ.as_raw()
                | vk::AccessFlags::COLOR_ATTACHMENT_WRITE.as_raw(),
        ),
    ),
    (
        ResourceState::UNORDERED_ACCESS,
        vk::AccessFlags::from_raw(
            vk::AccessFlags::SHADER_READ.as_raw() | vk::AccessFlags::SHADER_WRITE.as_raw(),
        ),
    ),
    (
        ResourceState::DEPTH_WRITE,
        vk::AccessFlags::from_raw(
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
        ),
    ),
    (ResourceState::DEPTH_READ, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ),
    (ResourceState::SHADER_RESOURCE, vk::AccessFlags::SHADER_READ),
    (
        ResourceState::STREAM_OUT,
        vk::AccessFlags::TRANSFORM_FEEDBACK_WRITE_EXT,
    ),
    (ResourceState::INDIRECT_ARGUMENT, vk::AccessFlags::INDIRECT_COMMAND_READ),
    (ResourceState::COPY_DEST, vk::AccessFlags::TRANSFER_WRITE),
    (ResourceState::COPY_SOURCE, vk::AccessFlags::TRANSFER_READ),
    (ResourceState::RESOLVE_DEST, vk::AccessFlags::TRANSFER_WRITE),
    (ResourceState::RESOLVE_SOURCE, vk::AccessFlags::TRANSFER_READ),
    (ResourceState::PRESENT, vk::AccessFlags::empty()),
];

const SHADER_STAGES: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::VERTEX_SHADER.as_raw()
        | vk::PipelineStageFlags::FRAGMENT_SHADER.as_raw()
        | vk::PipelineStageFlags::COMPUTE_SHADER.as_raw(),
);

const DEPTH_STAGES: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS.as_raw()
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS.as_raw(),
);

/// States that only make sense for buffers and say nothing about an image layout.
const BUFFER_ONLY: ResourceState = ResourceState::from_bits_retain(
    ResourceState::VERTEX_BUFFER.bits()
        | ResourceState::CONSTANT_BUFFER.bits()
        | ResourceState::INDEX_BUFFER.bits()
        | ResourceState::INDIRECT_ARGUMENT.bits()
        | ResourceState::STREAM_OUT.bits(),
);

#[inline]
pub fn state_to_stages(state: ResourceState) -> vk::PipelineStageFlags {
    let mut flags = vk::PipelineStageFlags::empty();
    for (s, stage) in STATE_TO_STAGE {
        if state.contains(*s) {
            flags |= *stage;
        }
    }
    // Nothing to wait on for UNKNOWN/UNDEFINED.
    if flags.is_empty() {
        flags = vk::PipelineStageFlags::TOP_OF_PIPE;
    }
    flags
}

#[inline]
pub fn state_to_access(state: ResourceState) -> vk::AccessFlags {
    let mut flags = vk::AccessFlags::empty();
    for (s, access) in STATE_TO_ACCESS {
        if state.contains(*s) {
            flags |= *access;
        }
    }
    flags
}

/// Image layout that satisfies every access in `state`. Combinations with no
/// dedicated layout fall back to `GENERAL`.
pub fn state_to_layout(state: ResourceState) -> vk::ImageLayout {
    if state.is_unknown() || state == ResourceState::UNDEFINED {
        return vk::ImageLayout::UNDEFINED;
    }

    let image = state.difference(BUFFER_ONLY);
    let only = |allowed: ResourceState| !image.is_empty() && allowed.contains(image);

    if image == ResourceState::RENDER_TARGET {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    } else if image == ResourceState::DEPTH_WRITE {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    } else if image.contains(ResourceState::DEPTH_READ)
        && only(ResourceState::DEPTH_READ | ResourceState::SHADER_RESOURCE)
    {
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
    } else if image == ResourceState::SHADER_RESOURCE {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    } else if only(ResourceState::COPY_SOURCE | ResourceState::RESOLVE_SOURCE) {
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL
    } else if only(ResourceState::COPY_DEST | ResourceState::RESOLVE_DEST) {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL
    } else if image == ResourceState::PRESENT {
        vk::ImageLayout::PRESENT_SRC_KHR
    } else {
        vk::ImageLayout::GENERAL
    }
}

/// Subresource range addressed by a transition barrier.
pub fn subresource_range(
    subresource: Subresource,
    extent: SubresourceExtent,
    aspect: vk::ImageAspectFlags,
) -> vk::ImageSubresourceRange {
    match subresource {
        Subresource::All => vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        },
        Subresource::Index(index) => {
            let mips = extent.mip_levels.max(1);
            vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: index % mips,
                level_count: 1,
                base_array_layer: (index / mips) % extent.array_size.max(1),
                layer_count: 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::driver::calc_subresource;

    #[test]
    fn layouts_for_single_roles() {
        assert_eq!(
            state_to_layout(ResourceState::RENDER_TARGET),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(
            state_to_layout(ResourceState::UNORDERED_ACCESS),
            vk::ImageLayout::GENERAL
        );
        assert_eq!(
            state_to_layout(ResourceState::COPY_DEST),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        );
        assert_eq!(
            state_to_layout(ResourceState::UNKNOWN),
            vk::ImageLayout::UNDEFINED
        );
    }

    #[test]
    fn merged_read_states_fall_back_to_general() {
        assert_eq!(
            state_to_layout(ResourceState::SHADER_RESOURCE | ResourceState::COPY_SOURCE),
            vk::ImageLayout::GENERAL
        );
        assert_eq!(
            state_to_layout(ResourceState::GENERIC_READ),
            vk::ImageLayout::GENERAL
        );
        assert_eq!(
            state_to_layout(ResourceState::DEPTH_READ | ResourceState::SHADER_RESOURCE),
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        );
    }

    #[test]
    fn stages_and_access_accumulate() {
        let state = ResourceState::SHADER_RESOURCE | ResourceState::COPY_SOURCE;
        let stages = state_to_stages(state);
        assert!(stages.contains(vk::PipelineStageFlags::TRANSFER));
        assert!(stages.contains(vk::PipelineStageFlags::FRAGMENT_SHADER));
        assert_eq!(
            state_to_access(state),
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::TRANSFER_READ
        );
        assert_eq!(
            state_to_stages(ResourceState::UNKNOWN),
            vk::PipelineStageFlags::TOP_OF_PIPE
        );
    }

    #[test]
    fn subresource_index_round_trips_to_mip_and_layer() {
        let extent = SubresourceExtent::new(4, 3);
        let index = calc_subresource(2, 1, 0, extent);
        let range = subresource_range(
            Subresource::Index(index),
            extent,
            vk::ImageAspectFlags::COLOR,
        );
        assert_eq!(range.base_mip_level, 2);
        assert_eq!(range.base_array_layer, 1);
        assert_eq!(range.level_count, 1);
    }
}
