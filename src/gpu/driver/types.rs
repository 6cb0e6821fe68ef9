use std::fmt;

use bitflags::bitflags;

#[cfg(feature = "dashi-serde")]
use serde::{Deserialize, Serialize};

pub use crate::utils::Handle;

bitflags! {
    /// Access classes a resource is currently synchronized for.
    ///
    /// Several read-only classes may be set at once. The empty mask is the
    /// `UNKNOWN` sentinel: the engine does not track the resource and the
    /// application supplies the prior state when transitioning it.
    #[repr(transparent)]
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceState: u32 {
        const UNKNOWN           = 0;
        const UNDEFINED         = 0x1;
        const VERTEX_BUFFER     = 0x2;
        const CONSTANT_BUFFER   = 0x4;
        const INDEX_BUFFER      = 0x8;
        const RENDER_TARGET     = 0x10;
        const UNORDERED_ACCESS  = 0x20;
        const DEPTH_WRITE       = 0x40;
        const DEPTH_READ        = 0x80;
        const SHADER_RESOURCE   = 0x100;
        const STREAM_OUT        = 0x200;
        const INDIRECT_ARGUMENT = 0x400;
        const COPY_DEST         = 0x800;
        const COPY_SOURCE       = 0x1000;
        const RESOLVE_DEST      = 0x2000;
        const RESOLVE_SOURCE    = 0x4000;
        const PRESENT           = 0x8000;

        /// Every state a resource may be in for read-only access by several
        /// consumers at once.
        const GENERIC_READ = Self::VERTEX_BUFFER.bits()
            | Self::CONSTANT_BUFFER.bits()
            | Self::INDEX_BUFFER.bits()
            | Self::SHADER_RESOURCE.bits()
            | Self::INDIRECT_ARGUMENT.bits()
            | Self::COPY_SOURCE.bits();
    }
}

impl ResourceState {
    pub fn is_unknown(self) -> bool {
        self.is_empty()
    }

    pub fn is_known(self) -> bool {
        !self.is_empty()
    }

    /// True when every bit of `self` lies inside [`ResourceState::GENERIC_READ`].
    pub fn is_read_only(self) -> bool {
        self.is_known() && ResourceState::GENERIC_READ.contains(self)
    }

    /// True when the resource is already usable for `required`.
    pub fn satisfies(self, required: ResourceState) -> bool {
        self.contains(required)
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            return f.write_str("UNKNOWN");
        }
        if *self == ResourceState::GENERIC_READ {
            return f.write_str("GENERIC_READ");
        }
        let mut first = true;
        for (name, _) in self.iter_names() {
            if name == "GENERIC_READ" {
                continue;
            }
            if !first {
                f.write_str(" | ")?;
            }
            f.write_str(name)?;
            first = false;
        }
        Ok(())
    }
}

bitflags! {
    /// Pipeline binding capabilities a buffer was created with.
    #[repr(transparent)]
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BindFlags: u32 {
        const VERTEX_BUFFER    = 0x1;
        const INDEX_BUFFER     = 0x2;
        const UNIFORM_BUFFER   = 0x4;
        const SHADER_RESOURCE  = 0x8;
        const UNORDERED_ACCESS = 0x10;
        const INDIRECT_ARGS    = 0x20;
        const RENDER_TARGET    = 0x40;
        const DEPTH_STENCIL    = 0x80;
    }
}

/// How the host updates a resource's contents.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum Usage {
    Immutable,
    #[default]
    Default,
    /// Rewritten by the host every frame through a staging suballocation.
    Dynamic,
    Staging,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDesc {
    pub usage: Usage,
    pub bind_flags: BindFlags,
}

impl BufferDesc {
    /// Dynamic buffers that cannot be bound as SRV or UAV live in the upload
    /// heap and must stay in [`ResourceState::GENERIC_READ`].
    pub fn is_upload_only(&self) -> bool {
        self.usage == Usage::Dynamic
            && !self
                .bind_flags
                .intersects(BindFlags::SHADER_RESOURCE | BindFlags::UNORDERED_ACCESS)
    }
}

bitflags! {
    /// Controls how [`CommandContext::set_render_targets`](crate::gpu::CommandContext::set_render_targets)
    /// treats the state of the bound textures.
    #[repr(transparent)]
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderTargetFlags: u32 {
        const TRANSITION_COLOR = 0x1;
        const TRANSITION_DEPTH = 0x2;
        const TRANSITION_ALL   = Self::TRANSITION_COLOR.bits() | Self::TRANSITION_DEPTH.bits();
        /// Only check states and report mismatches; never transitions.
        const VERIFY_STATES    = 0x4;
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearDepthStencilFlags: u32 {
        const DEPTH   = 0x1;
        const STENCIL = 0x2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_is_the_empty_mask() {
        assert!(ResourceState::UNKNOWN.is_unknown());
        assert!(!ResourceState::RENDER_TARGET.is_unknown());
        assert!(!ResourceState::UNKNOWN.is_read_only());
    }

    #[test]
    fn read_only_states() {
        assert!(ResourceState::SHADER_RESOURCE.is_read_only());
        assert!((ResourceState::SHADER_RESOURCE | ResourceState::COPY_SOURCE).is_read_only());
        assert!(ResourceState::GENERIC_READ.is_read_only());
        assert!(!ResourceState::RENDER_TARGET.is_read_only());
        assert!(!(ResourceState::SHADER_RESOURCE | ResourceState::COPY_DEST).is_read_only());
        assert!(!ResourceState::DEPTH_READ.is_read_only());
    }

    #[test]
    fn display_lists_flag_names() {
        assert_eq!(ResourceState::UNKNOWN.to_string(), "UNKNOWN");
        assert_eq!(ResourceState::GENERIC_READ.to_string(), "GENERIC_READ");
        assert_eq!(
            (ResourceState::SHADER_RESOURCE | ResourceState::COPY_SOURCE).to_string(),
            "SHADER_RESOURCE | COPY_SOURCE"
        );
    }

    #[test]
    fn upload_only_buffers() {
        let dynamic_cb = BufferDesc {
            usage: Usage::Dynamic,
            bind_flags: BindFlags::UNIFORM_BUFFER,
        };
        assert!(dynamic_cb.is_upload_only());

        let dynamic_srv = BufferDesc {
            usage: Usage::Dynamic,
            bind_flags: BindFlags::UNIFORM_BUFFER | BindFlags::SHADER_RESOURCE,
        };
        assert!(!dynamic_srv.is_upload_only());

        let default_cb = BufferDesc {
            usage: Usage::Default,
            bind_flags: BindFlags::UNIFORM_BUFFER,
        };
        assert!(!default_cb.is_upload_only());
    }
}
