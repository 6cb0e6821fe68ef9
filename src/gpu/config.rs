#[cfg(feature = "dashi-serde")]
use serde::{Deserialize, Serialize};

/// Bound on the pending-barrier batch before it is flushed implicitly.
pub const DEFAULT_MAX_PENDING_BARRIERS: usize = 16;

/// Whether the thread that waits on a fence is also the one that drives the
/// backend's completion pump.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum HostModel {
    /// Blocking the calling thread leaves the pump running.
    Threaded,
    /// Single-threaded event loop (browsers). Blocking would starve the pump.
    Cooperative,
}

impl Default for HostModel {
    fn default() -> Self {
        if cfg!(target_arch = "wasm32") {
            HostModel::Cooperative
        } else {
            HostModel::Threaded
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "dashi-serde", serde(default))]
pub struct ContextConfig {
    pub max_pending_barriers: usize,
    /// Report, rather than fix, resources bound in the wrong state.
    pub verify_states: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_pending_barriers: DEFAULT_MAX_PENDING_BARRIERS,
            verify_states: cfg!(debug_assertions),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "dashi-serde", serde(default))]
pub struct FenceConfig {
    pub host: HostModel,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "dashi-serde", serde(default))]
pub struct SyncConfig {
    pub context: ContextConfig,
    pub fence: FenceConfig,
}

impl SyncConfig {
    #[cfg(feature = "dashi-serde")]
    pub fn from_yaml(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }

    /// Apply `DASHI_VERIFY_STATES` and `DASHI_MAX_PENDING_BARRIERS` on top of
    /// `self`. Unparsable values are ignored with a warning.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var("DASHI_VERIFY_STATES") {
            match value.as_str() {
                "1" | "true" => self.context.verify_states = true,
                "0" | "false" => self.context.verify_states = false,
                other => log::warn!("Ignoring DASHI_VERIFY_STATES={other}"),
            }
        }

        if let Ok(value) = std::env::var("DASHI_MAX_PENDING_BARRIERS") {
            match value.parse::<usize>() {
                Ok(n) if n > 0 => self.context.max_pending_barriers = n,
                _ => log::warn!("Ignoring DASHI_MAX_PENDING_BARRIERS={value}"),
            }
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.context.max_pending_barriers, DEFAULT_MAX_PENDING_BARRIERS);
        assert_eq!(cfg.context.verify_states, cfg!(debug_assertions));
        assert_eq!(cfg.fence.host, HostModel::Threaded);
    }

    #[cfg(feature = "dashi-serde")]
    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg = SyncConfig::from_yaml(
            r#"
context:
  max_pending_barriers: 4
fence:
  host: Cooperative
"#,
        )
        .unwrap();
        assert_eq!(cfg.context.max_pending_barriers, 4);
        assert_eq!(cfg.context.verify_states, cfg!(debug_assertions));
        assert_eq!(cfg.fence.host, HostModel::Cooperative);
    }
}
