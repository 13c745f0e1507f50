//! Runtime configuration for the sequencer.
//!
//! Separate from the TOML-deserialized types in `mixer_config`; see
//! `conversions` for the mapping.

use std::time::Duration;

pub use crate::decoder::MismatchPolicy;

/// Acknowledgment handling shared by every action of a sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolCfg {
    /// Default acknowledgment deadline; `None` waits forever. Steps may override.
    pub ack_timeout: Option<Duration>,
    pub mismatch: MismatchPolicy,
}

impl Default for ProtocolCfg {
    fn default() -> Self {
        Self {
            ack_timeout: Some(Duration::from_secs(10)),
            mismatch: MismatchPolicy::Error,
        }
    }
}

/// What a failed step does to the rest of the recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failed step.
    #[default]
    Abort,
    /// Record the failure and move on to the next step. An unexpected ack
    /// byte still aborts, since it would fail every later step too.
    Continue,
}
