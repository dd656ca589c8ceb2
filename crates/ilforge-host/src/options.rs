//! Host configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Limits and checks applied by a module and the types it materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct HostOptions {
    /// Instructions executed per top-level invocation before `StepLimit`.
    pub max_steps: u64,
    /// Nested calls allowed before `CallDepth`.
    pub max_call_depth: usize,
    /// Run structural validation on every body at `create_type`.
    pub validate_bodies: bool,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self { max_steps: 10_000_000, max_call_depth: 256, validate_bodies: true }
    }
}

impl HostOptions {
    /// Sets `max_steps`.
    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Sets `max_call_depth`.
    #[must_use]
    pub const fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Sets `validate_bodies`.
    #[must_use]
    pub const fn with_validation(mut self, validate: bool) -> Self {
        self.validate_bodies = validate;
        self
    }
}
