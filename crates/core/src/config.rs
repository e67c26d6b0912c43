// SPDX-FileCopyrightText: © 2025 Circuitry Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Runtime-tunable circuit configuration.
//!
//! The original runtime hard-codes the send timeout at one second and
//! always reports slow sends. The design notes flag both as configuration
//! that should be exposed; this is a plain struct with a `Default` impl,
//! passed into the circuit constructor, following the shape of
//! `OneshotEngineConfig`/`DynamicEngineConfig` in the teacher engine crate.

use std::time::Duration;

/// Default value of [`CircuitConfig::send_timeout`], per §9's resolution of
/// the original runtime's hard-coded `1s` value.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Tunables for a circuit's send path.
#[derive(Debug, Clone, Copy)]
pub struct CircuitConfig {
    /// How long [`crate::gadget::GadgetContext::send`] waits on a full
    /// output before giving up with [`crate::error::SendError::Timeout`].
    pub send_timeout: Duration,

    /// Whether a timed-out send is logged at `warn` level. Disable in tests
    /// that intentionally exercise backpressure to keep output quiet.
    pub report_slow_sends: bool,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self { send_timeout: DEFAULT_SEND_TIMEOUT, report_slow_sends: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_original_hard_coded_values() {
        let config = CircuitConfig::default();
        assert_eq!(config.send_timeout, Duration::from_secs(1));
        assert!(config.report_slow_sends);
    }
}
