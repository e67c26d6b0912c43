// SPDX-FileCopyrightText: © 2025 Circuitry Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for circuitry.
//!
//! `CircuitError` covers the build-time misuse taxonomy (§7 of the design):
//! in the original runtime these are fatal (`glog.Fatalln`, terminating the
//! process). A library can't unilaterally kill its host process, so every
//! fallible builder method here returns a `Result` instead; callers that
//! want the original fail-fast behavior call `.expect(...)` at the call
//! site - the idiomatic Rust equivalent of "fatal".

use thiserror::Error;

/// Build-time and runtime misuse errors surfaced by the circuit builder API.
#[derive(Debug, Error)]
pub enum CircuitError {
    /// A gadget name was added twice to the same circuit.
    #[error("gadget '{0}' is already owned by this circuit")]
    AlreadyOwnedGadget(String),

    /// An output pin (or fan-out key) already has a producer bound.
    #[error("output pin '{0}' already has a producer bound")]
    DuplicateOutputBinding(String),

    /// A `label` external name contained a `.`.
    #[error("invalid label '{0}': external pin names must not contain '.'")]
    InvalidLabel(String),

    /// A wire, feed, or label referenced a pin the target gadget never declared.
    #[error("unknown pin '{0}'")]
    UnknownPin(String),

    /// Malformed input: an empty name, an unparseable pin path, etc.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Any other runtime failure (registry lookup races, supervisor channel closed).
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<String> for CircuitError {
    fn from(s: String) -> Self {
        Self::Runtime(s)
    }
}

impl From<&str> for CircuitError {
    fn from(s: &str) -> Self {
        Self::Runtime(s.to_string())
    }
}

/// Outcome of [`crate::gadget::GadgetContext::send`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The circuit aborted, or the wire's last consumer disconnected.
    #[error("output closed")]
    Closed,

    /// Neither room nor abort arrived within the configured send timeout.
    #[error("send timed out")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_descriptive() {
        let err = CircuitError::UnknownPin("gizmo.Foo".to_string());
        assert_eq!(err.to_string(), "unknown pin 'gizmo.Foo'");
    }

    #[test]
    fn string_conversions_default_to_runtime() {
        let err: CircuitError = "boom".into();
        assert!(matches!(err, CircuitError::Runtime(_)));
    }
}
