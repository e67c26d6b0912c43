// SPDX-FileCopyrightText: © 2025 Circuitry Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The circuit-wide abort signal.
//!
//! Modeled as a single cancellation token created at the root circuit and
//! inherited by every descendant sub-circuit at `add_circuitry` time, as
//! described in the design notes. `tokio_util::sync::CancellationToken`
//! already gives us idempotent, cheaply-clonable cancellation with a
//! `child_token` that stays independently observable but cancels with its
//! parent - exactly the "shared abort signal across sub-circuits" shape.

use tokio_util::sync::CancellationToken;

/// Cooperative, idempotent, inheritable shutdown signal for a circuit and
/// all of its descendants.
#[derive(Debug, Clone)]
pub struct AbortSignal(CancellationToken);

impl AbortSignal {
    /// Creates a new, unaborted root signal.
    #[must_use]
    pub fn new() -> Self {
        Self(CancellationToken::new())
    }

    /// Creates a child signal: cancelling `self` cancels the child too, but
    /// the child can't cancel its parent or its siblings.
    #[must_use]
    pub fn child(&self) -> Self {
        Self(self.0.child_token())
    }

    /// Requests shutdown. Safe to call multiple times, concurrently.
    pub fn abort(&self) {
        self.0.cancel();
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolves once `abort()` has been called on this signal or an ancestor.
    pub async fn cancelled(&self) {
        self.0.cancelled().await;
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn abort_is_idempotent_and_observable() {
        let signal = AbortSignal::new();
        assert!(!signal.is_aborted());
        signal.abort();
        signal.abort();
        assert!(signal.is_aborted());
        signal.cancelled().await;
    }

    #[tokio::test]
    async fn child_observes_parent_abort() {
        let parent = AbortSignal::new();
        let child = parent.child();
        assert!(!child.is_aborted());
        parent.abort();
        assert!(child.is_aborted());
    }
}
