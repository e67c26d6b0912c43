// SPDX-FileCopyrightText: © 2025 Circuitry Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Gadget factory registry (§4.1).
//!
//! The original runtime resolves a gadget's Go struct type by string name,
//! using a process-wide map populated by `init()` side effects in each
//! gadget's package. This rewrite keeps the same "name to factory" shape but
//! drops the init-time magic: callers build a `Registry` explicitly and
//! register factories into it, following `NodeRegistry` in the teacher core
//! crate. The catalogue/JSON-schema/resource-manager machinery `NodeRegistry`
//! carries is web-API surface with no counterpart here and was left behind.

use crate::error::CircuitError;
use crate::gadget::Gadget;
use std::collections::HashMap;
use std::sync::Arc;

/// Constructs a boxed gadget from an optional JSON configuration blob.
pub type GadgetFactory =
    Arc<dyn Fn(Option<&serde_json::Value>) -> Result<Box<dyn Gadget>, CircuitError> + Send + Sync>;

/// A name-to-factory map used to instantiate gadgets by string kind.
///
/// Mirrors `NodeRegistry`: a circuit builder doesn't need a registry at all
/// if it constructs gadgets directly, but one is handy when gadget kinds are
/// chosen dynamically (configuration files, the dispatcher pattern's decoder
/// lookup in §4.7).
#[derive(Clone, Default)]
pub struct Registry {
    factories: HashMap<String, GadgetFactory>,
}

impl Registry {
    /// Creates a new, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `kind`. Replaces any prior registration
    /// under the same name.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(Option<&serde_json::Value>) -> Result<Box<dyn Gadget>, CircuitError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    /// Constructs a gadget by its registered kind.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitError::Runtime`] if `kind` isn't registered, or
    /// whatever the factory itself returns on construction failure.
    pub fn create(
        &self,
        kind: &str,
        params: Option<&serde_json::Value>,
    ) -> Result<Box<dyn Gadget>, CircuitError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| CircuitError::Runtime(format!("gadget kind '{kind}' not registered")))?;
        factory(params)
    }

    /// Removes a registration. Returns `true` if `kind` was present.
    pub fn unregister(&mut self, kind: &str) -> bool {
        self.factories.remove(kind).is_some()
    }

    /// True if `kind` has a registered factory.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// The number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pin::PinSet;

    struct Noop;

    #[async_trait::async_trait]
    impl Gadget for Noop {
        fn pins(&self) -> PinSet {
            PinSet::new()
        }

        async fn run(self: Box<Self>, _ctx: crate::gadget::GadgetContext) {}
    }

    #[test]
    fn register_then_create_by_name() {
        let mut registry = Registry::new();
        registry.register("noop", |_params| Ok(Box::new(Noop) as Box<dyn Gadget>));
        assert!(registry.contains("noop"));
        assert!(registry.create("noop", None).is_ok());
    }

    #[test]
    fn unknown_kind_is_a_runtime_error() {
        let registry = Registry::new();
        let err = registry.create("missing", None).unwrap_err();
        assert!(matches!(err, CircuitError::Runtime(_)));
    }

    #[test]
    fn unregister_removes_the_entry() {
        let mut registry = Registry::new();
        registry.register("noop", |_params| Ok(Box::new(Noop) as Box<dyn Gadget>));
        assert!(registry.unregister("noop"));
        assert!(!registry.contains("noop"));
        assert!(!registry.unregister("noop"));
    }
}
