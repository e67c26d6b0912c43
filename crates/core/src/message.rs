// SPDX-FileCopyrightText: © 2025 Circuitry Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The dynamically-typed value carried on a wire.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// An opaque, dynamically-typed value carried between gadgets.
///
/// `Message` is cheap to clone (an `Arc` bump) so the same value can be
/// fanned out to multiple downstream consumers without copying the payload.
/// The human-readable representation is computed once at construction time
/// and reused for the `Lost <type>: <value>` diagnostic (see
/// [`crate::control::AdminMessage::Lost`]).
#[derive(Clone)]
pub struct Message {
    type_name: &'static str,
    repr: Arc<str>,
    value: Arc<dyn Any + Send + Sync>,
}

impl Message {
    /// Wraps `value` as a message. `T` must implement `Debug` so the runtime
    /// can render a `Lost <type>: <value>` line without knowing the concrete
    /// type ahead of time.
    pub fn new<T: Any + Send + Sync + fmt::Debug>(value: T) -> Self {
        let type_name = std::any::type_name::<T>();
        let repr = Arc::from(format!("{value:?}"));
        Self { type_name, repr, value: Arc::new(value) }
    }

    /// The type name captured at construction (`std::any::type_name`).
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The `{:?}` rendering captured at construction.
    #[must_use]
    pub fn repr(&self) -> &str {
        &self.repr
    }

    /// Borrows the value if it is of type `T`.
    #[must_use]
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// True if the wrapped value is of type `T`.
    #[must_use]
    pub fn is<T: Any + Send + Sync>(&self) -> bool {
        self.value.is::<T>()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message").field("type", &self.type_name).field("value", &self.repr).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_roundtrip() {
        let msg = Message::new(42i32);
        assert_eq!(msg.downcast_ref::<i32>(), Some(&42));
        assert!(!msg.is::<String>());
    }

    #[test]
    fn repr_matches_debug_format() {
        let msg = Message::new("abc".to_string());
        assert_eq!(msg.repr(), "\"abc\"");
        assert!(msg.type_name().contains("String"));
    }

    #[test]
    fn clone_is_cheap_and_shares_value() {
        let msg = Message::new(vec![1, 2, 3]);
        let clone = msg.clone();
        assert_eq!(clone.downcast_ref::<Vec<i32>>(), Some(&vec![1, 2, 3]));
    }
}
