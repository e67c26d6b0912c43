// SPDX-FileCopyrightText: © 2025 Circuitry Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Explicit pin declarations.
//!
//! The original runtime discovers a gadget's pins by reflecting over its
//! struct fields at run time. This rewrite follows the recommendation in the
//! design notes and has gadgets declare their pins explicitly from
//! [`crate::gadget::Gadget::pins`] instead — no reflection, same "declare
//! pins by name" ergonomics for gadget authors.

use std::fmt;

/// Whether a declared pin receives or sends messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    Input,
    Output,
}

impl fmt::Display for PinDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// The full set of pins a gadget declares.
///
/// `fanouts` names the gadget's fan-out map pins (the `Name:` form):
/// an indexed family of outputs keyed by a string suffix, all sharing the
/// same declared name.
#[derive(Debug, Clone, Default)]
pub struct PinSet {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub fanouts: Vec<String>,
}

impl PinSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    #[must_use]
    pub fn with_fanout(mut self, name: impl Into<String>) -> Self {
        self.fanouts.push(name.into());
        self
    }

    /// The direction of a declared pin, or `None` if `pin` isn't declared.
    /// Fan-out pins are reported as `Output`.
    #[must_use]
    pub fn direction_of(&self, pin: &str) -> Option<PinDirection> {
        if self.inputs.iter().any(|p| p == pin) {
            Some(PinDirection::Input)
        } else if self.outputs.iter().any(|p| p == pin) || self.fanouts.iter().any(|p| p == pin) {
            Some(PinDirection::Output)
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_fanout(&self, pin: &str) -> bool {
        self.fanouts.iter().any(|p| p == pin)
    }

    #[must_use]
    pub fn contains(&self, pin: &str) -> bool {
        self.direction_of(pin).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_records_direction() {
        let pins = PinSet::new().with_input("In").with_output("Out").with_fanout("Feeds");
        assert_eq!(pins.direction_of("In"), Some(PinDirection::Input));
        assert_eq!(pins.direction_of("Out"), Some(PinDirection::Output));
        assert_eq!(pins.direction_of("Feeds"), Some(PinDirection::Output));
        assert!(pins.is_fanout("Feeds"));
        assert_eq!(pins.direction_of("Missing"), None);
    }
}
