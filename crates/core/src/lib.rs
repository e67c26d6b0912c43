// SPDX-FileCopyrightText: © 2025 Circuitry Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Circuitry Core - fundamental traits and data structures for the
//! circuitry flow-based runtime.
//!
//! This crate defines the vocabulary every gadget author builds against:
//!
//! - [`message`]: the dynamically-typed [`message::Message`] carried on wires
//! - [`pin`]: explicit pin declarations ([`pin::PinSet`])
//! - [`gadget`]: the [`gadget::Gadget`] trait and [`gadget::GadgetContext`]
//!   a running gadget sees
//! - [`registry`]: a name-to-factory map for constructing gadgets by kind
//! - [`control`]: the admin channel's message type
//! - [`abort`]: the circuit-wide cooperative cancellation signal
//! - [`config`]: runtime-tunable send behavior
//! - [`error`]: structured error types
//!
//! circuitry-core has no notion of a circuit, a wire's concrete channel, or
//! task spawning - those live in circuitry-engine, which depends on this
//! crate and not the other way around. Two traits in [`gadget`] -
//! [`gadget::LabelResolver`] and [`gadget::DynamicOwner`] - exist purely as
//! the seam that lets circuitry-engine's `Circuit` plug into gadget-facing
//! code (sub-circuits, the dispatcher pattern) without this crate needing to
//! name it.
//!
//! ## Quick start
//!
//! ```ignore
//! use circuitry_core::gadget::{Gadget, GadgetContext};
//! use circuitry_core::message::Message;
//! use circuitry_core::pin::PinSet;
//!
//! struct Repeater;
//!
//! #[async_trait::async_trait]
//! impl Gadget for Repeater {
//!     fn pins(&self) -> PinSet {
//!         PinSet::new().with_input("In").with_output("Out")
//!     }
//!
//!     async fn run(self: Box<Self>, mut ctx: GadgetContext) {
//!         while let Some(msg) = ctx.recv("In").await {
//!             if ctx.send("Out", msg).await.is_err() {
//!                 break;
//!             }
//!         }
//!     }
//! }
//! ```

pub use async_trait::async_trait;

pub mod abort;
pub mod config;
pub mod control;
pub mod error;
pub mod gadget;
pub mod message;
pub mod pin;
pub mod registry;

pub use abort::AbortSignal;
pub use config::{CircuitConfig, DEFAULT_SEND_TIMEOUT};
pub use control::AdminMessage;
pub use error::{CircuitError, SendError};
pub use gadget::{
    DynamicOwner, FanoutRegistry, Gadget, GadgetContext, GadgetContextParts, LabelResolver,
    OutputEndpoint,
};
pub use message::Message;
pub use pin::{PinDirection, PinSet};
pub use registry::{GadgetFactory, Registry};
