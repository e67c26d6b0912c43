// SPDX-FileCopyrightText: © 2025 Circuitry Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Circuitry Engine - circuit construction, wiring, and supervision for the
//! circuitry flow-based runtime.
//!
//! This crate turns the declarations made against [`circuitry_core::Gadget`]
//! into a running graph:
//!
//! - [`wire`]: pin-path addressing and wire materialization (§3, §4.3)
//! - [`circuit`]: [`circuit::Circuit`], the graph builder and its phased
//!   `run` (§4.4, §4.5), sub-circuit label resolution (§4.6), and the
//!   supervisor command channel that backs the dynamic dispatch pattern
//!   (§4.7)
//! - [`dispatcher`]: [`dispatcher::packet_map_dispatcher`], the concrete
//!   `head`/`tail` sub-circuit demonstrating that pattern
//! - [`constants`]: the channel-capacity and timeout defaults the above
//!   modules share
//!
//! circuitry-core has no notion of `tokio::spawn`, a concrete channel, or a
//! running graph - this crate owns all of that, depending on
//! circuitry-core's vocabulary (`Message`, `Gadget`, `PinSet`, `Registry`,
//! ...) rather than the other way around.
//!
//! ## Quick start
//!
//! ```ignore
//! use circuitry_core::{Gadget, GadgetContext, Message, PinSet};
//! use circuitry_engine::Circuit;
//!
//! struct Repeater;
//!
//! #[circuitry_core::async_trait]
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
//!
//! # async fn build() -> Result<(), circuitry_core::CircuitError> {
//! let mut circuit = Circuit::new();
//! circuit.add_circuitry("r", Box::new(Repeater))?;
//! circuit.feed("r.In", Message::new("abc".to_string()))?;
//! circuit.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit;
pub mod constants;
pub mod dispatcher;
pub mod wire;

pub use circuit::{
    CircuitHandle, Describe, FeedDescriptor, GadgetDescriptor, SupervisorCommand, WireDescriptor,
};
pub use dispatcher::packet_map_dispatcher;
pub use wire::{ConnectDef, PinPath};

// `Circuit` is the crate's primary entry point; re-exported at the root so
// `circuitry_engine::Circuit` reads the same way `circuitry_core::Gadget`
// does, without making callers reach into the `circuit` submodule.
pub use circuit::Circuit;
