// SPDX-FileCopyrightText: © 2025 Circuitry Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Shared channel capacities and timing defaults for the engine.
//!
//! Mirrors `streamkit_engine::constants`: canonical default values kept in
//! one place so `Circuit` and the dispatcher pattern don't sprinkle magic
//! numbers through their construction code.
//!
//! The default send timeout lives in [`circuitry_core::config`] instead -
//! `CircuitConfig` is a core type, and core does not depend on this crate.

/// The capacity a `Connect(..., 0)` call ("unbuffered") actually gets.
///
/// Tokio's `mpsc` has no true zero-capacity channel; per §6 of the design
/// this rewrite documents the minimum explicitly rather than silently
/// rounding up.
pub const MIN_WIRE_CAPACITY: usize = 1;

/// Default capacity of a circuit's private admin channel.
///
/// Sized for bursts of `Terminated`/`Lost` records arriving faster than the
/// supervisor loop drains them during cascade shutdown.
pub const DEFAULT_ADMIN_CAPACITY: usize = 64;

/// Default capacity of a circuit's supervisor command channel.
///
/// Used by [`crate::circuit::CircuitHandle`] to carry `Add`/`Connect`/
/// `RunGadget` calls from a running gadget (the dispatcher's `head`, §4.7)
/// back to the owning circuit's supervisor loop.
pub const DEFAULT_SUPERVISOR_CAPACITY: usize = 32;
