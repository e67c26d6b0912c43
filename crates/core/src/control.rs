// SPDX-FileCopyrightText: © 2025 Circuitry Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The admin channel's message type.
//!
//! Every circuit runs a private admin channel (§4.5 step 6): gadgets report
//! their own termination on it, and any message sent to an unbound output
//! pin is rerouted onto it so it can be logged as `Lost <type>: <value>`.

use crate::message::Message;

/// A message delivered on a circuit's admin channel.
#[derive(Debug, Clone)]
pub enum AdminMessage {
    /// A gadget's `run` method returned; its outputs have already been disconnected.
    Terminated { gadget: String },

    /// A message was sent to an output pin with no connected consumer.
    Lost { gadget: String, pin: String, message: Message },
}
