// SPDX-FileCopyrightText: © 2025 Circuitry Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The `Gadget` trait and the context a running gadget sees.
//!
//! This is the seam between circuitry-core and circuitry-engine. Core knows
//! nothing about `tokio::spawn`, the supervisor loop, or wire materialization
//! - it only defines what a gadget *is* (declared pins plus an async `run`
//! method) and what a gadget *sees* while running ([`GadgetContext`]: typed
//! send/receive handles plus the abort signal). circuitry-engine owns
//! building the context and driving `run` to completion.
//!
//! Sub-circuits (§4.6) need a `Gadget` to resolve external labels and, for
//! the dispatcher pattern (§4.7), a running gadget needs to reach back into
//! its owning circuit to grow the graph. Core can't name `circuitry-engine`'s
//! `Circuit` type without an illegal dependency back-edge, so both needs are
//! expressed as trait objects a gadget may optionally hand back:
//! [`LabelResolver`] and [`DynamicOwner`]. `circuitry-engine::Circuit`
//! implements both; plain leaf gadgets implement neither.

use crate::abort::AbortSignal;
use crate::config::CircuitConfig;
use crate::control::AdminMessage;
use crate::error::{CircuitError, SendError};
use crate::message::Message;
use crate::pin::PinSet;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

/// A single unit of work in a circuit.
///
/// Implementors declare their pins up front via [`Gadget::pins`] and do all
/// of their work inside [`Gadget::run`], reading from
/// [`GadgetContext::recv`] and writing with [`GadgetContext::send`] /
/// [`GadgetContext::send_fanout`] until their inputs close or the circuit
/// aborts. Taking `self: Box<Self>` (rather than `&mut self`) mirrors the
/// original runtime's one-shot `Run` method: a gadget is consumed by running
/// it, it does not outlive the call.
#[async_trait]
pub trait Gadget: Send {
    /// The gadget's input, output, and fan-out pins.
    ///
    /// Called once at circuit-build time, before any wire is materialized,
    /// so the circuit can validate `Connect`/`Feed`/`Label` calls against it.
    fn pins(&self) -> PinSet;

    /// Runs the gadget to completion.
    ///
    /// Implementations should loop on [`GadgetContext::recv`] until it
    /// returns `None` (every input producer disconnected, or the context has
    /// no inputs at all) or [`GadgetContext::aborted`] resolves, then return.
    /// Returning ends the gadget; the engine releases its outputs and
    /// reports [`AdminMessage::Terminated`] on its behalf.
    async fn run(self: Box<Self>, ctx: GadgetContext);

    /// Exposes this gadget as a [`LabelResolver`], for sub-circuits.
    ///
    /// Leaf gadgets never override this; `circuitry-engine::Circuit`'s
    /// implementation returns `Some(self)`.
    fn as_label_resolver(&self) -> Option<&dyn LabelResolver> {
        None
    }
}

/// Resolves a sub-circuit's externally labeled pins (§4.6).
///
/// A nested circuit implements this to let its parent bind wires and feeds
/// directly to the label names the sub-circuit exposed, without the parent
/// needing to know the sub-circuit's internal gadget names.
pub trait LabelResolver: Send {
    /// The external label names this resolver exposes, with their direction.
    fn labels(&self) -> PinSet;

    /// Replaces this sub-circuit's own abort signal with a child of
    /// `parent`, so the parent's `Abort` cascades into it (§4.4, §9).
    ///
    /// Called once, at `add_circuitry` time, before the sub-circuit ever
    /// runs. Leaf gadgets have no notion of an abort signal of their own and
    /// never need this.
    fn adopt_abort(&self, parent: &AbortSignal);
}

/// Lets a running gadget add gadgets and wires to its own owning circuit
/// (§4.7, the dispatcher pattern).
///
/// `circuitry-engine::CircuitHandle` implements this over the supervisor
/// command channel; see `circuitry_engine::circuit::SupervisorCommand`.
#[async_trait]
pub trait DynamicOwner: Send + Sync {
    /// Adds `gadget` under `name` to the live circuit.
    async fn add(&self, name: String, gadget: Box<dyn Gadget>) -> Result<(), CircuitError>;

    /// Connects `from.pin` (an output or fan-out key) to `to.pin` (an
    /// input) in the live circuit, materializing or extending the wire.
    async fn connect(
        &self,
        from_gadget: String,
        from_pin: String,
        to_gadget: String,
        to_pin: String,
    ) -> Result<(), CircuitError>;

    /// Spawns an already-added gadget's `run` task.
    async fn run_gadget(&self, name: String) -> Result<(), CircuitError>;
}

/// Where a `send`/`send_fanout` call delivers a message.
///
/// A plain `Wire` carries it to another gadget's input. A `Sink` means
/// nothing consumes the pin (it was never connected, or its sole consumer
/// already disconnected) - the message is instead reported on the admin
/// channel and logged as `Lost` (see [`crate::control::AdminMessage::Lost`]).
#[derive(Clone)]
pub enum OutputEndpoint {
    Wire(mpsc::Sender<Message>),
    Sink,
}

/// The shared, mutably-extensible map behind a gadget's fan-out pins.
///
/// A plain `HashMap` moved into the spawned task can't grow after the task
/// starts. Wrapping it behind `Arc<Mutex<_>>` lets the owning circuit insert
/// new routes (new dispatcher keys, §4.7) into the *same* map the running
/// gadget is reading from on every `send_fanout` call.
pub type FanoutRegistry = Arc<Mutex<HashMap<String, OutputEndpoint>>>;

/// Everything a running [`Gadget::run`] implementation needs: its name,
/// input receivers, output senders, the admin channel, and the abort signal.
pub struct GadgetContext {
    pub(crate) name: String,
    pub(crate) inputs: HashMap<String, mpsc::Receiver<Message>>,
    pub(crate) outputs: HashMap<String, OutputEndpoint>,
    pub(crate) fanouts: HashMap<String, FanoutRegistry>,
    pub(crate) admin: mpsc::Sender<AdminMessage>,
    pub(crate) abort: AbortSignal,
    pub(crate) config: CircuitConfig,
    pub(crate) owner: Option<Arc<dyn DynamicOwner>>,
}

/// The raw pieces of a [`GadgetContext`], for composite gadgets that need to
/// redistribute their own bindings to an inner graph (sub-circuits, §4.6).
///
/// Ordinary gadgets never need this - use [`GadgetContext::recv`] /
/// [`GadgetContext::send`] instead.
pub struct GadgetContextParts {
    pub name: String,
    pub inputs: HashMap<String, mpsc::Receiver<Message>>,
    pub outputs: HashMap<String, OutputEndpoint>,
    pub fanouts: HashMap<String, FanoutRegistry>,
    pub admin: mpsc::Sender<AdminMessage>,
    pub abort: AbortSignal,
    pub config: CircuitConfig,
    pub owner: Option<Arc<dyn DynamicOwner>>,
}

impl GadgetContext {
    /// Builds a context from its raw pieces. Used by circuitry-engine when
    /// launching a gadget; gadget authors never construct one directly.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        inputs: HashMap<String, mpsc::Receiver<Message>>,
        outputs: HashMap<String, OutputEndpoint>,
        fanouts: HashMap<String, FanoutRegistry>,
        admin: mpsc::Sender<AdminMessage>,
        abort: AbortSignal,
        config: CircuitConfig,
        owner: Option<Arc<dyn DynamicOwner>>,
    ) -> Self {
        Self { name, inputs, outputs, fanouts, admin, abort, config, owner }
    }

    /// Disassembles this context into its raw pieces.
    #[must_use]
    pub fn into_parts(self) -> GadgetContextParts {
        GadgetContextParts {
            name: self.name,
            inputs: self.inputs,
            outputs: self.outputs,
            fanouts: self.fanouts,
            admin: self.admin,
            abort: self.abort,
            config: self.config,
            owner: self.owner,
        }
    }

    /// The gadget's own name, as it was added to the circuit.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The circuit-wide abort signal. Resolves once the circuit is aborting.
    #[must_use]
    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    /// True if the circuit has already been asked to abort.
    #[must_use]
    pub fn aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// A handle letting this gadget add gadgets and wires to its own owning
    /// circuit, if one was wired up (only the dispatcher pattern's `head`
    /// gadget needs this - see §4.7).
    #[must_use]
    pub fn owner(&self) -> Option<&Arc<dyn DynamicOwner>> {
        self.owner.as_ref()
    }

    /// Receives the next message on `pin`.
    ///
    /// Returns `None` once every producer of `pin` has disconnected, or
    /// immediately if `pin` isn't a declared input (a misconfigured gadget
    /// should not block forever on a pin that will never receive anything).
    pub async fn recv(&mut self, pin: &str) -> Option<Message> {
        self.inputs.get_mut(pin)?.recv().await
    }

    /// Receives the next message on `pin`, resolving to `None` early if the
    /// circuit aborts before one arrives.
    pub async fn recv_or_abort(&mut self, pin: &str) -> Option<Message> {
        let Some(rx) = self.inputs.get_mut(pin) else { return None };
        tokio::select! {
            biased;
            () = self.abort.cancelled() => None,
            msg = rx.recv() => msg,
        }
    }

    /// Sends `message` on a plain (non-fan-out) output pin.
    ///
    /// Tries a non-blocking send first; if the wire is full, waits up to
    /// [`CircuitConfig::send_timeout`] for room or for the circuit to abort,
    /// logging a `warn` if [`CircuitConfig::report_slow_sends`] is set and
    /// the slow path was taken. A pin with no connected consumer (or a
    /// declared-but-unbound pin) is treated as [`OutputEndpoint::Sink`] and
    /// reported as [`AdminMessage::Lost`].
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] if the circuit aborted or the last
    /// consumer disconnected, or [`SendError::Timeout`] if neither happened
    /// within the configured timeout.
    pub async fn send(&self, pin: &str, message: Message) -> Result<(), SendError> {
        match self.outputs.get(pin) {
            Some(OutputEndpoint::Wire(tx)) => self.send_on(tx, message).await,
            _ => {
                self.report_lost(pin, message).await;
                Ok(())
            },
        }
    }

    /// Sends `message` on a fan-out pin's `key` route (§4.3/§4.7).
    ///
    /// Behaves like [`Self::send`], but resolves the destination from the
    /// fan-out registry keyed by `key` instead of a single static endpoint -
    /// new keys can appear after the gadget has started running, which is
    /// exactly how the dispatcher pattern grows its graph live.
    pub async fn send_fanout(
        &self,
        pin: &str,
        key: &str,
        message: Message,
    ) -> Result<(), SendError> {
        let Some(registry) = self.fanouts.get(pin) else {
            self.report_lost(pin, message).await;
            return Ok(());
        };
        let endpoint = registry.lock().await.get(key).cloned();
        match endpoint {
            Some(OutputEndpoint::Wire(tx)) => self.send_on(&tx, message).await,
            _ => {
                self.report_lost(pin, message).await;
                Ok(())
            },
        }
    }

    async fn send_on(&self, tx: &mpsc::Sender<Message>, message: Message) -> Result<(), SendError> {
        match tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::Closed),
            Err(mpsc::error::TrySendError::Full(message)) => {
                tokio::select! {
                    biased;
                    () = self.abort.cancelled() => Err(SendError::Closed),
                    result = tx.send_timeout(message, self.config.send_timeout) => {
                        match result {
                            Ok(()) => {
                                if self.config.report_slow_sends {
                                    warn!(gadget = %self.name, "send blocked on a full output");
                                }
                                Ok(())
                            },
                            Err(mpsc::error::SendTimeoutError::Closed(_)) => Err(SendError::Closed),
                            Err(mpsc::error::SendTimeoutError::Timeout(_)) => Err(SendError::Timeout),
                        }
                    },
                }
            },
        }
    }

    async fn report_lost(&self, pin: &str, message: Message) {
        let _ = self
            .admin
            .send(AdminMessage::Lost { gadget: self.name.clone(), pin: pin.to_string(), message })
            .await;
    }

    /// Drops this gadget's hold on an output pin, signaling to any consumer
    /// that this producer is done (§4.2's `Release`).
    ///
    /// Tokio's `mpsc::Sender` already refcounts internally, so this is just
    /// removing our clone from the map: the wire itself only closes once
    /// every producer (across every gadget, plus any circuit-retained master
    /// sender for dynamically-extensible wires) has done the same.
    pub fn release(&mut self, pin: &str) {
        self.outputs.remove(pin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitConfig;

    fn context(
        outputs: HashMap<String, OutputEndpoint>,
        inputs: HashMap<String, mpsc::Receiver<Message>>,
    ) -> (GadgetContext, mpsc::Receiver<AdminMessage>) {
        let (admin_tx, admin_rx) = mpsc::channel(8);
        let ctx = GadgetContext {
            name: "under_test".to_string(),
            inputs,
            outputs,
            fanouts: HashMap::new(),
            admin: admin_tx,
            abort: AbortSignal::new(),
            config: CircuitConfig::default(),
            owner: None,
        };
        (ctx, admin_rx)
    }

    #[tokio::test]
    async fn send_on_unbound_pin_is_reported_lost() {
        let (ctx, mut admin_rx) = context(HashMap::new(), HashMap::new());
        ctx.send("Out", Message::new(1i32)).await.unwrap();
        match admin_rx.recv().await.unwrap() {
            AdminMessage::Lost { pin, .. } => assert_eq!(pin, "Out"),
            other => panic!("unexpected admin message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_on_wire_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut outputs = HashMap::new();
        outputs.insert("Out".to_string(), OutputEndpoint::Wire(tx));
        let (ctx, _admin_rx) = context(outputs, HashMap::new());
        ctx.send("Out", Message::new(7i32)).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.downcast_ref::<i32>(), Some(&7));
    }

    #[tokio::test]
    async fn send_on_closed_wire_errors() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let mut outputs = HashMap::new();
        outputs.insert("Out".to_string(), OutputEndpoint::Wire(tx));
        let (ctx, _admin_rx) = context(outputs, HashMap::new());
        let err = ctx.send("Out", Message::new(1i32)).await.unwrap_err();
        assert_eq!(err, SendError::Closed);
    }

    #[tokio::test]
    async fn release_removes_the_output_binding() {
        let (tx, _rx) = mpsc::channel(4);
        let mut outputs = HashMap::new();
        outputs.insert("Out".to_string(), OutputEndpoint::Wire(tx));
        let (mut ctx, mut admin_rx) = context(outputs, HashMap::new());
        ctx.release("Out");
        ctx.send("Out", Message::new(1i32)).await.unwrap();
        assert!(matches!(admin_rx.recv().await.unwrap(), AdminMessage::Lost { .. }));
    }

    #[tokio::test]
    async fn recv_returns_none_once_sender_drops() {
        let (tx, rx) = mpsc::channel(4);
        let mut inputs = HashMap::new();
        inputs.insert("In".to_string(), rx);
        let (mut ctx, _admin_rx) = context(HashMap::new(), inputs);
        drop(tx);
        assert!(ctx.recv("In").await.is_none());
    }
}
