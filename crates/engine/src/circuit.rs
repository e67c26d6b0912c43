// SPDX-FileCopyrightText: © 2025 Circuitry Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The circuit graph container and its phased execution (§4.4, §4.5).
//!
//! `Circuit` is a builder: `add`/`add_circuitry`/`connect`/`feed`/`label`
//! accumulate a graph description, validated eagerly against each gadget's
//! declared [`PinSet`]. `run` consumes the builder and drives the phased
//! startup this module is named for: materialize wires, preload feeds,
//! bind every gadget's pins, launch each as a task, then supervise until
//! all of them have reported [`AdminMessage::Terminated`].
//!
//! A `Circuit` is also a [`Gadget`] in its own right (§4.6): its `run`
//! implementation is the same phased execution, just fed the parent's
//! bindings for its labeled pins instead of starting fresh. `execute` is
//! the single method both paths share.

use async_trait::async_trait;
use circuitry_core::{
    AbortSignal, AdminMessage, CircuitConfig, CircuitError, DynamicOwner, FanoutRegistry, Gadget,
    GadgetContext, GadgetContextParts, LabelResolver, Message, OutputEndpoint, PinDirection,
    PinSet, Registry,
};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use crate::constants::{DEFAULT_ADMIN_CAPACITY, DEFAULT_SUPERVISOR_CAPACITY, MIN_WIRE_CAPACITY};
use crate::wire::{self, ConnectDef, PinPath};

/// A user-facing description of a built circuit (§4.4's `Describe`).
///
/// Purely informational - introspection and logging, no behavioral effect.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Describe {
    pub gadgets: Vec<GadgetDescriptor>,
    pub wires: Vec<WireDescriptor>,
    pub feeds: Vec<FeedDescriptor>,
    pub labels: HashMap<String, String>,
    pub unregistered: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct GadgetDescriptor {
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WireDescriptor {
    pub from: String,
    pub to: String,
    pub capacity: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FeedDescriptor {
    pub to: String,
    pub count: usize,
}

/// A graph of gadgets connected by wires (§4.4).
pub struct Circuit {
    order: Vec<String>,
    gadgets: HashMap<String, Box<dyn Gadget>>,
    pins: HashMap<String, PinSet>,
    kinds: HashMap<String, String>,
    connects: Vec<ConnectDef>,
    feeds: HashMap<PinPath, Vec<Message>>,
    labels: HashMap<String, PinPath>,
    abort: Mutex<AbortSignal>,
    config: CircuitConfig,
    registry: Registry,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

impl Circuit {
    /// Creates an empty circuit with a fresh root abort signal and default
    /// configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CircuitConfig::default())
    }

    /// Creates an empty circuit with an explicit send-timeout configuration.
    #[must_use]
    pub fn with_config(config: CircuitConfig) -> Self {
        Self {
            order: Vec::new(),
            gadgets: HashMap::new(),
            pins: HashMap::new(),
            kinds: HashMap::new(),
            connects: Vec::new(),
            feeds: HashMap::new(),
            labels: HashMap::new(),
            abort: Mutex::new(AbortSignal::new()),
            config,
            registry: Registry::new(),
        }
    }

    /// Attaches a gadget-kind registry used by [`Self::add`].
    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Instantiates a gadget from the attached registry and adds it under
    /// `name` (§4.4's `Add`).
    ///
    /// An unknown `kind` is a soft failure per §4.1: a warning is logged and
    /// the circuit is left without that gadget, rather than erroring the
    /// whole build - intentional, to allow partial graphs during
    /// development.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitError::AlreadyOwnedGadget`] if `name` is already
    /// taken, or whatever the registered factory returns on construction
    /// failure.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        kind: &str,
        params: Option<&serde_json::Value>,
    ) -> Result<(), CircuitError> {
        let name = name.into();
        if self.gadgets.contains_key(&name) {
            return Err(CircuitError::AlreadyOwnedGadget(name));
        }
        if !self.registry.contains(kind) {
            tracing::warn!(%name, %kind, "gadget kind not found in registry, skipping Add");
            return Ok(());
        }
        let gadget = self.registry.create(kind, params)?;
        self.insert_gadget(name, kind.to_string(), gadget);
        Ok(())
    }

    /// Adds an already-constructed gadget under `name` (§4.4's
    /// `AddCircuitry`). Used for ad-hoc gadgets and for sub-circuits.
    ///
    /// If `gadget` is itself a [`LabelResolver`] (i.e. a nested `Circuit`),
    /// it inherits this circuit's abort signal so `Abort` propagates to it
    /// (§4.4, §9).
    ///
    /// # Errors
    ///
    /// Returns [`CircuitError::AlreadyOwnedGadget`] if `name` is taken.
    pub fn add_circuitry(
        &mut self,
        name: impl Into<String>,
        gadget: Box<dyn Gadget>,
    ) -> Result<(), CircuitError> {
        let name = name.into();
        if self.gadgets.contains_key(&name) {
            return Err(CircuitError::AlreadyOwnedGadget(name));
        }
        if let Some(resolver) = gadget.as_label_resolver() {
            let parent = self.abort.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            resolver.adopt_abort(&parent);
        }
        self.insert_gadget(name, String::new(), gadget);
        Ok(())
    }

    fn insert_gadget(&mut self, name: String, kind: String, gadget: Box<dyn Gadget>) {
        let pins = gadget.as_label_resolver().map_or_else(|| gadget.pins(), LabelResolver::labels);
        self.pins.insert(name.clone(), pins);
        self.kinds.insert(name.clone(), kind);
        self.order.push(name.clone());
        self.gadgets.insert(name, gadget);
    }

    /// Connects an output (or fan-out key) pin to an input pin (§4.4's
    /// `Connect`). `capacity` of `0` means "unbuffered"; per §6 this
    /// implementation rounds it up to [`MIN_WIRE_CAPACITY`].
    ///
    /// # Errors
    ///
    /// Returns [`CircuitError::UnknownPin`] if either path doesn't resolve
    /// to a declared pin of the right direction on a gadget this circuit
    /// owns.
    pub fn connect(&mut self, from: &str, to: &str, capacity: usize) -> Result<(), CircuitError> {
        let from = PinPath::parse(from).map_err(CircuitError::Configuration)?;
        let to = PinPath::parse(to).map_err(CircuitError::Configuration)?;
        self.validate_pin(&from, PinDirection::Output)?;
        self.validate_pin(&to, PinDirection::Input)?;
        self.connects.push(ConnectDef { from, to, capacity });
        Ok(())
    }

    /// Queues a message to preload onto `pin` before the circuit launches
    /// (§4.4's `Feed`).
    ///
    /// # Errors
    ///
    /// Returns [`CircuitError::UnknownPin`] if `pin` isn't a declared input.
    pub fn feed(&mut self, pin: &str, message: Message) -> Result<(), CircuitError> {
        let path = PinPath::parse(pin).map_err(CircuitError::Configuration)?;
        self.validate_pin(&path, PinDirection::Input)?;
        self.feeds.entry(path).or_default().push(message);
        Ok(())
    }

    /// Exposes `internal` under the external name `external` (§4.4's
    /// `Label`), making this circuit usable as a gadget through that name.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitError::InvalidLabel`] if `external` contains `.`, or
    /// [`CircuitError::UnknownPin`] if `internal` doesn't resolve.
    pub fn label(&mut self, external: &str, internal: &str) -> Result<(), CircuitError> {
        if external.contains('.') {
            return Err(CircuitError::InvalidLabel(external.to_string()));
        }
        let path = PinPath::parse(internal).map_err(CircuitError::Configuration)?;
        if self.pin_direction(&path).is_none() {
            return Err(CircuitError::UnknownPin(path.to_string()));
        }
        self.labels.insert(external.to_string(), path);
        Ok(())
    }

    /// The circuit-wide abort signal, for `select!`-ing alongside it from
    /// outside the circuit (e.g. a server shutdown hook).
    #[must_use]
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    /// Requests shutdown of this circuit and every descendant sub-circuit.
    pub fn abort(&self) {
        self.abort_signal().abort();
    }

    /// A structured snapshot of the built graph (§4.4's `Describe`).
    #[must_use]
    pub fn describe(&self) -> Describe {
        Describe {
            gadgets: self
                .order
                .iter()
                .map(|name| GadgetDescriptor {
                    name: name.clone(),
                    kind: self.kinds.get(name).cloned().unwrap_or_default(),
                })
                .collect(),
            wires: self
                .connects
                .iter()
                .map(|c| WireDescriptor {
                    from: c.from.to_string(),
                    to: c.to.to_string(),
                    capacity: c.capacity,
                })
                .collect(),
            feeds: self
                .feeds
                .iter()
                .map(|(pin, messages)| FeedDescriptor { to: pin.to_string(), count: messages.len() })
                .collect(),
            labels: self.labels.iter().map(|(k, v)| (k.clone(), v.to_string())).collect(),
            unregistered: self
                .order
                .iter()
                .filter(|name| self.kinds.get(*name).is_none_or(String::is_empty))
                .cloned()
                .collect(),
        }
    }

    fn pin_direction(&self, path: &PinPath) -> Option<PinDirection> {
        self.pins.get(&path.gadget)?.direction_of(&path.pin)
    }

    fn validate_pin(&self, path: &PinPath, want: PinDirection) -> Result<(), CircuitError> {
        match self.pin_direction(path) {
            Some(direction) if direction == want => Ok(()),
            _ => Err(CircuitError::UnknownPin(path.to_string())),
        }
    }

    /// Runs the circuit to completion (§4.5's `Run`). Blocks (asynchronously)
    /// until every launched gadget has terminated.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitError::Runtime`] if wire materialization finds a
    /// connection whose destination wire failed to build - this should not
    /// happen for a circuit built entirely through [`Self::connect`].
    pub async fn run(self) -> Result<(), CircuitError> {
        Box::new(self).execute(None).await
    }

    /// The phased startup/supervision shared by [`Self::run`] and this
    /// circuit's [`Gadget::run`] implementation (§4.5, §4.6).
    ///
    /// `external` carries the parent-supplied bindings for this circuit's
    /// labeled pins when running as a sub-circuit; `None` at the top level.
    async fn execute(
        self: Box<Self>,
        external: Option<GadgetContextParts>,
    ) -> Result<(), CircuitError> {
        let this = *self;
        let Circuit { order, mut gadgets, pins, connects, feeds, labels, abort, config, .. } = this;

        let abort_signal =
            abort.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner);
        let (admin_tx, mut admin_rx) = mpsc::channel::<AdminMessage>(DEFAULT_ADMIN_CAPACITY);
        let (supervisor_tx, mut supervisor_rx) =
            mpsc::channel::<SupervisorCommand>(DEFAULT_SUPERVISOR_CAPACITY);
        let handle: Arc<dyn DynamicOwner> = Arc::new(CircuitHandle { tx: supervisor_tx });

        // reverse label map: internal "gadget.pin" -> external name exposed to our own parent
        let reverse_labels: HashMap<String, String> =
            labels.iter().map(|(ext, internal)| (internal.to_string(), ext.clone())).collect();
        let (mut ext_inputs, mut ext_outputs) = match external {
            Some(parts) => (parts.inputs, parts.outputs),
            None => (HashMap::new(), HashMap::new()),
        };

        let is_fanout =
            |gadget: &str, pin: &str| pins.get(gadget).is_some_and(|p| p.is_fanout(pin));
        let materialized = wire::materialize(&connects, &feeds, is_fanout);

        // `strong_senders` holds the materialize-time sender for every wire
        // just long enough to mint one clone per bound producer below. Once
        // that's done, each entry is downgraded - `wire_senders` keeps only
        // weak handles from then on, so a wire still closes once every
        // producer clone (and, for fan-out-sourced wires, the retained
        // holder clone in `retained`, and any sender clone stashed inside a
        // `fanout_registries` entry) has dropped. `execute` itself must not
        // hold any of these strong past its owning gadget's exit - see the
        // `retained.remove`/`fanout_registries.retain` pair on
        // `AdminMessage::Terminated` below.
        let mut input_receivers: HashMap<PinPath, mpsc::Receiver<Message>> = HashMap::new();
        let mut strong_senders: HashMap<PinPath, mpsc::Sender<Message>> = HashMap::new();
        let mut holder_of: HashMap<PinPath, String> = HashMap::new();
        for (pin, wire) in materialized {
            if let Some(holder) = wire.retain_holder {
                holder_of.insert(pin.clone(), holder);
            }
            strong_senders.insert(pin.clone(), wire.sender);
            input_receivers.insert(pin, wire.receiver);
        }

        let mut plain_producers: HashMap<(String, String), mpsc::Sender<Message>> = HashMap::new();
        let mut fanout_producers: HashMap<(String, String), HashMap<String, mpsc::Sender<Message>>> =
            HashMap::new();
        for connect in &connects {
            let Some(sender) = strong_senders.get(&connect.to).cloned() else {
                return Err(CircuitError::Runtime(format!(
                    "missing materialized wire for connection into '{}'",
                    connect.to
                )));
            };
            let gp = (connect.from.gadget.clone(), connect.from.pin.clone());
            if let Some(key) = &connect.from.key {
                let keys = fanout_producers.entry(gp).or_default();
                if keys.insert(key.clone(), sender).is_some() {
                    return Err(CircuitError::DuplicateOutputBinding(connect.from.to_string()));
                }
            } else if plain_producers.insert(gp, sender).is_some() {
                return Err(CircuitError::DuplicateOutputBinding(connect.from.to_string()));
            }
        }

        let mut retained: HashMap<String, Vec<mpsc::Sender<Message>>> = HashMap::new();
        let mut wire_senders: HashMap<PinPath, mpsc::WeakSender<Message>> = HashMap::new();
        for (pin, sender) in strong_senders {
            wire_senders.insert(pin.clone(), sender.downgrade());
            if let Some(holder) = holder_of.get(&pin) {
                retained.entry(holder.clone()).or_default().push(sender.clone());
            }
        }

        let mut fanout_registries: HashMap<(String, String), FanoutRegistry> = HashMap::new();
        let mut live = 0usize;
        for name in order {
            let gadget_pins = pins.get(&name).cloned().unwrap_or_default();
            let ctx = build_context(
                &name,
                &gadget_pins,
                &mut input_receivers,
                &mut plain_producers,
                &mut fanout_producers,
                &mut fanout_registries,
                &reverse_labels,
                &mut ext_inputs,
                &mut ext_outputs,
                admin_tx.clone(),
                abort_signal.clone(),
                config,
                Some(handle.clone()),
            );
            let Some(gadget) = gadgets.remove(&name) else { continue };
            spawn_gadget(name, gadget, ctx, admin_tx.clone());
            live += 1;
        }

        let mut pending_gadgets: HashMap<String, (Box<dyn Gadget>, PinSet)> = HashMap::new();
        let mut pending_inputs: HashMap<PinPath, mpsc::Receiver<Message>> = HashMap::new();
        let mut pending_plain_producers: HashMap<(String, String), mpsc::Sender<Message>> =
            HashMap::new();

        while live > 0 {
            tokio::select! {
                Some(admin) = admin_rx.recv() => {
                    match admin {
                        AdminMessage::Terminated { gadget } => {
                            tracing::debug!(%gadget, "gadget terminated");
                            retained.remove(&gadget);
                            // `execute`'s own clone of each of this gadget's
                            // fan-out registries must go too, or the sender
                            // clones stashed inside them (the dispatcher's
                            // `Feeds:""` route and every dynamically added
                            // `Feeds:<key>` route) keep their destination
                            // wires open forever - the exact thing
                            // `retained.remove` above does for the
                            // connect-time holder clone.
                            fanout_registries.retain(|(owner, _), _| owner != &gadget);
                            live -= 1;
                        },
                        AdminMessage::Lost { gadget, pin, message } => {
                            // §6: "Lost <type>: <value>" is the one required
                            // human-readable side effect of the core.
                            tracing::info!(
                                %gadget,
                                %pin,
                                "Lost {}: {}", message.type_name(), message.repr(),
                            );
                        },
                    }
                },
                Some(command) = supervisor_rx.recv() => {
                    live += handle_supervisor_command(
                        command,
                        &mut pending_gadgets,
                        &mut pending_inputs,
                        &mut pending_plain_producers,
                        &mut wire_senders,
                        &mut fanout_registries,
                        &pins,
                        &admin_tx,
                        &abort_signal,
                        config,
                    ).await;
                },
                else => break,
            }
        }

        // Drain any supervisor commands that arrived after the last gadget
        // terminated but before the select loop noticed (RunGadget races).
        while let Ok(command) = supervisor_rx.try_recv() {
            handle_supervisor_command(
                command,
                &mut pending_gadgets,
                &mut pending_inputs,
                &mut pending_plain_producers,
                &mut wire_senders,
                &mut fanout_registries,
                &pins,
                &admin_tx,
                &abort_signal,
                config,
            )
            .await;
        }

        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn build_context(
    name: &str,
    gadget_pins: &PinSet,
    input_receivers: &mut HashMap<PinPath, mpsc::Receiver<Message>>,
    plain_producers: &mut HashMap<(String, String), mpsc::Sender<Message>>,
    fanout_producers: &mut HashMap<(String, String), HashMap<String, mpsc::Sender<Message>>>,
    fanout_registries: &mut HashMap<(String, String), FanoutRegistry>,
    reverse_labels: &HashMap<String, String>,
    ext_inputs: &mut HashMap<String, mpsc::Receiver<Message>>,
    ext_outputs: &mut HashMap<String, OutputEndpoint>,
    admin_tx: mpsc::Sender<AdminMessage>,
    abort: AbortSignal,
    config: CircuitConfig,
    owner: Option<Arc<dyn DynamicOwner>>,
) -> GadgetContext {
    let mut inputs = HashMap::new();
    for pin in &gadget_pins.inputs {
        let path = PinPath::new(name.to_string(), pin.clone());
        let bound = reverse_labels
            .get(&path.to_string())
            .and_then(|external| ext_inputs.remove(external))
            .or_else(|| input_receivers.remove(&path));
        inputs.insert(pin.clone(), bound.unwrap_or_else(closed_receiver));
    }

    let mut outputs = HashMap::new();
    for pin in &gadget_pins.outputs {
        let path = PinPath::new(name.to_string(), pin.clone());
        let endpoint = reverse_labels
            .get(&path.to_string())
            .and_then(|external| ext_outputs.get(external).cloned())
            .or_else(|| plain_producers.remove(&(name.to_string(), pin.clone())).map(OutputEndpoint::Wire))
            .unwrap_or(OutputEndpoint::Sink);
        outputs.insert(pin.clone(), endpoint);
    }

    let mut fanouts = HashMap::new();
    for pin in &gadget_pins.fanouts {
        let key = (name.to_string(), pin.clone());
        let initial = fanout_producers
            .remove(&key)
            .unwrap_or_default()
            .into_iter()
            .map(|(k, sender)| (k, OutputEndpoint::Wire(sender)))
            .collect::<HashMap<_, _>>();
        let registry: FanoutRegistry = Arc::new(tokio::sync::Mutex::new(initial));
        fanout_registries.insert(key, registry.clone());
        fanouts.insert(pin.clone(), registry);
    }

    GadgetContext::new(name.to_string(), inputs, outputs, fanouts, admin_tx, abort, config, owner)
}

fn closed_receiver() -> mpsc::Receiver<Message> {
    let (tx, rx) = mpsc::channel(MIN_WIRE_CAPACITY);
    drop(tx);
    rx
}

/// Spawns a gadget's `run` method, reporting its termination on `admin` when
/// it returns (§4.5 step 5: a gadget never has to remember to signal its own
/// exit).
///
/// A panicking `run` is caught at this launch site (§7): the panic is
/// logged, the circuit is aborted (the only "circuit reference" a leaf
/// gadget's crash can reach is this spawn point, so this is where the
/// "optionally trigger Abort" half of §7 is decided), and the admin
/// `Terminated` record is still sent so the supervisor's live-count doesn't
/// hang waiting on a task that will never finish normally.
fn spawn_gadget(
    name: String,
    gadget: Box<dyn Gadget>,
    ctx: GadgetContext,
    admin: mpsc::Sender<AdminMessage>,
) {
    let span = tracing::info_span!("gadget_run", gadget = %name);
    let abort = ctx.abort_signal().clone();
    tokio::spawn(
        async move {
            if let Err(payload) = AssertUnwindSafe(gadget.run(ctx)).catch_unwind().await {
                tracing::error!(
                    gadget = %name,
                    reason = %panic_message(&payload),
                    "gadget panicked; aborting circuit",
                );
                abort.abort();
            }
            let _ = admin.send(AdminMessage::Terminated { gadget: name }).await;
        }
        .instrument(span),
    );
}

/// Renders a caught panic payload as text for the `tracing::error!` above.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Applies one command from a running gadget's [`CircuitHandle`]. Returns the
/// number of gadgets newly launched (`0` or `1`), for the caller to fold into
/// its live-gadget count.
#[allow(clippy::too_many_arguments)]
async fn handle_supervisor_command(
    command: SupervisorCommand,
    pending_gadgets: &mut HashMap<String, (Box<dyn Gadget>, PinSet)>,
    pending_inputs: &mut HashMap<PinPath, mpsc::Receiver<Message>>,
    pending_plain_producers: &mut HashMap<(String, String), mpsc::Sender<Message>>,
    wire_senders: &mut HashMap<PinPath, mpsc::WeakSender<Message>>,
    fanout_registries: &mut HashMap<(String, String), FanoutRegistry>,
    pins: &HashMap<String, PinSet>,
    admin_tx: &mpsc::Sender<AdminMessage>,
    abort: &AbortSignal,
    config: CircuitConfig,
) -> usize {
    match command {
        SupervisorCommand::Add { name, gadget, reply } => {
            let gadget_pins = gadget.pins();
            pending_gadgets.insert(name, (gadget, gadget_pins));
            let _ = reply.send(Ok(()));
            0
        },
        SupervisorCommand::Connect { from, to, reply } => {
            let result = connect_dynamic(
                &from,
                &to,
                pending_inputs,
                pending_plain_producers,
                wire_senders,
                fanout_registries,
                pins,
            )
            .await;
            let _ = reply.send(result);
            0
        },
        SupervisorCommand::RunGadget { name, reply } => {
            let Some((gadget, gadget_pins)) = pending_gadgets.remove(&name) else {
                let _ = reply.send(Err(CircuitError::UnknownPin(name)));
                return 0;
            };
            let mut inputs = HashMap::new();
            for pin in &gadget_pins.inputs {
                let path = PinPath::new(name.clone(), pin.clone());
                inputs.insert(
                    pin.clone(),
                    pending_inputs.remove(&path).unwrap_or_else(closed_receiver),
                );
            }
            let mut outputs = HashMap::new();
            for pin in &gadget_pins.outputs {
                let endpoint = pending_plain_producers
                    .remove(&(name.clone(), pin.clone()))
                    .map_or(OutputEndpoint::Sink, OutputEndpoint::Wire);
                outputs.insert(pin.clone(), endpoint);
            }
            let mut fanouts = HashMap::new();
            for pin in &gadget_pins.fanouts {
                let registry = fanout_registries
                    .entry((name.clone(), pin.clone()))
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(HashMap::new())))
                    .clone();
                fanouts.insert(pin.clone(), registry);
            }
            let ctx = GadgetContext::new(
                name.clone(),
                inputs,
                outputs,
                fanouts,
                admin_tx.clone(),
                abort.clone(),
                config,
                None,
            );
            spawn_gadget(name, gadget, ctx, admin_tx.clone());
            let _ = reply.send(Ok(()));
            1
        },
    }
}

/// Materializes (or extends) the wire for one dynamic `Connect` call
/// (§4.7). `to` is created fresh the first time it's referenced; a `from`
/// on a fan-out pin routes the new sender through that pin's
/// [`FanoutRegistry`] under its key, otherwise it's stashed for the
/// producing gadget's own `RunGadget` to pick up as a plain output.
async fn connect_dynamic(
    from: &PinPath,
    to: &PinPath,
    pending_inputs: &mut HashMap<PinPath, mpsc::Receiver<Message>>,
    pending_plain_producers: &mut HashMap<(String, String), mpsc::Sender<Message>>,
    wire_senders: &mut HashMap<PinPath, mpsc::WeakSender<Message>>,
    fanout_registries: &mut HashMap<(String, String), FanoutRegistry>,
    pins: &HashMap<String, PinSet>,
) -> Result<(), CircuitError> {
    let sender = if let Some(sender) = wire_senders.get(to).and_then(mpsc::WeakSender::upgrade) {
        sender
    } else {
        let (tx, rx) = mpsc::channel(MIN_WIRE_CAPACITY);
        wire_senders.insert(to.clone(), tx.downgrade());
        pending_inputs.insert(to.clone(), rx);
        tx
    };

    let is_fanout = pins.get(&from.gadget).is_some_and(|p| p.is_fanout(&from.pin));
    if is_fanout {
        let Some(key) = &from.key else {
            return Err(CircuitError::Configuration(format!(
                "'{from}' is a fan-out pin and needs a ':key' suffix"
            )));
        };
        let registry = fanout_registries
            .entry((from.gadget.clone(), from.pin.clone()))
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(HashMap::new())))
            .clone();
        registry.lock().await.insert(key.clone(), OutputEndpoint::Wire(sender));
    } else {
        pending_plain_producers.insert((from.gadget.clone(), from.pin.clone()), sender);
    }
    Ok(())
}

/// Commands a running gadget can send to its owning circuit (§4.7).
///
/// The sole sanctioned mutator of a running circuit's graph; see
/// [`circuitry_core::DynamicOwner`].
pub enum SupervisorCommand {
    Add { name: String, gadget: Box<dyn Gadget>, reply: oneshot::Sender<Result<(), CircuitError>> },
    Connect { from: PinPath, to: PinPath, reply: oneshot::Sender<Result<(), CircuitError>> },
    RunGadget { name: String, reply: oneshot::Sender<Result<(), CircuitError>> },
}

/// A handle a running gadget uses to grow its own owning circuit's graph
/// (§4.7's dispatcher pattern). Cloneable; cheap.
#[derive(Clone)]
pub struct CircuitHandle {
    tx: mpsc::Sender<SupervisorCommand>,
}

#[async_trait]
impl DynamicOwner for CircuitHandle {
    async fn add(&self, name: String, gadget: Box<dyn Gadget>) -> Result<(), CircuitError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SupervisorCommand::Add { name, gadget, reply: reply_tx })
            .await
            .map_err(|_| CircuitError::Runtime("circuit supervisor channel closed".to_string()))?;
        reply_rx.await.map_err(|_| CircuitError::Runtime("supervisor dropped the reply".to_string()))?
    }

    async fn connect(
        &self,
        from_gadget: String,
        from_pin: String,
        to_gadget: String,
        to_pin: String,
    ) -> Result<(), CircuitError> {
        let from = PinPath::parse(&format!("{from_gadget}.{from_pin}"))
            .map_err(CircuitError::Configuration)?;
        let to =
            PinPath::parse(&format!("{to_gadget}.{to_pin}")).map_err(CircuitError::Configuration)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SupervisorCommand::Connect { from, to, reply: reply_tx })
            .await
            .map_err(|_| CircuitError::Runtime("circuit supervisor channel closed".to_string()))?;
        reply_rx.await.map_err(|_| CircuitError::Runtime("supervisor dropped the reply".to_string()))?
    }

    async fn run_gadget(&self, name: String) -> Result<(), CircuitError> {
        // The supervisor loop owns the admin channel and abort signal
        // already; it fills in the new gadget's context from its own running
        // state, so this only needs to name which pending gadget to launch.
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SupervisorCommand::RunGadget { name, reply: reply_tx })
            .await
            .map_err(|_| CircuitError::Runtime("circuit supervisor channel closed".to_string()))?;
        reply_rx.await.map_err(|_| CircuitError::Runtime("supervisor dropped the reply".to_string()))?
    }
}

#[async_trait]
impl Gadget for Circuit {
    fn pins(&self) -> PinSet {
        let mut set = PinSet::new();
        for (external, internal) in &self.labels {
            match self.pin_direction(internal) {
                Some(PinDirection::Input) => set.inputs.push(external.clone()),
                Some(PinDirection::Output) => set.outputs.push(external.clone()),
                None => {},
            }
        }
        set
    }

    async fn run(self: Box<Self>, ctx: GadgetContext) {
        let parts = ctx.into_parts();
        if let Err(error) = self.execute(Some(parts)).await {
            tracing::error!(%error, "sub-circuit execution failed");
        }
    }

    fn as_label_resolver(&self) -> Option<&dyn LabelResolver> {
        Some(self)
    }
}

impl LabelResolver for Circuit {
    fn labels(&self) -> PinSet {
        Gadget::pins(self)
    }

    fn adopt_abort(&self, parent: &AbortSignal) {
        *self.abort.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = parent.child();
    }
}
