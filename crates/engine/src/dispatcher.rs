// SPDX-FileCopyrightText: © 2025 Circuitry Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The dynamic dispatch pattern (§4.7): a two-gadget sub-circuit that grows
//! its own graph while running.
//!
//! [`packet_map_dispatcher`] builds a `head`/`tail` [`Circuit`] exposing
//! three labels - `In`, `Out`, `Rej` - matching `PacketMapDispatcher` in the
//! source runtime. `head` inspects each inbound message with a
//! caller-supplied key function (the Rust stand-in for the source's
//! `Field`-by-reflection lookup: a message here is opaque, so there's no
//! generic "read field X" short of a closure the caller provides), looks
//! `prefix + key` up in a [`Registry`], and on a hit asks its own owning
//! circuit (through [`DynamicOwner`], reached via [`GadgetContext::owner`])
//! to add, wire, and launch a fresh gadget instance against the *already
//! running* sub-circuit. A miss is cached so it isn't retried, reported on
//! `Rej`, and still routed to `tail` through the fallback fan-out key `""`
//! (§9: the constructor wires that fallback route up front so
//! `head.Feeds[""]` always exists).

use circuitry_core::{async_trait, DynamicOwner, Gadget, GadgetContext, Message, PinSet, Registry};
use std::collections::HashSet;
use std::sync::Arc;

use crate::circuit::Circuit;
use crate::constants::MIN_WIRE_CAPACITY;

/// Extracts the dispatch key from a message. The Rust equivalent of the
/// source's configured `Field` name: since `Message` has no reflectable
/// fields, the caller supplies the lookup instead of naming one.
pub type KeyFn = Arc<dyn Fn(&Message) -> String + Send + Sync>;

/// Builds a `head`/`tail` sub-circuit implementing the dispatcher pattern.
///
/// Exposes three labels once `add_circuitry`'d into a parent circuit:
/// `In` (feed messages here), `Out` (every message eventually arrives here,
/// whether routed through a decoder or the rejection fallback), and `Rej`
/// (the dispatch key of every message whose decoder kind wasn't found).
///
/// # Errors
///
/// Returns [`circuitry_core::CircuitError`] only if the internal
/// construction below is inconsistent - it never fails for a correct
/// `prefix`/`key_fn`/`registry` triple.
pub fn packet_map_dispatcher(
    prefix: impl Into<String>,
    key_fn: impl Fn(&Message) -> String + Send + Sync + 'static,
    registry: Registry,
) -> Result<Circuit, circuitry_core::CircuitError> {
    let mut circuit = Circuit::new();
    circuit.add_circuitry(
        "head",
        Box::new(DispatchHead { prefix: prefix.into(), key_fn: Arc::new(key_fn), registry }),
    )?;
    circuit.add_circuitry("tail", Box::new(DispatchTail))?;
    // The fallback route: an empty fan-out key, wired up before the circuit
    // ever runs so `head`'s miss path always has somewhere to send to.
    circuit.connect("head.Feeds:", "tail.In", MIN_WIRE_CAPACITY)?;
    circuit.label("In", "head.In")?;
    circuit.label("Rej", "head.Rej")?;
    circuit.label("Out", "tail.Out")?;
    Ok(circuit)
}

struct DispatchHead {
    prefix: String,
    key_fn: KeyFn,
    registry: Registry,
}

#[async_trait]
impl Gadget for DispatchHead {
    fn pins(&self) -> PinSet {
        PinSet::new().with_input("In").with_output("Rej").with_fanout("Feeds")
    }

    async fn run(self: Box<Self>, mut ctx: GadgetContext) {
        let mut launched: HashSet<String> = HashSet::new();
        let mut rejected: HashSet<String> = HashSet::new();

        while let Some(message) = ctx.recv("In").await {
            let key = (self.key_fn)(&message);

            if rejected.contains(&key) {
                let _ = ctx.send("Rej", Message::new(key.clone())).await;
                let _ = ctx.send_fanout("Feeds", "", message).await;
                continue;
            }

            if !launched.contains(&key) {
                let kind = format!("{}{key}", self.prefix);
                let found = self.registry.contains(&kind);
                if found && launch_decoder(&ctx, &self.registry, &kind, &key).await {
                    launched.insert(key.clone());
                } else {
                    if !found {
                        tracing::warn!(%kind, "dispatcher: no registered decoder for kind, rejecting");
                    }
                    rejected.insert(key.clone());
                    let _ = ctx.send("Rej", Message::new(key.clone())).await;
                    let _ = ctx.send_fanout("Feeds", "", message).await;
                    continue;
                }
            }

            let _ = ctx.send_fanout("Feeds", &key, message).await;
        }
    }
}

/// Adds, wires, and launches a fresh decoder instance for `key` against the
/// owning circuit, returning `false` if there's no owner attached (shouldn't
/// happen for a gadget bound via [`packet_map_dispatcher`]), the registry
/// construction fails, or the owning circuit's supervisor has already shut
/// down.
async fn launch_decoder(ctx: &GadgetContext, registry: &Registry, kind: &str, key: &str) -> bool {
    let Some(owner) = ctx.owner() else { return false };
    let gadget = match registry.create(kind, None) {
        Ok(gadget) => gadget,
        Err(error) => {
            tracing::error!(%kind, %error, "dispatcher: decoder construction failed");
            return false;
        },
    };
    let name = key.to_string();
    if owner.add(name.clone(), gadget).await.is_err() {
        return false;
    }
    if owner
        .connect("head".to_string(), format!("Feeds:{key}"), name.clone(), "In".to_string())
        .await
        .is_err()
    {
        return false;
    }
    if owner.connect(name.clone(), "Out".to_string(), "tail".to_string(), "In".to_string()).await.is_err() {
        return false;
    }
    owner.run_gadget(name).await.is_ok()
}

struct DispatchTail;

#[async_trait]
impl Gadget for DispatchTail {
    fn pins(&self) -> PinSet {
        PinSet::new().with_input("In").with_output("Out")
    }

    async fn run(self: Box<Self>, mut ctx: GadgetContext) {
        while let Some(message) = ctx.recv("In").await {
            if ctx.send("Out", message).await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug, Clone)]
    struct Fields(HashMap<String, String>);

    fn kind_of(message: &Message) -> String {
        message.downcast_ref::<Fields>().and_then(|f| f.0.get("kind").cloned()).unwrap_or_default()
    }

    struct EchoDecoder;

    #[async_trait]
    impl Gadget for EchoDecoder {
        fn pins(&self) -> PinSet {
            PinSet::new().with_input("In").with_output("Out")
        }

        async fn run(self: Box<Self>, mut ctx: GadgetContext) {
            while let Some(message) = ctx.recv("In").await {
                if ctx.send("Out", message).await.is_err() {
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn builds_with_labels_exposed() {
        let mut registry = Registry::new();
        registry.register("Dec_A", |_| Ok(Box::new(EchoDecoder) as Box<dyn Gadget>));
        let dispatcher = packet_map_dispatcher("Dec_", kind_of, registry).unwrap();
        let pins = Gadget::pins(&dispatcher);
        assert!(pins.contains("In"));
        assert!(pins.contains("Out"));
        assert!(pins.contains("Rej"));
    }
}
