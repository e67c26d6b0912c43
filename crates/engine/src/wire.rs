// SPDX-FileCopyrightText: © 2025 Circuitry Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Pin addressing and wire materialization (§4.3, §4.5 steps 1-3).
//!
//! A [`PinPath`] names one endpoint of a connection: `"gadget.pin"`, or
//! `"gadget.pin:key"` for a fan-out map entry. [`materialize`] turns the
//! circuit builder's accumulated `connects`/`feeds` into real `tokio::mpsc`
//! channels, folding in the capacity invariant (§3: effective capacity is
//! the max of every declared capacity and the feed length) and the
//! dangling-input close rule (§4.5 step 3) - the latter falls out for free
//! here: a destination with no connect and no feed simply never gets an
//! entry in the returned map, so the binder treats it as unbound and
//! installs a pre-closed sentinel (see `circuit::build_context`).

use circuitry_core::Message;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc;

use crate::constants::MIN_WIRE_CAPACITY;

/// One endpoint of a connection inside a circuit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PinPath {
    pub gadget: String,
    pub pin: String,
    pub key: Option<String>,
}

impl PinPath {
    #[must_use]
    pub fn new(gadget: impl Into<String>, pin: impl Into<String>) -> Self {
        Self { gadget: gadget.into(), pin: pin.into(), key: None }
    }

    #[must_use]
    pub fn with_key(gadget: impl Into<String>, pin: impl Into<String>, key: impl Into<String>) -> Self {
        Self { gadget: gadget.into(), pin: pin.into(), key: Some(key.into()) }
    }

    /// Parses `"gadget.pin"` or `"gadget.pin:key"`.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `path` has no `.` separator.
    pub fn parse(path: &str) -> Result<Self, String> {
        let (gadget, rest) =
            path.split_once('.').ok_or_else(|| format!("pin path '{path}' is missing a '.'"))?;
        if gadget.is_empty() || rest.is_empty() {
            return Err(format!("pin path '{path}' has an empty gadget or pin name"));
        }
        match rest.split_once(':') {
            Some((pin, key)) => Ok(Self::with_key(gadget, pin, key)),
            None => Ok(Self::new(gadget, rest)),
        }
    }
}

impl fmt::Display for PinPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}.{}:{key}", self.gadget, self.pin),
            None => write!(f, "{}.{}", self.gadget, self.pin),
        }
    }
}

/// A single `Connect` call recorded at circuit-build time.
#[derive(Debug, Clone)]
pub struct ConnectDef {
    pub from: PinPath,
    pub to: PinPath,
    pub capacity: usize,
}

/// A materialized wire: its consumer-side receiver (taken exactly once, by
/// the destination gadget) and a sender usable by every producer bound to
/// it plus, for wires fed at least in part by a fan-out pin, a retained
/// "holder" clone so the wire survives until that fan-out's owning gadget
/// terminates (§4.7's dynamic growth - see `circuit::Circuit::execute`).
pub struct MaterializedWire {
    pub sender: mpsc::Sender<Message>,
    pub receiver: mpsc::Receiver<Message>,
    pub senders: usize,
    pub retain_holder: Option<String>,
}

/// Builds one real channel per distinct connection destination.
///
/// `feeds` messages are preloaded into the channel's buffer before any
/// sender clone is handed to a producer, so they are guaranteed to be the
/// first messages the consumer observes (§5's feed-ordering guarantee).
/// Preloading cannot block: capacity is sized to be at least the feed
/// length.
pub fn materialize(
    connects: &[ConnectDef],
    feeds: &HashMap<PinPath, Vec<Message>>,
    fanout_pin: impl Fn(&str, &str) -> bool,
) -> HashMap<PinPath, MaterializedWire> {
    let mut capacities: HashMap<PinPath, usize> = HashMap::new();
    let mut senders: HashMap<PinPath, usize> = HashMap::new();
    let mut holders: HashMap<PinPath, String> = HashMap::new();

    for connect in connects {
        let entry = capacities.entry(connect.to.clone()).or_insert(0);
        *entry = (*entry).max(connect.capacity);
        *senders.entry(connect.to.clone()).or_insert(0) += 1;
        if fanout_pin(&connect.from.gadget, &connect.from.pin) {
            holders.entry(connect.to.clone()).or_insert_with(|| connect.from.gadget.clone());
        }
    }
    for (pin, messages) in feeds {
        let entry = capacities.entry(pin.clone()).or_insert(0);
        *entry = (*entry).max(messages.len());
    }

    let mut wires = HashMap::new();
    for (pin, capacity) in capacities {
        let (sender, receiver) = mpsc::channel(capacity.max(MIN_WIRE_CAPACITY));
        if let Some(messages) = feeds.get(&pin) {
            for message in messages.iter().cloned() {
                if sender.try_send(message).is_err() {
                    tracing::error!(%pin, "feed preload exceeded the sized wire capacity");
                }
            }
        }
        wires.insert(
            pin.clone(),
            MaterializedWire {
                sender,
                receiver,
                senders: senders.get(&pin).copied().unwrap_or(0),
                retain_holder: holders.get(&pin).cloned(),
            },
        );
    }
    wires
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_fanout_paths() {
        let plain = PinPath::parse("r.Out").unwrap();
        assert_eq!(plain, PinPath::new("r", "Out"));

        let keyed = PinPath::parse("head.Feeds:A").unwrap();
        assert_eq!(keyed, PinPath::with_key("head", "Feeds", "A"));
    }

    #[test]
    fn rejects_paths_without_a_dot() {
        assert!(PinPath::parse("noseparator").is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        let path = PinPath::with_key("head", "Feeds", "A");
        assert_eq!(PinPath::parse(&path.to_string()).unwrap(), path);
    }

    #[test]
    fn capacity_is_the_max_of_connects_and_feed_length() {
        let to = PinPath::new("p", "In");
        let connects = vec![
            ConnectDef { from: PinPath::new("a", "Out"), to: to.clone(), capacity: 5 },
            ConnectDef { from: PinPath::new("b", "Out"), to: to.clone(), capacity: 2 },
        ];
        let mut feeds = HashMap::new();
        feeds.insert(to.clone(), vec![Message::new(1i32); 30]);

        let wires = materialize(&connects, &feeds, |_, _| false);
        let wire = wires.get(&to).unwrap();
        assert_eq!(wire.sender.max_capacity(), 30);
        assert_eq!(wire.senders, 2);
    }
}
