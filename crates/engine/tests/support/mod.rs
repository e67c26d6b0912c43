// SPDX-FileCopyrightText: © 2025 Circuitry Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Fixture gadgets and a tracing capture helper shared by the scenario
//! tests in `scenarios.rs`.

use circuitry_core::{async_trait, Gadget, GadgetContext, Message, PinSet};
use std::sync::{Arc, Mutex};

/// Repeats every message received on `In` `Num` times onto `Out`.
///
/// `Num` is itself a pin (not a constructor argument) so it can be set with
/// a plain `Feed`, matching `Repeater{Num, In, Out}` from §8's S1.
pub struct Repeater;

#[async_trait]
impl Gadget for Repeater {
    fn pins(&self) -> PinSet {
        PinSet::new().with_input("Num").with_input("In").with_output("Out")
    }

    async fn run(self: Box<Self>, mut ctx: GadgetContext) {
        let num = match ctx.recv("Num").await {
            Some(message) => message.downcast_ref::<i32>().copied().unwrap_or(1),
            None => return,
        };
        while let Some(message) = ctx.recv("In").await {
            for _ in 0..num {
                if ctx.send("Out", message.clone()).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Collects every message it receives (as its `repr()`) into a shared log,
/// standing in for the source's `Printer` fixture without depending on
/// captured stdout.
pub struct Collector(pub Arc<Mutex<Vec<String>>>);

#[async_trait]
impl Gadget for Collector {
    fn pins(&self) -> PinSet {
        PinSet::new().with_input("In")
    }

    async fn run(self: Box<Self>, mut ctx: GadgetContext) {
        while let Some(message) = ctx.recv("In").await {
            self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(message.repr().to_string());
        }
    }
}

/// Upper-cases every `String` it receives on `In` and sends it on `Out`,
/// matching §8's S2 `Upper{In, Out}` fixture.
pub struct Upper;

#[async_trait]
impl Gadget for Upper {
    fn pins(&self) -> PinSet {
        PinSet::new().with_input("In").with_output("Out")
    }

    async fn run(self: Box<Self>, mut ctx: GadgetContext) {
        while let Some(message) = ctx.recv("In").await {
            if let Some(s) = message.downcast_ref::<String>() {
                let _ = ctx.send("Out", Message::new(s.to_uppercase())).await;
            }
        }
    }
}

/// Sends two messages on a 1-capacity `Out` and records the second send's
/// outcome, then returns. The fixture S5 needs to exercise the send-timeout
/// and send-after-abort paths: the first send fills the wire, the second
/// blocks against whatever consumer (or lack of one) is on the other end.
pub struct ProbeSender {
    pub message: Message,
    pub results: Arc<Mutex<Vec<circuitry_core::SendError>>>,
}

#[async_trait]
impl Gadget for ProbeSender {
    fn pins(&self) -> PinSet {
        PinSet::new().with_output("Out")
    }

    async fn run(self: Box<Self>, ctx: GadgetContext) {
        if ctx.send("Out", self.message.clone()).await.is_err() {
            return;
        }
        if let Err(error) = ctx.send("Out", self.message.clone()).await {
            self.results.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(error);
        }
    }
}

/// Holds its `In` receiver open without ever draining it, standing in for a
/// stalled consumer so a producer's output wire stays full until the circuit
/// is aborted.
pub struct Never;

#[async_trait]
impl Gadget for Never {
    fn pins(&self) -> PinSet {
        PinSet::new().with_input("In")
    }

    async fn run(self: Box<Self>, ctx: GadgetContext) {
        ctx.abort_signal().cancelled().await;
    }
}

/// An output-only gadget that does nothing and returns immediately, used to
/// occupy a `Connect` slot (§8's S6) without actually producing traffic.
pub struct Idle;

#[async_trait]
impl Gadget for Idle {
    fn pins(&self) -> PinSet {
        PinSet::new().with_output("Out")
    }

    async fn run(self: Box<Self>, _ctx: GadgetContext) {}
}

/// Panics immediately on `run`, for exercising the launch site's panic
/// containment (§7): the circuit must still notice this gadget "terminated"
/// and, since a panic aborts the circuit, cascade-shutdown any sibling that
/// is only waiting on the abort signal.
pub struct Boom;

#[async_trait]
impl Gadget for Boom {
    fn pins(&self) -> PinSet {
        PinSet::new()
    }

    async fn run(self: Box<Self>, _ctx: GadgetContext) {
        panic!("boom");
    }
}

/// Forwards every message it receives on `In` to `Out` unchanged, standing
/// in for a decoder gadget that doesn't need to transform anything.
pub struct Echo;

#[async_trait]
impl Gadget for Echo {
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

/// A capture buffer usable as a `tracing_subscriber::fmt` writer, so tests
/// can assert on the rendered `Lost <type>: <value>` log lines without
/// touching real stdout.
#[derive(Clone, Default)]
pub struct CapturedLogs(pub Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl CapturedLogs {
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)).into_owned()
    }
}
