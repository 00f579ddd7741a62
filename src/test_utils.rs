//! Test utilities: in-memory transport and scripted predictors.
//!
//! The mock connection pairs a [`MockConnection`] (the side handed to a
//! pump) with a [`MockRemote`] (the test's handle playing the peer: feed
//! frames, read outbound traffic, disconnect, break the wire).

#![cfg(test)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};

use crate::transport::{Connection, FrameReceiver, FrameSender, Incoming};
use crate::types::{DetectedObject, Detections, Frame, Outbound, Payload};
use crate::{Predictor, PumpError, Result};

/// Install a compact test subscriber honoring `RUST_LOG`, once per process.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Create a connected mock transport pair.
pub fn mock_connection() -> (MockConnection, MockRemote) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let wire_broken = Arc::new(AtomicBool::new(false));

    let conn = MockConnection {
        accepted: false,
        inbound_rx,
        outbound_tx,
        wire_broken: Arc::clone(&wire_broken),
    };
    let remote = MockRemote { inbound_tx, outbound_rx, wire_broken, seq: 0 };
    (conn, remote)
}

/// Pump-side half of the mock transport.
pub struct MockConnection {
    accepted: bool,
    inbound_rx: mpsc::UnboundedReceiver<Incoming>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    wire_broken: Arc<AtomicBool>,
}

#[async_trait]
impl Connection for MockConnection {
    type Rx = MockReceiver;
    type Tx = MockSender;

    async fn accept(&mut self) -> Result<()> {
        if self.accepted {
            return Err(PumpError::handshake_failed("connection already open"));
        }
        self.accepted = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.accepted
    }

    fn split(self) -> (Self::Rx, Self::Tx) {
        let rx = MockReceiver { inbound: self.inbound_rx };
        let tx = MockSender { outbound: self.outbound_tx, wire_broken: self.wire_broken };
        (rx, tx)
    }
}

pub struct MockReceiver {
    inbound: mpsc::UnboundedReceiver<Incoming>,
}

#[async_trait]
impl FrameReceiver for MockReceiver {
    async fn receive(&mut self) -> Result<Incoming> {
        // A dropped remote counts as a close
        Ok(self.inbound.recv().await.unwrap_or(Incoming::Closed))
    }
}

pub struct MockSender {
    outbound: mpsc::UnboundedSender<Outbound>,
    wire_broken: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSender for MockSender {
    async fn send(&mut self, outbound: Outbound) -> Result<()> {
        if self.wire_broken.load(Ordering::SeqCst) {
            return Err(PumpError::send_closed("mock wire broken"));
        }
        self.outbound
            .send(outbound)
            .map_err(|_| PumpError::send_closed("mock remote dropped"))
    }
}

/// Test-side half of the mock transport.
pub struct MockRemote {
    inbound_tx: mpsc::UnboundedSender<Incoming>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    wire_broken: Arc<AtomicBool>,
    seq: u64,
}

impl MockRemote {
    /// Feed a text frame to the pump.
    pub fn send_text(&mut self, text: &str) {
        let seq = self.seq;
        self.seq += 1;
        let _ = self.inbound_tx.send(Incoming::Frame(Frame::text(text, seq)));
    }

    /// Feed a binary frame to the pump.
    pub fn send_binary(&mut self, data: Vec<u8>) {
        let seq = self.seq;
        self.seq += 1;
        let _ = self.inbound_tx.send(Incoming::Frame(Frame::binary(data, seq)));
    }

    /// Signal a clean disconnect.
    pub fn close(&self) {
        let _ = self.inbound_tx.send(Incoming::Closed);
    }

    /// Make every subsequent pump-side send fail.
    pub fn break_wire(&self) {
        self.wire_broken.store(true, Ordering::SeqCst);
    }

    /// Next message the pump wrote to the wire.
    pub async fn next_outbound(&mut self) -> Option<Outbound> {
        self.outbound_rx.recv().await
    }

    /// Next outbound message, or `None` if nothing arrives in `timeout`.
    pub async fn next_outbound_within(&mut self, timeout: Duration) -> Option<Outbound> {
        tokio::time::timeout(timeout, self.outbound_rx.recv()).await.ok().flatten()
    }
}

/// Label a frame the way the scripted predictors do.
fn label_of(frame: &Frame) -> String {
    match &frame.payload {
        Payload::Text(text) => text.to_string(),
        Payload::Binary(bytes) => format!("binary[{}]", bytes.len()),
    }
}

fn detect(frame: &Frame) -> Detections {
    Detections {
        objects: vec![DetectedObject {
            bounding_box: (0.0, 0.0, 1.0, 1.0),
            label: label_of(frame),
        }],
    }
}

/// Predictor that answers immediately with one object labeled after the
/// frame's payload.
#[derive(Debug, Default)]
pub struct InstantPredictor {
    calls: AtomicU64,
}

impl InstantPredictor {
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Predictor for InstantPredictor {
    async fn predict(&self, frame: Frame) -> Result<Detections> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(detect(&frame))
    }
}

/// Predictor that completes only when the test grants a permit.
///
/// Gives backpressure tests deterministic control over consumer speed: the
/// pump's outbound loop parks inside `predict` until `allow` is called.
#[derive(Debug)]
pub struct GatedPredictor {
    gate: Semaphore,
    started: AtomicU64,
    completed: AtomicU64,
}

impl GatedPredictor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { gate: Semaphore::new(0), started: AtomicU64::new(0), completed: AtomicU64::new(0) })
    }

    /// Allow `n` pending or future predictions to complete.
    pub fn allow(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Predictions that have been entered (possibly still parked).
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    /// Predictions that have completed.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Predictor for GatedPredictor {
    async fn predict(&self, frame: Frame) -> Result<Detections> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| PumpError::predictor_failed("gate closed"))?;
        permit.forget();
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(detect(&frame))
    }
}

/// Predictor that fails on a designated poison payload and succeeds on
/// everything else.
#[derive(Debug)]
pub struct FailOnPayload {
    poison: String,
}

impl FailOnPayload {
    pub fn new(poison: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { poison: poison.into() })
    }
}

#[async_trait]
impl Predictor for FailOnPayload {
    async fn predict(&self, frame: Frame) -> Result<Detections> {
        if label_of(&frame) == self.poison {
            return Err(PumpError::predictor_failed(format!("poison frame {}", frame.seq)));
        }
        Ok(detect(&frame))
    }
}

/// Poll `cond` until it holds, panicking after a generous deadline.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}
