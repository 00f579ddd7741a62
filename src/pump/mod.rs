//! The duplex pump: per-connection streaming state machine.
//!
//! A pump owns one [`Connection`] and runs two concurrent operations for its
//! lifetime: an inbound drain and an outbound drain. The coordinator waits
//! for whichever terminates first, cancels the other, and classifies the
//! combined outcome into a [`Termination`]. No operation outlives its
//! connection.
//!
//! Two operating modes share the coordinator:
//!
//! - **Queue-mediated** ([`DuplexPump::spawn`]): inbound frames land in a
//!   [`BoundedChannel`] (drop on overflow), the outbound loop pops, runs the
//!   [`Predictor`](crate::Predictor) and sends the result. Backpressure is
//!   resolved by dropping, never by blocking the producer.
//! - **Direct-race** ([`DuplexPump::spawn_race`](crate::pump::race)): no
//!   buffer; each iteration races "next client frame" against "next server
//!   event" and the winner's output is sent.
//!
//! State machine: `Idle → Running → Draining → Closed`, published through a
//! watch channel so observers can follow the lifecycle without touching the
//! pump.

pub mod race;
pub mod stats;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::channel::{BoundedChannel, OverflowPolicy};
use crate::predictor::Predictor;
use crate::transport::{Connection, FrameReceiver, FrameSender, Incoming};
use crate::types::{Frame, Outbound};
use crate::{PumpError, Result};

pub use stats::{PumpStats, StatsSnapshot, Termination};

/// Lifecycle of one pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    /// Connection not yet accepted; no operations started.
    Idle,
    /// Both pump operations are concurrently active.
    Running,
    /// One operation has terminated; the other is being cancelled.
    Draining,
    /// Terminal. Connection released, channel discarded.
    Closed,
}

/// Configuration for one pump.
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Capacity of the frame buffer between the inbound and outbound loops.
    /// The reference setup holds at most one frame awaiting processing.
    pub channel_capacity: usize,

    /// What to lose when the buffer is full. The default keeps the oldest
    /// unprocessed frame and drops the incoming one.
    pub overflow: OverflowPolicy,

    /// Optional message sent to the peer right after the handshake, before
    /// any pumped output.
    pub greeting: Option<Outbound>,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self { channel_capacity: 1, overflow: OverflowPolicy::default(), greeting: None }
    }
}

impl PumpConfig {
    /// Config with a non-default buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { channel_capacity: capacity, ..Self::default() }
    }

    /// Set the overflow policy.
    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    /// Set the post-handshake greeting.
    pub fn greeting(mut self, greeting: Outbound) -> Self {
        self.greeting = Some(greeting);
        self
    }
}

/// Handle to a running pump.
///
/// Dropping the handle cancels the pump; [`join`](PumpHandle::join) waits
/// for it to finish and reports why it stopped.
pub struct PumpHandle {
    stats: Arc<PumpStats>,
    state: watch::Receiver<PumpState>,
    cancel: CancellationToken,
    join: JoinHandle<Termination>,
}

impl PumpHandle {
    /// Shared counters for this pump.
    pub fn stats(&self) -> Arc<PumpStats> {
        Arc::clone(&self.stats)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PumpState {
        *self.state.borrow()
    }

    /// Stream of lifecycle transitions, starting from the current state.
    pub fn state_changes(&self) -> WatchStream<PumpState> {
        WatchStream::new(self.state.clone())
    }

    /// Request cooperative shutdown without waiting for it.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether the pump task has finished.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the pump to terminate and report why.
    pub async fn join(mut self) -> Termination {
        match (&mut self.join).await {
            Ok(termination) => termination,
            Err(err) if err.is_cancelled() => Termination::Shutdown,
            Err(err) => {
                Termination::Failed(PumpError::transport_failed(format!("pump task panicked: {err}")))
            }
        }
    }
}

impl Drop for PumpHandle {
    fn drop(&mut self) {
        // Cancel on drop so an abandoned handle never leaks its tasks
        self.cancel.cancel();
    }
}

/// How a pump operation ended, short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// The transport reported a clean close (or the event source ended).
    Disconnect,
    /// The operation observed its cancellation token.
    Cancelled,
}

/// Spawner for per-connection pumps.
pub struct DuplexPump;

impl DuplexPump {
    /// Spawn a queue-mediated pump over `conn`.
    ///
    /// Accepts the connection, then runs the inbound and outbound loops as
    /// sibling tasks until disconnect, failure or shutdown. The predictor is
    /// typically an `Arc` shared across every connection's pump.
    pub fn spawn<C, P>(conn: C, predictor: P, config: PumpConfig) -> PumpHandle
    where
        C: Connection,
        P: Predictor,
    {
        Self::spawn_with_cancel(conn, predictor, config, CancellationToken::new())
    }

    /// Like [`spawn`](DuplexPump::spawn), with an externally supplied
    /// cancellation token (e.g. a session manager's child token).
    pub fn spawn_with_cancel<C, P>(
        conn: C,
        predictor: P,
        config: PumpConfig,
        cancel: CancellationToken,
    ) -> PumpHandle
    where
        C: Connection,
        P: Predictor,
    {
        let stats = Arc::new(PumpStats::new());
        let (state_tx, state_rx) = watch::channel(PumpState::Idle);

        let join = {
            let stats = Arc::clone(&stats);
            let cancel = cancel.clone();
            tokio::spawn(
                async move { run_queue(conn, predictor, config, stats, state_tx, cancel).await },
            )
        };

        PumpHandle { stats, state: state_rx, cancel, join }
    }
}

/// Queue-mediated pump body: accept, split, run both loops, tear down.
async fn run_queue<C, P>(
    mut conn: C,
    predictor: P,
    config: PumpConfig,
    stats: Arc<PumpStats>,
    state_tx: watch::Sender<PumpState>,
    cancel: CancellationToken,
) -> Termination
where
    C: Connection,
    P: Predictor,
{
    if let Err(err) = conn.accept().await {
        warn!("Handshake failed: {err}");
        let _ = state_tx.send(PumpState::Closed);
        return Termination::Failed(err);
    }

    let (rx, mut tx) = conn.split();

    if let Some(greeting) = config.greeting.clone() {
        if let Err(err) = tx.send(greeting).await {
            let _ = state_tx.send(PumpState::Closed);
            return classify_single(Ok(Err(err)));
        }
        stats.record_sent();
    }

    let channel = Arc::new(BoundedChannel::with_policy(config.channel_capacity, config.overflow));
    debug!(
        capacity = channel.capacity(),
        policy = ?config.overflow,
        "Pump running"
    );
    let _ = state_tx.send(PumpState::Running);

    let mut inbound = tokio::spawn(inbound_loop(
        rx,
        Arc::clone(&channel),
        Arc::clone(&stats),
        cancel.clone(),
    ));
    let mut outbound = tokio::spawn(outbound_loop(
        tx,
        Arc::clone(&channel),
        predictor,
        Arc::clone(&stats),
        cancel.clone(),
    ));

    // Wait for the first operation to terminate, then retire the pair
    // together: cancel the survivor and close the channel to unblock it.
    let first_was_inbound;
    let first = tokio::select! {
        res = &mut inbound => { first_was_inbound = true; res }
        res = &mut outbound => { first_was_inbound = false; res }
    };

    let _ = state_tx.send(PumpState::Draining);
    cancel.cancel();
    channel.close();
    let second = if first_was_inbound { outbound.await } else { inbound.await };

    let _ = state_tx.send(PumpState::Closed);

    let termination = classify_pair(first, second);
    log_termination(&termination, &stats);
    termination
}

/// Inbound drain: receive frames and push them into the bounded channel,
/// dropping on overflow, until close or cancellation.
async fn inbound_loop<R>(
    mut rx: R,
    channel: Arc<BoundedChannel<Frame>>,
    stats: Arc<PumpStats>,
    cancel: CancellationToken,
) -> Result<Exit>
where
    R: FrameReceiver,
{
    loop {
        let incoming = tokio::select! {
            _ = cancel.cancelled() => return Ok(Exit::Cancelled),
            res = rx.receive() => res?,
        };

        match incoming {
            Incoming::Closed => {
                debug!("Peer closed the connection");
                return Ok(Exit::Disconnect);
            }
            Incoming::Frame(frame) => {
                stats.record_received();
                let outcome = channel.push(frame);
                if outcome.dropped() {
                    stats.record_dropped();
                    trace!(
                        received = stats.received(),
                        dropped = stats.dropped(),
                        "Frame dropped by overflow policy"
                    );
                }
            }
        }
    }
}

/// Outbound drain: pop, predict, send, until cancellation or failure.
async fn outbound_loop<T, P>(
    mut tx: T,
    channel: Arc<BoundedChannel<Frame>>,
    predictor: P,
    stats: Arc<PumpStats>,
    cancel: CancellationToken,
) -> Result<Exit>
where
    T: FrameSender,
    P: Predictor,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return Ok(Exit::Cancelled),
            popped = channel.pop() => match popped {
                Some(frame) => frame,
                None => return Ok(Exit::Cancelled),
            },
        };

        let seq = frame.seq;
        let detections = tokio::select! {
            _ = cancel.cancelled() => return Ok(Exit::Cancelled),
            res = predictor.predict(frame) => res?,
        };
        stats.record_processed();
        trace!(seq, objects = detections.objects.len(), "Frame processed");

        let outbound = detections.to_outbound()?;
        tx.send(outbound).await?;
        stats.record_sent();
    }
}

/// Fold the two loop results into one termination reason.
///
/// A non-disconnect error from either operation wins (the earlier finisher
/// takes precedence); otherwise a disconnect from either side ends the pump
/// cleanly; otherwise both were cancelled and this is an external shutdown.
fn classify_pair(
    first: std::result::Result<Result<Exit>, JoinError>,
    second: std::result::Result<Result<Exit>, JoinError>,
) -> Termination {
    let mut saw_disconnect = false;

    for result in [first, second] {
        match flatten(result) {
            Ok(Exit::Disconnect) => saw_disconnect = true,
            Ok(Exit::Cancelled) => {}
            Err(err) if err.is_disconnect() => saw_disconnect = true,
            Err(err) => return Termination::Failed(err),
        }
    }

    if saw_disconnect { Termination::Disconnect } else { Termination::Shutdown }
}

/// Classification for a single-operation outcome (direct-race mode, or a
/// failure before the loops start).
fn classify_single(result: std::result::Result<Result<Exit>, JoinError>) -> Termination {
    classify_pair(result, Ok(Ok(Exit::Cancelled)))
}

fn flatten(result: std::result::Result<Result<Exit>, JoinError>) -> Result<Exit> {
    match result {
        Ok(inner) => inner,
        Err(err) if err.is_cancelled() => Ok(Exit::Cancelled),
        Err(err) => Err(PumpError::transport_failed(format!("pump operation panicked: {err}"))),
    }
}

fn log_termination(termination: &Termination, stats: &PumpStats) {
    let snapshot = stats.snapshot();
    match termination {
        Termination::Disconnect => {
            debug!(?snapshot, "Pump ended: client disconnected");
        }
        Termination::Shutdown => {
            info!(?snapshot, "Pump ended: shutdown requested");
        }
        Termination::Failed(err) => {
            error!(?snapshot, "Pump failed: {err}");
        }
    }
}
