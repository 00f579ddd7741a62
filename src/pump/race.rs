//! Direct-race pump mode.
//!
//! No buffer between the directions: each iteration schedules "wait for the
//! next client frame" against "wait for the next server event" and proceeds
//! with whichever completes first. The loser is dropped at its suspension
//! point — the race itself provides fairness between "client has something
//! to say" and "server has something to say".
//!
//! This is the mode behind echo, timer and broadcast style sessions; the
//! queue-mediated mode in the parent module covers the processing-heavy
//! path.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::pump::{DuplexPump, Exit, PumpConfig, PumpHandle, PumpState, PumpStats, Termination};
use crate::pump::{classify_single, log_termination};
use crate::transport::{Connection, FrameReceiver, FrameSender, Incoming};
use crate::types::{Frame, Outbound};
use crate::Result;

/// Server-side event producer raced against the inbound direction.
///
/// A timer tick, an external publish, anything the server wants to say
/// without being asked. The pump races `next_event` against `receive`; the
/// call must be cancel-safe because it is dropped whenever the inbound side
/// wins an iteration.
#[async_trait]
pub trait EventSource: Send + 'static {
    /// Suspend until the next event is ready.
    ///
    /// `Ok(None)` means the source is exhausted; the pump ends the session
    /// cleanly.
    async fn next_event(&mut self) -> Result<Option<Outbound>>;
}

/// Per-frame handler for the inbound side of a direct-race pump.
#[async_trait]
pub trait FrameHandler: Send + 'static {
    /// React to one inbound frame, optionally producing a reply.
    ///
    /// Returning `None` consumes the frame without replying (e.g. a handler
    /// that publishes it elsewhere).
    async fn on_frame(&mut self, frame: Frame) -> Result<Option<Outbound>>;
}

impl DuplexPump {
    /// Spawn a direct-race pump over `conn`.
    ///
    /// Every iteration races the connection's `receive` against
    /// `source.next_event()`; the winner's output (handler reply or event)
    /// is sent before the next iteration starts.
    pub fn spawn_race<C, S, H>(conn: C, source: S, handler: H, config: PumpConfig) -> PumpHandle
    where
        C: Connection,
        S: EventSource,
        H: FrameHandler,
    {
        Self::spawn_race_with_cancel(conn, source, handler, config, CancellationToken::new())
    }

    /// Like [`spawn_race`](DuplexPump::spawn_race), with an externally
    /// supplied cancellation token.
    pub fn spawn_race_with_cancel<C, S, H>(
        conn: C,
        source: S,
        handler: H,
        config: PumpConfig,
        cancel: CancellationToken,
    ) -> PumpHandle
    where
        C: Connection,
        S: EventSource,
        H: FrameHandler,
    {
        let stats = Arc::new(PumpStats::new());
        let (state_tx, state_rx) = watch::channel(PumpState::Idle);

        let join = {
            let stats = Arc::clone(&stats);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                run_race(conn, source, handler, config, stats, state_tx, cancel).await
            })
        };

        PumpHandle { stats, state: state_rx, cancel, join }
    }
}

async fn run_race<C, S, H>(
    mut conn: C,
    source: S,
    handler: H,
    config: PumpConfig,
    stats: Arc<PumpStats>,
    state_tx: watch::Sender<PumpState>,
    cancel: CancellationToken,
) -> Termination
where
    C: Connection,
    S: EventSource,
    H: FrameHandler,
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

    let _ = state_tx.send(PumpState::Running);

    let result = race_loop(rx, tx, source, handler, Arc::clone(&stats), cancel).await;

    let _ = state_tx.send(PumpState::Draining);
    let _ = state_tx.send(PumpState::Closed);

    let termination = classify_single(Ok(result));
    log_termination(&termination, &stats);
    termination
}

/// One task, two racing operations per iteration.
///
/// Exactly one winner is observed per iteration; the losing future is
/// dropped, so its operation unwinds at the suspension point it was parked
/// on. All sends happen after the race resolves — a loser never leaves the
/// connection half-written.
async fn race_loop<Rx, Tx, S, H>(
    mut rx: Rx,
    mut tx: Tx,
    mut source: S,
    mut handler: H,
    stats: Arc<PumpStats>,
    cancel: CancellationToken,
) -> Result<Exit>
where
    Rx: FrameReceiver,
    Tx: FrameSender,
    S: EventSource,
    H: FrameHandler,
{
    enum Winner {
        Inbound(Incoming),
        Event(Option<Outbound>),
    }

    loop {
        let winner = tokio::select! {
            _ = cancel.cancelled() => return Ok(Exit::Cancelled),
            res = rx.receive() => Winner::Inbound(res?),
            res = source.next_event() => Winner::Event(res?),
        };

        match winner {
            Winner::Inbound(Incoming::Closed) => {
                debug!("Peer closed the connection");
                return Ok(Exit::Disconnect);
            }
            Winner::Inbound(Incoming::Frame(frame)) => {
                stats.record_received();
                let seq = frame.seq;
                if let Some(reply) = handler.on_frame(frame).await? {
                    tx.send(reply).await?;
                    stats.record_sent();
                    trace!(seq, "Replied to inbound frame");
                }
                stats.record_processed();
            }
            Winner::Event(Some(event)) => {
                tx.send(event).await?;
                stats.record_sent();
                trace!("Forwarded server event");
            }
            Winner::Event(None) => {
                debug!("Event source ended");
                return Ok(Exit::Disconnect);
            }
        }
    }
}
