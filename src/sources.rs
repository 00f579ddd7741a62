//! Built-in race participants for direct-race pumps.
//!
//! - [`EchoHandler`]: replies to every inbound frame with its own payload
//! - [`TickerSource`]: periodic server-side event (the "server has
//!   something to say on a timer" pattern)
//! - [`Broadcaster`] / [`BroadcastSource`] / [`PublishHandler`]: chat-style
//!   fan-out where every session's inbound frames are published to all
//!   other sessions

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::time::{Interval, MissedTickBehavior, interval};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

use crate::Result;
use crate::pump::race::{EventSource, FrameHandler};
use crate::types::{Frame, Outbound};

/// Handler that echoes each inbound frame back unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

#[async_trait]
impl FrameHandler for EchoHandler {
    async fn on_frame(&mut self, frame: Frame) -> Result<Option<Outbound>> {
        Ok(Some((&frame).into()))
    }
}

/// Periodic event source.
///
/// Emits one message per period, built by the supplied closure from the tick
/// index. Ticks that would pile up while the pump is busy are delayed rather
/// than burst.
pub struct TickerSource<F> {
    interval: Interval,
    tick: u64,
    make: F,
}

impl<F> TickerSource<F>
where
    F: FnMut(u64) -> Outbound + Send + 'static,
{
    pub fn new(period: Duration, make: F) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, tick: 0, make }
    }
}

#[async_trait]
impl<F> EventSource for TickerSource<F>
where
    F: FnMut(u64) -> Outbound + Send + 'static,
{
    async fn next_event(&mut self) -> Result<Option<Outbound>> {
        self.interval.tick().await;
        let message = (self.make)(self.tick);
        self.tick += 1;
        Ok(Some(message))
    }
}

/// A message published into a [`Broadcaster`], tagged with the session that
/// produced it.
#[derive(Debug, Clone)]
struct Published {
    origin: u64,
    message: Outbound,
}

/// Fan-out hub for chat-style sessions.
///
/// Every session joined to the broadcaster sees messages published by every
/// *other* session; a session's own messages are filtered out by origin id.
/// Slow sessions may miss messages (the underlying channel is bounded) —
/// consistent with the rest of the pipeline, staleness loses to liveness.
pub struct Broadcaster {
    tx: broadcast::Sender<Published>,
    next_origin: AtomicU64,
}

impl Broadcaster {
    /// Create a hub whose per-subscriber backlog holds up to `capacity`
    /// messages.
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(capacity);
        Arc::new(Self { tx, next_origin: AtomicU64::new(0) })
    }

    /// Join the hub: returns the event source and publish handler for one
    /// session's direct-race pump.
    pub fn join(self: &Arc<Self>) -> (BroadcastSource, PublishHandler) {
        let origin = self.next_origin.fetch_add(1, Ordering::Relaxed);
        let stream = BroadcastStream::new(self.tx.subscribe());
        let source = BroadcastSource { origin, stream };
        let handler = PublishHandler { origin, hub: Arc::clone(self) };
        (source, handler)
    }

    fn publish(&self, origin: u64, message: Outbound) {
        // Send only fails with zero subscribers; the publisher itself is
        // always subscribed, so a failure just means the session is tearing
        // down.
        let _ = self.tx.send(Published { origin, message });
    }

    /// Number of currently subscribed sessions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Event source yielding messages published by other sessions.
pub struct BroadcastSource {
    origin: u64,
    stream: BroadcastStream<Published>,
}

#[async_trait]
impl EventSource for BroadcastSource {
    async fn next_event(&mut self) -> Result<Option<Outbound>> {
        loop {
            match self.stream.next().await {
                Some(Ok(published)) => {
                    // Discard this session's own messages
                    if published.origin != self.origin {
                        return Ok(Some(published.message));
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
                    warn!(missed, "Session lagged behind the broadcast hub");
                }
                None => {
                    debug!("Broadcast hub closed");
                    return Ok(None);
                }
            }
        }
    }
}

/// Handler that publishes each inbound frame to the hub instead of replying.
pub struct PublishHandler {
    origin: u64,
    hub: Arc<Broadcaster>,
}

#[async_trait]
impl FrameHandler for PublishHandler {
    async fn on_frame(&mut self, frame: Frame) -> Result<Option<Outbound>> {
        self.hub.publish(self.origin, (&frame).into());
        Ok(None)
    }
}
