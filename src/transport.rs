//! Transport boundary for duplex message connections.
//!
//! The pump is transport-agnostic: anything that can accept a session,
//! receive frames and send messages can drive it. Framing and encoding
//! (text vs. binary) are opaque here — frames pass through unchanged.
//!
//! Disconnect is signaled as a value, not an error: `receive` resolves to
//! [`Incoming::Closed`] when the peer goes away cleanly, and the coordinator
//! inspects it explicitly. Only genuine transport faults surface as
//! [`PumpError::Transport`](crate::PumpError).

use async_trait::async_trait;

use crate::Result;
use crate::types::{Frame, Outbound};

/// What the receive side produced: a frame, or the end of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A frame arrived from the peer.
    Frame(Frame),

    /// The peer closed the connection. Expected termination, not an error.
    Closed,
}

/// Receive half of a duplex connection.
///
/// Exactly one task reads from a receiver at any instant; the pump enforces
/// this by giving the half to a single loop.
#[async_trait]
pub trait FrameReceiver: Send + 'static {
    /// Suspend until a frame arrives or the connection closes.
    ///
    /// Implementations must be cancel-safe: the pump races `receive` against
    /// sibling operations and drops the losing future at its suspension
    /// point. A dropped call must not lose or corrupt a frame that a later
    /// call would have returned.
    async fn receive(&mut self) -> Result<Incoming>;
}

/// Send half of a duplex connection.
#[async_trait]
pub trait FrameSender: Send + 'static {
    /// Enqueue a message on the wire.
    ///
    /// Fails with [`PumpError::Send`](crate::PumpError) once the connection
    /// is closed; the pump classifies that as an implicit disconnect.
    /// Concurrent sends from multiple tasks are the caller's responsibility
    /// to serialize — the pump funnels all sends through one loop.
    async fn send(&mut self, outbound: Outbound) -> Result<()>;
}

/// One duplex transport session.
///
/// A connection is owned exclusively by the pump that drives it. After the
/// transport-level handshake, [`split`](Connection::split) hands out the two
/// single-writer halves so the receive and send loops can run concurrently
/// without sharing state.
#[async_trait]
pub trait Connection: Send + 'static {
    type Rx: FrameReceiver;
    type Tx: FrameSender;

    /// Complete the transport-level handshake.
    ///
    /// Calling `accept` on an already-open connection fails with
    /// [`PumpError::Handshake`](crate::PumpError).
    async fn accept(&mut self) -> Result<()>;

    /// Cheap, non-blocking open-state check.
    fn is_open(&self) -> bool;

    /// Split into receive and send halves.
    fn split(self) -> (Self::Rx, Self::Tx);
}
