//! Bounded, lossy duplex stream pump for real-time message connections.
//!
//! Floodgate drives one pair of concurrent operations per live connection:
//! an inbound drain and an outbound drain, coordinated so neither direction
//! can starve the other and both are torn down together on the first
//! disconnect or failure.
//!
//! # Features
//!
//! - **Bounded backpressure**: a fixed-capacity, lossy buffer between the
//!   directions — overload drops frames, it never blocks the producer
//! - **Cooperative cancellation**: every operation observes its token at the
//!   next suspension point; no task outlives its connection
//! - **Two modes**: queue-mediated (receive → buffer → predict → send) and
//!   direct-race (next client frame vs. next server event)
//! - **Isolation**: one pump per connection; a failure on one never touches
//!   another
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use floodgate::{Connection, DuplexPump, Predictor, PumpConfig};
//!
//! async fn serve<C: Connection, P: Predictor>(conn: C, predictor: Arc<P>) {
//!     let handle = DuplexPump::spawn(conn, predictor, PumpConfig::default());
//!     let termination = handle.join().await;
//!     println!("session ended: {termination}");
//! }
//! ```

// Core types and error handling
mod error;
pub mod types;

// Streaming pipeline
pub mod channel;
pub mod predictor;
pub mod pump;
pub mod session;
pub mod sources;
pub mod transport;

#[cfg(test)]
mod test_utils;

// Core exports
pub use error::{PumpError, Result};
pub use types::{DetectedObject, Detections, Frame, Outbound, Payload};

// Pipeline exports
pub use channel::{BoundedChannel, OverflowPolicy, PushOutcome};
pub use predictor::Predictor;
pub use pump::race::{EventSource, FrameHandler};
pub use pump::{
    DuplexPump, PumpConfig, PumpHandle, PumpState, PumpStats, StatsSnapshot, Termination,
};
pub use session::{SessionContext, SessionManager};
pub use sources::{BroadcastSource, Broadcaster, EchoHandler, PublishHandler, TickerSource};
pub use transport::{Connection, FrameReceiver, FrameSender, Incoming};
