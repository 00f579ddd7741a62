//! Per-connection lifecycle management.
//!
//! The session manager owns what is shared across connections — the
//! predictor, the default pump configuration, a root cancellation token —
//! and spawns one fully isolated pump per accepted connection. A pump
//! failure on one connection never touches another; shutting the manager
//! down cancels every active pump through child tokens.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::predictor::Predictor;
use crate::pump::race::{EventSource, FrameHandler};
use crate::pump::{DuplexPump, PumpConfig, PumpHandle};
use crate::transport::Connection;
use crate::types::Outbound;

/// Per-connection context supplied at accept time.
///
/// Carries whatever identity the surrounding infrastructure resolved for
/// this session (the pump itself never interprets it beyond the greeting).
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub username: Option<String>,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn named(username: impl Into<String>) -> Self {
        Self { username: Some(username.into()) }
    }

    /// Greeting sent right after the handshake, if the session is named.
    fn greeting(&self) -> Option<Outbound> {
        self.username.as_ref().map(|name| Outbound::Text(format!("Hello, {name}!")))
    }
}

/// Spawns and supervises one pump per connection.
pub struct SessionManager<P> {
    predictor: P,
    config: PumpConfig,
    cancel: CancellationToken,
    sessions_started: AtomicU64,
}

impl<P> SessionManager<P>
where
    P: Predictor + Clone,
{
    /// Create a manager around a shared predictor.
    ///
    /// The predictor is constructed once at process startup and injected
    /// here; pass an `Arc` so every pump shares the same instance.
    pub fn new(predictor: P, config: PumpConfig) -> Self {
        Self {
            predictor,
            config,
            cancel: CancellationToken::new(),
            sessions_started: AtomicU64::new(0),
        }
    }

    /// Serve one connection with a queue-mediated (processing) pump.
    ///
    /// Accepts, sends the context's greeting, then pumps until disconnect,
    /// failure or manager shutdown. Returns immediately with the handle.
    pub fn serve<C>(&self, conn: C, ctx: SessionContext) -> PumpHandle
    where
        C: Connection,
    {
        let session = self.sessions_started.fetch_add(1, Ordering::Relaxed);
        debug!(session, username = ?ctx.username, "Starting detection session");

        let mut config = self.config.clone();
        config.greeting = ctx.greeting();

        DuplexPump::spawn_with_cancel(
            conn,
            self.predictor.clone(),
            config,
            self.cancel.child_token(),
        )
    }

    /// Serve one connection with a direct-race pump.
    ///
    /// The caller supplies the two race participants; the manager only
    /// contributes lifecycle (greeting, child cancellation, accounting).
    pub fn serve_race<C, S, H>(
        &self,
        conn: C,
        source: S,
        handler: H,
        ctx: SessionContext,
    ) -> PumpHandle
    where
        C: Connection,
        S: EventSource,
        H: FrameHandler,
    {
        let session = self.sessions_started.fetch_add(1, Ordering::Relaxed);
        debug!(session, username = ?ctx.username, "Starting race session");

        let mut config = self.config.clone();
        config.greeting = ctx.greeting();

        DuplexPump::spawn_race_with_cancel(
            conn,
            source,
            handler,
            config,
            self.cancel.child_token(),
        )
    }

    /// Cancel every active pump.
    ///
    /// Cooperative: each pump observes its child token at the next
    /// suspension point and unwinds, releasing its connection.
    pub fn shutdown(&self) {
        info!(
            sessions_started = self.sessions_started.load(Ordering::Relaxed),
            "Shutting down session manager"
        );
        self.cancel.cancel();
    }

    /// Total sessions accepted since startup.
    pub fn sessions_started(&self) -> u64 {
        self.sessions_started.load(Ordering::Relaxed)
    }
}

impl<P> SessionManager<Arc<P>>
where
    P: Predictor + ?Sized,
{
    /// Convenience constructor taking an already-shared predictor.
    pub fn shared(predictor: Arc<P>, config: PumpConfig) -> Self {
        Self::new(predictor, config)
    }
}
