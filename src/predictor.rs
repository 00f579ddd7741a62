//! Predictor boundary.
//!
//! The processing stage is an external collaborator with a narrow contract:
//! one frame in, one structured result out, possibly slowly, possibly
//! failing. The pump does not care what the model is.
//!
//! A predictor is constructed once at process startup and injected into
//! every pump as a shared handle — never a lazily-initialized global. It
//! must tolerate concurrent calls from many connections' pumps without
//! corrupting state across them.

use async_trait::async_trait;

use crate::Result;
use crate::types::{Detections, Frame};

/// Processing stage consumed by the pump.
///
/// `predict` is the pump's view of the model: a suspending call that yields
/// a structured result or a
/// [`PumpError::Predictor`](crate::PumpError). A failure terminates the
/// owning connection's pump only; it never crashes the process or touches
/// sibling connections.
///
/// CPU-bound implementations should offload the actual inference (e.g. via
/// `tokio::task::spawn_blocking`) so one connection's slow frame does not
/// stall other connections' pumps.
#[async_trait]
pub trait Predictor: Send + Sync + 'static {
    /// Run the model on one frame.
    async fn predict(&self, frame: Frame) -> Result<Detections>;
}

#[async_trait]
impl<P: Predictor + ?Sized> Predictor for std::sync::Arc<P> {
    async fn predict(&self, frame: Frame) -> Result<Detections> {
        (**self).predict(frame).await
    }
}
