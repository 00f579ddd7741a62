//! Core data types flowing through the pump.

mod detection;
mod frame;

pub use detection::{DetectedObject, Detections};
pub use frame::{Frame, Outbound, Payload};
