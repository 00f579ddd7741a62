//! Frame and outbound message types.

use std::sync::Arc;

use serde::Serialize;

use crate::Result;

/// Payload of one inbound frame.
///
/// Payloads are reference-counted so a frame can be cloned into a queue or a
/// stats sample without copying the underlying bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Raw binary data (e.g. an encoded image)
    Binary(Arc<[u8]>),
    /// Decoded text data
    Text(Arc<str>),
}

impl Payload {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Payload::Binary(bytes) => bytes.len(),
            Payload::Text(text) => text.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One inbound unit of data from a duplex connection.
///
/// Frames are created on receipt from the transport and consumed exactly once
/// by the pipeline. They are never mutated; `seq` records arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Opaque payload, passed through unchanged to the processing stage
    pub payload: Payload,

    /// Monotonic arrival counter, assigned by the receive side
    pub seq: u64,
}

impl Frame {
    /// Create a binary frame.
    pub fn binary(data: impl Into<Arc<[u8]>>, seq: u64) -> Self {
        Self { payload: Payload::Binary(data.into()), seq }
    }

    /// Create a text frame.
    pub fn text(data: impl Into<Arc<str>>, seq: u64) -> Self {
        Self { payload: Payload::Text(data.into()), seq }
    }
}

/// One outbound unit of data produced by processing a frame (or by a server
/// side event in direct-race mode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Binary wire message
    Binary(Vec<u8>),
    /// Text wire message
    Text(String),
}

impl Outbound {
    /// Serialize a value as a JSON text message.
    ///
    /// This is the wire form used for structured results such as
    /// [`Detections`](crate::types::Detections).
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Outbound::Text(serde_json::to_string(value)?))
    }

    /// Message length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Outbound::Binary(bytes) => bytes.len(),
            Outbound::Text(text) => text.len(),
        }
    }

    /// Whether the message is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&Frame> for Outbound {
    /// Echo conversion: the frame's payload, unchanged, as a wire message.
    fn from(frame: &Frame) -> Self {
        match &frame.payload {
            Payload::Binary(bytes) => Outbound::Binary(bytes.to_vec()),
            Payload::Text(text) => Outbound::Text(text.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_preserve_payload_and_order() {
        let frame = Frame::binary(vec![1u8, 2, 3], 7);
        assert_eq!(frame.seq, 7);
        assert_eq!(frame.payload.len(), 3);

        let frame = Frame::text("hello", 8);
        assert_eq!(frame.seq, 8);
        assert!(!frame.payload.is_empty());
    }

    #[test]
    fn echo_conversion_round_trips_text() {
        let frame = Frame::text("hello", 0);
        let out: Outbound = (&frame).into();
        assert_eq!(out, Outbound::Text("hello".to_string()));
    }

    #[test]
    fn json_outbound_is_text() {
        #[derive(serde::Serialize)]
        struct Msg {
            value: u32,
        }

        let out = Outbound::json(&Msg { value: 42 }).unwrap();
        match out {
            Outbound::Text(text) => assert!(text.contains("42")),
            Outbound::Binary(_) => panic!("JSON messages must be text"),
        }
    }
}
