//! Error types for the duplex pump.
//!
//! All errors implement the `std::error::Error` trait and carry structured
//! context. The taxonomy mirrors the pump's failure semantics:
//!
//! - **Transport errors**: the receive side of a connection faulted in a way
//!   that is not a clean close
//! - **Handshake errors**: `accept` was called on a connection that is
//!   already open, or the transport-level handshake failed
//! - **Send errors**: the wire rejected an outbound message — classified as
//!   an implicit disconnect, not a pump failure
//! - **Predictor errors**: the processing step failed; recoverable at
//!   connection granularity
//! - **Encode errors**: an outbound payload could not be serialized
//!
//! A clean disconnect is deliberately *not* an error: the receive side
//! reports it as the [`Incoming::Closed`](crate::transport::Incoming) value,
//! which the coordinator inspects explicitly.
//!
//! ## Classification
//!
//! The coordinator folds every operation-level error into "benign close"
//! vs. "pump failure" using [`PumpError::is_disconnect`]:
//!
//! ```rust
//! use floodgate::PumpError;
//!
//! let error = PumpError::send_closed("peer went away");
//! assert!(error.is_disconnect());
//!
//! let error = PumpError::predictor_failed("model returned garbage");
//! assert!(!error.is_disconnect());
//! ```

use thiserror::Error;

/// Result type alias for pump operations.
pub type Result<T, E = PumpError> = std::result::Result<T, E>;

/// Main error type for duplex pump operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PumpError {
    #[error("Transport error: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Handshake failed: {reason}")]
    Handshake { reason: String },

    #[error("Send failed: {reason}")]
    Send { reason: String },

    #[error("Predictor error: {reason}")]
    Predictor {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to encode outbound payload")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
}

impl PumpError {
    /// Returns whether this error represents an implicit disconnect rather
    /// than a genuine pump failure.
    ///
    /// A failed `send` means the peer is gone (or going); the pump treats it
    /// exactly like a transport-level close: terminate cleanly, no failure
    /// logged. Everything else is a real failure for the owning connection.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, PumpError::Send { .. })
    }

    /// Helper constructor for transport errors.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        PumpError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        PumpError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for handshake errors.
    pub fn handshake_failed(reason: impl Into<String>) -> Self {
        PumpError::Handshake { reason: reason.into() }
    }

    /// Helper constructor for send failures.
    pub fn send_closed(reason: impl Into<String>) -> Self {
        PumpError::Send { reason: reason.into() }
    }

    /// Helper constructor for predictor failures.
    pub fn predictor_failed(reason: impl Into<String>) -> Self {
        PumpError::Predictor { reason: reason.into(), source: None }
    }

    /// Helper constructor for predictor failures with source.
    pub fn predictor_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        PumpError::Predictor { reason: reason.into(), source: Some(source) }
    }
}

impl From<serde_json::Error> for PumpError {
    fn from(err: serde_json::Error) -> Self {
        PumpError::Encode { source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(test)]
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_contain_their_context(
            reason in ".*",
          ) {
            let transport = PumpError::transport_failed(reason.clone());
            let handshake = PumpError::handshake_failed(reason.clone());
            let send = PumpError::send_closed(reason.clone());
            let predictor = PumpError::predictor_failed(reason.clone());

            prop_assert!(transport.to_string().contains(&reason));
            prop_assert!(handshake.to_string().contains(&reason));
            prop_assert!(send.to_string().contains(&reason));
            prop_assert!(predictor.to_string().contains(&reason));

            prop_assert!(!transport.to_string().is_empty());
            prop_assert!(!handshake.to_string().is_empty());
            prop_assert!(!send.to_string().is_empty());
            prop_assert!(!predictor.to_string().is_empty());
          }

          #[test]
          fn only_send_failures_classify_as_disconnect(
            reason in ".*",
          ) {
            prop_assert!(PumpError::send_closed(reason.clone()).is_disconnect());
            prop_assert!(!PumpError::transport_failed(reason.clone()).is_disconnect());
            prop_assert!(!PumpError::handshake_failed(reason.clone()).is_disconnect());
            prop_assert!(!PumpError::predictor_failed(reason).is_disconnect());
          }

          #[test]
          fn source_chaining_preserves_the_underlying_message(
            base_message in ".*",
            reason in ".*",
          ) {
            let io_err: Box<dyn std::error::Error + Send + Sync> =
              Box::new(std::io::Error::other(base_message.clone()));
            let wrapped = PumpError::transport_failed_with_source(reason, io_err);

            let source = std::error::Error::source(&wrapped)
              .expect("wrapped error should expose its source");
            prop_assert_eq!(source.to_string(), base_message);
          }
        }
    }

    #[test]
    fn error_constructors_validation() {
        let transport = PumpError::transport_failed("socket reset");
        assert!(matches!(transport, PumpError::Transport { .. }));

        let handshake = PumpError::handshake_failed("already open");
        assert!(matches!(handshake, PumpError::Handshake { .. }));

        let predictor = PumpError::predictor_failed("model not loaded");
        assert!(matches!(predictor, PumpError::Predictor { .. }));
    }

    #[test]
    fn error_traits_validation() {
        // Compile-time check: PumpError must be Send + Sync + 'static
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<PumpError>();

        let error = PumpError::transport_failed("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn json_errors_convert_to_encode() {
        struct Unserializable;
        impl serde::Serialize for Unserializable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("nope"))
            }
        }

        let err = serde_json::to_string(&Unserializable).unwrap_err();
        let pump_err: PumpError = err.into();
        assert!(matches!(pump_err, PumpError::Encode { .. }));
        assert!(!pump_err.is_disconnect());
    }
}
