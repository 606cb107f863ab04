//! Error types shared across the pool-sense workspace.
//!
//! Two families of failure exist in the core:
//!
//! - **`TransportError`**: the sensor port could not complete an operation
//!   (bus NACK, timeout, corrupt PROM). These are recovered locally by the
//!   reading producer, which skips the tick and eventually degrades to
//!   simulated data.
//! - **`PoolError`**: everything a caller of the session or the application
//!   layer can see, most importantly `InvalidTransition` when a leak-test
//!   command is issued from a state that does not allow it.
//!
//! "Not enough data yet" is deliberately not an error. The leak analyzer
//! reports it as `None`.

use crate::session::SessionState;
use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Category of a sensor transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The bus rejected or failed a transfer.
    Bus,
    /// The operation did not complete within the configured bound.
    Timeout,
    /// PROM contents failed validation (CRC mismatch, blank or floating bus).
    Calibration,
    /// No sensor is attached or the port was never opened.
    Unavailable,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransportErrorKind::Bus => "bus",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Calibration => "calibration",
            TransportErrorKind::Unavailable => "unavailable",
        };
        write!(f, "{}", label)
    }
}

/// Failure reported by a [`SensorPort`](crate::capabilities::SensorPort).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Sensor {kind} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bus(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Bus, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn calibration(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Calibration, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unavailable, message)
    }
}

// =============================================================================
// Pool Errors
// =============================================================================

/// Convenience alias for results using the core error type.
pub type PoolResult<T> = std::result::Result<T, PoolError>;

/// Primary error type for leak-test operations.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A state-machine command was issued from a state that does not accept it.
    ///
    /// Surfaced to the caller as-is; the session is left untouched.
    #[error("Cannot {operation} while the session is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: SessionState,
    },

    /// Sensor transport failure that escaped local recovery.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PoolError {
    /// Whether this error represents a rejected state-machine command.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, PoolError::InvalidTransition { .. })
    }
}
