//! Application error type.
//!
//! `AppError` collects the failures the service layer can hit: configuration,
//! session transitions, result storage and the HTTP listener.
//! Library crates keep their own errors (`PoolError`, `TransportError`) and
//! convert with `?`; the binary wraps everything in `anyhow` at the top level.

use pool_core::error::PoolError;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Failed to write result to {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP server error: {0}")]
    Server(String),
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<hyper::Error> for AppError {
    fn from(e: hyper::Error) -> Self {
        AppError::Server(e.to_string())
    }
}

impl AppError {
    /// Whether the caller asked for a transition the session cannot make.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, AppError::Pool(e) if e.is_invalid_transition())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_core::session::SessionState;

    #[test]
    fn invalid_transition_is_detected_through_wrapper() {
        let err: AppError = PoolError::InvalidTransition {
            operation: "start a test",
            state: SessionState::Testing,
        }
        .into();
        assert!(err.is_invalid_transition());
        assert_eq!(err.to_string(), "Cannot start a test while the session is testing");
    }

    #[test]
    fn storage_error_names_path() {
        let err = AppError::Storage {
            path: PathBuf::from("/data/test_1.json"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("/data/test_1.json"));
        assert!(!err.is_invalid_transition());
    }

    #[test]
    fn encode_failure_is_serialization_error() {
        let err: AppError = serde_json::from_str::<u8>("not json").unwrap_err().into();
        assert!(matches!(err, AppError::Serialization(_)));
        assert!(err.to_string().starts_with("Serialization error"));
    }
}
