//! Centralized error types for the co-listen core library.
//!
//! Only the operations that start a session (`create_session`,
//! `join_session`) return these to callers. Everything else is reflected
//! through the coordinator's observable state and the log.

use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

/// Errors raised by a [`SessionStore`](crate::store::SessionStore) implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached (transport fault, offline).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the operation (permission rules, quota).
    #[error("Store rejected the operation: {0}")]
    Rejected(String),

    /// A value could not be converted to or from the store representation.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The path is empty or malformed.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "store_unavailable",
            Self::Rejected(_) => "store_rejected",
            Self::Serialization(_) => "store_serialization",
            Self::InvalidPath(_) => "store_invalid_path",
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenient Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced synchronously by the session coordinator.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum CoListenError {
    /// No session document exists for the given code.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The user-entered code is empty or malformed.
    #[error("Invalid session code: {0:?}")]
    InvalidCode(String),

    /// A store operation failed.
    #[error("{0}")]
    Store(String),

    /// The session document could not be encoded.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Configuration values are unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ErrorCode for CoListenError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "session_not_found",
            Self::InvalidCode(_) => "invalid_session_code",
            Self::Store(_) => "store_error",
            Self::Serialization(_) => "serialization_error",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

impl From<StoreError> for CoListenError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<serde_json::Error> for CoListenError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenient Result alias for coordinator operations.
pub type CoListenResult<T> = Result<T, CoListenError>;
