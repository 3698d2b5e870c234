//! Error types for thermwatch.
//!
//! All errors in thermwatch are strongly typed using thiserror.
//! Expected runtime conditions such as a failed subsystem read or a
//! rejected listener registration are ordinary `Err` values; nothing in
//! the monitor panics for them.

use thiserror::Error;

use crate::listener::ListenerId;
use crate::subsystem::SubsystemId;

/// Validation errors raised while admitting readings or building a monitor.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Temperature reading {value} is not strictly positive")]
    NonPositiveTemperature {
        value: f32,
    },

    #[error("Temperature reading {value} is not finite")]
    NonFiniteTemperature {
        value: f32,
    },

    #[error("Subsystem id {id} appears more than once")]
    DuplicateSubsystemId {
        id: SubsystemId,
    },
}

/// Listener registration failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Listener is already registered under token {id}")]
    AlreadyRegistered {
        id: ListenerId,
    },

    #[error("No listener is registered under token {id}")]
    NotRegistered {
        id: ListenerId,
    },
}

/// Transport errors surfaced by subsystem clients and connectors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("No address is configured for subsystem {id}")]
    NoAddress {
        id: SubsystemId,
    },

    #[error("Connection failed: {message}")]
    ConnectionFailed {
        message: String,
    },

    #[error("Temperature read failed: {message}")]
    ReadFailed {
        message: String,
    },
}

/// Errors on the pull side of a max-temperature stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Max-temperature stream disconnected")]
    Disconnected,

    #[error("No max-temperature event within {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

/// Top-level error type for thermwatch.
///
/// This enum encompasses all possible errors that can occur
/// when using the monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Monitor is already initialized")]
    AlreadyInitialized,

    #[error("Monitor is not initialized")]
    NotInitialized,
}

impl MonitorError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a registry error.
    #[must_use]
    pub const fn is_registry(&self) -> bool {
        matches!(self, Self::Registry(_))
    }

    /// Returns true if this is a transport error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if this is a stream error.
    #[must_use]
    pub const fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Returns true if this is a lifecycle error (wrong initialize order).
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(self, Self::AlreadyInitialized | Self::NotInitialized)
    }

    /// Returns true if retrying the failed call can succeed without any
    /// state change on the caller's side.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            // Invalid inputs and misused tokens won't change on retry.
            Self::Validation(_) | Self::Registry(_) => false,
            Self::Transport(e) => matches!(
                e,
                TransportError::ConnectionFailed { .. } | TransportError::ReadFailed { .. }
            ),
            Self::Stream(e) => matches!(e, StreamError::Timeout { .. }),
            Self::AlreadyInitialized | Self::NotInitialized => false,
        }
    }
}

/// Result type alias for thermwatch operations.
pub type MonitorResult<T> = Result<T, MonitorError>;
