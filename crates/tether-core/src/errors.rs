//! Error taxonomy for the tether client.
//!
//! Every failure the runtime observes is classified into one of four
//! [`ErrorCategory`] values, and the category alone decides what happens next:
//!
//! - **transport**: unreachable backend, handshake failure, dropped socket.
//!   Retried automatically with capped exponential backoff.
//! - **protocol**: malformed or unrecognized frame. Logged and dropped.
//! - **application**: the backend reported a failure (tool error, rejected
//!   message). Surfaced to the host as an event.
//! - **fatal**: authentication rejected or protocol version mismatch. The
//!   connection moves to `failed` and never retries on its own.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Categories
// ─────────────────────────────────────────────────────────────────────────────

/// Error category for classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Network connectivity or handshake failure.
    Transport,
    /// Frame could not be understood.
    Protocol,
    /// Failure reported by the backend's own logic.
    Application,
    /// Unrecoverable without host action.
    Fatal,
}

impl ErrorCategory {
    /// Whether the runtime retries errors of this category on its own.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transport)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Protocol => write!(f, "protocol"),
            Self::Application => write!(f, "application"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Why a connection failed fatally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalKind {
    /// Credentials were rejected.
    AuthRejected,
    /// Client and backend speak incompatible protocol versions.
    VersionMismatch,
    /// The endpoint itself is unusable (bad URL, bad header value).
    InvalidEndpoint,
    /// Reconnect attempts were exhausted.
    RetriesExhausted,
}

impl FatalKind {
    /// Classify a backend error code. Returns `None` for non-fatal codes.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "AUTH_REJECTED" | "UNAUTHORIZED" | "AUTHENTICATION_FAILED" => Some(Self::AuthRejected),
            "PROTOCOL_VERSION_MISMATCH" | "VERSION_MISMATCH" | "UNSUPPORTED_PROTOCOL" => {
                Some(Self::VersionMismatch)
            }
            _ => None,
        }
    }

    /// Stable machine-readable code for this kind.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::AuthRejected => "AUTH_REJECTED",
            Self::VersionMismatch => "PROTOCOL_VERSION_MISMATCH",
            Self::InvalidEndpoint => "INVALID_ENDPOINT",
            Self::RetriesExhausted => "RETRIES_EXHAUSTED",
        }
    }
}

impl fmt::Display for FatalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TetherError
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level error type for the tether client.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TetherError {
    /// The transport failed; the runtime will retry.
    #[error("transport error: {0}")]
    Transport(String),

    /// The connection cannot continue without host action.
    #[error("fatal error ({kind}): {message}")]
    Fatal {
        /// What kind of fatal failure.
        kind: FatalKind,
        /// Human-readable detail.
        message: String,
    },

    /// A frame could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The client runtime has shut down and no longer accepts commands.
    #[error("client runtime is closed")]
    Closed,
}

impl TetherError {
    /// Build a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Build a fatal error.
    #[must_use]
    pub fn fatal(kind: FatalKind, message: impl Into<String>) -> Self {
        Self::Fatal {
            kind,
            message: message.into(),
        }
    }

    /// Error category for classification.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) => ErrorCategory::Transport,
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::Fatal { .. } | Self::Closed => ErrorCategory::Fatal,
        }
    }

    /// Whether the runtime retries this error on its own.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::Fatal { kind, .. } => kind.code(),
            Self::Closed => "CLIENT_CLOSED",
        }
    }
}

/// Result alias used across tether crates.
pub type Result<T> = std::result::Result<T, TetherError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn only_transport_is_retryable() {
        assert!(ErrorCategory::Transport.is_retryable());
        assert!(!ErrorCategory::Protocol.is_retryable());
        assert!(!ErrorCategory::Application.is_retryable());
        assert!(!ErrorCategory::Fatal.is_retryable());
    }

    #[test]
    fn category_display() {
        assert_eq!(ErrorCategory::Transport.to_string(), "transport");
        assert_eq!(ErrorCategory::Application.to_string(), "application");
    }

    #[test]
    fn category_serde_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::Fatal).unwrap();
        assert_eq!(json, "\"fatal\"");
    }

    #[test]
    fn fatal_kind_from_auth_codes() {
        assert_eq!(FatalKind::from_code("AUTH_REJECTED"), Some(FatalKind::AuthRejected));
        assert_eq!(FatalKind::from_code("UNAUTHORIZED"), Some(FatalKind::AuthRejected));
    }

    #[test]
    fn fatal_kind_from_version_codes() {
        assert_eq!(
            FatalKind::from_code("PROTOCOL_VERSION_MISMATCH"),
            Some(FatalKind::VersionMismatch)
        );
    }

    #[test]
    fn non_fatal_code_is_none() {
        assert_eq!(FatalKind::from_code("TOOL_FAILED"), None);
        assert_eq!(FatalKind::from_code(""), None);
    }

    #[test]
    fn transport_error_is_retryable() {
        let err = TetherError::transport("connection refused");
        assert!(err.is_retryable());
        assert_eq!(err.code(), "TRANSPORT_ERROR");
        assert_eq!(err.to_string(), "transport error: connection refused");
    }

    #[test]
    fn fatal_error_is_not_retryable() {
        let err = TetherError::fatal(FatalKind::AuthRejected, "bad token");
        assert!(!err.is_retryable());
        assert_eq!(err.category(), ErrorCategory::Fatal);
        assert_eq!(err.code(), "AUTH_REJECTED");
        assert_matches!(err, TetherError::Fatal { kind: FatalKind::AuthRejected, .. });
    }

    #[test]
    fn closed_is_fatal() {
        assert_eq!(TetherError::Closed.category(), ErrorCategory::Fatal);
    }
}
