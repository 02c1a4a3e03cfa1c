//! Connection lifecycle state machine.
//!
//! ```text
//! disconnected ──connect──▶ connecting ──handshake ok──▶ connected
//!                               │                            │
//!                               └──────transport loss────────┤
//!                                                            ▼
//!          failed ◀──retries exhausted / fatal── reconnecting ──ok──▶ connected
//! ```
//!
//! [`Connection`] only decides; the runtime performs the I/O and timers.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_core::{BackoffPolicy, FatalKind, TetherError};

/// Connection lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport and nothing scheduled.
    #[default]
    Disconnected,
    /// First handshake in progress.
    Connecting,
    /// Transport up, session attached.
    Connected,
    /// Transport lost, retry scheduled or in progress.
    Reconnecting,
    /// Terminal until the host calls `connect` again.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Read-only view of the connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Current state.
    pub state: ConnectionState,
    /// Number of successful (re)connects so far.
    pub epoch: u64,
    /// Reconnect attempts since the last successful connect.
    pub retry_count: u32,
    /// Most recent failure.
    pub last_error: Option<TetherError>,
}

/// What a transport loss leads to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LossAction {
    /// Retry after `delay`. `attempt` is one-based.
    Retry {
        /// One-based attempt number.
        attempt: u32,
        /// Backoff before the attempt.
        delay: Duration,
    },
    /// Retries exhausted; the connection is now `failed`.
    GiveUp,
}

/// Result of a successful handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Established {
    /// New epoch.
    pub epoch: u64,
    /// Whether this ended a `reconnecting` phase after an earlier connection.
    pub reconnected: bool,
}

/// The connection state machine.
#[derive(Debug, Default)]
pub struct Connection {
    status: ConnectionStatus,
}

impl Connection {
    /// Fresh, disconnected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.status.state
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.status.epoch
    }

    /// Snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.status.clone()
    }

    /// Host asked to connect. Returns `false` if already connected or on the way.
    pub fn begin(&mut self) -> bool {
        match self.status.state {
            ConnectionState::Disconnected | ConnectionState::Failed => {
                self.status.state = ConnectionState::Connecting;
                self.status.retry_count = 0;
                self.status.last_error = None;
                true
            }
            ConnectionState::Connecting
            | ConnectionState::Connected
            | ConnectionState::Reconnecting => false,
        }
    }

    /// Handshake succeeded.
    pub fn established(&mut self) -> Established {
        let reconnected =
            self.status.state == ConnectionState::Reconnecting && self.status.epoch > 0;
        self.status.epoch += 1;
        self.status.state = ConnectionState::Connected;
        self.status.retry_count = 0;
        Established {
            epoch: self.status.epoch,
            reconnected,
        }
    }

    /// Transport failed or dropped.
    pub fn lost(&mut self, error: TetherError, policy: &BackoffPolicy) -> LossAction {
        if !policy.allows(self.status.retry_count) {
            self.status.state = ConnectionState::Failed;
            self.status.last_error = Some(TetherError::fatal(
                FatalKind::RetriesExhausted,
                format!("gave up after {} attempts: {error}", self.status.retry_count),
            ));
            return LossAction::GiveUp;
        }
        let delay = policy.delay(self.status.retry_count);
        self.status.retry_count += 1;
        self.status.state = ConnectionState::Reconnecting;
        self.status.last_error = Some(error);
        LossAction::Retry {
            attempt: self.status.retry_count,
            delay,
        }
    }

    /// Unrecoverable failure.
    pub fn fail(&mut self, error: TetherError) {
        self.status.state = ConnectionState::Failed;
        self.status.last_error = Some(error);
    }

    /// Host-initiated disconnect.
    pub fn reset(&mut self) {
        self.status.state = ConnectionState::Disconnected;
        self.status.retry_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn policy(max_retries: u32) -> BackoffPolicy {
        BackoffPolicy {
            max_retries,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn begin_is_idempotent() {
        let mut conn = Connection::new();
        assert!(conn.begin());
        assert!(!conn.begin());
        assert_eq!(conn.state(), ConnectionState::Connecting);
        let _ = conn.established();
        assert!(!conn.begin());
    }

    #[test]
    fn first_connect_is_not_a_reconnect() {
        let mut conn = Connection::new();
        let _ = conn.begin();
        let est = conn.established();
        assert_eq!(est, Established { epoch: 1, reconnected: false });
    }

    #[test]
    fn loss_schedules_increasing_retries() {
        let mut conn = Connection::new();
        let _ = conn.begin();
        let _ = conn.established();
        let p = policy(5);
        let first = conn.lost(TetherError::transport("reset"), &p);
        let second = conn.lost(TetherError::transport("refused"), &p);
        assert_eq!(
            first,
            LossAction::Retry { attempt: 1, delay: Duration::from_millis(100) }
        );
        assert_eq!(
            second,
            LossAction::Retry { attempt: 2, delay: Duration::from_millis(200) }
        );
        assert_eq!(conn.state(), ConnectionState::Reconnecting);
        assert_eq!(conn.status().retry_count, 2);
    }

    #[test]
    fn retried_first_connect_is_not_a_reconnect() {
        let mut conn = Connection::new();
        let _ = conn.begin();
        let _ = conn.lost(TetherError::transport("refused"), &policy(3));
        assert_eq!(conn.state(), ConnectionState::Reconnecting);
        let est = conn.established();
        assert_eq!(est, Established { epoch: 1, reconnected: false });
    }

    #[test]
    fn reconnect_bumps_epoch_and_resets_retries() {
        let mut conn = Connection::new();
        let _ = conn.begin();
        let _ = conn.established();
        let _ = conn.lost(TetherError::transport("x"), &policy(3));
        let est = conn.established();
        assert_eq!(est, Established { epoch: 2, reconnected: true });
        assert_eq!(conn.status().retry_count, 0);
    }

    #[test]
    fn exhausted_retries_fail() {
        let mut conn = Connection::new();
        let _ = conn.begin();
        let p = policy(1);
        assert_matches!(conn.lost(TetherError::transport("a"), &p), LossAction::Retry { .. });
        assert_eq!(conn.lost(TetherError::transport("b"), &p), LossAction::GiveUp);
        assert_eq!(conn.state(), ConnectionState::Failed);
        assert_matches!(
            conn.status().last_error,
            Some(TetherError::Fatal { kind: FatalKind::RetriesExhausted, .. })
        );
    }

    #[test]
    fn failed_allows_explicit_retry() {
        let mut conn = Connection::new();
        let _ = conn.begin();
        conn.fail(TetherError::fatal(FatalKind::AuthRejected, "no"));
        assert!(conn.begin());
        assert!(conn.status().last_error.is_none());
    }

    #[test]
    fn reset_keeps_epoch() {
        let mut conn = Connection::new();
        let _ = conn.begin();
        let _ = conn.established();
        conn.reset();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.epoch(), 1);
    }

    #[test]
    fn state_display() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
