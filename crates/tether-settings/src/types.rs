//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so partial
//! JSON is fine: missing fields get their default value.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the tether client.
///
/// ```json
/// {
///   "connection": { "endpoint": "wss://agent.example/ws" },
///   "reconnect": { "maxRetries": 5 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TetherSettings {
    /// Transport settings.
    pub connection: ConnectionSettings,
    /// Reconnect backoff.
    pub reconnect: ReconnectSettings,
    /// Permission/question handling.
    pub interactions: InteractionSettings,
    /// Event fan-out and bookkeeping sizes.
    pub queue: QueueSettings,
    /// History collaborator used for re-bootstrap.
    pub history: HistorySettings,
}

impl TetherSettings {
    /// Reject combinations the runtime cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(SettingsError::InvalidValue(format!(
                "reconnect.maxDelayMs ({}) is below reconnect.baseDelayMs ({})",
                self.reconnect.max_delay_ms, self.reconnect.base_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.reconnect.jitter_factor) {
            return Err(SettingsError::InvalidValue(format!(
                "reconnect.jitterFactor ({}) must be within 0.0..=1.0",
                self.reconnect.jitter_factor
            )));
        }
        if self.queue.emitter_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "queue.emitterCapacity must be at least 1".into(),
            ));
        }
        if self.history.page_size == 0 {
            return Err(SettingsError::InvalidValue(
                "history.pageSize must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// WebSocket URL of the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Bearer token sent on the handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Protocol version announced on the handshake.
    pub protocol_version: String,
    /// Handshake timeout.
    pub connect_timeout_ms: u64,
    /// Silence after which the connection counts as lost. 0 disables.
    pub heartbeat_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            auth_token: None,
            protocol_version: "1".to_string(),
            connect_timeout_ms: 10_000,
            heartbeat_timeout_ms: 90_000,
        }
    }
}

/// Reconnect backoff settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectSettings {
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
    /// Delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter factor (0.0–1.0).
    pub jitter_factor: f64,
    /// Attempts before the connection moves to `failed`.
    pub max_retries: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_factor: 0.2,
            max_retries: 8,
        }
    }
}

/// Permission/question handling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InteractionSettings {
    /// Local timeout for permission requests.
    pub permission_timeout_ms: u64,
    /// Local timeout for questions.
    pub question_timeout_ms: u64,
    /// Keep pending interactions alive across a reconnect.
    pub survive_reconnect: bool,
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            permission_timeout_ms: 300_000,
            question_timeout_ms: 600_000,
            survive_reconnect: false,
        }
    }
}

/// Event fan-out and bookkeeping sizes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueSettings {
    /// Broadcast buffer per subscriber.
    pub emitter_capacity: usize,
    /// Resolved interactions remembered for duplicate detection.
    pub resolved_history: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            emitter_capacity: 1024,
            resolved_history: 256,
        }
    }
}

/// History collaborator settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistorySettings {
    /// HTTP base URL. History bootstrap is disabled when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Entries per page.
    pub page_size: u32,
    /// Page limit per bootstrap.
    pub max_pages: u32,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            base_url: None,
            page_size: 200,
            max_pages: 20,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
