//! Runtime configuration and connection endpoints.
//!
//! [`ClientConfig`] is plain data handed to the client at construction. It is
//! usually built from [`TetherSettings`] at the host's composition root.

use std::time::Duration;

use tether_core::{BackoffPolicy, SessionId};
use tether_settings::TetherSettings;

/// History collaborator configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryConfig {
    /// HTTP base URL (`{base}/sessions/{id}/history`).
    pub base_url: String,
    /// Entries requested per page.
    pub page_size: u32,
    /// Upper bound on pages fetched per bootstrap.
    pub max_pages: u32,
}

/// Client runtime configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// Reconnect backoff.
    pub backoff: BackoffPolicy,
    /// Handshake timeout.
    pub connect_timeout: Duration,
    /// Silence after which the connection counts as lost.
    pub heartbeat_timeout: Option<Duration>,
    /// Protocol version announced on the handshake.
    pub protocol_version: String,
    /// Default local timeout for permission requests.
    pub permission_timeout: Duration,
    /// Default local timeout for questions.
    pub question_timeout: Duration,
    /// Keep pending interactions alive across a reconnect.
    pub survive_reconnect: bool,
    /// Broadcast buffer per subscriber.
    pub emitter_capacity: usize,
    /// Resolved interactions remembered for duplicate detection.
    pub resolved_history: usize,
    /// History bootstrap. Disabled when `None`.
    pub history: Option<HistoryConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_settings(&TetherSettings::default())
    }
}

impl ClientConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &TetherSettings) -> Self {
        let reconnect = &settings.reconnect;
        let heartbeat_ms = settings.connection.heartbeat_timeout_ms;
        Self {
            backoff: BackoffPolicy {
                max_retries: reconnect.max_retries,
                base_delay_ms: reconnect.base_delay_ms,
                max_delay_ms: reconnect.max_delay_ms,
                jitter_factor: reconnect.jitter_factor,
            },
            connect_timeout: Duration::from_millis(settings.connection.connect_timeout_ms),
            heartbeat_timeout: (heartbeat_ms > 0).then(|| Duration::from_millis(heartbeat_ms)),
            protocol_version: settings.connection.protocol_version.clone(),
            permission_timeout: Duration::from_millis(settings.interactions.permission_timeout_ms),
            question_timeout: Duration::from_millis(settings.interactions.question_timeout_ms),
            survive_reconnect: settings.interactions.survive_reconnect,
            emitter_capacity: settings.queue.emitter_capacity.max(1),
            resolved_history: settings.queue.resolved_history,
            history: settings.history.base_url.as_ref().map(|base_url| HistoryConfig {
                base_url: base_url.clone(),
                page_size: settings.history.page_size,
                max_pages: settings.history.max_pages,
            }),
        }
    }
}

/// Where and how to connect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// WebSocket URL.
    pub url: String,
    /// Bearer token for the handshake.
    pub auth_token: Option<String>,
    /// Session to resume on first attach.
    pub resume_session: Option<SessionId>,
}

impl Endpoint {
    /// Endpoint with no credentials.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            resume_session: None,
        }
    }

    /// Attach a bearer token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Resume an existing session on first attach.
    #[must_use]
    pub fn resume_session(mut self, session_id: impl Into<SessionId>) -> Self {
        self.resume_session = Some(session_id.into());
        self
    }

    /// Endpoint from the `connection` settings section, if one is configured.
    pub fn from_settings(settings: &TetherSettings) -> Option<Self> {
        let url = settings.connection.endpoint.clone()?;
        Some(Self {
            url,
            auth_token: settings.connection.auth_token.clone(),
            resume_session: None,
        })
    }
}
