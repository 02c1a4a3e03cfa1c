//! Stream event types.
//!
//! [`StreamEvent`] is the closed set of events the client publishes to its
//! host. Every inbound frame decodes to exactly one variant, with
//! [`StreamEvent::Unknown`] reserved for discriminators this client does not
//! recognize. Connection-category events are mostly synthesized by the client
//! runtime itself, but they decode from the wire as well.
//!
//! Payload structs use camelCase on the wire. Critical fields are plain
//! (missing → the frame becomes `Unknown`); everything else is lenient.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_core::{CorrelationId, ErrorCategory, IdempotencyToken, SessionId};

use crate::lenient;

// ─────────────────────────────────────────────────────────────────────────────
// Shared value types
// ─────────────────────────────────────────────────────────────────────────────

/// Cumulative token usage for a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Input tokens.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub input_tokens: u64,
    /// Output tokens.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub output_tokens: u64,
    /// Tokens read from prompt cache.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub cache_read_tokens: u64,
    /// Tokens written to prompt cache.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub cache_creation_tokens: u64,
}

/// Active model as reported by the backend.
///
/// `alias` is the backend-echoed display name. The client never derives one
/// from `id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ModelInfoWire")]
pub struct ModelInfo {
    /// Raw model identifier.
    pub id: String,
    /// Server-supplied display alias.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ModelInfo {
    /// Alias when the backend sent one, otherwise the raw identifier.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.id)
    }
}

/// Accepts either `"model-id"` or `{"id": ..., "alias": ...}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ModelInfoWire {
    Bare(String),
    Full {
        id: String,
        #[serde(default, deserialize_with = "lenient::optional")]
        alias: Option<String>,
    },
}

impl From<ModelInfoWire> for ModelInfo {
    fn from(wire: ModelInfoWire) -> Self {
        match wire {
            ModelInfoWire::Bare(id) => Self { id, alias: None },
            ModelInfoWire::Full { id, alias } => Self { id, alias },
        }
    }
}

macro_rules! open_string_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
            /// A value this client does not know about, kept verbatim.
            Other(String),
        }

        impl $name {
            /// Wire representation.
            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $wire,)+
                    Self::Other(s) => s,
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                let known = match s.as_str() {
                    $($wire => Some(Self::$variant),)+
                    _ => None,
                };
                known.unwrap_or_else(|| Self::Other(s))
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> Self {
                v.as_str().to_owned()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

open_string_enum! {
    /// How tool invocations are gated by the backend.
    PermissionMode {
        /// Ask before every gated tool.
        Default => "default",
        /// Auto-approve file edits.
        AcceptEdits => "acceptEdits",
        /// Read-only planning.
        Plan => "plan",
        /// Never ask.
        BypassPermissions => "bypassPermissions",
    }
}

open_string_enum! {
    /// Coarse agent activity state.
    AgentState {
        /// Waiting for input.
        Idle => "idle",
        /// Generating a response.
        Thinking => "thinking",
        /// Executing tools.
        Running => "running",
        /// Blocked on a permission or question.
        WaitingForInput => "waiting_for_input",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Content payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Incremental assistant text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDelta {
    /// Text fragment.
    pub delta: String,
    /// Message this fragment belongs to.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub message_id: Option<String>,
}

/// Incremental thinking text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThinkingDelta {
    /// Thinking fragment.
    pub delta: String,
}

/// A tool invocation started.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStart {
    /// Tool call ID.
    pub tool_call_id: String,
    /// Tool name.
    pub tool_name: String,
    /// Tool arguments.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// A tool invocation finished.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Tool call ID.
    pub tool_call_id: String,
    /// Tool name.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub tool_name: Option<String>,
    /// Result text.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub output: Option<String>,
    /// Whether the tool failed. A failure is an application event, not an error.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub is_error: bool,
    /// Execution time.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub duration_ms: Option<u64>,
}

/// A system notice for the transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemNotice {
    /// Notice text.
    pub message: String,
    /// Severity hint (`info`, `warning`, ...).
    #[serde(default, deserialize_with = "lenient::optional")]
    pub level: Option<String>,
}

/// Echo of a user message as recorded by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEcho {
    /// Message text.
    pub text: String,
    /// Token of the outbound item this echoes.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub idempotency_key: Option<IdempotencyToken>,
}

/// Progress for a long-running step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Progress text.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub message: Option<String>,
    /// Completion percentage.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub percent: Option<f64>,
    /// Tool call this progress belongs to.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub tool_call_id: Option<String>,
}

/// Cumulative usage counters. Absent counters are left unchanged by the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageUpdate {
    /// Input tokens.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub input_tokens: Option<u64>,
    /// Output tokens.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub output_tokens: Option<u64>,
    /// Cache-read tokens.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub cache_read_tokens: Option<u64>,
    /// Cache-creation tokens.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub cache_creation_tokens: Option<u64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Agent activity state changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentStateChanged {
    /// New state.
    pub state: AgentState,
}

/// Agent run stopped.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStopped {
    /// Stop reason.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub reason: Option<String>,
    /// Error text when the run ended in failure.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub error: Option<String>,
}

/// Active model changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelChanged {
    /// New model.
    pub model: ModelInfo,
}

/// Permission mode changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PermissionModeChanged {
    /// New mode.
    pub mode: PermissionMode,
}

// ─────────────────────────────────────────────────────────────────────────────
// Session payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Full session state, sent on attach and when a replay gap is too large.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConnected {
    /// Session identifier.
    pub session_id: SessionId,
    /// Active model.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub model: Option<ModelInfo>,
    /// Permission mode.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub permission_mode: Option<PermissionMode>,
    /// Cumulative usage.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub usage: Option<TokenUsage>,
    /// History cursor at the time of the snapshot.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub cursor: Option<u64>,
}

/// A named session-level notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionNotice {
    /// Notification name.
    pub name: String,
    /// Arbitrary payload.
    #[serde(default)]
    pub data: Option<Value>,
}

/// One page of session history.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    /// Raw history entries, oldest first.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub events: Vec<Value>,
    /// Cursor of the last entry in this page.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub cursor: Option<u64>,
    /// Whether more pages follow.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub has_more: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Interactive payloads
// ─────────────────────────────────────────────────────────────────────────────

/// The agent asks permission to run a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    /// Correlation id for the response.
    pub request_id: CorrelationId,
    /// Tool awaiting approval.
    pub tool_name: String,
    /// Human-readable description.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub description: Option<String>,
    /// Tool input.
    #[serde(default)]
    pub input: Option<Value>,
    /// Backend-suggested timeout.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub timeout_ms: Option<u64>,
}

/// A selectable answer for a question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    /// Option label.
    pub label: String,
    /// Longer explanation.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub description: Option<String>,
}

/// The agent asks the user a question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequest {
    /// Correlation id for the response.
    pub request_id: CorrelationId,
    /// Question text.
    pub question: String,
    /// Offered answers.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub options: Vec<QuestionOption>,
    /// Whether several options may be chosen.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub multi_select: bool,
    /// Backend-suggested timeout.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub timeout_ms: Option<u64>,
}

/// Why a prompt closed without an answer from the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    /// Its local timeout elapsed.
    TimedOut,
    /// The connection it belonged to is gone.
    Invalidated,
}

/// A permission or question prompt can no longer be answered.
///
/// Synthesized by the client; the backend never sends it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionExpired {
    /// Request that expired.
    pub request_id: CorrelationId,
    /// Why.
    pub reason: ExpiryReason,
}

// ─────────────────────────────────────────────────────────────────────────────
// Subagent, queue, connection, cursor payloads
// ─────────────────────────────────────────────────────────────────────────────

/// A subagent was spawned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentStart {
    /// Subagent id.
    pub subagent_id: String,
    /// Task description.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub task: Option<String>,
    /// Model the subagent runs on.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub model: Option<String>,
}

/// A subagent finished.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentComplete {
    /// Subagent id.
    pub subagent_id: String,
    /// Result summary.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub summary: Option<String>,
    /// Whether it succeeded.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub success: Option<bool>,
}

/// The backend accepted an outbound item into its input queue.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputQueued {
    /// Token of the accepted item.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub idempotency_key: Option<IdempotencyToken>,
    /// Position in the backend queue.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub position: Option<u32>,
}

/// The backend dropped its pending input queue.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueCleared {
    /// How many items were dropped.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub count: Option<u32>,
}

/// The backend replaced the session bound to this connection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReplaced {
    /// Replacement session, if the backend created one.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub new_session_id: Option<SessionId>,
    /// Why.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub reason: Option<String>,
}

/// A reconnect attempt has been scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconnecting {
    /// One-based attempt number.
    pub attempt: u32,
    /// Delay before the attempt.
    pub delay_ms: u64,
}

/// A reconnect finished and the session is reattached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectComplete {
    /// Epoch of the new connection.
    pub epoch: u64,
    /// Reattached session.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub session_id: Option<SessionId>,
    /// `true` for incremental replay, `false` for a full re-bootstrap.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub replayed: bool,
}

/// A connection-level failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionError {
    /// Machine-readable code.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub code: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Whether the connection moved to `failed`.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub fatal: bool,
}

/// Network reachability changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    /// Whether the network is reachable.
    pub reachable: bool,
}

/// The requested replay cursor is older than the backend retains.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorEvicted {
    /// Cursor the client asked for.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub cursor: Option<u64>,
    /// Oldest cursor still available.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub oldest_available: Option<u64>,
}

/// The requested replay cursor is unknown to the backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CursorInvalid {
    /// Cursor the client asked for.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub cursor: Option<u64>,
    /// Why.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub reason: Option<String>,
}

/// A backend-reported or client-classified error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    /// Machine-readable code.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub code: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Error category.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub category: Option<ErrorCategory>,
    /// Outbound item this error rejects.
    #[serde(default, deserialize_with = "lenient::optional")]
    pub idempotency_key: Option<IdempotencyToken>,
}

// ─────────────────────────────────────────────────────────────────────────────
// StreamEvent
// ─────────────────────────────────────────────────────────────────────────────

/// Event group, used for routing and logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Transcript content.
    Content,
    /// Agent lifecycle.
    Agent,
    /// Session bootstrap and history.
    Session,
    /// Requests needing a host response.
    Interactive,
    /// Subagent lifecycle.
    Subagent,
    /// Backend input queue.
    Queue,
    /// Connection lifecycle.
    Connection,
    /// Replay cursor problems.
    Cursor,
    /// Errors.
    Error,
    /// Unrecognized.
    Unknown,
}

/// The unified event published to the host.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum StreamEvent {
    /// Assistant text delta.
    #[serde(rename = "content.text")]
    Text(TextDelta),
    /// Thinking delta.
    #[serde(rename = "content.thinking")]
    Thinking(ThinkingDelta),
    /// Tool started.
    #[serde(rename = "content.tool_start")]
    ToolStart(ToolStart),
    /// Tool finished.
    #[serde(rename = "content.tool_result")]
    ToolResult(ToolResult),
    /// System notice.
    #[serde(rename = "content.system")]
    System(SystemNotice),
    /// User message echo.
    #[serde(rename = "content.user")]
    User(UserEcho),
    /// Progress.
    #[serde(rename = "content.progress")]
    Progress(Progress),
    /// Usage counters.
    #[serde(rename = "content.usage")]
    Usage(UsageUpdate),
    /// Agent state.
    #[serde(rename = "agent.state_changed")]
    AgentStateChanged(AgentStateChanged),
    /// Agent stopped.
    #[serde(rename = "agent.stopped")]
    AgentStopped(AgentStopped),
    /// Model changed.
    #[serde(rename = "agent.model_changed")]
    ModelChanged(ModelChanged),
    /// Permission mode changed.
    #[serde(rename = "agent.permission_mode_changed")]
    PermissionModeChanged(PermissionModeChanged),
    /// Full session snapshot.
    #[serde(rename = "session.connected")]
    SessionConnected(SessionConnected),
    /// Named session notification.
    #[serde(rename = "session.event")]
    SessionEvent(SessionNotice),
    /// History page.
    #[serde(rename = "session.history")]
    History(HistoryPage),
    /// Permission prompt.
    #[serde(rename = "interactive.permission_request")]
    PermissionRequest(PermissionRequest),
    /// Question prompt.
    #[serde(rename = "interactive.question_request")]
    QuestionRequest(QuestionRequest),
    /// Prompt closed unanswered.
    #[serde(rename = "interactive.expired")]
    InteractionExpired(InteractionExpired),
    /// Subagent spawned.
    #[serde(rename = "subagent.start")]
    SubagentStart(SubagentStart),
    /// Subagent finished.
    #[serde(rename = "subagent.complete")]
    SubagentComplete(SubagentComplete),
    /// Outbound item accepted.
    #[serde(rename = "queue.input_queued")]
    InputQueued(InputQueued),
    /// Backend queue cleared.
    #[serde(rename = "queue.cleared")]
    QueueCleared(QueueCleared),
    /// Session replaced.
    #[serde(rename = "connection.replaced")]
    Replaced(SessionReplaced),
    /// Reconnect scheduled.
    #[serde(rename = "connection.reconnecting")]
    Reconnecting(Reconnecting),
    /// Reconnect finished.
    #[serde(rename = "connection.reconnect_complete")]
    ReconnectComplete(ReconnectComplete),
    /// Connection failure.
    #[serde(rename = "connection.error")]
    ConnectionError(ConnectionError),
    /// Reachability changed.
    #[serde(rename = "connection.network_status_changed")]
    NetworkStatusChanged(NetworkStatus),
    /// Replay cursor too old.
    #[serde(rename = "cursor.evicted")]
    CursorEvicted(CursorEvicted),
    /// Replay cursor unknown.
    #[serde(rename = "cursor.invalid")]
    CursorInvalid(CursorInvalid),
    /// Error.
    #[serde(rename = "error")]
    Error(ErrorEvent),
    /// Unrecognized frame, kept verbatim.
    #[serde(rename = "unknown", rename_all = "camelCase")]
    Unknown {
        /// Raw discriminator.
        event_type: String,
        /// Raw `data` payload.
        payload: Value,
    },
}

impl StreamEvent {
    /// Wire discriminator for this event.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::Text(_) => "content.text",
            Self::Thinking(_) => "content.thinking",
            Self::ToolStart(_) => "content.tool_start",
            Self::ToolResult(_) => "content.tool_result",
            Self::System(_) => "content.system",
            Self::User(_) => "content.user",
            Self::Progress(_) => "content.progress",
            Self::Usage(_) => "content.usage",
            Self::AgentStateChanged(_) => "agent.state_changed",
            Self::AgentStopped(_) => "agent.stopped",
            Self::ModelChanged(_) => "agent.model_changed",
            Self::PermissionModeChanged(_) => "agent.permission_mode_changed",
            Self::SessionConnected(_) => "session.connected",
            Self::SessionEvent(_) => "session.event",
            Self::History(_) => "session.history",
            Self::PermissionRequest(_) => "interactive.permission_request",
            Self::QuestionRequest(_) => "interactive.question_request",
            Self::InteractionExpired(_) => "interactive.expired",
            Self::SubagentStart(_) => "subagent.start",
            Self::SubagentComplete(_) => "subagent.complete",
            Self::InputQueued(_) => "queue.input_queued",
            Self::QueueCleared(_) => "queue.cleared",
            Self::Replaced(_) => "connection.replaced",
            Self::Reconnecting(_) => "connection.reconnecting",
            Self::ReconnectComplete(_) => "connection.reconnect_complete",
            Self::ConnectionError(_) => "connection.error",
            Self::NetworkStatusChanged(_) => "connection.network_status_changed",
            Self::CursorEvicted(_) => "cursor.evicted",
            Self::CursorInvalid(_) => "cursor.invalid",
            Self::Error(_) => "error",
            Self::Unknown { event_type, .. } => event_type,
        }
    }

    /// Event group.
    #[must_use]
    pub fn category(&self) -> EventCategory {
        match self {
            Self::Text(_)
            | Self::Thinking(_)
            | Self::ToolStart(_)
            | Self::ToolResult(_)
            | Self::System(_)
            | Self::User(_)
            | Self::Progress(_)
            | Self::Usage(_) => EventCategory::Content,
            Self::AgentStateChanged(_)
            | Self::AgentStopped(_)
            | Self::ModelChanged(_)
            | Self::PermissionModeChanged(_) => EventCategory::Agent,
            Self::SessionConnected(_) | Self::SessionEvent(_) | Self::History(_) => {
                EventCategory::Session
            }
            Self::PermissionRequest(_) | Self::QuestionRequest(_) | Self::InteractionExpired(_) => {
                EventCategory::Interactive
            }
            Self::SubagentStart(_) | Self::SubagentComplete(_) => EventCategory::Subagent,
            Self::InputQueued(_) | Self::QueueCleared(_) => EventCategory::Queue,
            Self::Replaced(_)
            | Self::Reconnecting(_)
            | Self::ReconnectComplete(_)
            | Self::ConnectionError(_)
            | Self::NetworkStatusChanged(_) => EventCategory::Connection,
            Self::CursorEvicted(_) | Self::CursorInvalid(_) => EventCategory::Cursor,
            Self::Error(_) => EventCategory::Error,
            Self::Unknown { .. } => EventCategory::Unknown,
        }
    }

    /// Whether this event can (re)bootstrap a session.
    #[must_use]
    pub fn is_reattachment(&self) -> bool {
        matches!(self, Self::SessionConnected(_) | Self::History(_))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
