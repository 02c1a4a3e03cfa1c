//! Wire decoder: raw inbound frames → [`InboundFrame`].
//!
//! Single dispatch on the `type` discriminator. Each payload decodes on its
//! own, so a bad payload only ever downgrades its own frame:
//!
//! - mistyped optional field → that field is `None`
//! - missing/mistyped critical field → [`StreamEvent::Unknown`]
//! - unrecognized `type` → [`StreamEvent::Unknown`]
//! - not JSON, not an object, or no string `type` → [`DecodeError`]
//!
//! None of these outcomes are connection-terminating; the runtime logs
//! `DecodeError`s and drops the frame.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tether_core::SessionId;
use thiserror::Error;
use tracing::warn;

use crate::events::StreamEvent;

/// A structurally invalid frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Frame text is not JSON.
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// Frame is JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,
    /// Frame has no string `type` discriminator.
    #[error("frame has no string `type` field")]
    MissingType,
}

/// A decoded inbound frame: the event plus its envelope metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundFrame {
    /// The decoded event.
    pub event: StreamEvent,
    /// Session the frame belongs to.
    pub session_id: Option<SessionId>,
    /// Monotonic history cursor of this frame, when the backend assigned one.
    pub cursor: Option<u64>,
    /// Backend timestamp.
    pub timestamp: Option<String>,
}

/// Decode one text frame.
pub fn decode(frame: &str) -> Result<InboundFrame, DecodeError> {
    let value: Value = serde_json::from_str(frame)?;
    decode_value(value)
}

/// Decode one already-parsed frame.
pub fn decode_value(value: Value) -> Result<InboundFrame, DecodeError> {
    let Value::Object(mut envelope) = value else {
        return Err(DecodeError::NotAnObject);
    };
    let Some(Value::String(event_type)) = envelope.remove("type") else {
        return Err(DecodeError::MissingType);
    };

    let session_id = envelope
        .get("sessionId")
        .and_then(Value::as_str)
        .map(SessionId::from);
    let cursor = envelope.get("cursor").and_then(Value::as_u64);
    let timestamp = envelope
        .get("timestamp")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let mut data = match envelope.remove("data") {
        Some(Value::Object(map)) => map,
        None | Some(Value::Null) => Map::new(),
        Some(other) => {
            warn!(event_type = %event_type, "frame data is not an object");
            return Ok(InboundFrame {
                event: StreamEvent::Unknown {
                    event_type,
                    payload: other,
                },
                session_id,
                cursor,
                timestamp,
            });
        }
    };

    // session.connected may carry its id on the envelope only
    if event_type == "session.connected" && !data.contains_key("sessionId") {
        if let Some(id) = &session_id {
            let _ = data.insert("sessionId".into(), Value::String(id.to_string()));
        }
    }

    let event = decode_event(event_type, Value::Object(data));
    Ok(InboundFrame {
        event,
        session_id,
        cursor,
        timestamp,
    })
}

/// Dispatch a discriminator and payload to a [`StreamEvent`].
pub fn decode_event(event_type: String, data: Value) -> StreamEvent {
    let decoded = match event_type.as_str() {
        "content.text" => payload(&data).map(StreamEvent::Text),
        "content.thinking" => payload(&data).map(StreamEvent::Thinking),
        "content.tool_start" => payload(&data).map(StreamEvent::ToolStart),
        "content.tool_result" => payload(&data).map(StreamEvent::ToolResult),
        "content.system" => payload(&data).map(StreamEvent::System),
        "content.user" => payload(&data).map(StreamEvent::User),
        "content.progress" => payload(&data).map(StreamEvent::Progress),
        "content.usage" => payload(&data).map(StreamEvent::Usage),
        "agent.state_changed" => payload(&data).map(StreamEvent::AgentStateChanged),
        "agent.stopped" => payload(&data).map(StreamEvent::AgentStopped),
        "agent.model_changed" => payload(&data).map(StreamEvent::ModelChanged),
        "agent.permission_mode_changed" => payload(&data).map(StreamEvent::PermissionModeChanged),
        "session.connected" => payload(&data).map(StreamEvent::SessionConnected),
        "session.event" => payload(&data).map(StreamEvent::SessionEvent),
        "session.history" => payload(&data).map(StreamEvent::History),
        "interactive.permission_request" => payload(&data).map(StreamEvent::PermissionRequest),
        "interactive.question_request" => payload(&data).map(StreamEvent::QuestionRequest),
        "interactive.expired" => payload(&data).map(StreamEvent::InteractionExpired),
        "subagent.start" => payload(&data).map(StreamEvent::SubagentStart),
        "subagent.complete" => payload(&data).map(StreamEvent::SubagentComplete),
        "queue.input_queued" => payload(&data).map(StreamEvent::InputQueued),
        "queue.cleared" => payload(&data).map(StreamEvent::QueueCleared),
        "connection.replaced" => payload(&data).map(StreamEvent::Replaced),
        "connection.reconnecting" => payload(&data).map(StreamEvent::Reconnecting),
        "connection.reconnect_complete" => payload(&data).map(StreamEvent::ReconnectComplete),
        "connection.error" => payload(&data).map(StreamEvent::ConnectionError),
        "connection.network_status_changed" => {
            payload(&data).map(StreamEvent::NetworkStatusChanged)
        }
        "cursor.evicted" => payload(&data).map(StreamEvent::CursorEvicted),
        "cursor.invalid" => payload(&data).map(StreamEvent::CursorInvalid),
        "error" => payload(&data).map(StreamEvent::Error),
        _ => None,
    };

    decoded.unwrap_or_else(|| StreamEvent::Unknown {
        event_type,
        payload: data,
    })
}

fn payload<T: DeserializeOwned>(data: &Value) -> Option<T> {
    match T::deserialize(data) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, "payload missing critical field, decoding as unknown");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
