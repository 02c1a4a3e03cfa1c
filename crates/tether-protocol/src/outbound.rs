//! Outbound frames the client writes to the backend.

use serde::{Deserialize, Serialize};
use tether_core::{CorrelationId, IdempotencyToken, SessionId};

/// A file or image attached to a user message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// File name.
    pub name: String,
    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Base64 content.
    pub data: String,
}

/// A user message waiting to be delivered.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Prompt text.
    pub text: String,
    /// Attachments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl OutgoingMessage {
    /// A text-only message.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }
}

/// How the host answered a permission or question request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InteractionOutcome {
    /// Permission granted.
    Approved,
    /// Permission refused.
    Denied,
    /// Question answered.
    Answered {
        /// Answer text.
        answer: String,
    },
}

/// Body of an `interaction.respond` frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionResponse {
    /// Request being answered.
    pub request_id: CorrelationId,
    /// The answer.
    #[serde(flatten)]
    pub outcome: InteractionOutcome,
}

/// Body of a `session.reattach` frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ReattachData {
    /// Last cursor the client applied. `None` asks for a full snapshot.
    pub cursor: Option<u64>,
}

/// Body of a `session.attach` frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachData {
    /// Existing session to resume; a new session is created when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// A frame written to the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    /// Deliver a user message.
    #[serde(rename = "message.send", rename_all = "camelCase")]
    SendMessage {
        /// Token identifying this logical send across resends.
        idempotency_key: IdempotencyToken,
        /// Target session.
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        /// Message body.
        data: OutgoingMessage,
    },
    /// Answer a permission or question request.
    #[serde(rename = "interaction.respond", rename_all = "camelCase")]
    RespondInteraction {
        /// Token identifying this logical send across resends.
        idempotency_key: IdempotencyToken,
        /// Response body.
        data: InteractionResponse,
    },
    /// Resume a known session from a cursor.
    #[serde(rename = "session.reattach", rename_all = "camelCase")]
    Reattach {
        /// Session to resume.
        session_id: SessionId,
        /// Resume position.
        data: ReattachData,
    },
    /// Attach to a new or existing session on first connect.
    #[serde(rename = "session.attach")]
    Attach {
        /// Attach body.
        data: AttachData,
    },
}

impl OutboundFrame {
    /// Wire discriminator.
    #[must_use]
    pub fn frame_type(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "message.send",
            Self::RespondInteraction { .. } => "interaction.respond",
            Self::Reattach { .. } => "session.reattach",
            Self::Attach { .. } => "session.attach",
        }
    }

    /// Idempotency token, for frames that carry one.
    #[must_use]
    pub fn idempotency_key(&self) -> Option<&IdempotencyToken> {
        match self {
            Self::SendMessage {
                idempotency_key, ..
            }
            | Self::RespondInteraction {
                idempotency_key, ..
            } => Some(idempotency_key),
            Self::Reattach { .. } | Self::Attach { .. } => None,
        }
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn encoded(frame: &OutboundFrame) -> Value {
        serde_json::from_str(&frame.encode().unwrap()).unwrap()
    }

    #[test]
    fn send_message_shape() {
        let frame = OutboundFrame::SendMessage {
            idempotency_key: IdempotencyToken::from("tok-1"),
            session_id: Some(SessionId::from("S1")),
            data: OutgoingMessage::text("hello"),
        };
        assert_eq!(
            encoded(&frame),
            json!({
                "type": "message.send",
                "idempotencyKey": "tok-1",
                "sessionId": "S1",
                "data": {"text": "hello"}
            })
        );
        assert_eq!(frame.idempotency_key().map(IdempotencyToken::as_str), Some("tok-1"));
    }

    #[test]
    fn send_message_with_attachment() {
        let frame = OutboundFrame::SendMessage {
            idempotency_key: IdempotencyToken::from("tok-2"),
            session_id: None,
            data: OutgoingMessage {
                text: "look".into(),
                attachments: vec![Attachment {
                    name: "a.png".into(),
                    mime_type: Some("image/png".into()),
                    data: "AAAA".into(),
                }],
            },
        };
        let v = encoded(&frame);
        assert!(v.get("sessionId").is_none());
        assert_eq!(v["data"]["attachments"][0]["mimeType"], "image/png");
    }

    #[test]
    fn respond_flattens_outcome() {
        let frame = OutboundFrame::RespondInteraction {
            idempotency_key: IdempotencyToken::from("tok-3"),
            data: InteractionResponse {
                request_id: CorrelationId::from("q1"),
                outcome: InteractionOutcome::Answered {
                    answer: "B".into(),
                },
            },
        };
        assert_eq!(
            encoded(&frame),
            json!({
                "type": "interaction.respond",
                "idempotencyKey": "tok-3",
                "data": {"requestId": "q1", "outcome": "answered", "answer": "B"}
            })
        );
    }

    #[test]
    fn respond_approved_has_no_answer() {
        let frame = OutboundFrame::RespondInteraction {
            idempotency_key: IdempotencyToken::from("tok-4"),
            data: InteractionResponse {
                request_id: CorrelationId::from("p1"),
                outcome: InteractionOutcome::Approved,
            },
        };
        assert_eq!(
            encoded(&frame)["data"],
            json!({"requestId": "p1", "outcome": "approved"})
        );
    }

    #[test]
    fn reattach_carries_cursor() {
        let frame = OutboundFrame::Reattach {
            session_id: SessionId::from("S1"),
            data: ReattachData { cursor: Some(42) },
        };
        assert_eq!(
            encoded(&frame),
            json!({"type": "session.reattach", "sessionId": "S1", "data": {"cursor": 42}})
        );
        assert!(frame.idempotency_key().is_none());
    }

    #[test]
    fn attach_without_session() {
        let frame = OutboundFrame::Attach {
            data: AttachData::default(),
        };
        assert_eq!(encoded(&frame), json!({"type": "session.attach", "data": {}}));
        assert_eq!(frame.frame_type(), "session.attach");
    }
}
