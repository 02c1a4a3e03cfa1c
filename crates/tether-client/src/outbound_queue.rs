//! Outbound Queue: host submissions waiting for backend acknowledgement.
//!
//! Items stay queued until the backend acknowledges (`queue.input_queued`)
//! or rejects (`error`) their idempotency token. A transport loss only moves
//! in-flight items back to pending, so the next drain resends them with the
//! same token.

use std::collections::VecDeque;

use serde::Serialize;
use tether_core::{CorrelationId, IdempotencyToken, SessionId};
use tether_protocol::outbound::InteractionResponse;
use tether_protocol::{InteractionOutcome, OutboundFrame, OutgoingMessage};
use tokio::time::Instant;

/// Delivery state of a queued item.
///
/// Only `Pending` and `InFlight` items live in the queue. `Delivered` marks
/// the item [`OutboundQueue::acknowledge`] hands back as it leaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Not yet written on the current connection.
    Pending,
    /// Written, awaiting acknowledgement.
    InFlight,
    /// Acknowledged by the backend.
    Delivered,
}

/// What a queued item carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundPayload {
    /// A user message.
    Message(OutgoingMessage),
    /// An answer to a permission/question request.
    Response {
        /// Request being answered.
        request_id: CorrelationId,
        /// The answer.
        outcome: InteractionOutcome,
        /// Epoch the request was registered under.
        epoch: u64,
    },
}

/// One queued item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedMessage {
    /// Idempotency token.
    pub token: IdempotencyToken,
    /// Payload.
    pub payload: OutboundPayload,
    /// Enqueue time.
    pub enqueued_at: Instant,
    /// Delivery state.
    pub state: DeliveryState,
}

impl QueuedMessage {
    /// Wire frame for this item.
    pub fn to_frame(&self, session_id: Option<&SessionId>) -> OutboundFrame {
        match &self.payload {
            OutboundPayload::Message(message) => OutboundFrame::SendMessage {
                idempotency_key: self.token.clone(),
                session_id: session_id.cloned(),
                data: message.clone(),
            },
            OutboundPayload::Response {
                request_id,
                outcome,
                ..
            } => OutboundFrame::RespondInteraction {
                idempotency_key: self.token.clone(),
                data: InteractionResponse {
                    request_id: request_id.clone(),
                    outcome: outcome.clone(),
                },
            },
        }
    }
}

/// Host-visible summary of a queued item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedSummary {
    /// Idempotency token.
    pub token: IdempotencyToken,
    /// `message` or `response`.
    pub kind: &'static str,
    /// Delivery state.
    pub state: DeliveryState,
}

/// FIFO of outbound items.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    items: VecDeque<QueuedMessage>,
}

impl OutboundQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item. Never fails.
    pub fn enqueue(&mut self, token: IdempotencyToken, payload: OutboundPayload) {
        self.items.push_back(QueuedMessage {
            token,
            payload,
            enqueued_at: Instant::now(),
            state: DeliveryState::Pending,
        });
    }

    /// Mark every pending item in-flight and return them in enqueue order.
    pub fn drain(&mut self) -> Vec<QueuedMessage> {
        self.items
            .iter_mut()
            .filter(|item| item.state == DeliveryState::Pending)
            .map(|item| {
                item.state = DeliveryState::InFlight;
                item.clone()
            })
            .collect()
    }

    /// The backend accepted `token`. Removes the item and returns it as
    /// delivered.
    pub fn acknowledge(&mut self, token: &IdempotencyToken) -> Option<QueuedMessage> {
        let mut item = self.remove(token)?;
        item.state = DeliveryState::Delivered;
        Some(item)
    }

    /// The backend rejected `token`. Removes and returns the item.
    pub fn reject(&mut self, token: &IdempotencyToken) -> Option<QueuedMessage> {
        self.remove(token)
    }

    /// Transport lost: everything in flight goes back to pending.
    pub fn revert_in_flight(&mut self) -> usize {
        let mut reverted = 0;
        for item in &mut self.items {
            if item.state == DeliveryState::InFlight {
                item.state = DeliveryState::Pending;
                reverted += 1;
            }
        }
        reverted
    }

    /// Drop interaction responses registered before `epoch`.
    pub fn drop_responses_before(&mut self, epoch: u64) -> Vec<QueuedMessage> {
        let (dropped, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|item| {
                matches!(item.payload, OutboundPayload::Response { epoch: e, .. } if e < epoch)
            });
        self.items = kept.into();
        dropped
    }

    /// Summaries in enqueue order.
    pub fn summary(&self) -> Vec<QueuedSummary> {
        self.items
            .iter()
            .map(|item| QueuedSummary {
                token: item.token.clone(),
                kind: match item.payload {
                    OutboundPayload::Message(_) => "message",
                    OutboundPayload::Response { .. } => "response",
                },
                state: item.state,
            })
            .collect()
    }

    fn remove(&mut self, token: &IdempotencyToken) -> Option<QueuedMessage> {
        let index = self.items.iter().position(|item| &item.token == token)?;
        self.items.remove(index)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> IdempotencyToken {
        IdempotencyToken::from(s)
    }

    fn message(text: &str) -> OutboundPayload {
        OutboundPayload::Message(OutgoingMessage::text(text))
    }

    fn response(id: &str, epoch: u64) -> OutboundPayload {
        OutboundPayload::Response {
            request_id: CorrelationId::from(id),
            outcome: InteractionOutcome::Approved,
            epoch,
        }
    }

    fn tokens(items: &[QueuedMessage]) -> Vec<&str> {
        items.iter().map(|i| i.token.as_str()).collect()
    }

    #[tokio::test]
    async fn drain_is_fifo_and_only_once() {
        let mut q = OutboundQueue::new();
        q.enqueue(token("a"), message("1"));
        q.enqueue(token("b"), message("2"));
        q.enqueue(token("c"), message("3"));

        assert_eq!(tokens(&q.drain()), ["a", "b", "c"]);
        assert!(q.drain().is_empty());
        assert_eq!(q.summary().len(), 3);
    }

    #[tokio::test]
    async fn ack_removes_only_that_item() {
        let mut q = OutboundQueue::new();
        q.enqueue(token("a"), message("1"));
        q.enqueue(token("b"), message("2"));
        let _ = q.drain();

        let delivered = q.acknowledge(&token("a")).unwrap();
        assert_eq!(delivered.state, DeliveryState::Delivered);
        assert!(q.acknowledge(&token("a")).is_none());
        assert_eq!(tokens(&Vec::from(q.items.clone())), ["b"]);
    }

    #[tokio::test]
    async fn transport_loss_resends_unacked_in_order() {
        let mut q = OutboundQueue::new();
        q.enqueue(token("a"), message("1"));
        q.enqueue(token("b"), message("2"));
        let _ = q.drain();
        let _ = q.acknowledge(&token("a"));
        q.enqueue(token("c"), message("3"));

        assert_eq!(q.revert_in_flight(), 1);
        assert_eq!(tokens(&q.drain()), ["b", "c"]);
    }

    #[tokio::test]
    async fn sent_but_unacked_is_still_queued() {
        let mut q = OutboundQueue::new();
        q.enqueue(token("a"), message("1"));
        let _ = q.drain();
        assert_eq!(q.summary()[0].state, DeliveryState::InFlight);
    }

    #[tokio::test]
    async fn reject_removes() {
        let mut q = OutboundQueue::new();
        q.enqueue(token("a"), message("1"));
        let rejected = q.reject(&token("a")).unwrap();
        assert_eq!(rejected.payload, message("1"));
        assert!(q.summary().is_empty());
    }

    #[tokio::test]
    async fn stale_responses_are_dropped() {
        let mut q = OutboundQueue::new();
        q.enqueue(token("m"), message("hi"));
        q.enqueue(token("r1"), response("req-1", 1));
        q.enqueue(token("r2"), response("req-2", 2));

        let dropped = q.drop_responses_before(2);
        assert_eq!(tokens(&dropped), ["r1"]);
        let kinds: Vec<_> = q.summary().into_iter().map(|s| s.kind).collect();
        assert_eq!(kinds, ["message", "response"]);
        assert_eq!(tokens(&q.drain()), ["m", "r2"]);
    }

    #[tokio::test]
    async fn frames_carry_token_and_session() {
        let mut q = OutboundQueue::new();
        q.enqueue(token("a"), message("1"));
        q.enqueue(token("r"), response("req-1", 1));
        let items = q.drain();
        let session = SessionId::from("S1");

        let first = items[0].to_frame(Some(&session));
        assert_eq!(first.frame_type(), "message.send");
        assert_eq!(first.idempotency_key(), Some(&token("a")));

        let second = items[1].to_frame(Some(&session));
        assert_eq!(second.frame_type(), "interaction.respond");
        assert_eq!(second.idempotency_key(), Some(&token("r")));
    }
}
