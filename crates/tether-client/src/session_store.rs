//! Session State Store: the authoritative view of the current session.
//!
//! The store applies decoded frames and hands out immutable
//! [`SessionSnapshot`]s. Guards:
//!
//! - usage counts never decrease; a lower count rejects the whole update
//! - frames at or below the last applied cursor are duplicates
//! - a stale session only accepts reattachment events
//! - model aliases come from the backend verbatim

use std::sync::Arc;

use serde::Serialize;
use tether_core::SessionId;
use tether_protocol::events::{SessionConnected, SessionReplaced};
use tether_protocol::{
    AgentState, InboundFrame, ModelInfo, PermissionMode, StreamEvent, TokenUsage, UsageUpdate,
};
use tracing::{debug, info, warn};

/// Session lifecycle phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No `session.connected` seen yet.
    #[default]
    Uninitialized,
    /// Live session.
    Active,
    /// The backend replaced the session and has not announced the new one.
    Replaced,
    /// The connection failed; values are last-known only.
    Stale,
}

/// Immutable view of the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Session identifier.
    pub id: SessionId,
    /// Active model, alias as echoed by the backend.
    pub model: Option<ModelInfo>,
    /// Permission mode.
    pub permission_mode: Option<PermissionMode>,
    /// Last reported agent state.
    pub agent_state: Option<AgentState>,
    /// Cumulative usage.
    pub usage: TokenUsage,
    /// Last applied history cursor.
    pub cursor: Option<u64>,
    /// Lifecycle phase.
    pub phase: SessionPhase,
}

impl SessionSnapshot {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            model: None,
            permission_mode: None,
            agent_state: None,
            usage: TokenUsage::default(),
            cursor: None,
            phase: SessionPhase::Active,
        }
    }
}

/// Why a frame was not applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// A usage count was lower than the stored one.
    UsageRegressed,
    /// The session is stale and the frame is not a reattachment.
    Stale,
    /// The frame names a different session.
    OtherSession,
}

/// Result of applying a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Session state changed.
    Updated,
    /// Nothing to change; the event still goes to the host.
    Unchanged,
    /// Already applied (cursor at or below the last one). Drop it.
    Duplicate,
    /// Refused by a guard. Drop it.
    Rejected(Rejection),
}

impl ApplyOutcome {
    /// Whether the event should be published.
    pub fn is_publishable(self) -> bool {
        matches!(self, Self::Updated | Self::Unchanged)
    }
}

/// The session store.
#[derive(Debug, Default)]
pub struct SessionStore {
    phase: SessionPhase,
    current: Option<Arc<SessionSnapshot>>,
}

impl SessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Current snapshot.
    pub fn current(&self) -> Option<Arc<SessionSnapshot>> {
        self.current.clone()
    }

    /// Current session id.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.current.as_deref().map(|s| &s.id)
    }

    /// Last applied cursor.
    pub fn cursor(&self) -> Option<u64> {
        self.current.as_deref().and_then(|s| s.cursor)
    }

    /// Apply one decoded frame.
    pub fn apply(&mut self, frame: &InboundFrame) -> ApplyOutcome {
        let reattachment = frame.event.is_reattachment();

        if self.phase == SessionPhase::Stale && !reattachment {
            return ApplyOutcome::Rejected(Rejection::Stale);
        }

        if !matches!(
            frame.event,
            StreamEvent::SessionConnected(_) | StreamEvent::Replaced(_)
        ) {
            if let (Some(theirs), Some(ours)) = (&frame.session_id, self.session_id()) {
                if theirs != ours {
                    debug!(frame_session = %theirs, session = %ours, "frame for another session");
                    return ApplyOutcome::Rejected(Rejection::OtherSession);
                }
            }
        }

        if !reattachment {
            if let (Some(cursor), Some(last)) = (frame.cursor, self.cursor()) {
                if cursor <= last {
                    return ApplyOutcome::Duplicate;
                }
            }
        }

        let outcome = self.apply_event(&frame.event, frame.cursor);
        if let Some(cursor) = frame.cursor {
            if self.advance_cursor(cursor) && outcome == ApplyOutcome::Unchanged {
                return ApplyOutcome::Updated;
            }
        }
        outcome
    }

    /// Apply an event that carries no envelope (e.g. a fetched history page).
    pub fn apply_event(&mut self, event: &StreamEvent, cursor: Option<u64>) -> ApplyOutcome {
        match event {
            StreamEvent::SessionConnected(connected) => self.connected(connected, cursor),
            StreamEvent::History(page) => {
                let Some(session) = self.current.as_mut() else {
                    return ApplyOutcome::Unchanged;
                };
                let s = Arc::make_mut(session);
                s.phase = SessionPhase::Active;
                self.phase = SessionPhase::Active;
                if let Some(c) = page.cursor {
                    let _ = self.advance_cursor(c);
                }
                ApplyOutcome::Updated
            }
            StreamEvent::Usage(update) => self.usage(update),
            StreamEvent::ModelChanged(changed) => {
                self.update(|s| replace(&mut s.model, Some(changed.model.clone())))
            }
            StreamEvent::PermissionModeChanged(changed) => {
                self.update(|s| replace(&mut s.permission_mode, Some(changed.mode.clone())))
            }
            StreamEvent::AgentStateChanged(changed) => {
                self.update(|s| replace(&mut s.agent_state, Some(changed.state.clone())))
            }
            StreamEvent::Replaced(replaced) => self.replaced(replaced),
            _ => ApplyOutcome::Unchanged,
        }
    }

    /// The connection failed: keep values, stop accepting live events.
    pub fn mark_stale(&mut self) {
        if let Some(session) = self.current.as_mut() {
            Arc::make_mut(session).phase = SessionPhase::Stale;
            self.phase = SessionPhase::Stale;
        }
    }

    /// A reattach was sent on a new connection: accept its replay again.
    pub fn reattaching(&mut self) {
        if self.phase != SessionPhase::Stale {
            return;
        }
        if let Some(session) = self.current.as_mut() {
            Arc::make_mut(session).phase = SessionPhase::Active;
            self.phase = SessionPhase::Active;
        }
    }

    fn connected(&mut self, connected: &SessionConnected, envelope_cursor: Option<u64>) -> ApplyOutcome {
        let cursor = connected.cursor.or(envelope_cursor);
        let same = self.session_id() == Some(&connected.session_id);

        let snapshot = match self.current.as_ref() {
            Some(existing) if same => {
                let mut s = SessionSnapshot::clone(existing);
                if let Some(usage) = connected.usage {
                    s.usage = max_usage(s.usage, usage);
                }
                s.cursor = s.cursor.max(cursor);
                s.model = connected.model.clone().or(s.model);
                s.permission_mode = connected.permission_mode.clone().or(s.permission_mode);
                s.phase = SessionPhase::Active;
                s
            }
            _ => {
                if let Some(old) = self.session_id() {
                    warn!(old = %old, new = %connected.session_id, "session changed without replacement");
                } else {
                    info!(session_id = %connected.session_id, "session attached");
                }
                let mut s = SessionSnapshot::new(connected.session_id.clone());
                s.usage = connected.usage.unwrap_or_default();
                s.cursor = cursor;
                s.model.clone_from(&connected.model);
                s.permission_mode.clone_from(&connected.permission_mode);
                s
            }
        };

        self.phase = SessionPhase::Active;
        if self.current.as_deref() == Some(&snapshot) {
            return ApplyOutcome::Unchanged;
        }
        self.current = Some(Arc::new(snapshot));
        ApplyOutcome::Updated
    }

    fn replaced(&mut self, replaced: &SessionReplaced) -> ApplyOutcome {
        info!(
            old = ?self.session_id().map(SessionId::as_str),
            new = ?replaced.new_session_id.as_deref(),
            "session replaced"
        );
        match &replaced.new_session_id {
            Some(id) => {
                self.current = Some(Arc::new(SessionSnapshot::new(id.clone())));
                self.phase = SessionPhase::Active;
            }
            None => {
                self.current = None;
                self.phase = SessionPhase::Replaced;
            }
        }
        ApplyOutcome::Updated
    }

    fn usage(&mut self, update: &UsageUpdate) -> ApplyOutcome {
        let Some(current) = self.current.as_deref() else {
            return ApplyOutcome::Unchanged;
        };
        let old = current.usage;
        let pairs = [
            (update.input_tokens, old.input_tokens),
            (update.output_tokens, old.output_tokens),
            (update.cache_read_tokens, old.cache_read_tokens),
            (update.cache_creation_tokens, old.cache_creation_tokens),
        ];
        if pairs.iter().any(|(new, old)| new.is_some_and(|n| n < *old)) {
            debug!(?update, ?old, "usage regressed, rejecting");
            return ApplyOutcome::Rejected(Rejection::UsageRegressed);
        }
        let next = TokenUsage {
            input_tokens: update.input_tokens.unwrap_or(old.input_tokens),
            output_tokens: update.output_tokens.unwrap_or(old.output_tokens),
            cache_read_tokens: update.cache_read_tokens.unwrap_or(old.cache_read_tokens),
            cache_creation_tokens: update
                .cache_creation_tokens
                .unwrap_or(old.cache_creation_tokens),
        };
        self.update(|s| replace(&mut s.usage, next))
    }

    /// Run `f` against a copy of the session; keep the copy if `f` reports a change.
    fn update(&mut self, f: impl FnOnce(&mut SessionSnapshot) -> bool) -> ApplyOutcome {
        let Some(session) = self.current.as_mut() else {
            return ApplyOutcome::Unchanged;
        };
        let mut next = SessionSnapshot::clone(session);
        if f(&mut next) {
            *session = Arc::new(next);
            ApplyOutcome::Updated
        } else {
            ApplyOutcome::Unchanged
        }
    }

    fn advance_cursor(&mut self, cursor: u64) -> bool {
        let Some(session) = self.current.as_mut() else {
            return false;
        };
        if session.cursor.is_some_and(|c| c >= cursor) {
            return false;
        }
        Arc::make_mut(session).cursor = Some(cursor);
        true
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

fn max_usage(a: TokenUsage, b: TokenUsage) -> TokenUsage {
    TokenUsage {
        input_tokens: a.input_tokens.max(b.input_tokens),
        output_tokens: a.output_tokens.max(b.output_tokens),
        cache_read_tokens: a.cache_read_tokens.max(b.cache_read_tokens),
        cache_creation_tokens: a.cache_creation_tokens.max(b.cache_creation_tokens),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_protocol::decode_value;

    fn frame(v: serde_json::Value) -> InboundFrame {
        decode_value(v).unwrap()
    }

    fn attached(store: &mut SessionStore) {
        let outcome = store.apply(&frame(json!({
            "type": "session.connected",
            "sessionId": "S1",
            "cursor": 10,
            "data": {
                "model": {"id": "model-2026-01-01", "alias": "Model Two"},
                "permissionMode": "default",
                "usage": {"inputTokens": 100, "outputTokens": 40}
            }
        })));
        assert_eq!(outcome, ApplyOutcome::Updated);
    }

    fn usage(cursor: u64, input: u64, output: u64) -> InboundFrame {
        frame(json!({
            "type": "content.usage",
            "sessionId": "S1",
            "cursor": cursor,
            "data": {"inputTokens": input, "outputTokens": output}
        }))
    }

    #[test]
    fn starts_uninitialized() {
        let store = SessionStore::new();
        assert_eq!(store.phase(), SessionPhase::Uninitialized);
        assert!(store.current().is_none());
    }

    #[test]
    fn session_connected_activates() {
        let mut store = SessionStore::new();
        attached(&mut store);
        let s = store.current().unwrap();
        assert_eq!(s.id.as_str(), "S1");
        assert_eq!(s.model.as_ref().unwrap().display_name(), "Model Two");
        assert_eq!(s.permission_mode, Some(PermissionMode::Default));
        assert_eq!(s.usage.input_tokens, 100);
        assert_eq!(s.cursor, Some(10));
        assert_eq!(store.phase(), SessionPhase::Active);
    }

    #[test]
    fn usage_only_moves_forward() {
        let mut store = SessionStore::new();
        attached(&mut store);
        assert_eq!(store.apply(&usage(11, 150, 60)), ApplyOutcome::Updated);
        assert_eq!(
            store.apply(&usage(12, 120, 70)),
            ApplyOutcome::Rejected(Rejection::UsageRegressed)
        );
        let s = store.current().unwrap();
        assert_eq!(s.usage.input_tokens, 150);
        assert_eq!(s.usage.output_tokens, 60);
    }

    #[test]
    fn same_usage_twice_is_idempotent() {
        let mut store = SessionStore::new();
        attached(&mut store);
        let update = StreamEvent::Usage(UsageUpdate {
            input_tokens: Some(200),
            ..UsageUpdate::default()
        });
        assert_eq!(store.apply_event(&update, None), ApplyOutcome::Updated);
        assert_eq!(store.apply_event(&update, None), ApplyOutcome::Unchanged);
        assert_eq!(store.current().unwrap().usage.input_tokens, 200);
        assert_eq!(store.current().unwrap().usage.output_tokens, 40);
    }

    #[test]
    fn replayed_cursor_is_duplicate() {
        let mut store = SessionStore::new();
        attached(&mut store);
        assert_eq!(store.apply(&usage(11, 150, 60)), ApplyOutcome::Updated);
        assert_eq!(store.apply(&usage(11, 150, 60)), ApplyOutcome::Duplicate);
        assert_eq!(store.apply(&usage(5, 1, 1)), ApplyOutcome::Duplicate);
        assert_eq!(store.cursor(), Some(11));
    }

    #[test]
    fn cursor_advance_alone_counts_as_update() {
        let mut store = SessionStore::new();
        attached(&mut store);
        let text = frame(json!({"type": "content.text", "cursor": 20, "data": {"delta": "x"}}));
        assert_eq!(store.apply(&text), ApplyOutcome::Updated);
        assert_eq!(store.cursor(), Some(20));
    }

    #[test]
    fn reconnect_snapshot_keeps_usage_monotone() {
        let mut store = SessionStore::new();
        attached(&mut store);
        let _ = store.apply(&usage(11, 150, 60));
        let outcome = store.apply(&frame(json!({
            "type": "session.connected",
            "sessionId": "S1",
            "data": {"usage": {"inputTokens": 120, "outputTokens": 90}, "cursor": 9}
        })));
        assert_eq!(outcome, ApplyOutcome::Updated);
        let s = store.current().unwrap();
        assert_eq!(s.id.as_str(), "S1");
        assert_eq!(s.usage.input_tokens, 150);
        assert_eq!(s.usage.output_tokens, 90);
        assert_eq!(s.cursor, Some(11));
        assert_eq!(s.model.as_ref().unwrap().display_name(), "Model Two");
    }

    #[test]
    fn alias_comes_from_backend_only() {
        let mut store = SessionStore::new();
        attached(&mut store);
        let _ = store.apply(&frame(json!({
            "type": "agent.model_changed",
            "data": {"model": "model-2026-02-01"}
        })));
        let model = store.current().unwrap().model.clone().unwrap();
        assert_eq!(model.alias, None);
        assert_eq!(model.display_name(), "model-2026-02-01");
    }

    #[test]
    fn replaced_with_new_id_creates_fresh_session() {
        let mut store = SessionStore::new();
        attached(&mut store);
        let outcome = store.apply(&frame(json!({
            "type": "connection.replaced",
            "data": {"newSessionId": "S2"}
        })));
        assert_eq!(outcome, ApplyOutcome::Updated);
        let s = store.current().unwrap();
        assert_eq!(s.id.as_str(), "S2");
        assert_eq!(s.usage, TokenUsage::default());
        assert_eq!(store.phase(), SessionPhase::Active);
    }

    #[test]
    fn replaced_without_id_waits_for_next_session() {
        let mut store = SessionStore::new();
        attached(&mut store);
        let _ = store.apply(&frame(json!({"type": "connection.replaced", "data": {}})));
        assert_eq!(store.phase(), SessionPhase::Replaced);
        assert!(store.current().is_none());
        let _ = store.apply(&frame(json!({"type": "session.connected", "data": {"sessionId": "S3"}})));
        assert_eq!(store.session_id().map(SessionId::as_str), Some("S3"));
        assert_eq!(store.phase(), SessionPhase::Active);
    }

    #[test]
    fn stale_accepts_only_reattachment() {
        let mut store = SessionStore::new();
        attached(&mut store);
        store.mark_stale();
        assert_eq!(store.phase(), SessionPhase::Stale);
        assert_eq!(store.current().unwrap().phase, SessionPhase::Stale);
        assert_eq!(
            store.apply(&usage(50, 999, 999)),
            ApplyOutcome::Rejected(Rejection::Stale)
        );
        let _ = store.apply(&frame(json!({"type": "session.connected", "sessionId": "S1"})));
        assert_eq!(store.phase(), SessionPhase::Active);
        assert_eq!(store.current().unwrap().usage.input_tokens, 100);
    }

    #[test]
    fn reattaching_accepts_replay_after_failure() {
        let mut store = SessionStore::new();
        attached(&mut store);
        store.mark_stale();
        store.reattaching();
        assert_eq!(store.phase(), SessionPhase::Active);
        assert_eq!(store.current().unwrap().phase, SessionPhase::Active);
        assert_eq!(store.apply(&usage(50, 150, 60)), ApplyOutcome::Updated);
        assert_eq!(store.current().unwrap().usage.input_tokens, 150);
    }

    #[test]
    fn history_page_reactivates_and_advances() {
        let mut store = SessionStore::new();
        attached(&mut store);
        store.mark_stale();
        let page = frame(json!({"type": "session.history", "data": {"events": [], "cursor": 30}}));
        assert_eq!(store.apply(&page), ApplyOutcome::Updated);
        assert_eq!(store.phase(), SessionPhase::Active);
        assert_eq!(store.cursor(), Some(30));
    }

    #[test]
    fn frames_for_other_session_are_rejected() {
        let mut store = SessionStore::new();
        attached(&mut store);
        let foreign = frame(json!({"type": "content.text", "sessionId": "S9", "data": {"delta": "x"}}));
        assert_eq!(store.apply(&foreign), ApplyOutcome::Rejected(Rejection::OtherSession));
    }

    #[test]
    fn events_before_attach_pass_through() {
        let mut store = SessionStore::new();
        let text = frame(json!({"type": "content.text", "cursor": 3, "data": {"delta": "x"}}));
        assert_eq!(store.apply(&text), ApplyOutcome::Unchanged);
        assert!(store.current().is_none());
    }
}
