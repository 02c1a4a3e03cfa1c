//! Rebuilding a session from history when the replay cursor is gone.

mod common;

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde_json::json;
use tether_client::{
    ClientBuilder, ClientConfig, ConnectionState, HISTORY_UNAVAILABLE, HistoryConfig, HistoryError,
    HistoryFetcher,
};
use tether_core::SessionId;
use tether_protocol::StreamEvent;
use tether_protocol::events::HistoryPage;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{Harness, config};

/// Serves canned pages and records the `after` cursor of each request.
struct FakeHistory {
    pages: Mutex<Vec<HistoryPage>>,
    requests: Mutex<Vec<(String, Option<u64>)>>,
    fail: bool,
}

impl FakeHistory {
    fn new(pages: Vec<HistoryPage>) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(pages.into_iter().rev().collect()),
            requests: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            fail: true,
        })
    }
}

#[async_trait]
impl HistoryFetcher for FakeHistory {
    async fn fetch_page(
        &self,
        session_id: &SessionId,
        after: Option<u64>,
        _limit: u32,
    ) -> Result<HistoryPage, HistoryError> {
        self.requests.lock().unwrap().push((session_id.to_string(), after));
        if self.fail {
            return Err(HistoryError::Status(503));
        }
        Ok(self.pages.lock().unwrap().pop().unwrap_or_default())
    }
}

fn page(cursor: u64, has_more: bool) -> HistoryPage {
    HistoryPage {
        events: vec![json!({"type": "content.text", "data": {"delta": format!("entry {cursor}")}})],
        cursor: Some(cursor),
        has_more,
    }
}

#[tokio::test(start_paused = true)]
async fn evicted_cursor_rebuilds_from_history() {
    let history = FakeHistory::new(vec![page(20, true), page(25, false)]);
    let mut h = Harness::from_builder(ClientBuilder::new(config()).history(history.clone()));
    let server = h.attached("S1").await;
    drop(server);

    let mut server = h.accept().await;
    let reattach = server.next_frame().await;
    assert_eq!(reattach["data"]["cursor"], 1);
    server.push(json!({
        "type": "cursor.evicted", "sessionId": "S1",
        "data": {"cursor": 1, "oldestAvailable": 10}
    }));

    let _ = h.event("cursor.evicted").await;
    let first = h.event("session.history").await;
    assert_matches!(first.event, StreamEvent::History(ref p) if p.cursor == Some(20));
    let second = h.event("session.history").await;
    assert_matches!(second.event, StreamEvent::History(ref p) if p.cursor == Some(25) && !p.has_more);

    let done = h
        .event_where(|e| matches!(e.event, StreamEvent::ReconnectComplete(ref c) if !c.replayed))
        .await;
    assert_eq!(done.epoch, 2);

    let snapshot = h.client.snapshot();
    assert_eq!(snapshot.session.unwrap().cursor, Some(25));
    assert_eq!(
        *history.requests.lock().unwrap(),
        vec![("S1".to_string(), Some(1)), ("S1".to_string(), Some(20))]
    );
}

#[tokio::test(start_paused = true)]
async fn history_failure_is_reported_without_dropping_the_connection() {
    let mut h = Harness::from_builder(ClientBuilder::new(config()).history(FakeHistory::failing()));
    let server = h.attached("S1").await;
    server.push(json!({"type": "cursor.invalid", "sessionId": "S1", "data": {"reason": "unknown"}}));

    let error = h.event("error").await;
    assert_matches!(
        error.event,
        StreamEvent::Error(ref e) if e.code.as_deref() == Some(HISTORY_UNAVAILABLE)
    );
    assert_eq!(h.client.snapshot().connection.state, ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn evicted_cursor_without_history_source_is_passed_through() {
    let mut h = Harness::start(config());
    let server = h.attached("S1").await;
    server.push(json!({"type": "cursor.evicted", "sessionId": "S1", "data": {"cursor": 1}}));
    server.push(json!({"type": "content.text", "sessionId": "S1", "data": {"delta": "after"}}));

    let _ = h.event("cursor.evicted").await;
    let next = h.event_where(|e| e.event.event_type() != "cursor.evicted").await;
    assert_eq!(next.event.event_type(), "content.text");
}

#[tokio::test]
async fn http_history_is_used_when_configured() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sessions/S1/history"))
        .and(query_param("after", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [{"type": "content.text", "data": {"delta": "restored"}}],
            "cursor": 7,
            "hasMore": false
        })))
        .expect(1)
        .mount(&backend)
        .await;

    let mut h = Harness::start(ClientConfig {
        history: Some(HistoryConfig {
            base_url: backend.uri(),
            page_size: 50,
            max_pages: 4,
        }),
        ..config()
    });
    let server = h.attached("S1").await;
    server.push(json!({"type": "cursor.evicted", "sessionId": "S1", "data": {"cursor": 1}}));

    let restored = h.event("session.history").await;
    assert_matches!(restored.event, StreamEvent::History(ref p) if p.events.len() == 1);
    let snapshot = h.wait_for(|s| s.session.as_ref().is_some_and(|s| s.cursor == Some(7))).await;
    assert_eq!(snapshot.connection.state, ConnectionState::Connected);
}
