//! In-memory transport and helpers for driving the client runtime.

#![allow(dead_code, clippy::missing_panics_doc, missing_docs)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tether_client::{
    Client, ClientBuilder, ClientConfig, ClientEvent, ClientSnapshot, Connector, Endpoint,
    Handshake, Inbound, Transport,
};
use tether_core::{BackoffPolicy, TetherError};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

/// Upper bound for any single wait. Time is paused in most tests, so this
/// only matters when something is genuinely stuck.
pub const WAIT: Duration = Duration::from_secs(120);

/// What the next connect attempt does.
pub enum Outcome {
    Accept,
    Fail(TetherError),
}

/// Server end of one accepted connection.
pub struct ServerSide {
    to_client: fmpsc::UnboundedSender<Result<Inbound, TetherError>>,
    from_client: fmpsc::UnboundedReceiver<String>,
}

impl ServerSide {
    /// Send a JSON frame to the client.
    pub fn push(&self, frame: Value) {
        self.push_raw(&frame.to_string());
    }

    /// Send raw text to the client.
    pub fn push_raw(&self, text: &str) {
        self.to_client
            .unbounded_send(Ok(Inbound::Frame(text.to_string())))
            .expect("client reader gone");
    }

    /// Send a ping.
    pub fn keepalive(&self) {
        self.to_client
            .unbounded_send(Ok(Inbound::Keepalive))
            .expect("client reader gone");
    }

    /// Next frame the client wrote, parsed.
    pub async fn next_frame(&mut self) -> Value {
        let text = timeout(WAIT, self.from_client.next())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client closed the connection");
        serde_json::from_str(&text).expect("client wrote invalid JSON")
    }

    /// Whether the client writes nothing within `wait`.
    pub async fn is_silent_for(&mut self, wait: Duration) -> bool {
        match timeout(wait, self.from_client.next()).await {
            Err(_) | Ok(None) => true,
            Ok(Some(_)) => false,
        }
    }
}

/// Connector that follows a script and hands server ends to the test.
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Outcome>>,
    attempts: AtomicU32,
    accepted: mpsc::UnboundedSender<ServerSide>,
}

impl ScriptedConnector {
    /// Queue outcomes for the next attempts. Unscripted attempts accept.
    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.script.lock().unwrap().extend(outcomes);
    }

    /// Connect attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _endpoint: &Endpoint, _handshake: &Handshake) -> Result<Transport, TetherError> {
        let _ = self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = self.script.lock().unwrap().pop_front().unwrap_or(Outcome::Accept);
        match outcome {
            Outcome::Fail(error) => Err(error),
            Outcome::Accept => {
                let (to_client, inbound) = fmpsc::unbounded();
                let (outbound, from_client) = fmpsc::unbounded::<String>();
                self.accepted
                    .send(ServerSide {
                        to_client,
                        from_client,
                    })
                    .map_err(|_| TetherError::transport("test harness gone"))?;
                Ok(Transport {
                    sink: Box::pin(outbound.sink_map_err(|e| TetherError::transport(e.to_string()))),
                    stream: Box::pin(inbound),
                })
            }
        }
    }
}

/// A running client wired to a scripted connector.
pub struct Harness {
    pub client: Client,
    pub connector: Arc<ScriptedConnector>,
    pub events: broadcast::Receiver<ClientEvent>,
    servers: mpsc::UnboundedReceiver<ServerSide>,
}

impl Harness {
    pub fn start(config: ClientConfig) -> Self {
        Self::from_builder(ClientBuilder::new(config))
    }

    pub fn from_builder(builder: ClientBuilder) -> Self {
        let (accepted, servers) = mpsc::unbounded_channel();
        let connector = Arc::new(ScriptedConnector {
            script: Mutex::new(VecDeque::new()),
            attempts: AtomicU32::new(0),
            accepted,
        });
        let client = builder.connector(connector.clone()).spawn();
        let events = client.subscribe();
        Self {
            client,
            connector,
            events,
            servers,
        }
    }

    /// Wait for the next accepted connection.
    pub async fn accept(&mut self) -> ServerSide {
        timeout(WAIT, self.servers.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    /// Connect and attach to session `S1`. Returns the server end.
    pub async fn attached(&mut self, session_id: &str) -> ServerSide {
        self.client.connect(endpoint()).unwrap();
        let mut server = self.accept().await;
        assert_eq!(server.next_frame().await["type"], "session.attach");
        server.push(serde_json::json!({
            "type": "session.connected",
            "sessionId": session_id,
            "cursor": 1,
            "data": {"model": {"id": "model-x-20260101", "alias": "Model X"}}
        }));
        let id = session_id.to_string();
        let _ = self
            .wait_for(move |s| s.session.as_ref().is_some_and(|session| session.id.as_str() == id))
            .await;
        server
    }

    pub async fn wait_for(&self, predicate: impl FnMut(&ClientSnapshot) -> bool) -> ClientSnapshot {
        timeout(WAIT, self.client.wait_for(predicate))
            .await
            .expect("timed out waiting for snapshot")
            .expect("client closed")
    }

    /// Next event of the given wire type.
    pub async fn event(&mut self, event_type: &str) -> ClientEvent {
        self.event_where(|e| e.event.event_type() == event_type).await
    }

    /// Next event matching `predicate`; earlier events are skipped.
    pub async fn event_where(&mut self, mut predicate: impl FnMut(&ClientEvent) -> bool) -> ClientEvent {
        loop {
            let event = timeout(WAIT, self.events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    }

    /// Everything already emitted and not yet read.
    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}

pub fn endpoint() -> Endpoint {
    Endpoint::new("ws://backend.test/ws").with_auth_token("token")
}

/// Fast, deterministic config with no heartbeat.
pub fn config() -> ClientConfig {
    ClientConfig {
        backoff: BackoffPolicy {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter_factor: 0.0,
        },
        heartbeat_timeout: None,
        ..ClientConfig::default()
    }
}
