//! Host-facing handle.
//!
//! [`Client`] is cheap to clone and safe to use from any task: every method
//! only enqueues a command for the runtime. State is read through immutable
//! [`ClientSnapshot`]s and the event stream.

use std::sync::Arc;

use futures::{Stream, StreamExt, future};
use serde::Serialize;
use tether_core::{CorrelationId, IdempotencyToken, Result, TetherError};
use tether_protocol::{InteractionOutcome, OutgoingMessage};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::config::{ClientConfig, Endpoint};
use crate::connection::{ConnectionState, ConnectionStatus};
use crate::correlator::PendingInteraction;
use crate::emitter::{ClientEvent, EventEmitter};
use crate::history::{HistoryFetcher, HttpHistory};
use crate::outbound_queue::QueuedSummary;
use crate::runtime::{AppLifecycle, Command, Runtime};
use crate::session_store::{SessionPhase, SessionSnapshot};
use crate::transport::{Connector, WsConnector};

/// Point-in-time view of the whole client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientSnapshot {
    /// Connection state, epoch, retries, last error.
    pub connection: ConnectionStatus,
    /// Current session, if any.
    pub session: Option<Arc<SessionSnapshot>>,
    /// Session lifecycle phase.
    pub session_phase: SessionPhase,
    /// Unresolved interactions, oldest first.
    pub pending_interactions: Vec<PendingInteraction>,
    /// Queued outbound items, in send order.
    pub queued: Vec<QueuedSummary>,
}

/// Serializable summary for logs and the CLI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    /// Connection state.
    pub state: ConnectionState,
    /// Connection epoch.
    pub epoch: u64,
    /// Session id.
    pub session_id: Option<String>,
    /// Pending interaction ids.
    pub pending: Vec<String>,
    /// Queued item count.
    pub queued: usize,
}

impl ClientSnapshot {
    /// Compact, serializable summary.
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            state: self.connection.state,
            epoch: self.connection.epoch,
            session_id: self.session.as_ref().map(|s| s.id.to_string()),
            pending: self
                .pending_interactions
                .iter()
                .map(|p| p.id.to_string())
                .collect(),
            queued: self.queued.len(),
        }
    }
}

/// Builds and spawns a client runtime.
pub struct ClientBuilder {
    config: ClientConfig,
    connector: Option<Arc<dyn Connector>>,
    history: Option<Arc<dyn HistoryFetcher>>,
}

impl ClientBuilder {
    /// Builder with the given config.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connector: None,
            history: None,
        }
    }

    /// Use a custom connector instead of [`WsConnector`].
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Use a custom history source instead of [`HttpHistory`].
    #[must_use]
    pub fn history(mut self, history: Arc<dyn HistoryFetcher>) -> Self {
        self.history = Some(history);
        self
    }

    /// Spawn the runtime on the current tokio runtime.
    pub fn spawn(self) -> Client {
        let connector = self.connector.unwrap_or_else(|| Arc::new(WsConnector) as Arc<dyn Connector>);
        let history = self.history.or_else(|| {
            self.config
                .history
                .as_ref()
                .map(|h| Arc::new(HttpHistory::from_config(h)) as Arc<dyn HistoryFetcher>)
        });
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let emitter = Arc::new(EventEmitter::with_capacity(self.config.emitter_capacity));
        let (snapshots, snapshot_rx) = watch::channel(ClientSnapshot::default());

        let runtime = Runtime::new(
            self.config,
            connector,
            history,
            commands_rx,
            Arc::clone(&emitter),
            snapshots,
        );
        drop(tokio::spawn(runtime.run()));

        Client {
            commands,
            emitter,
            snapshots: snapshot_rx,
        }
    }
}

/// Handle to a running client.
#[derive(Clone)]
pub struct Client {
    commands: mpsc::UnboundedSender<Command>,
    emitter: Arc<EventEmitter>,
    snapshots: watch::Receiver<ClientSnapshot>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.snapshots.borrow().connection.state)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Spawn a client with the default connector and history source.
    pub fn spawn(config: ClientConfig) -> Self {
        ClientBuilder::new(config).spawn()
    }

    /// Start connecting. Idempotent while connecting or connected.
    pub fn connect(&self, endpoint: Endpoint) -> Result<()> {
        self.command(Command::Connect(endpoint))
    }

    /// Tear down the transport and cancel every retry and pending interaction.
    ///
    /// Returns once the runtime is `disconnected`. No event is emitted for
    /// the teardown itself.
    pub async fn disconnect(&self) -> Result<()> {
        let (done, wait) = oneshot::channel();
        self.command(Command::Disconnect(done))?;
        wait.await.map_err(|_| TetherError::Closed)
    }

    /// Queue a message. Returns its idempotency token immediately.
    pub fn send(&self, message: OutgoingMessage) -> Result<IdempotencyToken> {
        let token = IdempotencyToken::generate();
        self.command(Command::Send {
            token: token.clone(),
            message,
        })?;
        Ok(token)
    }

    /// Answer a permission or question request.
    ///
    /// Resolves to `false` when the id is unknown or already settled
    /// (answered, timed out or invalidated); nothing is sent then. An answer
    /// to a prompt whose connection is gone is refused the same way unless
    /// interactions survive reconnects. Prompts that close unanswered are
    /// announced as `interactive.expired`.
    pub async fn respond_to_interaction(
        &self,
        request_id: impl Into<CorrelationId>,
        outcome: InteractionOutcome,
    ) -> Result<bool> {
        let (reply, accepted) = oneshot::channel();
        self.command(Command::Respond {
            request_id: request_id.into(),
            outcome,
            token: IdempotencyToken::generate(),
            reply,
        })?;
        accepted.await.map_err(|_| TetherError::Closed)
    }

    /// Report an app lifecycle change. Foregrounding may retry early.
    pub fn notify_app_lifecycle(&self, lifecycle: AppLifecycle) -> Result<()> {
        self.command(Command::Lifecycle(lifecycle))
    }

    /// Report a reachability change. Regaining the network may retry early.
    pub fn notify_network(&self, reachable: bool) -> Result<()> {
        self.command(Command::Network { reachable })
    }

    /// Raw event receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.emitter.subscribe()
    }

    /// Event stream. Events a slow consumer missed are skipped.
    pub fn events(&self) -> impl Stream<Item = ClientEvent> + Send + 'static {
        BroadcastStream::new(self.emitter.subscribe()).filter_map(|item| {
            future::ready(match item {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                    None
                }
            })
        })
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> ClientSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Snapshot receiver for change notification.
    pub fn watch(&self) -> watch::Receiver<ClientSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a snapshot satisfies `predicate` and return it.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<ClientSnapshot>
    where
        F: FnMut(&ClientSnapshot) -> bool,
    {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| TetherError::Closed)?;
        Ok(ClientSnapshot::clone(&snapshot))
    }

    /// Wait until the connection reaches `state`.
    pub async fn wait_for_state(&self, state: ConnectionState) -> Result<ClientSnapshot> {
        self.wait_for(|s| s.connection.state == state).await
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| TetherError::Closed)
    }
}
