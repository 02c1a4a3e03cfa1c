//! Connection Manager: the actor that owns every piece of client state.
//!
//! One task runs [`Runtime::run`]. Host commands, transport items, connect
//! results, backoff and heartbeat timers and interaction timeouts all arrive
//! in its `select!` loop, so state changes are serialized without locks.
//! Per connection it spawns a reader and a writer task; both stop when the
//! link's [`CancellationToken`] fires and tag everything they report with the
//! epoch they were started for, so items from an old connection are dropped.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tether_core::{CorrelationId, ErrorCategory, FatalKind, IdempotencyToken, TetherError};
use tether_protocol::events::{
    ConnectionError, ErrorEvent, ExpiryReason, HistoryPage, InteractionExpired, NetworkStatus,
    ReconnectComplete, Reconnecting,
};
use tether_protocol::outbound::{AttachData, ReattachData};
use tether_protocol::{
    InboundFrame, InteractionOutcome, OutboundFrame, OutgoingMessage, StreamEvent, decode,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument, trace, warn};

use crate::client::ClientSnapshot;
use crate::config::{ClientConfig, Endpoint};
use crate::connection::{Connection, ConnectionState, Established, LossAction};
use crate::correlator::{Correlator, InteractionKind, PendingInteraction, Resolution};
use crate::emitter::{ClientEvent, EventEmitter};
use crate::history::{self, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE, HistoryError, HistoryFetcher};
use crate::outbound_queue::{OutboundPayload, OutboundQueue, QueuedMessage};
use crate::session_store::SessionStore;
use crate::transport::{Connector, FrameSink, FrameStream, Handshake, Inbound, Transport};

/// Error code reported when a history bootstrap fails.
pub const HISTORY_UNAVAILABLE: &str = "HISTORY_UNAVAILABLE";

/// Error code reported for an interaction response that was written but not
/// acknowledged before its connection was replaced.
pub const RESPONSE_DROPPED: &str = "RESPONSE_DROPPED";

/// How long the writer waits for a graceful close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Application lifecycle signal from the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppLifecycle {
    /// The app came to the foreground.
    Foreground,
    /// The app went to the background.
    Background,
}

/// Host → runtime.
#[derive(Debug)]
pub(crate) enum Command {
    Connect(Endpoint),
    Disconnect(oneshot::Sender<()>),
    Send {
        token: IdempotencyToken,
        message: OutgoingMessage,
    },
    Respond {
        request_id: CorrelationId,
        outcome: InteractionOutcome,
        token: IdempotencyToken,
        reply: oneshot::Sender<bool>,
    },
    Lifecycle(AppLifecycle),
    Network {
        reachable: bool,
    },
}

/// Spawned tasks → runtime.
enum Internal {
    Connected {
        generation: u64,
        result: Result<Transport, TetherError>,
    },
    Frame {
        epoch: u64,
        frame: InboundFrame,
    },
    Activity {
        epoch: u64,
    },
    Lost {
        epoch: u64,
        error: TetherError,
    },
    HistoryPage {
        epoch: u64,
        page: HistoryPage,
    },
    HistoryDone {
        epoch: u64,
        result: Result<u32, HistoryError>,
    },
}

/// The live transport of one epoch.
struct Link {
    epoch: u64,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

type Timer = Option<Pin<Box<Sleep>>>;

/// The client actor.
pub(crate) struct Runtime {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    history: Option<Arc<dyn HistoryFetcher>>,

    commands: mpsc::UnboundedReceiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    emitter: Arc<EventEmitter>,
    snapshots: watch::Sender<ClientSnapshot>,

    connection: Connection,
    store: SessionStore,
    correlator: Correlator,
    queue: OutboundQueue,

    endpoint: Option<Endpoint>,
    link: Option<Link>,
    connect_task: Option<JoinHandle<()>>,
    connect_generation: u64,
    backoff: Timer,
    heartbeat: Timer,
    bootstrap: Option<JoinHandle<()>>,
}

impl Runtime {
    pub(crate) fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        history: Option<Arc<dyn HistoryFetcher>>,
        commands: mpsc::UnboundedReceiver<Command>,
        emitter: Arc<EventEmitter>,
        snapshots: watch::Sender<ClientSnapshot>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let correlator = Correlator::new(config.resolved_history);
        Self {
            config,
            connector,
            history,
            commands,
            internal_tx,
            internal_rx,
            emitter,
            snapshots,
            connection: Connection::new(),
            store: SessionStore::new(),
            correlator,
            queue: OutboundQueue::new(),
            endpoint: None,
            link: None,
            connect_task: None,
            connect_generation: 0,
            backoff: None,
            heartbeat: None,
            bootstrap: None,
        }
    }

    /// Run until every [`Client`](crate::Client) handle is dropped.
    #[instrument(skip_all, name = "tether_runtime")]
    pub(crate) async fn run(mut self) {
        debug!("client runtime started");
        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    self.on_command(command);
                }
                Some(message) = self.internal_rx.recv() => self.on_internal(message),
                () = expired(&mut self.backoff) => {
                    self.backoff = None;
                    self.start_attempt();
                }
                () = expired(&mut self.heartbeat) => {
                    self.heartbeat = None;
                    if self.link.is_some() {
                        self.on_lost(TetherError::transport("heartbeat timed out"));
                    }
                }
                timed_out = self.correlator.next_timeout() => {
                    self.expire(vec![timed_out], ExpiryReason::TimedOut);
                }
            }
            self.publish_snapshot();
        }
        self.teardown();
        self.publish_snapshot();
        debug!("client runtime stopped");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Host commands
    // ─────────────────────────────────────────────────────────────────────

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect(endpoint) => {
                if self.connection.begin() {
                    info!(url = %endpoint.url, "connecting");
                    self.endpoint = Some(endpoint);
                    self.start_attempt();
                } else {
                    debug!(state = %self.connection.state(), "connect ignored");
                }
            }
            Command::Disconnect(done) => {
                self.teardown();
                info!(epoch = self.connection.epoch(), "disconnected by host");
                self.publish_snapshot();
                let _ = done.send(());
            }
            Command::Send { token, message } => {
                debug!(token = %token, "message queued");
                self.queue.enqueue(token, OutboundPayload::Message(message));
                self.flush();
            }
            Command::Respond {
                request_id,
                outcome,
                token,
                reply,
            } => {
                let accepted = self.respond(request_id, outcome, token);
                let _ = reply.send(accepted);
            }
            Command::Lifecycle(lifecycle) => {
                debug!(?lifecycle, "app lifecycle changed");
                if lifecycle == AppLifecycle::Foreground {
                    self.retry_now("foreground");
                }
            }
            Command::Network { reachable } => {
                info!(reachable, "network reachability changed");
                self.publish(
                    self.connection.epoch(),
                    StreamEvent::NetworkStatusChanged(NetworkStatus { reachable }),
                );
                if reachable {
                    self.retry_now("network");
                }
            }
        }
    }

    fn respond(
        &mut self,
        request_id: CorrelationId,
        outcome: InteractionOutcome,
        token: IdempotencyToken,
    ) -> bool {
        let Some(registered) = self.correlator.epoch_of(&request_id) else {
            let previous = self.correlator.resolution(&request_id);
            debug!(request_id = %request_id, ?previous, "response for unknown or settled interaction ignored");
            return false;
        };
        // Without a live link for its epoch the answer could never be sent.
        if !self.config.survive_reconnect && !self.is_current(registered) {
            info!(request_id = %request_id, epoch = registered, "response to interaction from a lost connection");
            let dead: Vec<_> = self
                .correlator
                .resolve(&request_id, Resolution::Invalidated)
                .into_iter()
                .collect();
            self.expire(dead, ExpiryReason::Invalidated);
            return false;
        }

        let resolution = match outcome {
            InteractionOutcome::Denied => Resolution::Denied,
            InteractionOutcome::Approved | InteractionOutcome::Answered { .. } => {
                Resolution::Approved
            }
        };
        let Some(interaction) = self.correlator.resolve(&request_id, resolution) else {
            return false;
        };
        debug!(request_id = %request_id, token = %token, ?resolution, "interaction resolved");
        self.queue.enqueue(
            token,
            OutboundPayload::Response {
                request_id,
                outcome,
                epoch: interaction.epoch,
            },
        );
        self.flush();
        true
    }

    /// Pull a scheduled retry forward. Never starts a second attempt.
    fn retry_now(&mut self, trigger: &'static str) {
        let waiting = self.connection.state() == ConnectionState::Reconnecting
            && self.backoff.is_some()
            && self.connect_task.is_none();
        if waiting {
            info!(trigger, "retrying before backoff elapsed");
            self.backoff = None;
            self.start_attempt();
        } else {
            debug!(trigger, state = %self.connection.state(), "reconnect trigger ignored");
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Task messages
    // ─────────────────────────────────────────────────────────────────────

    fn on_internal(&mut self, message: Internal) {
        match message {
            Internal::Connected { generation, result } => {
                if generation != self.connect_generation {
                    debug!(generation, "stale connect result dropped");
                    return;
                }
                self.connect_task = None;
                match result {
                    Ok(transport) => self.on_established(transport),
                    Err(error) if error.category() == ErrorCategory::Fatal => self.fail(error),
                    Err(error) => self.on_lost(error),
                }
            }
            Internal::Frame { epoch, frame } => {
                if self.is_current(epoch) {
                    self.touch_heartbeat();
                    self.on_frame(epoch, frame);
                }
            }
            Internal::Activity { epoch } => {
                if self.is_current(epoch) {
                    self.touch_heartbeat();
                }
            }
            Internal::Lost { epoch, error } => {
                if self.is_current(epoch) {
                    self.on_lost(error);
                }
            }
            Internal::HistoryPage { epoch, page } => {
                if self.is_current(epoch) {
                    let event = StreamEvent::History(page);
                    let _ = self.store.apply_event(&event, None);
                    self.publish(epoch, event);
                }
            }
            Internal::HistoryDone { epoch, result } => {
                if !self.is_current(epoch) {
                    return;
                }
                self.bootstrap = None;
                match result {
                    Ok(pages) => {
                        info!(epoch, pages, "session rebuilt from history");
                        let session_id = self.store.session_id().cloned();
                        self.publish(
                            epoch,
                            StreamEvent::ReconnectComplete(ReconnectComplete {
                                epoch,
                                session_id,
                                replayed: false,
                            }),
                        );
                    }
                    Err(e) => {
                        warn!(epoch, error = %e, "history bootstrap failed");
                        self.publish(
                            epoch,
                            StreamEvent::Error(ErrorEvent {
                                code: Some(HISTORY_UNAVAILABLE.to_string()),
                                message: e.to_string(),
                                category: Some(ErrorCategory::Transport),
                                idempotency_key: None,
                            }),
                        );
                    }
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Connection lifecycle
    // ─────────────────────────────────────────────────────────────────────

    fn start_attempt(&mut self) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        self.connect_generation += 1;
        let generation = self.connect_generation;
        let connector = Arc::clone(&self.connector);
        let internal = self.internal_tx.clone();
        let handshake = Handshake {
            protocol_version: self.config.protocol_version.clone(),
            timeout: self.config.connect_timeout,
        };
        let span = info_span!("connect", generation, url = %endpoint.url);
        self.connect_task = Some(tokio::spawn(
            async move {
                let result = connector.connect(&endpoint, &handshake).await;
                let _ = internal.send(Internal::Connected { generation, result });
            }
            .instrument(span),
        ));
    }

    fn on_established(&mut self, transport: Transport) {
        let Established { epoch, reconnected } = self.connection.established();
        info!(epoch, reconnected, "connected");

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        drop(tokio::spawn(write_loop(
            transport.sink,
            outbound_rx,
            cancel.clone(),
            epoch,
            self.internal_tx.clone(),
        )));
        drop(tokio::spawn(read_loop(
            transport.stream,
            cancel.clone(),
            epoch,
            self.internal_tx.clone(),
        )));
        self.link = Some(Link {
            epoch,
            outbound,
            cancel,
        });

        self.store.reattaching();
        let attach = match self.store.session_id() {
            Some(session_id) => OutboundFrame::Reattach {
                session_id: session_id.clone(),
                data: ReattachData {
                    cursor: self.store.cursor(),
                },
            },
            None => OutboundFrame::Attach {
                data: AttachData {
                    session_id: self.endpoint.as_ref().and_then(|e| e.resume_session.clone()),
                },
            },
        };
        let _ = self.write(&attach);

        if reconnected && !self.config.survive_reconnect {
            let invalidated = self.correlator.invalidate_before(epoch);
            let dropped = self.queue.drop_responses_before(epoch);
            if !invalidated.is_empty() || !dropped.is_empty() {
                info!(
                    epoch,
                    invalidated = invalidated.len(),
                    dropped = dropped.len(),
                    "interactions from previous connection dropped"
                );
            }
            self.expire(invalidated, ExpiryReason::Invalidated);
            self.report_dropped(epoch, dropped);
        }

        self.flush();

        if reconnected {
            let session_id = self.store.session_id().cloned();
            self.publish(
                epoch,
                StreamEvent::ReconnectComplete(ReconnectComplete {
                    epoch,
                    session_id,
                    replayed: true,
                }),
            );
        }

        if let Some(timeout) = self.config.heartbeat_timeout {
            self.heartbeat = Some(Box::pin(tokio::time::sleep(timeout)));
        }
    }

    fn on_lost(&mut self, error: TetherError) {
        let epoch = self.connection.epoch();
        self.close_link();
        let reverted = self.queue.revert_in_flight();
        match self.connection.lost(error.clone(), &self.config.backoff) {
            LossAction::Retry { attempt, delay } => {
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                info!(epoch, attempt, delay_ms, reverted, error = %error, "connection lost, retrying");
                self.backoff = Some(Box::pin(tokio::time::sleep(delay)));
                self.publish(
                    epoch,
                    StreamEvent::Reconnecting(Reconnecting { attempt, delay_ms }),
                );
            }
            LossAction::GiveUp => self.enter_failed(),
        }
    }

    fn fail(&mut self, error: TetherError) {
        self.connection.fail(error);
        self.enter_failed();
    }

    /// Common path into `failed`. The connection already holds the error.
    fn enter_failed(&mut self) {
        self.stop_connecting();
        self.close_link();
        self.store.mark_stale();
        let invalidated = self.correlator.invalidate_all();
        let _ = self.queue.drop_responses_before(u64::MAX);
        let _ = self.queue.revert_in_flight();
        self.expire(invalidated, ExpiryReason::Invalidated);

        let status = self.connection.status();
        let (code, message) = status.last_error.as_ref().map_or_else(
            || ("UNKNOWN".to_string(), "connection failed".to_string()),
            |e| (e.code().to_string(), e.to_string()),
        );
        error!(epoch = status.epoch, code = %code, message = %message, "connection failed");
        self.publish(
            status.epoch,
            StreamEvent::ConnectionError(ConnectionError {
                code: Some(code),
                message,
                fatal: true,
            }),
        );
    }

    /// Host-initiated teardown. Emits nothing.
    fn teardown(&mut self) {
        self.stop_connecting();
        self.close_link();
        let _ = self.correlator.invalidate_all();
        let _ = self.queue.drop_responses_before(u64::MAX);
        let _ = self.queue.revert_in_flight();
        self.connection.reset();
    }

    fn stop_connecting(&mut self) {
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        self.connect_generation += 1;
        self.backoff = None;
    }

    fn close_link(&mut self) {
        if let Some(link) = self.link.take() {
            debug!(epoch = link.epoch, "closing link");
            link.cancel.cancel();
        }
        self.heartbeat = None;
        if let Some(task) = self.bootstrap.take() {
            task.abort();
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.link.as_ref().is_some_and(|link| link.epoch == epoch)
    }

    fn touch_heartbeat(&mut self) {
        if let (Some(timer), Some(timeout)) = (self.heartbeat.as_mut(), self.config.heartbeat_timeout) {
            timer.as_mut().reset(Instant::now() + timeout);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────

    fn on_frame(&mut self, epoch: u64, frame: InboundFrame) {
        let outcome = self.store.apply(&frame);
        if !outcome.is_publishable() {
            debug!(epoch, event_type = frame.event.event_type(), ?outcome, cursor = ?frame.cursor, "frame not applied");
            return;
        }

        let mut event = frame.event;
        let mut fatal = None;
        let mut invalidated = Vec::new();
        match &mut event {
            StreamEvent::PermissionRequest(request) => {
                let timeout = request
                    .timeout_ms
                    .map_or(self.config.permission_timeout, Duration::from_millis);
                if !self.track(request.request_id.clone(), InteractionKind::Permission, timeout, epoch) {
                    return;
                }
            }
            StreamEvent::QuestionRequest(request) => {
                let timeout = request
                    .timeout_ms
                    .map_or(self.config.question_timeout, Duration::from_millis);
                if !self.track(request.request_id.clone(), InteractionKind::Question, timeout, epoch) {
                    return;
                }
            }
            StreamEvent::InputQueued(queued) => {
                if let Some(token) = &queued.idempotency_key {
                    if self.queue.acknowledge(token).is_some() {
                        debug!(token = %token, "outbound item acknowledged");
                    }
                }
            }
            StreamEvent::Error(err) => {
                if let Some(token) = &err.idempotency_key {
                    if self.queue.reject(token).is_some() {
                        warn!(token = %token, code = ?err.code, message = %err.message, "outbound item rejected");
                        err.category = Some(ErrorCategory::Application);
                    }
                }
                fatal = err
                    .code
                    .as_deref()
                    .and_then(FatalKind::from_code)
                    .map(|kind| TetherError::fatal(kind, err.message.clone()));
            }
            StreamEvent::ConnectionError(err) => {
                fatal = err
                    .code
                    .as_deref()
                    .and_then(FatalKind::from_code)
                    .map(|kind| TetherError::fatal(kind, err.message.clone()));
            }
            StreamEvent::Replaced(_) => {
                invalidated = self.correlator.invalidate_all();
                let dropped = self.queue.drop_responses_before(u64::MAX).len();
                info!(
                    epoch,
                    invalidated = invalidated.len(),
                    dropped,
                    "pending interactions dropped with replaced session"
                );
            }
            StreamEvent::CursorEvicted(_) | StreamEvent::CursorInvalid(_) => {
                self.start_bootstrap(epoch);
            }
            _ => {}
        }

        self.publish(epoch, event);
        self.expire(invalidated, ExpiryReason::Invalidated);
        if let Some(error) = fatal {
            self.fail(error);
        }
    }

    fn track(
        &mut self,
        id: CorrelationId,
        kind: InteractionKind,
        timeout: Duration,
        epoch: u64,
    ) -> bool {
        match self.correlator.register(id, kind, timeout, epoch) {
            Some(handle) => {
                debug!(request_id = %handle.id, ?kind, ?timeout, "interaction registered");
                true
            }
            None => false,
        }
    }

    fn start_bootstrap(&mut self, epoch: u64) {
        let (Some(fetcher), Some(session_id)) = (self.history.clone(), self.store.session_id().cloned())
        else {
            warn!(epoch, "replay cursor unusable and no history source to rebuild from");
            return;
        };
        let (page_size, max_pages) = self
            .config
            .history
            .as_ref()
            .map_or((DEFAULT_PAGE_SIZE, DEFAULT_MAX_PAGES), |h| (h.page_size, h.max_pages));
        let after = self.store.cursor();
        let internal = self.internal_tx.clone();
        if let Some(task) = self.bootstrap.take() {
            task.abort();
        }
        info!(epoch, session_id = %session_id, ?after, "rebuilding session from history");

        let span = info_span!("history_bootstrap", epoch, session_id = %session_id);
        self.bootstrap = Some(tokio::spawn(
            async move {
                let pages = internal.clone();
                let result = history::fetch_all(
                    fetcher.as_ref(),
                    &session_id,
                    after,
                    page_size,
                    max_pages,
                    move |page| {
                        let _ = pages.send(Internal::HistoryPage { epoch, page });
                    },
                )
                .await;
                let _ = internal.send(Internal::HistoryDone { epoch, result });
            }
            .instrument(span),
        ));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Outbound
    // ─────────────────────────────────────────────────────────────────────

    /// Send every pending item, oldest first. No-op without a link.
    fn flush(&mut self) {
        if self.link.is_none() {
            return;
        }
        for item in self.queue.drain() {
            let session_id = self
                .store
                .session_id()
                .or_else(|| self.endpoint.as_ref().and_then(|e| e.resume_session.as_ref()));
            let frame = item.to_frame(session_id);
            if self.write(&frame) {
                trace!(token = %item.token, frame_type = frame.frame_type(), "outbound item written");
            }
        }
    }

    fn write(&self, frame: &OutboundFrame) -> bool {
        let Some(link) = &self.link else {
            return false;
        };
        match frame.encode() {
            Ok(text) => link.outbound.send(text).is_ok(),
            Err(e) => {
                warn!(frame_type = frame.frame_type(), error = %e, "failed to encode outbound frame");
                false
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Publication
    // ─────────────────────────────────────────────────────────────────────

    fn publish(&self, epoch: u64, event: StreamEvent) {
        trace!(epoch, event_type = event.event_type(), "publishing event");
        let _ = self.emitter.emit(ClientEvent {
            epoch,
            event,
            session: self.store.current(),
        });
    }

    /// Tell the host these prompts can no longer be answered.
    fn expire(&self, interactions: Vec<PendingInteraction>, reason: ExpiryReason) {
        let epoch = self.connection.epoch();
        for interaction in interactions {
            debug!(request_id = %interaction.id, ?reason, "interaction expired");
            self.publish(
                epoch,
                StreamEvent::InteractionExpired(InteractionExpired {
                    request_id: interaction.id,
                    reason,
                }),
            );
        }
    }

    /// Responses that were written but never acknowledged on a lost link.
    fn report_dropped(&self, epoch: u64, dropped: Vec<QueuedMessage>) {
        for item in dropped {
            warn!(token = %item.token, "unacknowledged interaction response dropped");
            self.publish(
                epoch,
                StreamEvent::Error(ErrorEvent {
                    code: Some(RESPONSE_DROPPED.to_string()),
                    message: "interaction response was not acknowledged before reconnect".to_string(),
                    category: Some(ErrorCategory::Application),
                    idempotency_key: Some(item.token),
                }),
            );
        }
    }

    fn publish_snapshot(&self) {
        let next = ClientSnapshot {
            connection: self.connection.status(),
            session: self.store.current(),
            session_phase: self.store.phase(),
            pending_interactions: self.correlator.pending(),
            queued: self.queue.summary(),
        };
        let _ = self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// Resolves when the timer fires; pending forever when unset.
async fn expired(timer: &mut Timer) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn write_loop(
    mut sink: FrameSink,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
    epoch: u64,
    internal: mpsc::UnboundedSender<Internal>,
) {
    loop {
        let text = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            text = outbound.recv() => text,
        };
        let Some(text) = text else { break };
        if let Err(error) = sink.send(text).await {
            let _ = internal.send(Internal::Lost { epoch, error });
            return;
        }
    }
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
}

async fn read_loop(
    mut stream: FrameStream,
    cancel: CancellationToken,
    epoch: u64,
    internal: mpsc::UnboundedSender<Internal>,
) {
    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            item = stream.next() => item,
        };
        let message = match item {
            Some(Ok(Inbound::Frame(text))) => match decode(&text) {
                Ok(frame) => Internal::Frame { epoch, frame },
                Err(e) => {
                    warn!(epoch, error = %e, len = text.len(), "dropping malformed frame");
                    Internal::Activity { epoch }
                }
            },
            Some(Ok(Inbound::Keepalive)) => Internal::Activity { epoch },
            Some(Err(error)) => {
                let _ = internal.send(Internal::Lost { epoch, error });
                return;
            }
            None => {
                let _ = internal.send(Internal::Lost {
                    epoch,
                    error: TetherError::transport("stream closed"),
                });
                return;
            }
        };
        if internal.send(message).is_err() {
            return;
        }
    }
}
