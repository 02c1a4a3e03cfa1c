//! Event Emitter: the one stream the host reads.
//!
//! Only the runtime publishes. Every event is stamped with the connection
//! epoch it was decoded on and the session state right after it applied.

use std::sync::Arc;

use tether_protocol::StreamEvent;
use tokio::sync::broadcast;

use crate::session_store::SessionSnapshot;

/// One published event.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientEvent {
    /// Connection epoch the event belongs to.
    pub epoch: u64,
    /// The event.
    pub event: StreamEvent,
    /// Session state after the event was applied.
    pub session: Option<Arc<SessionSnapshot>>,
}

/// Fan-out of [`ClientEvent`]s.
///
/// Publishing never waits on subscribers: a receiver that falls more than
/// `capacity` events behind sees `Lagged` and resumes at the oldest kept
/// event.
pub struct EventEmitter {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventEmitter {
    /// Emitter buffering up to `capacity` events per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish `event`. Returns how many subscribers will see it.
    pub fn emit(&self, event: ClientEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Receiver for every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }
}
