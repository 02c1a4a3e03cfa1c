//! # tether-client
//!
//! Client-side streaming session runtime.
//!
//! - **Connection Manager** ([`runtime`]): the actor owning all state, with
//!   reconnect backoff, epochs and lifecycle/network triggers
//! - **Session State Store** ([`session_store`]): monotone session view
//! - **Interaction Correlator** ([`correlator`]): permission/question
//!   exchanges with monotonic timeouts
//! - **Outbound Queue** ([`outbound_queue`]): FIFO with idempotency tokens
//! - **Event Emitter** ([`emitter`]): the single event fan-out
//! - [`Client`]: the host-facing handle
//!
//! ```no_run
//! # async fn demo() -> tether_core::Result<()> {
//! use tether_client::{Client, ClientConfig, Endpoint};
//! use tether_protocol::OutgoingMessage;
//!
//! let client = Client::spawn(ClientConfig::default());
//! let mut events = client.subscribe();
//! client.connect(Endpoint::new("ws://localhost:8080/ws"))?;
//! let _token = client.send(OutgoingMessage::text("hello"))?;
//! while let Ok(event) = events.recv().await {
//!     println!("{}", event.event.event_type());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod emitter;
pub mod history;
pub mod outbound_queue;
pub mod runtime;
pub mod session_store;
pub mod transport;

pub use client::{Client, ClientBuilder, ClientSnapshot, SnapshotSummary};
pub use config::{ClientConfig, Endpoint, HistoryConfig};
pub use connection::{ConnectionState, ConnectionStatus};
pub use correlator::{InteractionKind, PendingInteraction, Resolution};
pub use emitter::{ClientEvent, EventEmitter};
pub use history::{HistoryError, HistoryFetcher, HttpHistory};
pub use outbound_queue::{DeliveryState, QueuedSummary};
pub use runtime::{AppLifecycle, HISTORY_UNAVAILABLE, RESPONSE_DROPPED};
pub use session_store::{SessionPhase, SessionSnapshot};
pub use transport::{Connector, FrameSink, FrameStream, Handshake, Inbound, Transport, WsConnector};
