//! # tether-protocol
//!
//! Wire protocol for the tether streaming client.
//!
//! - [`events`]: the closed [`StreamEvent`] union and its payloads
//! - [`decode`]: tolerant decoder from raw frames to [`InboundFrame`]
//! - [`outbound`]: frames the client writes to the backend

#![deny(unsafe_code)]

pub mod decode;
pub mod events;
mod lenient;
pub mod outbound;

pub use decode::{DecodeError, InboundFrame, decode, decode_value};
pub use events::{
    AgentState, EventCategory, ModelInfo, PermissionMode, StreamEvent, TokenUsage, UsageUpdate,
};
pub use outbound::{Attachment, InteractionOutcome, OutboundFrame, OutgoingMessage};
