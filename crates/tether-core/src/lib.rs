//! # tether-core
//!
//! Foundation types shared by every tether crate:
//!
//! - **Branded IDs**: `SessionId`, `CorrelationId`, `IdempotencyToken`
//! - **Errors**: `TetherError` and the four-way `ErrorCategory` taxonomy
//! - **Backoff**: `BackoffPolicy` with monotone, capped, jittered delays
//! - **Logging**: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod backoff;
pub mod errors;
pub mod ids;
pub mod logging;

pub use backoff::BackoffPolicy;
pub use errors::{ErrorCategory, FatalKind, Result, TetherError};
pub use ids::{CorrelationId, IdempotencyToken, SessionId};
