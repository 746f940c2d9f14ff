//! Gateway Error Taxonomy
//!
//! Command-level rejections surface synchronously; everything else resolves
//! the corresponding pending request's waiter with one of these values.
//! Orphan events are deliberately absent: they are an internal routing
//! outcome (logged and counted), never a caller-visible error.

use crate::domain::events::RawCode;
use crate::domain::screen::{ScreenNo, ScreenPoolError};

/// Errors surfaced by gateway commands and resolved requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The broker rejected the command synchronously; no asynchronous
    /// tracking was started.
    #[error("rejected by broker (status {0})")]
    RejectedBySystem(RawCode),

    /// A bounded resource (registration caps, condition pool) is full.
    #[error("capacity exceeded: {what} (limit {limit})")]
    CapacityExceeded {
        /// Which resource hit its cap.
        what: &'static str,
        /// The configured limit.
        limit: usize,
    },

    /// A request with the same correlation key is already pending.
    #[error("duplicate request {rq_name:?} (screen {screen:?})")]
    DuplicateRequest {
        /// Screen of the colliding request, if screen-scoped.
        screen: Option<ScreenNo>,
        /// Correlation key of the colliding request.
        rq_name: String,
    },

    /// The deadline passed with no terminal event.
    #[error("request timed out")]
    Timeout,

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// The connection dropped while the request was pending.
    #[error("connection lost")]
    ConnectionLost,

    /// An event's fields are structurally inconsistent; fatal to the one
    /// request it belongs to.
    #[error("protocol violation: {reason}")]
    ProtocolViolation {
        /// What was inconsistent.
        reason: String,
    },

    /// The command requires an established connection.
    #[error("not connected")]
    NotConnected,

    /// The screen still owns a pending query and cannot be closed.
    #[error("screen {0} has a query in flight")]
    ScreenBusy(ScreenNo),

    /// Screen pool failure.
    #[error(transparent)]
    Screen(#[from] ScreenPoolError),
}

impl GatewayError {
    /// Shorthand for a protocol violation with a formatted reason.
    #[must_use]
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            reason: reason.into(),
        }
    }
}
