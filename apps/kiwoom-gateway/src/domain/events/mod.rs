//! Inbound Event Types
//!
//! Tagged variants for everything the broker delivers asynchronously:
//! query (TR) data, realtime ticks, execution notices, connection state
//! transitions, and condition-search traffic.
//!
//! The wire format is never parsed here: payloads are opaque records of
//! field-name to raw-string pairs, exactly as the callback surface hands
//! them over. Events are immutable once constructed and consumed exactly
//! once by the event router.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::condition::ConditionId;
use super::screen::ScreenNo;

// =============================================================================
// Raw Status Codes
// =============================================================================

/// Immediate status code returned by every broker command.
///
/// Zero means accepted; negative values are broker-specific rejection
/// reasons. The literal code-to-message table is external configuration
/// and deliberately not reproduced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawCode(pub i32);

impl RawCode {
    /// The broker's "accepted" status.
    pub const OK: Self = Self(0);

    /// Quote-request burst rejection (the broker's rate-limit signal).
    pub const SISE_OVERFLOW: Self = Self(-200);

    /// Whether the command was accepted.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        self.0 >= 0
    }

    /// Whether the command was rejected.
    #[must_use]
    pub const fn is_rejected(self) -> bool {
        self.0 < 0
    }

    /// The underlying integer value.
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for RawCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Payload Records
// =============================================================================

/// One row of TR response data or one realtime tick: field name to raw value.
///
/// Ordered so accumulated pages serialize deterministically.
pub type Record = BTreeMap<String, String>;

// =============================================================================
// Flags
// =============================================================================

/// Continuation marker on paginated TR responses.
///
/// The broker tags responses with `"2"` when further pages exist and `"0"`
/// otherwise; follow-up submissions for the same logical query carry the
/// same marker back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Continuation {
    /// Final (or only) page.
    #[default]
    None,
    /// More pages follow; the caller must re-issue with this flag set.
    More,
}

impl Continuation {
    /// Parse the broker's prev/next marker.
    #[must_use]
    pub fn from_flag(flag: &str) -> Self {
        if flag.trim() == "2" {
            Self::More
        } else {
            Self::None
        }
    }

    /// The marker value submitted back to the broker.
    #[must_use]
    pub const fn as_flag(self) -> i32 {
        match self {
            Self::None => 0,
            Self::More => 2,
        }
    }

    /// Whether more pages follow.
    #[must_use]
    pub const fn has_more(self) -> bool {
        matches!(self, Self::More)
    }
}

/// Session connection lifecycle.
///
/// Driven exclusively by [`InboundEvent::ConnectState`] deliveries after a
/// connect command: code 0 lands in `Connected`, anything negative in
/// `Disconnected` with the broker's reason attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No session.
    #[default]
    Disconnected,
    /// Login window opened, waiting for the connect-state event.
    Connecting,
    /// Live session.
    Connected,
    /// Session ended by the broker with a reason code.
    DisconnectedWithReason(RawCode),
}

impl ConnectionState {
    /// Whether commands that need a session may proceed.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Short label for logging and the connection-state gauge.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected | Self::DisconnectedWithReason(_) => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Execution-data category (the broker's "gubun" field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChejanKind {
    /// Order accepted / filled notification.
    OrderAccepted,
    /// Account balance update.
    Balance,
    /// Special out-of-band signal.
    SpecialSignal,
}

impl ChejanKind {
    /// Parse the broker's gubun marker ("0", "1", "3").
    #[must_use]
    pub fn from_gubun(gubun: &str) -> Option<Self> {
        match gubun.trim() {
            "0" => Some(Self::OrderAccepted),
            "1" => Some(Self::Balance),
            "3" => Some(Self::SpecialSignal),
            _ => None,
        }
    }
}

/// Direction of a realtime condition hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// The instrument entered the condition set ("I").
    Entered,
    /// The instrument left the condition set ("D").
    Left,
}

impl EntryKind {
    /// Parse the broker's entry marker.
    #[must_use]
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker.trim() {
            "I" => Some(Self::Entered),
            "D" => Some(Self::Left),
            _ => None,
        }
    }
}

// =============================================================================
// Inbound Events
// =============================================================================

/// One asynchronous delivery from the broker callback surface.
///
/// Every variant mirrors one callback of the external control. Events
/// carrying a (screen, request-name) pair must match a pending request or
/// they are treated as orphans: logged, counted, dropped, never fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InboundEvent {
    /// Query response data is ready (possibly one page of many).
    TrData {
        /// Screen the request was issued on.
        screen: ScreenNo,
        /// Caller-chosen correlation key.
        rq_name: String,
        /// Operation code of the originating request.
        tr_code: String,
        /// Record name within the TR output block.
        record_name: String,
        /// Whether further pages follow.
        prev_next: Continuation,
        /// Rows delivered with this page.
        rows: Vec<Record>,
    },
    /// Realtime tick for a registered instrument. Carries no screen tag;
    /// routing is by instrument code through the reverse index.
    RealData {
        /// Instrument code.
        code: String,
        /// Realtime type name (e.g. quote, execution).
        real_type: String,
        /// FID to raw-value pairs.
        fields: Record,
    },
    /// Human-readable notice attached to a request.
    Message {
        /// Screen of the originating request.
        screen: ScreenNo,
        /// Correlation key of the originating request.
        rq_name: String,
        /// Operation code of the originating request.
        tr_code: String,
        /// Notice text.
        text: String,
    },
    /// Execution / balance push.
    Chejan {
        /// Execution-data category.
        kind: ChejanKind,
        /// Number of items in this delivery.
        item_count: u32,
        /// FIDs present in this delivery.
        fids: Vec<u32>,
    },
    /// Connection state transition (0 connected, negative disconnected).
    ConnectState {
        /// Transition status code.
        code: RawCode,
    },
    /// Realtime condition-search hit.
    RealCondition {
        /// Instrument code that entered or left.
        code: String,
        /// Entry direction.
        entry: EntryKind,
        /// Condition that fired.
        condition: ConditionId,
    },
    /// Condition-search result snapshot (possibly paginated).
    TrCondition {
        /// Screen the search was issued on.
        screen: ScreenNo,
        /// Matching instrument codes.
        codes: Vec<String>,
        /// Condition that was searched.
        condition: ConditionId,
        /// Whether further pages follow.
        prev_next: Continuation,
    },
    /// Server-side condition catalog finished loading.
    ConditionListLoaded {
        /// Whether the load succeeded.
        ok: bool,
        /// Broker-provided detail message.
        message: String,
    },
}

impl InboundEvent {
    /// Short variant name for logging and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TrData { .. } => "tr_data",
            Self::RealData { .. } => "real_data",
            Self::Message { .. } => "message",
            Self::Chejan { .. } => "chejan",
            Self::ConnectState { .. } => "connect_state",
            Self::RealCondition { .. } => "real_condition",
            Self::TrCondition { .. } => "tr_condition",
            Self::ConditionListLoaded { .. } => "condition_list_loaded",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(0, true ; "zero is accepted")]
    #[test_case(1, true ; "positive is accepted")]
    #[test_case(-100, false ; "login failure is rejected")]
    #[test_case(-200, false ; "rate limit is rejected")]
    fn raw_code_classifies_statuses(code: i32, ok: bool) {
        assert_eq!(RawCode(code).is_ok(), ok);
        assert_eq!(RawCode(code).is_rejected(), !ok);
    }

    #[test]
    fn continuation_parses_broker_marker() {
        assert_eq!(Continuation::from_flag("2"), Continuation::More);
        assert_eq!(Continuation::from_flag("0"), Continuation::None);
        assert_eq!(Continuation::from_flag(""), Continuation::None);
        assert_eq!(Continuation::from_flag(" 2 "), Continuation::More);
    }

    #[test]
    fn continuation_round_trips_to_flag() {
        assert_eq!(Continuation::More.as_flag(), 2);
        assert_eq!(Continuation::None.as_flag(), 0);
    }

    #[test_case("0", Some(ChejanKind::OrderAccepted) ; "order accepted")]
    #[test_case("1", Some(ChejanKind::Balance) ; "balance")]
    #[test_case("3", Some(ChejanKind::SpecialSignal) ; "special signal")]
    #[test_case("2", None ; "undefined gubun")]
    fn chejan_kind_parses_gubun(gubun: &str, expected: Option<ChejanKind>) {
        assert_eq!(ChejanKind::from_gubun(gubun), expected);
    }

    #[test]
    fn entry_kind_parses_markers() {
        assert_eq!(EntryKind::from_marker("I"), Some(EntryKind::Entered));
        assert_eq!(EntryKind::from_marker("D"), Some(EntryKind::Left));
        assert_eq!(EntryKind::from_marker("X"), None);
    }

    #[test]
    fn event_kind_labels_are_stable() {
        let ev = InboundEvent::ConnectState { code: RawCode::OK };
        assert_eq!(ev.kind(), "connect_state");
    }
}
