//! Push Channel Adapters
//!
//! Implements distribution of push traffic (realtime ticks, execution
//! notices, request messages, condition hits, connection transitions)
//! using tokio broadcast channels for efficient fan-out to multiple
//! subscribers.
//!
//! # Architecture
//!
//! The `PushHub` provides a separate channel per push category. Each
//! channel supports multiple receivers with configurable capacity; the
//! event router is the only sender.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::domain::condition::ConditionId;
use crate::domain::events::{ChejanKind, ConnectionState, EntryKind, Record};
use crate::domain::screen::ScreenNo;

// =============================================================================
// Push Messages
// =============================================================================

/// A routed realtime tick.
#[derive(Debug, Clone)]
pub struct RealtimeUpdate {
    /// Instrument code.
    pub code: String,
    /// Realtime type name.
    pub real_type: String,
    /// Screens whose registrations matched, sorted.
    pub screens: Vec<ScreenNo>,
    /// FID to raw-value pairs.
    pub fields: Record,
}

/// An execution / balance push.
#[derive(Debug, Clone)]
pub struct ChejanUpdate {
    /// Execution-data category.
    pub kind: ChejanKind,
    /// Number of items in the delivery.
    pub item_count: u32,
    /// FIDs present in the delivery.
    pub fids: Vec<u32>,
}

/// A human-readable notice attached to a request.
#[derive(Debug, Clone)]
pub struct Notice {
    /// Screen of the originating request.
    pub screen: ScreenNo,
    /// Correlation key of the originating request.
    pub rq_name: String,
    /// Operation code of the originating request.
    pub tr_code: String,
    /// Notice text.
    pub text: String,
}

/// A realtime condition hit, routed to its registered screens.
#[derive(Debug, Clone)]
pub struct ConditionHit {
    /// Condition that fired.
    pub condition: ConditionId,
    /// Instrument that entered or left.
    pub code: String,
    /// Entry direction.
    pub entry: EntryKind,
    /// Screens running this condition, sorted.
    pub screens: Vec<ScreenNo>,
}

// =============================================================================
// Push Hub
// =============================================================================

/// Configuration for push channel capacities.
#[derive(Debug, Clone, Copy)]
pub struct PushConfig {
    /// Capacity for the realtime tick channel.
    pub realtime_capacity: usize,
    /// Capacity for the execution channel.
    pub chejan_capacity: usize,
    /// Capacity for the notice channel.
    pub notice_capacity: usize,
    /// Capacity for the condition-hit channel.
    pub condition_capacity: usize,
    /// Capacity for the connection-state channel.
    pub connection_capacity: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            realtime_capacity: 10_000,
            chejan_capacity: 1_000,
            notice_capacity: 1_000,
            condition_capacity: 1_000,
            connection_capacity: 64,
        }
    }
}

/// Central hub for all push channels.
///
/// # Example
///
/// ```rust
/// use kiwoom_gateway::infrastructure::push::{PushConfig, PushHub};
///
/// let hub = PushHub::new(PushConfig::default());
///
/// // Get a receiver for realtime ticks
/// let mut rx = hub.realtime_rx();
///
/// // The event router sends routed updates
/// // hub.send_realtime(update);
/// ```
#[derive(Debug)]
pub struct PushHub {
    realtime_tx: broadcast::Sender<RealtimeUpdate>,
    chejan_tx: broadcast::Sender<ChejanUpdate>,
    notice_tx: broadcast::Sender<Notice>,
    condition_tx: broadcast::Sender<ConditionHit>,
    connection_tx: broadcast::Sender<ConnectionState>,
}

impl PushHub {
    /// Create a new push hub with the given configuration.
    #[must_use]
    pub fn new(config: PushConfig) -> Self {
        Self {
            realtime_tx: broadcast::channel(config.realtime_capacity).0,
            chejan_tx: broadcast::channel(config.chejan_capacity).0,
            notice_tx: broadcast::channel(config.notice_capacity).0,
            condition_tx: broadcast::channel(config.condition_capacity).0,
            connection_tx: broadcast::channel(config.connection_capacity).0,
        }
    }

    /// Create a new push hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(PushConfig::default())
    }

    // =========================================================================
    // Realtime Tick Channel
    // =========================================================================

    /// Send a routed realtime tick to all subscribers.
    ///
    /// Returns the number of receivers that got the message, or `None`
    /// if there are no active receivers.
    #[must_use]
    pub fn send_realtime(&self, update: RealtimeUpdate) -> Option<usize> {
        self.realtime_tx.send(update).ok()
    }

    /// Get a new receiver for realtime ticks.
    #[must_use]
    pub fn realtime_rx(&self) -> broadcast::Receiver<RealtimeUpdate> {
        self.realtime_tx.subscribe()
    }

    /// Get the number of active realtime receivers.
    #[must_use]
    pub fn realtime_receiver_count(&self) -> usize {
        self.realtime_tx.receiver_count()
    }

    // =========================================================================
    // Execution Channel
    // =========================================================================

    /// Send an execution push to all subscribers.
    #[must_use]
    pub fn send_chejan(&self, update: ChejanUpdate) -> Option<usize> {
        self.chejan_tx.send(update).ok()
    }

    /// Get a new receiver for execution pushes.
    #[must_use]
    pub fn chejan_rx(&self) -> broadcast::Receiver<ChejanUpdate> {
        self.chejan_tx.subscribe()
    }

    /// Get the number of active execution receivers.
    #[must_use]
    pub fn chejan_receiver_count(&self) -> usize {
        self.chejan_tx.receiver_count()
    }

    // =========================================================================
    // Notice Channel
    // =========================================================================

    /// Send a request notice to all subscribers.
    #[must_use]
    pub fn send_notice(&self, notice: Notice) -> Option<usize> {
        self.notice_tx.send(notice).ok()
    }

    /// Get a new receiver for request notices.
    #[must_use]
    pub fn notice_rx(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }

    /// Get the number of active notice receivers.
    #[must_use]
    pub fn notice_receiver_count(&self) -> usize {
        self.notice_tx.receiver_count()
    }

    // =========================================================================
    // Condition Hit Channel
    // =========================================================================

    /// Send a condition hit to all subscribers.
    #[must_use]
    pub fn send_condition_hit(&self, hit: ConditionHit) -> Option<usize> {
        self.condition_tx.send(hit).ok()
    }

    /// Get a new receiver for condition hits.
    #[must_use]
    pub fn condition_rx(&self) -> broadcast::Receiver<ConditionHit> {
        self.condition_tx.subscribe()
    }

    /// Get the number of active condition-hit receivers.
    #[must_use]
    pub fn condition_receiver_count(&self) -> usize {
        self.condition_tx.receiver_count()
    }

    // =========================================================================
    // Connection State Channel
    // =========================================================================

    /// Send a connection transition to all subscribers.
    #[must_use]
    pub fn send_connection(&self, state: ConnectionState) -> Option<usize> {
        self.connection_tx.send(state).ok()
    }

    /// Get a new receiver for connection transitions.
    #[must_use]
    pub fn connection_rx(&self) -> broadcast::Receiver<ConnectionState> {
        self.connection_tx.subscribe()
    }

    /// Get the number of active connection-state receivers.
    #[must_use]
    pub fn connection_receiver_count(&self) -> usize {
        self.connection_tx.receiver_count()
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Get statistics about all channels.
    #[must_use]
    pub fn stats(&self) -> PushStats {
        PushStats {
            realtime_receivers: self.realtime_receiver_count(),
            chejan_receivers: self.chejan_receiver_count(),
            notice_receivers: self.notice_receiver_count(),
            condition_receivers: self.condition_receiver_count(),
            connection_receivers: self.connection_receiver_count(),
        }
    }
}

/// Shared push hub reference.
pub type SharedPushHub = Arc<PushHub>;

/// Statistics about push channels.
#[derive(Debug, Clone, Default)]
pub struct PushStats {
    /// Number of realtime tick receivers.
    pub realtime_receivers: usize,
    /// Number of execution receivers.
    pub chejan_receivers: usize,
    /// Number of notice receivers.
    pub notice_receivers: usize,
    /// Number of condition-hit receivers.
    pub condition_receivers: usize,
    /// Number of connection-state receivers.
    pub connection_receivers: usize,
}

impl PushStats {
    /// Get total number of receivers across all channels.
    #[must_use]
    pub const fn total_receivers(&self) -> usize {
        self.realtime_receivers
            + self.chejan_receivers
            + self.notice_receivers
            + self.condition_receivers
            + self.connection_receivers
    }
}

// =============================================================================
// Tests
// =============================================================================
