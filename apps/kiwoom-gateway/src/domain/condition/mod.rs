//! Condition-Search Types
//!
//! Server-stored search conditions are addressed by (name, index). The
//! catalog arrives as a single delimited string; searches ride the regular
//! request correlator with a synthetic request name, and realtime searches
//! additionally occupy a dedicated capacity pool in the realtime registry.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::GatewayError;

/// Operation code recorded when condition-search traffic rides the
/// request correlator.
pub const SEARCH_OP_CODE: &str = "CONDITION_SEARCH";

/// Field name under which snapshot instrument codes fold into generic
/// result records.
pub const CODE_FIELD: &str = "code";

// =============================================================================
// Condition Identity
// =============================================================================

/// One server-stored search condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConditionId {
    /// Condition name as stored on the server.
    pub name: String,
    /// Server-side index of the condition.
    pub index: u32,
}

impl ConditionId {
    /// Create a condition identity.
    #[must_use]
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }

    /// Synthetic correlation key for search traffic on this condition.
    ///
    /// Search responses carry (screen, name, index) instead of a caller
    /// request name; this key lets them share the request correlator.
    #[must_use]
    pub fn rq_name(&self) -> String {
        format!("COND_{}_{}", self.index, self.name)
    }
}

impl std::fmt::Display for ConditionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}^{}", self.index, self.name)
    }
}

/// Search execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    /// One-shot snapshot query.
    OneShot,
    /// Snapshot plus a realtime stream of entries/exits.
    Realtime,
    /// Follow-up page of a previous snapshot.
    Continuation,
}

impl SearchMode {
    /// The broker's search marker (0 normal, 1 realtime, 2 continuation).
    #[must_use]
    pub const fn as_flag(self) -> i32 {
        match self {
            Self::OneShot => 0,
            Self::Realtime => 1,
            Self::Continuation => 2,
        }
    }
}

// =============================================================================
// Catalog Parsing
// =============================================================================

/// Parse the broker's condition catalog string ("index^name;index^name;…").
///
/// Malformed entries are skipped; the broker terminates the list with a
/// trailing separator.
#[must_use]
pub fn parse_catalog(raw: &str) -> Vec<ConditionId> {
    raw.split(';')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let (index, name) = entry.split_once('^')?;
            let index = index.trim().parse::<u32>().ok()?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(ConditionId::new(name, index))
        })
        .collect()
}

// =============================================================================
// Catalog Load Slot
// =============================================================================

/// Single-slot waiter for the global (screen-less) catalog load.
///
/// The load is a one-shot request/response with no channel of its own, so
/// one in-flight load is tracked here instead of in the correlator.
#[derive(Debug, Default)]
pub struct CatalogLoadSlot {
    waiter: Mutex<Option<oneshot::Sender<Result<(), GatewayError>>>>,
}

impl CatalogLoadSlot {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a load in flight.
    ///
    /// Fails with [`GatewayError::DuplicateRequest`] while a previous load
    /// is still unresolved.
    pub fn begin(&self) -> Result<oneshot::Receiver<Result<(), GatewayError>>, GatewayError> {
        let mut waiter = self.waiter.lock();
        if waiter.is_some() {
            return Err(GatewayError::DuplicateRequest {
                screen: None,
                rq_name: "condition catalog load".to_string(),
            });
        }
        let (tx, rx) = oneshot::channel();
        *waiter = Some(tx);
        Ok(rx)
    }

    /// Resolve the in-flight load, if any. Returns whether a waiter existed.
    pub fn resolve(&self, result: Result<(), GatewayError>) -> bool {
        match self.waiter.lock().take() {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Drop the in-flight load without resolving it (synchronous rejection).
    pub fn abort(&self) {
        self.waiter.lock().take();
    }

    /// Whether a load is currently in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.waiter.lock().is_some()
    }
}

// =============================================================================
// Tests
// =============================================================================
