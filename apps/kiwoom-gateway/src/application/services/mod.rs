//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - [`GatewaySession`]: the synchronous command facade callers talk to
//! - [`EventRouter`]: the single consumer task draining the event queue

mod router;
mod session;

use parking_lot::Mutex;

pub use router::EventRouter;
pub use session::{ConditionSearchResult, GatewaySession, QuerySpec};

use crate::domain::condition::CatalogLoadSlot;
use crate::domain::events::ConnectionState;

/// State shared between the facade and the router.
#[derive(Debug, Default)]
pub(crate) struct SessionShared {
    /// Connection state machine, driven by connect-state events.
    pub(crate) connection: Mutex<ConnectionState>,
    /// Single-slot waiter for the global condition catalog load.
    pub(crate) catalog_load: CatalogLoadSlot,
}
