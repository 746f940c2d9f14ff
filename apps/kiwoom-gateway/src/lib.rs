#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Kiwoom Gateway - Request Correlation & Realtime Multiplexer
//!
//! A correlation and multiplexing layer between the Kiwoom OpenAPI
//! synchronous command surface (issue a request, get an immediate status
//! code) and its asynchronous event stream (the data arrives later, out
//! of band, tagged with identifiers chosen at request time).
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core correlation state machines and data types
//!   - `screen`: bounded screen-number allocation with quarantine
//!   - `correlation`: pending-request tracking and continuation pages
//!   - `realtime`: registration bookkeeping with reverse-index fan-out
//!   - `condition`: condition-search identity and catalog parsing
//!   - `events`: inbound event variants and broker status codes
//!   - `order`: order ticket types
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: interface to the broker control's command surface
//!   - `services`: the gateway facade and the event-router task
//!
//! - **Infrastructure**: Adapters and runtime plumbing
//!   - `queue`: the single ordered inbound event path
//!   - `push`: channel-based distribution of push traffic
//!   - `config`: configuration loading
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: OpenTelemetry tracing integration
//!
//! # Data Flow
//!
//! ```text
//! Broker callbacks ──► Event Queue ──► Event Router ──┬─► Correlator ──► query futures
//!                                                     ├─► Registry   ──► Push Hub ──► subscribers
//!                                                     └─► Connection state
//!
//! Callers ──► Gateway Session ──► OpenApiPort ──► Broker (immediate status)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Correlation state machines with no transport dependencies.
pub mod domain;

/// Application layer - Facade, router, and port definitions.
pub mod application;

/// Infrastructure layer - Delivery-path primitives and operational plumbing.
pub mod infrastructure;

/// Crate-level error taxonomy.
pub mod error;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::condition::{ConditionId, SearchMode, parse_catalog};
pub use domain::correlation::{
    AccumulationPolicy, CorrelationOutcome, Correlator, PageOutcome, QueryResult, RequestHandle,
    RequestKey,
};
pub use domain::events::{
    ChejanKind, ConnectionState, Continuation, EntryKind, InboundEvent, RawCode, Record,
};
pub use domain::order::{OrderAction, OrderTicket, PriceCondition};
pub use domain::realtime::{
    RealtimeCaps, RealtimeRegistry, RegMode, RegistryStats, RemoveTarget,
};
pub use domain::screen::{ScreenLease, ScreenNo, ScreenPool, ScreenPoolConfig, ScreenPoolError};

// Application surface
pub use application::ports::{LoginInfoTag, OpenApiPort};
pub use application::services::{ConditionSearchResult, EventRouter, GatewaySession, QuerySpec};

// Errors
pub use error::GatewayError;

// Infrastructure config
pub use infrastructure::config::{
    GatewayConfig, PushSettings, RealtimeSettings, RequestSettings, ScreenSettings,
};

// Event path (for the broker bridge and integration tests)
pub use infrastructure::queue::{EventSink, EventStream, QueueClosed, event_channel};

// Push hub
pub use infrastructure::push::{
    ChejanUpdate, ConditionHit, Notice, PushConfig, PushHub, PushStats, RealtimeUpdate,
    SharedPushHub,
};

// Metrics
pub use infrastructure::metrics::{get_metrics_handle, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
