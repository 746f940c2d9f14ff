//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the gateway facade, the event-router task, and the
//! port interfaces that define how the domain interacts with the broker.

/// Port interfaces for the broker command surface.
pub mod ports;

/// Gateway facade and event-router services.
pub mod services;
