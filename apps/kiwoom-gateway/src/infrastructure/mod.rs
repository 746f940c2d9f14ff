//! Infrastructure Layer - Adapters and runtime plumbing.
//!
//! This layer contains the delivery-path primitives and the operational
//! concerns around the domain core.

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Push channel adapters for caller-visible streams.
pub mod push;

/// The single ordered inbound event path.
pub mod queue;

/// OpenTelemetry tracing integration.
pub mod telemetry;
