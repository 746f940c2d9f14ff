//! Configuration and dependency wiring.

mod settings;

pub use settings::{
    GatewayConfig, PushSettings, RealtimeSettings, RequestSettings, ScreenSettings,
};
