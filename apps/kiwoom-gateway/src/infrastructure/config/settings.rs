//! Gateway Configuration Settings
//!
//! Configuration types for the gateway, loaded from environment variables
//! (`KIWOOM_GW_*`). Every knob has a default matching the broker's
//! documented limits and observed latency ceiling.

use std::time::Duration;

use crate::domain::realtime::RealtimeCaps;
use crate::domain::screen::ScreenPoolConfig;
use crate::infrastructure::push::PushConfig;

/// Screen pool settings.
#[derive(Debug, Clone)]
pub struct ScreenSettings {
    /// First allocatable screen number.
    pub first: u16,
    /// Last allocatable screen number.
    pub last: u16,
    /// Quarantine window for released screens.
    pub quarantine: Duration,
}

impl Default for ScreenSettings {
    fn default() -> Self {
        let defaults = ScreenPoolConfig::default();
        Self {
            first: defaults.first,
            last: defaults.last,
            quarantine: defaults.quarantine,
        }
    }
}

impl From<ScreenSettings> for ScreenPoolConfig {
    fn from(settings: ScreenSettings) -> Self {
        Self {
            first: settings.first,
            last: settings.last,
            reserved: Vec::new(),
            quarantine: settings.quarantine,
        }
    }
}

/// Request correlation settings.
#[derive(Debug, Clone)]
pub struct RequestSettings {
    /// Deadline for a correlated response (all pages).
    pub response_timeout: Duration,
    /// Sanity cap on continuation pages per logical request.
    pub page_cap: u32,
    /// Minimum interval between TR submissions (broker rate limit).
    pub pacing_interval: Duration,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(30),
            page_cap: 200,
            pacing_interval: Duration::from_millis(250),
        }
    }
}

/// Realtime registration settings.
#[derive(Debug, Clone)]
pub struct RealtimeSettings {
    /// Maximum instrument codes per screen.
    pub max_codes_per_screen: usize,
    /// Maximum FIDs per screen.
    pub max_fids_per_screen: usize,
    /// Maximum screens hosting realtime condition searches.
    pub max_condition_screens: usize,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        let caps = RealtimeCaps::default();
        Self {
            max_codes_per_screen: caps.max_codes_per_screen,
            max_fids_per_screen: caps.max_fids_per_screen,
            max_condition_screens: caps.max_condition_screens,
        }
    }
}

impl From<RealtimeSettings> for RealtimeCaps {
    fn from(settings: RealtimeSettings) -> Self {
        Self {
            max_codes_per_screen: settings.max_codes_per_screen,
            max_fids_per_screen: settings.max_fids_per_screen,
            max_condition_screens: settings.max_condition_screens,
        }
    }
}

/// Push channel settings.
#[derive(Debug, Clone)]
pub struct PushSettings {
    /// Capacity of the realtime tick channel.
    pub realtime_capacity: usize,
    /// Capacity of the execution channel.
    pub chejan_capacity: usize,
    /// Capacity of the notice channel.
    pub notice_capacity: usize,
    /// Capacity of the condition-hit channel.
    pub condition_capacity: usize,
    /// Capacity of the connection-state channel.
    pub connection_capacity: usize,
}

impl Default for PushSettings {
    fn default() -> Self {
        let defaults = PushConfig::default();
        Self {
            realtime_capacity: defaults.realtime_capacity,
            chejan_capacity: defaults.chejan_capacity,
            notice_capacity: defaults.notice_capacity,
            condition_capacity: defaults.condition_capacity,
            connection_capacity: defaults.connection_capacity,
        }
    }
}

impl From<PushSettings> for PushConfig {
    fn from(settings: PushSettings) -> Self {
        Self {
            realtime_capacity: settings.realtime_capacity,
            chejan_capacity: settings.chejan_capacity,
            notice_capacity: settings.notice_capacity,
            condition_capacity: settings.condition_capacity,
            connection_capacity: settings.connection_capacity,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Screen pool settings.
    pub screens: ScreenSettings,
    /// Request correlation settings.
    pub requests: RequestSettings,
    /// Realtime registration settings.
    pub realtime: RealtimeSettings,
    /// Push channel settings.
    pub push: PushSettings,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults; there
    /// are no required variables.
    #[must_use]
    pub fn from_env() -> Self {
        let screens = ScreenSettings {
            first: parse_env_u16("KIWOOM_GW_SCREEN_FIRST", ScreenSettings::default().first),
            last: parse_env_u16("KIWOOM_GW_SCREEN_LAST", ScreenSettings::default().last),
            quarantine: parse_env_duration_secs(
                "KIWOOM_GW_SCREEN_QUARANTINE_SECS",
                ScreenSettings::default().quarantine,
            ),
        };

        let requests = RequestSettings {
            response_timeout: parse_env_duration_secs(
                "KIWOOM_GW_RESPONSE_TIMEOUT_SECS",
                RequestSettings::default().response_timeout,
            ),
            page_cap: parse_env_u32("KIWOOM_GW_PAGE_CAP", RequestSettings::default().page_cap),
            pacing_interval: parse_env_duration_millis(
                "KIWOOM_GW_PACING_INTERVAL_MS",
                RequestSettings::default().pacing_interval,
            ),
        };

        let realtime = RealtimeSettings {
            max_codes_per_screen: parse_env_usize(
                "KIWOOM_GW_MAX_CODES_PER_SCREEN",
                RealtimeSettings::default().max_codes_per_screen,
            ),
            max_fids_per_screen: parse_env_usize(
                "KIWOOM_GW_MAX_FIDS_PER_SCREEN",
                RealtimeSettings::default().max_fids_per_screen,
            ),
            max_condition_screens: parse_env_usize(
                "KIWOOM_GW_MAX_CONDITION_SCREENS",
                RealtimeSettings::default().max_condition_screens,
            ),
        };

        let push = PushSettings {
            realtime_capacity: parse_env_usize(
                "KIWOOM_GW_REALTIME_CAPACITY",
                PushSettings::default().realtime_capacity,
            ),
            chejan_capacity: parse_env_usize(
                "KIWOOM_GW_CHEJAN_CAPACITY",
                PushSettings::default().chejan_capacity,
            ),
            notice_capacity: parse_env_usize(
                "KIWOOM_GW_NOTICE_CAPACITY",
                PushSettings::default().notice_capacity,
            ),
            condition_capacity: parse_env_usize(
                "KIWOOM_GW_CONDITION_CAPACITY",
                PushSettings::default().condition_capacity,
            ),
            connection_capacity: parse_env_usize(
                "KIWOOM_GW_CONNECTION_CAPACITY",
                PushSettings::default().connection_capacity,
            ),
        };

        Self {
            screens,
            requests,
            realtime,
            push,
        }
    }
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
