//! Runtime configuration read from the environment.
//!
//! Every knob has a default; unset or unparsable values fall back to it.
//! `from_lookup` takes the variable source as a closure so tests never
//! mutate the process environment.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_ROOM_GRACE_SECS: u64 = 60;
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_EVENT_LOG_RETENTION: usize = 10_000;
pub const DEFAULT_ROOM_SWEEP_INTERVAL_SECS: u64 = 5;

/// Per-room limits, handed to every `Room` the registry creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    /// How long an empty room survives before the reaper destroys it.
    pub grace_period: Duration,
    /// Bound of each connection's outbound queue.
    pub outbound_capacity: usize,
    /// Most recent events kept in a room's log.
    pub log_retention: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(DEFAULT_ROOM_GRACE_SECS),
            outbound_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            log_retention: DEFAULT_EVENT_LOG_RETENTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub room: RoomConfig,
    pub heartbeat_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            room: RoomConfig::default(),
            heartbeat_timeout: Duration::from_secs(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_ROOM_SWEEP_INTERVAL_SECS),
        }
    }
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let positive = |key: &str, default: u64| parse(key).filter(|v| *v > 0).unwrap_or(default);

        let port = lookup("PORT")
            .and_then(|v| v.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let count = |key: &str, default: usize| {
            parse(key)
                .and_then(|v| usize::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };
        let outbound_capacity = count("OUTBOUND_QUEUE_CAPACITY", DEFAULT_OUTBOUND_QUEUE_CAPACITY);
        let log_retention = count("EVENT_LOG_RETENTION", DEFAULT_EVENT_LOG_RETENTION);

        Self {
            port,
            room: RoomConfig {
                grace_period: Duration::from_secs(parse("ROOM_GRACE_SECS").unwrap_or(DEFAULT_ROOM_GRACE_SECS)),
                outbound_capacity,
                log_retention,
            },
            heartbeat_timeout: Duration::from_secs(positive("HEARTBEAT_TIMEOUT_SECS", DEFAULT_HEARTBEAT_TIMEOUT_SECS)),
            sweep_interval: Duration::from_secs(positive("ROOM_SWEEP_INTERVAL_SECS", DEFAULT_ROOM_SWEEP_INTERVAL_SECS)),
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
