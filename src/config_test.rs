use super::*;
use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_when_nothing_set() {
    let config = Config::from_lookup(|_| None);
    assert_eq!(config, Config::default());
    assert_eq!(config.port, 3000);
    assert_eq!(config.room.grace_period, Duration::from_secs(60));
    assert_eq!(config.heartbeat_timeout, Duration::from_secs(30));
    assert_eq!(config.room.outbound_capacity, 256);
    assert_eq!(config.room.log_retention, 10_000);
    assert_eq!(config.sweep_interval, Duration::from_secs(5));
}

#[test]
fn overrides_are_applied() {
    let config = Config::from_lookup(lookup_from(&[
        ("PORT", "8080"),
        ("ROOM_GRACE_SECS", "0"),
        ("HEARTBEAT_TIMEOUT_SECS", "10"),
        ("OUTBOUND_QUEUE_CAPACITY", "16"),
        ("EVENT_LOG_RETENTION", "100"),
        ("ROOM_SWEEP_INTERVAL_SECS", " 2 "),
    ]));
    assert_eq!(config.port, 8080);
    assert_eq!(config.room.grace_period, Duration::ZERO);
    assert_eq!(config.heartbeat_timeout, Duration::from_secs(10));
    assert_eq!(config.room.outbound_capacity, 16);
    assert_eq!(config.room.log_retention, 100);
    assert_eq!(config.sweep_interval, Duration::from_secs(2));
}

#[test]
fn invalid_values_fall_back_to_defaults() {
    let config = Config::from_lookup(lookup_from(&[
        ("PORT", "not-a-port"),
        ("ROOM_GRACE_SECS", "-5"),
        ("HEARTBEAT_TIMEOUT_SECS", "0"),
        ("OUTBOUND_QUEUE_CAPACITY", "0"),
        ("EVENT_LOG_RETENTION", "lots"),
    ]));
    assert_eq!(config, Config::default());
}
