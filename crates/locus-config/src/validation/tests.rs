//! Tests for the full validation pipeline.

use super::*;

#[test]
fn default_config_validates() {
    let config = LocusConfig::default();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_reachability_debounce_too_large() {
    let mut config = LocusConfig::default();
    config.connectivity.reachability_debounce_ms = 60_000;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("connectivity.reachability_debounce_ms"));
}

#[test]
fn zero_debounce_is_allowed() {
    let mut config = LocusConfig::default();
    config.connectivity.reachability_debounce_ms = 0;
    config.connectivity.lifecycle_debounce_ms = 0;
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_presence_timeout_too_small() {
    let mut config = LocusConfig::default();
    config.presence.write_timeout_ms = 10;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("presence.write_timeout_ms"));
}

#[test]
fn catches_empty_status_path() {
    let mut config = LocusConfig::default();
    config.presence.status_path = "  ".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("presence.status_path must not be empty"));
}

#[test]
fn catches_nested_collection_name() {
    let mut config = LocusConfig::default();
    config.settings.collection = "users/prefs".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("settings.collection"));
}

#[test]
fn collects_multiple_errors() {
    let mut config = LocusConfig::default();
    config.push.token_timeout_ms = 0;
    config.settings.write_timeout_ms = 100_000;
    config.cache.file_name = String::new();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("push.token_timeout_ms"));
    assert!(err.contains("settings.write_timeout_ms"));
    assert!(err.contains("cache.file_name"));
    assert_eq!(err.matches("; ").count(), 2);
}

#[test]
fn catches_push_read_timeout_out_of_range() {
    let mut config = LocusConfig::default();
    config.push.read_timeout_ms = 100;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("push.read_timeout_ms"));
    assert!(!err.contains("push.write_timeout_ms"));
}
