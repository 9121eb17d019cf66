//! Per-section validators.

use crate::schema::LocusConfig;

use super::helpers::{validate_range, validate_segment};

pub(crate) fn validate_connectivity(errors: &mut Vec<String>, config: &LocusConfig) {
    validate_range(
        errors,
        "connectivity.reachability_debounce_ms",
        config.connectivity.reachability_debounce_ms,
        0,
        10_000,
    );
    validate_range(
        errors,
        "connectivity.lifecycle_debounce_ms",
        config.connectivity.lifecycle_debounce_ms,
        0,
        5000,
    );
}

pub(crate) fn validate_presence(errors: &mut Vec<String>, config: &LocusConfig) {
    validate_segment(errors, "presence.status_path", &config.presence.status_path);
    validate_range(
        errors,
        "presence.write_timeout_ms",
        config.presence.write_timeout_ms,
        500,
        30_000,
    );
    validate_range(
        errors,
        "presence.retry_backoff_ms",
        config.presence.retry_backoff_ms,
        100,
        30_000,
    );
}

pub(crate) fn validate_push(errors: &mut Vec<String>, config: &LocusConfig) {
    validate_segment(errors, "push.users_collection", &config.push.users_collection);
    validate_range(
        errors,
        "push.token_timeout_ms",
        config.push.token_timeout_ms,
        1000,
        60_000,
    );
    validate_range(
        errors,
        "push.read_timeout_ms",
        config.push.read_timeout_ms,
        500,
        30_000,
    );
    validate_range(
        errors,
        "push.write_timeout_ms",
        config.push.write_timeout_ms,
        500,
        30_000,
    );
}

pub(crate) fn validate_settings(errors: &mut Vec<String>, config: &LocusConfig) {
    validate_segment(errors, "settings.collection", &config.settings.collection);
    validate_range(
        errors,
        "settings.read_timeout_ms",
        config.settings.read_timeout_ms,
        500,
        30_000,
    );
    validate_range(
        errors,
        "settings.write_timeout_ms",
        config.settings.write_timeout_ms,
        500,
        30_000,
    );
}

pub(crate) fn validate_cache(errors: &mut Vec<String>, config: &LocusConfig) {
    validate_segment(errors, "cache.file_name", &config.cache.file_name);
}
