//! The process-wide allocator instance.
//!
//! Created on first use and never dropped. Every operation runs under one
//! `parking_lot::Mutex`, which is the single mutual-exclusion domain the
//! core allocator requires.

use std::cell::Cell;

use parking_lot::Mutex;
use tinypool_core::{
    AllocatorConfig, DEFAULT_LOG_CAPACITY, OomPolicy, PoolAllocator, ValidationMode,
};

use crate::libc_heap::LibcHeap;

/// Environment variable selecting the validation mode (`strict`|`hardened`).
pub const ENV_VALIDATION: &str = "TINYPOOL_VALIDATION";

/// Environment variable selecting the OOM policy (`error`|`abort`).
pub const ENV_OOM: &str = "TINYPOOL_OOM";

/// Environment variable turning on lifecycle recording: a record count, or
/// `on` for the default capacity. Recording is off when unset.
pub const ENV_LOG_CAPACITY: &str = "TINYPOOL_LOG_CAPACITY";

static GLOBAL_POOL: Mutex<Option<PoolAllocator<LibcHeap>>> = Mutex::new(None);

thread_local! {
    static IN_GLOBAL_POOL: Cell<bool> = const { Cell::new(false) };
}

struct ReentryGuard;

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        IN_GLOBAL_POOL.with(|flag| flag.set(false));
    }
}

fn enter() -> Option<ReentryGuard> {
    IN_GLOBAL_POOL.with(|flag| {
        if flag.get() {
            None
        } else {
            flag.set(true);
            Some(ReentryGuard)
        }
    })
}

fn parse_log_capacity(raw: &str) -> Option<usize> {
    let raw = raw.trim();
    match raw.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" => Some(DEFAULT_LOG_CAPACITY),
        "off" | "false" | "no" => Some(0),
        _ => raw.parse().ok(),
    }
}

/// Builds the global instance's configuration from the environment.
///
/// Unset or unrecognised values keep the defaults, which leave lifecycle
/// recording off.
#[must_use]
pub fn config_from_env() -> AllocatorConfig {
    let mut config = AllocatorConfig::default().with_log_capacity(0);
    if let Ok(raw) = std::env::var(ENV_VALIDATION) {
        config = config.with_validation(ValidationMode::from_str_loose(&raw));
    }
    if let Ok(raw) = std::env::var(ENV_OOM) {
        config = config.with_oom_policy(OomPolicy::from_str_loose(&raw));
    }
    if let Some(capacity) = std::env::var(ENV_LOG_CAPACITY)
        .ok()
        .and_then(|raw| parse_log_capacity(&raw))
    {
        config = config.with_log_capacity(capacity);
    }
    config
}

/// Runs `f` on the process-wide allocator, creating it if needed.
///
/// Returns `None` if called from inside another `with_global_pool` closure
/// on the same thread, which would otherwise deadlock.
pub fn with_global_pool<R>(f: impl FnOnce(&mut PoolAllocator<LibcHeap>) -> R) -> Option<R> {
    let _guard = enter()?;
    let mut slot = GLOBAL_POOL.lock();
    let pool =
        slot.get_or_insert_with(|| PoolAllocator::with_config(LibcHeap::new(), config_from_env()));
    Some(f(pool))
}
