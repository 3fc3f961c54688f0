// src/debug.rs
//
// Process-wide debug mode.  While it is on, every augmenter runs sequentially
// on the calling thread.

use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;

use crate::constants::ENV_DEBUG;

static DEBUG_MODE: Lazy<AtomicBool> = Lazy::new(|| AtomicBool::new(env_flag(ENV_DEBUG)));

/// Current debug mode; initialised from `AUGFLOW_DEBUG` on first use.
pub fn get_current_debug_mode() -> bool {
    DEBUG_MODE.load(Ordering::SeqCst)
}

pub fn set_debug_mode(enabled: bool) {
    DEBUG_MODE.store(enabled, Ordering::SeqCst);
}

/// `1`, `true`, `yes` and `on` (any case) count as set.
pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| parse_flag(&v).unwrap_or(false))
        .unwrap_or(false)
}

pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
