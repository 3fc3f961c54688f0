// src/constants.rs
//
// Centralized constants for augflow to avoid hardcoded values throughout the codebase

use std::time::Duration;

/// Default number of samples per batch
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default base seed for sampling and per-worker transform seeding
pub const DEFAULT_SEED: u64 = 1;

/// Index groups queued per worker before the first batch is collected
/// (double buffering: one batch in work, one waiting)
pub const DEFAULT_PREFETCH_FACTOR: usize = 2;

/// How long a worker waits on its index channel before re-checking the abort flag
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(DEFAULT_POLL_INTERVAL_MS);

/// Sample field read by per-class samplers
pub const DEFAULT_LABEL_KEY: &str = "label";

/// Worker threads are named `{prefix}-{slot}`
pub const WORKER_THREAD_PREFIX: &str = "augflow-worker";

// ============================================================================
// Environment variables
// ============================================================================

/// Enables the global debug mode (forces sequential augmentation)
pub const ENV_DEBUG: &str = "AUGFLOW_DEBUG";

/// Worker count: `auto` or an integer (`0` = sequential)
pub const ENV_NUM_WORKERS: &str = "AUGFLOW_NUM_WORKERS";

pub const ENV_SEED: &str = "AUGFLOW_SEED";

pub const ENV_BATCH_SIZE: &str = "AUGFLOW_BATCH_SIZE";

pub const ENV_DROP_LAST: &str = "AUGFLOW_DROP_LAST";
