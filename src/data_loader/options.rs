// src/data_loader/options.rs
//!
//! Options shared by every augmenter.
//!
//! Builder helpers are provided so callers can write a fluent style:
//!
//! let opts = AugmenterOptions::default()
//!     .with_batch_size(128)
//!     .drop_last(true)
//!     .seed(42)
//!     .num_workers(NumWorkers::Count(8))
//!     .prefetch_factor(2)
//!     .poll_interval(Duration::from_millis(50));
//!
//! `from_env()` overlays `AUGFLOW_*` environment variables on top.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_POLL_INTERVAL, DEFAULT_PREFETCH_FACTOR, DEFAULT_SEED,
    ENV_BATCH_SIZE, ENV_DROP_LAST, ENV_NUM_WORKERS, ENV_SEED,
};
use crate::debug::parse_flag;
use crate::error::AugmentError;

/// Number of augmentation workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumWorkers {
    /// One worker per available CPU.
    #[default]
    Auto,
    /// Exactly this many workers; `0` selects sequential augmentation.
    Count(usize),
}

impl NumWorkers {
    pub fn resolve(self) -> usize {
        match self {
            NumWorkers::Auto => num_cpus::get().max(1),
            NumWorkers::Count(n) => n,
        }
    }

    pub fn is_zero(self) -> bool {
        self == NumWorkers::Count(0)
    }
}

impl FromStr for NumWorkers {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(NumWorkers::Auto);
        }
        s.parse::<usize>()
            .map(NumWorkers::Count)
            .map_err(|_| format!("expected 'auto' or a worker count, got '{}'", s))
    }
}

impl fmt::Display for NumWorkers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumWorkers::Auto => write!(f, "auto"),
            NumWorkers::Count(n) => write!(f, "{}", n),
        }
    }
}

impl From<usize> for NumWorkers {
    fn from(n: usize) -> Self {
        NumWorkers::Count(n)
    }
}

#[derive(Debug, Clone)]
pub struct AugmenterOptions {
    /// Number of samples per batch (element samplers only).
    pub batch_size: usize,
    /// Whether to drop the final, possibly incomplete batch.
    pub drop_last: bool,
    /// Base seed for the sampler and for per-worker transform seeding.
    pub seed: u64,
    /// Number of workers.  `Count(0)` forces sequential augmentation.
    pub num_workers: NumWorkers,
    /// Index groups queued per worker before the first batch is collected.
    pub prefetch_factor: usize,
    /// Worker poll timeout; also the coordinator's abort re-check period.
    pub poll_interval: Duration,
}

impl Default for AugmenterOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            drop_last: false,
            seed: DEFAULT_SEED,
            num_workers: NumWorkers::Auto,
            prefetch_factor: DEFAULT_PREFETCH_FACTOR,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl AugmenterOptions {
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn drop_last(mut self, yes: bool) -> Self {
        self.drop_last = yes;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn num_workers(mut self, n: impl Into<NumWorkers>) -> Self {
        self.num_workers = n.into();
        self
    }

    pub fn prefetch_factor(mut self, factor: usize) -> Self {
        self.prefetch_factor = factor.max(1);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overlay `AUGFLOW_NUM_WORKERS`, `AUGFLOW_SEED`, `AUGFLOW_BATCH_SIZE` and
    /// `AUGFLOW_DROP_LAST` when they are set.
    pub fn from_env(self) -> Result<Self, AugmentError> {
        self.overlay(|key| std::env::var(key).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AugmentError> {
        let invalid = |key: &str, value: &str| {
            AugmentError::InvalidOption(format!("{}='{}'", key, value))
        };

        if let Some(v) = lookup(ENV_NUM_WORKERS) {
            self.num_workers = v.parse().map_err(|_| invalid(ENV_NUM_WORKERS, &v))?;
        }
        if let Some(v) = lookup(ENV_SEED) {
            self.seed = v.trim().parse().map_err(|_| invalid(ENV_SEED, &v))?;
        }
        if let Some(v) = lookup(ENV_BATCH_SIZE) {
            self.batch_size = v.trim().parse().map_err(|_| invalid(ENV_BATCH_SIZE, &v))?;
        }
        if let Some(v) = lookup(ENV_DROP_LAST) {
            self.drop_last = parse_flag(&v).ok_or_else(|| invalid(ENV_DROP_LAST, &v))?;
        }
        Ok(self)
    }
}
