// src/augment/abort.rs
//
// Shared abort signal for one worker pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Monotonic boolean shared by the coordinator and every worker of a pool.
///
/// Once set it stays set; a new pool gets a new flag.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// True if both handles refer to the same flag.
    pub fn same_as(&self, other: &AbortFlag) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Sets the flag if the owning thread unwinds.
pub(crate) struct AbortOnPanic(pub(crate) AbortFlag);

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.set();
        }
    }
}
