// src/lib.rs
//
// Crate root: module tree plus the public re-exports.

//! Parallel batch loading and augmentation.
//!
//! A sampler decides which dataset indices form each batch, a pool of worker
//! threads fetches and transforms the batches, and the coordinator hands them
//! to the caller in collection order.  See [`augment::Augmenter`].

pub mod constants;
pub mod debug;
pub mod error;

pub mod augment;
pub mod data_loader;

pub use augment::{AbortFlag, Augmenter, BatchStream, Batches};
pub use data_loader::{
    AugmenterOptions, Batch, DataLoader, DataManager, DataSource, Dataset, NumWorkers, Sample,
    SamplerKind, Transform,
};
pub use debug::{get_current_debug_mode, set_debug_mode};
pub use error::{AugmentError, Result};
