// src/augment/mod.rs

//! Augmenters: turn a sampler's index groups into transformed batches.
//!
//! [`Augmenter`] is the entry point.  It picks the
//! [`SequentialAugmenter`] when the global debug mode is on or zero workers
//! are requested, and the [`ParallelAugmenter`] otherwise.  Both implement
//! [`BatchStream`], so callers never need to know which one they got.

pub mod abort;
pub mod parallel;
pub mod pool;
pub mod sequential;
pub(crate) mod worker;

pub use abort::AbortFlag;
pub use parallel::{ParallelAugmenter, ParallelPass};
pub use pool::WorkerPool;
pub use sequential::{SequentialAugmenter, SequentialPass};
pub use worker::{WorkerExit, WorkerState};

use tracing::debug;

use crate::data_loader::batch::Batch;
use crate::data_loader::dataloader::DataLoader;
use crate::data_loader::dataset::DataSource;
use crate::data_loader::options::AugmenterOptions;
use crate::data_loader::sampler::SamplerSource;
use crate::data_loader::transform::Transform;
use crate::debug::get_current_debug_mode;
use crate::error::AugmentError;

/// Iterator over the batches of one pass.
pub type Batches<'a> = Box<dyn Iterator<Item = Result<Batch, AugmentError>> + 'a>;

/// A source of augmented batches.  Every call to [`BatchStream::batches`]
/// starts a new pass over the sampler.
pub trait BatchStream: Send {
    fn batches(&mut self) -> Result<Batches<'_>, AugmentError>;

    /// Batches per pass.
    fn num_batches(&self) -> usize;

    /// `0` for the sequential augmenter.
    fn num_workers(&self) -> usize;

    /// Abort flag of the current pass, if the stream runs workers.
    fn abort_flag(&self) -> Option<AbortFlag> {
        None
    }
}

/// Chooses and owns the concrete augmenter.
pub struct Augmenter {
    inner: Box<dyn BatchStream>,
}

impl Augmenter {
    pub fn new(
        loader: DataLoader,
        sampler: impl Into<SamplerSource>,
        transforms: Option<Box<dyn Transform>>,
        opts: &AugmenterOptions,
    ) -> Result<Self, AugmentError> {
        let sampler = sampler
            .into()
            .into_batch_sampler(opts.batch_size, opts.drop_last)?;

        let inner: Box<dyn BatchStream> = if get_current_debug_mode() || opts.num_workers.is_zero() {
            debug!("using sequential augmenter");
            Box::new(SequentialAugmenter::new(loader, sampler, transforms, opts.seed))
        } else {
            let workers = opts.num_workers.resolve();
            debug!(workers, "using parallel augmenter");
            Box::new(ParallelAugmenter::new(loader, sampler, transforms, workers, opts)?)
        };
        Ok(Self { inner })
    }

    /// Build the data loader from raw data first.
    pub fn from_data(
        data: impl Into<DataSource>,
        sampler: impl Into<SamplerSource>,
        transforms: Option<Box<dyn Transform>>,
        opts: &AugmenterOptions,
    ) -> Result<Self, AugmentError> {
        Self::new(DataLoader::new(data)?, sampler, transforms, opts)
    }

    /// Start a pass.
    pub fn batches(&mut self) -> Result<Batches<'_>, AugmentError> {
        self.inner.batches()
    }

    pub fn num_batches(&self) -> usize {
        self.inner.num_batches()
    }

    pub fn num_workers(&self) -> usize {
        self.inner.num_workers()
    }

    pub fn is_parallel(&self) -> bool {
        self.inner.num_workers() > 0
    }

    pub fn abort_flag(&self) -> Option<AbortFlag> {
        self.inner.abort_flag()
    }
}

impl BatchStream for Augmenter {
    fn batches(&mut self) -> Result<Batches<'_>, AugmentError> {
        self.inner.batches()
    }

    fn num_batches(&self) -> usize {
        self.inner.num_batches()
    }

    fn num_workers(&self) -> usize {
        self.inner.num_workers()
    }

    fn abort_flag(&self) -> Option<AbortFlag> {
        self.inner.abort_flag()
    }
}

impl std::fmt::Debug for Augmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Augmenter")
            .field("num_workers", &self.num_workers())
            .field("num_batches", &self.num_batches())
            .finish()
    }
}
