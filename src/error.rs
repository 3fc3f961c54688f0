// src/error.rs
//
// Error taxonomy for the augmentation pipeline.

use thiserror::Error;

use crate::data_loader::dataset::DatasetError;

/// Errors raised while building or iterating an augmenter.
#[derive(Error, Debug)]
pub enum AugmentError {
    /// The sampler cannot be turned into a batch sampler.
    #[error("invalid sampler: {0}")]
    InvalidSampler(String),

    /// The input data is neither a dataset nor a well-formed mapping/sequence.
    #[error("invalid data source: {0}")]
    InvalidDataSource(String),

    /// A worker failed while fetching or transforming a batch.
    ///
    /// Only ever seen inside the pool; the coordinator reports [`AugmentError::PoolAbort`].
    #[error("worker {worker} failed: {source}")]
    WorkerFailure {
        worker: usize,
        #[source]
        source: Box<AugmentError>,
    },

    /// The abort flag was observed while iterating.
    #[error("abort flag was set in one of the workers")]
    PoolAbort,

    /// The process identity of a data loader was written twice.
    #[error("process id can be set only once (already set to {current})")]
    ProcessIdentityReuse { current: usize },

    /// Samples of one index group cannot be stacked into a batch.
    #[error("malformed batch: {0}")]
    MalformedBatch(String),

    /// A configuration value could not be parsed.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// The sampler yields no indices at all.
    #[error("dataset or sampler is empty")]
    EmptyDataset,

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// A transform returned an error.
    #[error("transform failed: {0}")]
    Transform(#[source] anyhow::Error),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type Result<T, E = AugmentError> = std::result::Result<T, E>;

impl AugmentError {
    /// True for errors that end a pass after the pool was torn down.
    pub fn is_pool_abort(&self) -> bool {
        matches!(self, AugmentError::PoolAbort)
    }
}
