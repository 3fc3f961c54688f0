// src/data_loader/mod.rs

//! Public API surface for the augflow data_loader layer.

/// expose the `batch` module (file batch.rs)
pub mod batch;

/// expose the `dataloader` module (file dataloader.rs)
pub mod dataloader;

/// expose the `dataset` module (file dataset.rs)
pub mod dataset;

pub mod manager;

/// expose the `options` module (file options.rs)
pub mod options;

pub mod sampler;

pub mod transform;

// Re‐export the key types at this level:
pub use batch::{collate, Batch};
pub use dataloader::DataLoader;
pub use dataset::{
    DataSource, Dataset, DatasetError, DictDataset, Sample, SequenceDataset, SubsetDataset,
};
pub use manager::{DataManager, ManagerUpdate};
pub use options::{AugmenterOptions, NumWorkers};
pub use sampler::{
    BatchSampler, IndexGroups, LambdaSampler, PerClassRandomSampler, PerClassSequentialSampler,
    RandomSampler, Sampler, SamplerKind, SamplerSource, SequentialSampler,
    StoppingPerClassRandomSampler, StoppingPerClassSequentialSampler,
    WeightedPrevalenceRandomSampler, WeightedRandomSampler,
};
pub use transform::{Compose, FnTransform, RandomFlip, Transform, UniformNoise};
