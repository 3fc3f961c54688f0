// src/data_loader/manager.rs
//
// Bundles a dataset with its sampling and augmentation settings and hands out
// ready-to-iterate augmenters.

use std::sync::Arc;

use tracing::debug;

use crate::augment::Augmenter;
use crate::data_loader::dataloader::DataLoader;
use crate::data_loader::dataset::{DataSource, Dataset, SubsetDataset};
use crate::data_loader::options::{AugmenterOptions, NumWorkers};
use crate::data_loader::sampler::SamplerKind;
use crate::data_loader::transform::Transform;
use crate::error::AugmentError;

/// Partial update for [`DataManager::update_state`]; `None` keeps the current
/// value.
#[derive(Default)]
pub struct ManagerUpdate {
    pub batch_size: Option<usize>,
    pub num_workers: Option<NumWorkers>,
    pub sampler: Option<SamplerKind>,
    /// `Some(None)` removes the transforms.
    pub transforms: Option<Option<Box<dyn Transform>>>,
}

pub struct DataManager {
    loader: DataLoader,
    sampler_kind: SamplerKind,
    transforms: Option<Box<dyn Transform>>,
    opts: AugmenterOptions,
    n_samples: usize,
}

impl DataManager {
    pub fn new(
        data: impl Into<DataSource>,
        batch_size: usize,
        num_workers: impl Into<NumWorkers>,
        transforms: Option<Box<dyn Transform>>,
        sampler_kind: SamplerKind,
        drop_last: bool,
    ) -> Result<Self, AugmentError> {
        let opts = AugmenterOptions::default()
            .with_batch_size(batch_size)
            .num_workers(num_workers)
            .drop_last(drop_last);
        Self::with_options(DataLoader::new(data)?, sampler_kind, transforms, opts)
    }

    /// Build from an existing loader and a full option set.
    pub fn with_options(
        loader: DataLoader,
        sampler_kind: SamplerKind,
        transforms: Option<Box<dyn Transform>>,
        opts: AugmenterOptions,
    ) -> Result<Self, AugmentError> {
        if opts.batch_size == 0 {
            return Err(AugmentError::InvalidSampler(
                "batch_size must be > 0".to_string(),
            ));
        }
        let n_samples = sampler_kind.from_dataset(loader.dataset().as_ref())?.len();
        Ok(Self {
            loader,
            sampler_kind,
            transforms,
            opts,
            n_samples,
        })
    }

    pub fn dataset(&self) -> &Arc<dyn Dataset> {
        self.loader.dataset()
    }

    pub fn options(&self) -> &AugmenterOptions {
        &self.opts
    }

    pub fn sampler_kind(&self) -> &SamplerKind {
        &self.sampler_kind
    }

    pub fn batch_size(&self) -> usize {
        self.opts.batch_size
    }

    /// Samples drawn per pass.
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Batches per pass: `ceil(n/B)`, or `floor(n/B)` with `drop_last`.
    pub fn n_batches(&self) -> Result<usize, AugmentError> {
        if self.n_samples == 0 {
            return Err(AugmentError::EmptyDataset);
        }
        let b = self.opts.batch_size;
        Ok(if self.opts.drop_last {
            self.n_samples / b
        } else {
            self.n_samples.div_ceil(b)
        })
    }

    /// A new augmenter over the managed data, seeded with `seed`.
    pub fn augmenter(&self, seed: u64) -> Result<Augmenter, AugmentError> {
        if self.n_batches()? == 0 {
            return Err(AugmentError::EmptyDataset);
        }
        let sampler = self
            .sampler_kind
            .from_dataset(self.loader.dataset().as_ref())?;
        let opts = self.opts.clone().seed(seed);
        Augmenter::new(
            self.loader.clone(),
            sampler,
            self.transforms.as_ref().map(|t| t.box_clone()),
            &opts,
        )
    }

    /// A manager over `indices` of the current dataset with the same settings.
    pub fn subset(&self, indices: Vec<usize>) -> Result<Self, AugmentError> {
        let subset = SubsetDataset::new(self.loader.dataset().clone(), indices)?;
        let dataset: Arc<dyn Dataset> = Arc::new(subset);
        debug!(len = dataset.len(), "created data manager subset");
        Self::with_options(
            DataLoader::new(dataset)?,
            self.sampler_kind.clone(),
            self.transforms.as_ref().map(|t| t.box_clone()),
            self.opts.clone(),
        )
    }

    /// Replace any of batch size, worker count, sampler kind or transforms.
    pub fn update_state(&mut self, update: ManagerUpdate) -> Result<(), AugmentError> {
        if update.batch_size == Some(0) {
            return Err(AugmentError::InvalidSampler(
                "batch_size must be > 0".to_string(),
            ));
        }
        if let Some(kind) = update.sampler {
            self.n_samples = kind.from_dataset(self.loader.dataset().as_ref())?.len();
            self.sampler_kind = kind;
        }
        if let Some(b) = update.batch_size {
            self.opts.batch_size = b;
        }
        if let Some(n) = update.num_workers {
            self.opts.num_workers = n;
        }
        if let Some(t) = update.transforms {
            self.transforms = t;
        }
        Ok(())
    }
}

impl std::fmt::Debug for DataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataManager")
            .field("len", &self.loader.len())
            .field("sampler_kind", &self.sampler_kind)
            .field("opts", &self.opts)
            .field("has_transforms", &self.transforms.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loader::dataset::Sample;
    use ndarray::arr0;

    fn data(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                Sample::from([
                    ("x".to_string(), arr0(i as f32).into_dyn()),
                    ("label".to_string(), arr0((i % 2) as f32).into_dyn()),
                ])
            })
            .collect()
    }

    #[test]
    fn batch_counts_follow_drop_last() {
        let m = DataManager::new(data(10), 3, 0usize, None, SamplerKind::Sequential, false).unwrap();
        assert_eq!(m.n_samples(), 10);
        assert_eq!(m.n_batches().unwrap(), 4);
        let m = DataManager::new(data(10), 3, 0usize, None, SamplerKind::Sequential, true).unwrap();
        assert_eq!(m.n_batches().unwrap(), 3);
    }

    #[test]
    fn augmenter_respects_settings() {
        let m = DataManager::new(data(7), 2, 0usize, None, SamplerKind::random(), false).unwrap();
        let mut aug = m.augmenter(3).unwrap();
        assert!(!aug.is_parallel());
        let n: usize = aug.batches().unwrap().map(|b| b.unwrap().len()).sum();
        assert_eq!(n, 7);
    }

    #[test]
    fn drop_last_with_too_few_samples_is_empty() {
        let m = DataManager::new(data(3), 4, 0usize, None, SamplerKind::Sequential, true).unwrap();
        assert_eq!(m.n_batches().unwrap(), 0);
        assert!(matches!(m.augmenter(0), Err(AugmentError::EmptyDataset)));
    }

    #[test]
    fn subset_keeps_settings() {
        let m = DataManager::new(data(10), 2, 0usize, None, SamplerKind::Sequential, false).unwrap();
        let s = m.subset(vec![1, 3, 5]).unwrap();
        assert_eq!(s.n_samples(), 3);
        assert_eq!(s.batch_size(), 2);
        assert_eq!(s.n_batches().unwrap(), 2);
        assert!(m.subset(vec![10]).is_err());
    }

    #[test]
    fn update_state_replaces_fields() {
        let mut m = DataManager::new(data(10), 2, 0usize, None, SamplerKind::Sequential, false).unwrap();
        m.update_state(ManagerUpdate {
            batch_size: Some(5),
            num_workers: Some(NumWorkers::Count(2)),
            sampler: Some(SamplerKind::Random {
                replacement: true,
                num_samples: Some(20),
            }),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(m.batch_size(), 5);
        assert_eq!(m.options().num_workers, NumWorkers::Count(2));
        assert_eq!(m.n_samples(), 20);
        assert_eq!(m.n_batches().unwrap(), 4);

        let bad = m.update_state(ManagerUpdate {
            batch_size: Some(0),
            ..Default::default()
        });
        assert!(bad.is_err());
        assert_eq!(m.batch_size(), 5);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let res = DataManager::new(data(4), 0, 0usize, None, SamplerKind::Sequential, false);
        assert!(matches!(res, Err(AugmentError::InvalidSampler(_))));
    }
}
