// src/augment/sequential.rs
//
// Single-threaded augmenter: fetch and transform inline on the calling
// thread.  Used for debugging and as the reference the parallel path is
// checked against.

use tracing::debug;

use crate::augment::{BatchStream, Batches};
use crate::data_loader::batch::Batch;
use crate::data_loader::dataloader::DataLoader;
use crate::data_loader::sampler::{BatchSampler, IndexGroups};
use crate::data_loader::transform::Transform;
use crate::error::AugmentError;

pub struct SequentialAugmenter {
    loader: DataLoader,
    sampler: BatchSampler,
    transforms: Option<Box<dyn Transform>>,
    seed: u64,
}

impl SequentialAugmenter {
    /// The sampler is reseeded with `seed`; pass `p` samples with `seed + p`.
    pub fn new(
        loader: DataLoader,
        mut sampler: BatchSampler,
        transforms: Option<Box<dyn Transform>>,
        seed: u64,
    ) -> Self {
        sampler.reseed(seed);
        Self {
            loader,
            sampler,
            transforms,
            seed,
        }
    }

    pub fn num_batches(&self) -> usize {
        self.sampler.num_batches()
    }

    /// Plan a pass.  The transform copy used for the pass is seeded exactly
    /// like the first worker of a parallel pass.
    pub fn start_pass(&mut self) -> SequentialPass<'_> {
        let groups = self.sampler.start_pass();
        let transforms = self.transforms.as_ref().map(|t| {
            let mut t = t.box_clone();
            t.reseed(self.seed);
            t
        });
        debug!(groups = groups.remaining(), "starting sequential pass");
        SequentialPass {
            loader: &self.loader,
            groups,
            transforms,
            failed: false,
        }
    }
}

impl BatchStream for SequentialAugmenter {
    fn batches(&mut self) -> Result<Batches<'_>, AugmentError> {
        Ok(Box::new(self.start_pass()))
    }

    fn num_batches(&self) -> usize {
        SequentialAugmenter::num_batches(self)
    }

    fn num_workers(&self) -> usize {
        0
    }
}

impl std::fmt::Debug for SequentialAugmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequentialAugmenter")
            .field("sampler", &self.sampler)
            .field("seed", &self.seed)
            .finish()
    }
}

pub struct SequentialPass<'a> {
    loader: &'a DataLoader,
    groups: IndexGroups,
    transforms: Option<Box<dyn Transform>>,
    failed: bool,
}

impl SequentialPass<'_> {
    fn process(&mut self, indices: &[usize]) -> Result<Batch, AugmentError> {
        let batch = self.loader.fetch(indices)?;
        match self.transforms.as_mut() {
            Some(t) => t.apply(batch).map_err(AugmentError::Transform),
            None => Ok(batch),
        }
    }
}

impl Iterator for SequentialPass<'_> {
    type Item = Result<Batch, AugmentError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let group = self.groups.next()?;
        let res = self.process(&group);
        self.failed = res.is_err();
        Some(res)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            (0, Some(0))
        } else {
            (0, Some(self.groups.remaining()))
        }
    }
}
