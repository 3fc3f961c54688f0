// src/augment/parallel.rs
//
// Multi-worker augmenter.  A pass starts a fresh pool, keeps
// `prefetch_factor` index groups queued per worker, and tears the pool down
// when the pass ends, fails or is dropped.

use tracing::{debug, error};

use crate::augment::abort::AbortFlag;
use crate::augment::pool::WorkerPool;
use crate::augment::{BatchStream, Batches};
use crate::data_loader::batch::Batch;
use crate::data_loader::dataloader::DataLoader;
use crate::data_loader::options::AugmenterOptions;
use crate::data_loader::sampler::{BatchSampler, IndexGroups};
use crate::data_loader::transform::Transform;
use crate::error::AugmentError;

pub struct ParallelAugmenter {
    loader: DataLoader,
    sampler: BatchSampler,
    transforms: Option<Box<dyn Transform>>,
    num_workers: usize,
    prefetch_factor: usize,
    seed: u64,
    pool: WorkerPool,
}

impl ParallelAugmenter {
    /// The sampler is reseeded with `opts.seed`; pass `p` samples with
    /// `seed + p`.
    pub fn new(
        loader: DataLoader,
        mut sampler: BatchSampler,
        transforms: Option<Box<dyn Transform>>,
        num_workers: usize,
        opts: &AugmenterOptions,
    ) -> Result<Self, AugmentError> {
        if num_workers == 0 {
            return Err(AugmentError::InvalidOption(
                "parallel augmentation needs at least one worker".to_string(),
            ));
        }
        sampler.reseed(opts.seed);
        Ok(Self {
            loader,
            sampler,
            transforms,
            num_workers,
            prefetch_factor: opts.prefetch_factor.max(1),
            seed: opts.seed,
            pool: WorkerPool::new(opts.poll_interval),
        })
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn num_batches(&self) -> usize {
        self.sampler.num_batches()
    }

    /// Abort flag of the running (or last) pass.
    pub fn abort_flag(&self) -> Option<AbortFlag> {
        self.pool.abort_flag()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Start the workers and pre-fill their queues.
    pub fn start_pass(&mut self) -> Result<ParallelPass<'_>, AugmentError> {
        let depth = self.prefetch_factor.saturating_mul(self.num_workers);
        let groups = self.sampler.start_pass();
        self.pool.start(
            self.num_workers,
            &self.loader,
            self.transforms.as_deref(),
            self.seed,
        )?;
        debug!(
            workers = self.num_workers,
            groups = groups.remaining(),
            "starting parallel pass"
        );

        let mut pass = ParallelPass {
            pool: &mut self.pool,
            groups,
            exhausted: false,
            finished: false,
        };
        for _ in 0..depth {
            if let Err(e) = pass.dispatch_next() {
                pass.finish();
                return Err(e);
            }
        }
        Ok(pass)
    }
}

impl BatchStream for ParallelAugmenter {
    fn batches(&mut self) -> Result<Batches<'_>, AugmentError> {
        Ok(Box::new(self.start_pass()?))
    }

    fn num_batches(&self) -> usize {
        ParallelAugmenter::num_batches(self)
    }

    fn num_workers(&self) -> usize {
        self.num_workers
    }

    fn abort_flag(&self) -> Option<AbortFlag> {
        self.pool.abort_flag()
    }
}

impl std::fmt::Debug for ParallelAugmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelAugmenter")
            .field("sampler", &self.sampler)
            .field("num_workers", &self.num_workers)
            .field("prefetch_factor", &self.prefetch_factor)
            .field("seed", &self.seed)
            .finish()
    }
}

/// One pass over the sampler.  Yields batches in collection order; the first
/// error ends the pass.
pub struct ParallelPass<'a> {
    pool: &'a mut WorkerPool,
    groups: IndexGroups,
    exhausted: bool,
    finished: bool,
}

impl ParallelPass<'_> {
    /// Index groups not dispatched yet.
    pub fn remaining(&self) -> usize {
        self.groups.remaining()
    }

    pub fn pending(&self) -> Vec<usize> {
        self.pool.pending()
    }

    pub fn abort_flag(&self) -> Option<AbortFlag> {
        self.pool.abort_flag()
    }

    fn dispatch_next(&mut self) -> Result<(), AugmentError> {
        if self.exhausted {
            return Ok(());
        }
        match self.groups.next() {
            Some(group) => self.pool.dispatch(group),
            None => {
                self.exhausted = true;
                Ok(())
            }
        }
    }

    /// Collect one batch, then refill the slot it freed.
    fn step(&mut self) -> Result<Option<Batch>, AugmentError> {
        if self.pool.is_aborted() {
            return Err(AugmentError::PoolAbort);
        }
        let batch = self.pool.collect()?;
        if batch.is_some() {
            self.dispatch_next()?;
        }
        Ok(batch)
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.pool.shutdown();
        }
    }
}

impl Iterator for ParallelPass<'_> {
    type Item = Result<Batch, AugmentError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.step() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.finish();
                None
            }
            Err(e) => {
                if let Some(flag) = self.pool.abort_flag() {
                    flag.set();
                }
                error!("parallel pass aborted: {}", e);
                self.finish();
                Some(Err(e))
            }
        }
    }
}

impl Drop for ParallelPass<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}
