//! src/data_loader/sampler.rs
//! Samplers for the data loader.
//!
//! A `Sampler` plans the order in which the indices of a dataset are visited
//! during one pass.  A [`BatchSampler`] wraps an element sampler, reseeds it
//! deterministically at the start of every pass and cuts its output into
//! index groups, one group per mini-batch.
//!
//! Strategies:
//!  * `SequentialSampler`                 – `0..len` in order.
//!  * `RandomSampler`                     – shuffled, optionally with replacement.
//!  * `PerClassRandomSampler`             – classes in turn, random member each time.
//!  * `StoppingPerClassRandomSampler`     – as above without replacement, stops at the
//!                                          end of the smallest class.
//!  * `PerClassSequentialSampler`         – classes in turn, members in order (wrapping).
//!  * `StoppingPerClassSequentialSampler` – as above, stops at the end of the smallest class.
//!  * `WeightedRandomSampler`             – draws with replacement by explicit weights.
//!  * `WeightedPrevalenceRandomSampler`   – weights are the inverse class prevalence.
//!  * `LambdaSampler`                     – caller-provided closure.

use std::collections::BTreeMap;

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::constants::DEFAULT_LABEL_KEY;
use crate::data_loader::dataset::Dataset;
use crate::error::AugmentError;

/// Trait for index planners.
pub trait Sampler: Send {
    /// Number of indices one pass yields.
    fn len(&self) -> usize;

    /// Plan the indices of one pass using `rng` for any randomness.
    fn indices(&self, rng: &mut ChaCha20Rng) -> Vec<usize>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Yields `0, 1, 2, …, len-1` once.
#[derive(Debug, Clone)]
pub struct SequentialSampler {
    len: usize,
}

impl SequentialSampler {
    pub fn new(len: usize) -> Self {
        Self { len }
    }

    pub fn from_dataset(dataset: &dyn Dataset) -> Self {
        Self::new(dataset.len())
    }
}

impl Sampler for SequentialSampler {
    fn len(&self) -> usize {
        self.len
    }

    fn indices(&self, _rng: &mut ChaCha20Rng) -> Vec<usize> {
        (0..self.len).collect()
    }
}

/// Uniform random sampling over `0..dataset_size`.
///
/// Without replacement this is a shuffle truncated to `num_samples`; with
/// replacement every draw is independent.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    dataset_size: usize,
    replacement: bool,
    num_samples: usize,
}

impl RandomSampler {
    pub fn new(
        dataset_size: usize,
        replacement: bool,
        num_samples: Option<usize>,
    ) -> Result<Self, AugmentError> {
        let num_samples = num_samples.unwrap_or(dataset_size);
        if !replacement && num_samples > dataset_size {
            return Err(AugmentError::InvalidSampler(format!(
                "num_samples ({}) exceeds dataset size ({}) without replacement",
                num_samples, dataset_size
            )));
        }
        if replacement && dataset_size == 0 && num_samples > 0 {
            return Err(AugmentError::InvalidSampler(
                "cannot draw with replacement from an empty dataset".to_string(),
            ));
        }
        Ok(Self {
            dataset_size,
            replacement,
            num_samples,
        })
    }
}

impl Sampler for RandomSampler {
    fn len(&self) -> usize {
        self.num_samples
    }

    fn indices(&self, rng: &mut ChaCha20Rng) -> Vec<usize> {
        if self.replacement {
            (0..self.num_samples)
                .map(|_| rng.random_range(0..self.dataset_size))
                .collect()
        } else {
            let mut indices: Vec<usize> = (0..self.dataset_size).collect();
            indices.shuffle(rng);
            indices.truncate(self.num_samples);
            indices
        }
    }
}

/// Dataset indices grouped by class label, classes in ascending label order.
#[derive(Debug, Clone)]
struct ClassMembers {
    classes: Vec<Vec<usize>>,
}

impl ClassMembers {
    fn from_dataset(dataset: &dyn Dataset, label_key: &str) -> Result<Self, AugmentError> {
        let mut by_label: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for index in 0..dataset.len() {
            let label = dataset
                .label(index, label_key)
                .map_err(|e| AugmentError::InvalidSampler(format!("cannot read labels: {}", e)))?;
            by_label.entry(label).or_default().push(index);
        }
        Ok(Self {
            classes: by_label.into_values().collect(),
        })
    }

    fn total(&self) -> usize {
        self.classes.iter().map(Vec::len).sum()
    }

    fn smallest(&self) -> usize {
        self.classes.iter().map(Vec::len).min().unwrap_or(0)
    }

    /// Round-robin over classes, `rounds` members per class.
    fn interleave(classes: &[Vec<usize>], rounds: usize) -> Vec<usize> {
        let mut out = Vec::with_capacity(rounds * classes.len());
        for round in 0..rounds {
            out.extend(classes.iter().map(|c| c[round]));
        }
        out
    }
}

/// Visits classes in turn and draws a random member of the current class.
#[derive(Debug, Clone)]
pub struct PerClassRandomSampler {
    members: ClassMembers,
}

impl PerClassRandomSampler {
    pub fn from_dataset(dataset: &dyn Dataset, label_key: &str) -> Result<Self, AugmentError> {
        Ok(Self {
            members: ClassMembers::from_dataset(dataset, label_key)?,
        })
    }
}

impl Sampler for PerClassRandomSampler {
    fn len(&self) -> usize {
        self.members.total()
    }

    fn indices(&self, rng: &mut ChaCha20Rng) -> Vec<usize> {
        let classes = &self.members.classes;
        (0..self.len())
            .map(|i| {
                let class = &classes[i % classes.len()];
                class[rng.random_range(0..class.len())]
            })
            .collect()
    }
}

/// Shuffles every class, then visits classes in turn until the smallest class
/// runs out.
#[derive(Debug, Clone)]
pub struct StoppingPerClassRandomSampler {
    members: ClassMembers,
}

impl StoppingPerClassRandomSampler {
    pub fn from_dataset(dataset: &dyn Dataset, label_key: &str) -> Result<Self, AugmentError> {
        Ok(Self {
            members: ClassMembers::from_dataset(dataset, label_key)?,
        })
    }
}

impl Sampler for StoppingPerClassRandomSampler {
    fn len(&self) -> usize {
        self.members.smallest() * self.members.classes.len()
    }

    fn indices(&self, rng: &mut ChaCha20Rng) -> Vec<usize> {
        let mut classes = self.members.classes.clone();
        for class in classes.iter_mut() {
            class.shuffle(rng);
        }
        ClassMembers::interleave(&classes, self.members.smallest())
    }
}

/// Visits classes in turn, walking each class in index order and wrapping
/// around when a class is exhausted.
#[derive(Debug, Clone)]
pub struct PerClassSequentialSampler {
    members: ClassMembers,
}

impl PerClassSequentialSampler {
    pub fn from_dataset(dataset: &dyn Dataset, label_key: &str) -> Result<Self, AugmentError> {
        Ok(Self {
            members: ClassMembers::from_dataset(dataset, label_key)?,
        })
    }
}

impl Sampler for PerClassSequentialSampler {
    fn len(&self) -> usize {
        self.members.total()
    }

    fn indices(&self, _rng: &mut ChaCha20Rng) -> Vec<usize> {
        let classes = &self.members.classes;
        let k = classes.len();
        (0..self.len())
            .map(|i| {
                let class = &classes[i % k];
                class[(i / k) % class.len()]
            })
            .collect()
    }
}

/// Visits classes in turn, members in index order, until the smallest class
/// runs out.
#[derive(Debug, Clone)]
pub struct StoppingPerClassSequentialSampler {
    members: ClassMembers,
}

impl StoppingPerClassSequentialSampler {
    pub fn from_dataset(dataset: &dyn Dataset, label_key: &str) -> Result<Self, AugmentError> {
        Ok(Self {
            members: ClassMembers::from_dataset(dataset, label_key)?,
        })
    }
}

impl Sampler for StoppingPerClassSequentialSampler {
    fn len(&self) -> usize {
        self.members.smallest() * self.members.classes.len()
    }

    fn indices(&self, _rng: &mut ChaCha20Rng) -> Vec<usize> {
        ClassMembers::interleave(&self.members.classes, self.members.smallest())
    }
}

/// Draws `num_samples` indices with replacement, proportionally to `weights`.
#[derive(Debug, Clone)]
pub struct WeightedRandomSampler {
    distribution: WeightedIndex<f64>,
    num_samples: usize,
}

impl WeightedRandomSampler {
    pub fn new(weights: &[f64], num_samples: Option<usize>) -> Result<Self, AugmentError> {
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AugmentError::InvalidSampler(
                "all weights must be finite and non-negative".to_string(),
            ));
        }
        let distribution = WeightedIndex::new(weights)
            .map_err(|e| AugmentError::InvalidSampler(format!("invalid weights: {}", e)))?;
        Ok(Self {
            distribution,
            num_samples: num_samples.unwrap_or(weights.len()),
        })
    }

    /// One weight per sample; the weight count must match the dataset size.
    pub fn from_dataset(dataset: &dyn Dataset, weights: &[f64]) -> Result<Self, AugmentError> {
        if weights.len() != dataset.len() {
            return Err(AugmentError::InvalidSampler(format!(
                "got {} weights for a dataset of {} samples",
                weights.len(),
                dataset.len()
            )));
        }
        Self::new(weights, None)
    }
}

impl Sampler for WeightedRandomSampler {
    fn len(&self) -> usize {
        self.num_samples
    }

    fn indices(&self, rng: &mut ChaCha20Rng) -> Vec<usize> {
        (0..self.num_samples)
            .map(|_| self.distribution.sample(rng))
            .collect()
    }
}

/// Weighted sampling where every sample is weighted by the inverse size of
/// its class, so each class is drawn equally often on average.
#[derive(Debug, Clone)]
pub struct WeightedPrevalenceRandomSampler {
    inner: WeightedRandomSampler,
}

impl WeightedPrevalenceRandomSampler {
    pub fn from_dataset(dataset: &dyn Dataset, label_key: &str) -> Result<Self, AugmentError> {
        let members = ClassMembers::from_dataset(dataset, label_key)?;
        let mut weights = vec![0.0; dataset.len()];
        for class in &members.classes {
            let w = 1.0 / class.len() as f64;
            for &i in class {
                weights[i] = w;
            }
        }
        Ok(Self {
            inner: WeightedRandomSampler::new(&weights, None)?,
        })
    }
}

impl Sampler for WeightedPrevalenceRandomSampler {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn indices(&self, rng: &mut ChaCha20Rng) -> Vec<usize> {
        self.inner.indices(rng)
    }
}

type SamplingFn = dyn Fn(usize, &mut ChaCha20Rng) -> Vec<usize> + Send;

/// Delegates the planning of a pass to a closure `(len, rng) -> indices`.
pub struct LambdaSampler {
    len: usize,
    func: Box<SamplingFn>,
}

impl LambdaSampler {
    pub fn new<F>(len: usize, func: F) -> Self
    where
        F: Fn(usize, &mut ChaCha20Rng) -> Vec<usize> + Send + 'static,
    {
        Self {
            len,
            func: Box::new(func),
        }
    }
}

impl Sampler for LambdaSampler {
    fn len(&self) -> usize {
        self.len
    }

    fn indices(&self, rng: &mut ChaCha20Rng) -> Vec<usize> {
        (self.func)(self.len, rng)
    }
}

impl std::fmt::Debug for LambdaSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LambdaSampler").field("len", &self.len).finish()
    }
}

/// Sampling strategy, resolved against a dataset with [`SamplerKind::from_dataset`].
#[derive(Debug, Clone, PartialEq)]
pub enum SamplerKind {
    Sequential,
    Random {
        replacement: bool,
        num_samples: Option<usize>,
    },
    PerClassRandom { label_key: String },
    StoppingPerClassRandom { label_key: String },
    PerClassSequential { label_key: String },
    StoppingPerClassSequential { label_key: String },
    WeightedRandom { weights: Vec<f64> },
    WeightedPrevalence { label_key: String },
}

impl Default for SamplerKind {
    fn default() -> Self {
        SamplerKind::Sequential
    }
}

impl SamplerKind {
    /// Shuffle without replacement.
    pub fn random() -> Self {
        SamplerKind::Random {
            replacement: false,
            num_samples: None,
        }
    }

    pub fn per_class_random() -> Self {
        SamplerKind::PerClassRandom {
            label_key: DEFAULT_LABEL_KEY.to_string(),
        }
    }

    pub fn weighted_prevalence() -> Self {
        SamplerKind::WeightedPrevalence {
            label_key: DEFAULT_LABEL_KEY.to_string(),
        }
    }

    /// Build the element sampler for `dataset`.
    pub fn from_dataset(&self, dataset: &dyn Dataset) -> Result<Box<dyn Sampler>, AugmentError> {
        Ok(match self {
            SamplerKind::Sequential => Box::new(SequentialSampler::from_dataset(dataset)),
            SamplerKind::Random {
                replacement,
                num_samples,
            } => Box::new(RandomSampler::new(dataset.len(), *replacement, *num_samples)?),
            SamplerKind::PerClassRandom { label_key } => {
                Box::new(PerClassRandomSampler::from_dataset(dataset, label_key)?)
            }
            SamplerKind::StoppingPerClassRandom { label_key } => {
                Box::new(StoppingPerClassRandomSampler::from_dataset(dataset, label_key)?)
            }
            SamplerKind::PerClassSequential { label_key } => {
                Box::new(PerClassSequentialSampler::from_dataset(dataset, label_key)?)
            }
            SamplerKind::StoppingPerClassSequential { label_key } => {
                Box::new(StoppingPerClassSequentialSampler::from_dataset(dataset, label_key)?)
            }
            SamplerKind::WeightedRandom { weights } => {
                Box::new(WeightedRandomSampler::from_dataset(dataset, weights)?)
            }
            SamplerKind::WeightedPrevalence { label_key } => {
                Box::new(WeightedPrevalenceRandomSampler::from_dataset(dataset, label_key)?)
            }
        })
    }
}

/// Groups the output of an element sampler into fixed-size index groups.
pub struct BatchSampler {
    sampler: Box<dyn Sampler>,
    batch_size: usize,
    drop_last: bool,
    seed: u64,
    passes: u64,
}

impl BatchSampler {
    pub fn new(
        sampler: Box<dyn Sampler>,
        batch_size: usize,
        drop_last: bool,
    ) -> Result<Self, AugmentError> {
        if batch_size == 0 {
            return Err(AugmentError::InvalidSampler(
                "batch_size must be > 0".to_string(),
            ));
        }
        Ok(Self {
            sampler,
            batch_size,
            drop_last,
            seed: 0,
            passes: 0,
        })
    }

    /// Reset the pass counter and use `seed` as the base seed from now on.
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.passes = 0;
    }

    /// Number of sample indices per pass.
    pub fn len(&self) -> usize {
        self.sampler.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sampler.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn drop_last(&self) -> bool {
        self.drop_last
    }

    /// Number of index groups per pass.
    pub fn num_batches(&self) -> usize {
        let n = self.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    /// Plan a new pass.  The RNG is seeded with `seed + pass_number`.
    pub fn start_pass(&mut self) -> IndexGroups {
        let mut rng = ChaCha20Rng::seed_from_u64(self.seed.wrapping_add(self.passes));
        self.passes += 1;
        IndexGroups {
            order: self.sampler.indices(&mut rng),
            pos: 0,
            batch_size: self.batch_size,
            drop_last: self.drop_last,
        }
    }
}

impl std::fmt::Debug for BatchSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSampler")
            .field("len", &self.len())
            .field("batch_size", &self.batch_size)
            .field("drop_last", &self.drop_last)
            .field("seed", &self.seed)
            .finish()
    }
}

/// The index groups of one pass.
#[derive(Debug, Clone)]
pub struct IndexGroups {
    order: Vec<usize>,
    pos: usize,
    batch_size: usize,
    drop_last: bool,
}

impl IndexGroups {
    /// Groups left in this pass.
    pub fn remaining(&self) -> usize {
        let left = self.order.len() - self.pos;
        if self.drop_last {
            left / self.batch_size
        } else {
            left.div_ceil(self.batch_size)
        }
    }
}

impl Iterator for IndexGroups {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let end = (self.pos + self.batch_size).min(self.order.len());
        let size = end - self.pos;
        if size == 0 || (self.drop_last && size < self.batch_size) {
            self.pos = self.order.len();
            return None;
        }
        let group = self.order[self.pos..end].to_vec();
        self.pos = end;
        Some(group)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

/// A sampler as handed to an augmenter: either an element sampler that still
/// needs grouping, or a ready batch sampler.
pub enum SamplerSource {
    Element(Box<dyn Sampler>),
    Batch(BatchSampler),
}

impl SamplerSource {
    /// Resolve into a batch sampler.  `batch_size`/`drop_last` only apply to
    /// element samplers; a batch sampler keeps its own settings.
    pub fn into_batch_sampler(
        self,
        batch_size: usize,
        drop_last: bool,
    ) -> Result<BatchSampler, AugmentError> {
        let sampler = match self {
            SamplerSource::Element(s) => BatchSampler::new(s, batch_size, drop_last)?,
            SamplerSource::Batch(b) => b,
        };
        if sampler.is_empty() {
            return Err(AugmentError::InvalidSampler(
                "sampler yields no indices".to_string(),
            ));
        }
        Ok(sampler)
    }
}

impl From<BatchSampler> for SamplerSource {
    fn from(b: BatchSampler) -> Self {
        SamplerSource::Batch(b)
    }
}

impl From<Box<dyn Sampler>> for SamplerSource {
    fn from(s: Box<dyn Sampler>) -> Self {
        SamplerSource::Element(s)
    }
}
