//! Batch transforms (augmentations).
//!
//! A transform maps one [`Batch`] to another.  Every worker receives its own
//! clone of the pipeline, so transforms may keep mutable state such as an RNG
//! without any synchronisation.

use anyhow::{anyhow, Result};
use ndarray::{Axis, Slice};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::data_loader::batch::Batch;

pub trait Transform: Send + 'static {
    fn apply(&mut self, batch: Batch) -> Result<Batch>;

    /// Clone into a new boxed transform (one per worker).
    fn box_clone(&self) -> Box<dyn Transform>;

    /// Reseed any internal RNG.  Called once per worker with `seed + worker_id`.
    fn reseed(&mut self, _seed: u64) {}
}

impl Clone for Box<dyn Transform> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Wraps a plain function or closure.
#[derive(Clone)]
pub struct FnTransform<F> {
    func: F,
}

impl<F> FnTransform<F>
where
    F: Fn(Batch) -> Result<Batch> + Clone + Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(Batch) -> Result<Batch> + Clone + Send + 'static,
{
    fn apply(&mut self, batch: Batch) -> Result<Batch> {
        (self.func)(batch)
    }

    fn box_clone(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }
}

/// Applies transforms in order.
#[derive(Clone, Default)]
pub struct Compose {
    transforms: Vec<Box<dyn Transform>>,
}

impl Compose {
    pub fn new(transforms: Vec<Box<dyn Transform>>) -> Self {
        Self { transforms }
    }

    pub fn push(mut self, t: impl Transform) -> Self {
        self.transforms.push(Box::new(t));
        self
    }
}

impl Transform for Compose {
    fn apply(&mut self, batch: Batch) -> Result<Batch> {
        self.transforms.iter_mut().try_fold(batch, |b, t| t.apply(b))
    }

    fn box_clone(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }

    fn reseed(&mut self, seed: u64) {
        for (i, t) in self.transforms.iter_mut().enumerate() {
            t.reseed(seed.wrapping_add(i as u64));
        }
    }
}

/// Mirrors each sample of `field` along `axis` (sample axis, not batch axis)
/// with probability `prob`.  A NaN `prob` makes `apply` fail.
#[derive(Clone)]
pub struct RandomFlip {
    field: String,
    axis: usize,
    prob: f64,
    rng: ChaCha20Rng,
}

impl RandomFlip {
    pub fn new(field: impl Into<String>, axis: usize, prob: f64) -> Self {
        Self {
            field: field.into(),
            axis,
            prob: prob.clamp(0.0, 1.0),
            rng: ChaCha20Rng::seed_from_u64(0),
        }
    }
}

impl Transform for RandomFlip {
    fn apply(&mut self, mut batch: Batch) -> Result<Batch> {
        if self.prob.is_nan() {
            return Err(anyhow!("RandomFlip: probability is NaN"));
        }
        let field = self.field.clone();
        let arr = batch
            .get_mut(&field)
            .ok_or_else(|| anyhow!("RandomFlip: batch has no field '{}'", field))?;
        if self.axis + 1 >= arr.ndim() {
            return Err(anyhow!(
                "RandomFlip: axis {} out of range for field '{}' with {} sample dims",
                self.axis,
                field,
                arr.ndim() - 1
            ));
        }
        for i in 0..arr.len_of(Axis(0)) {
            if !self.rng.random_bool(self.prob) {
                continue;
            }
            let mut sample = arr.index_axis_mut(Axis(0), i);
            let flipped = sample
                .slice_axis(Axis(self.axis), Slice::new(0, None, -1))
                .to_owned();
            sample.assign(&flipped);
        }
        Ok(batch)
    }

    fn box_clone(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha20Rng::seed_from_u64(seed);
    }
}

/// Adds uniform noise in `[-amplitude, amplitude)` to every element of `field`.
/// `apply` fails unless `amplitude` is finite.
#[derive(Clone)]
pub struct UniformNoise {
    field: String,
    amplitude: f32,
    rng: ChaCha20Rng,
}

impl UniformNoise {
    pub fn new(field: impl Into<String>, amplitude: f32) -> Self {
        Self {
            field: field.into(),
            amplitude: amplitude.abs(),
            rng: ChaCha20Rng::seed_from_u64(0),
        }
    }
}

impl Transform for UniformNoise {
    fn apply(&mut self, mut batch: Batch) -> Result<Batch> {
        if !self.amplitude.is_finite() {
            return Err(anyhow!("UniformNoise: amplitude {} is not finite", self.amplitude));
        }
        if self.amplitude == 0.0 {
            return Ok(batch);
        }
        let a = self.amplitude;
        let rng = &mut self.rng;
        let arr = batch
            .get_mut(&self.field)
            .ok_or_else(|| anyhow!("UniformNoise: batch has no field '{}'", self.field))?;
        arr.map_inplace(|v| *v += rng.random_range(-a..a));
        Ok(batch)
    }

    fn box_clone(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha20Rng::seed_from_u64(seed);
    }
}
