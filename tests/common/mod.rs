// tests/common/mod.rs
//
// Common test utilities: small in-memory datasets and augmenter options.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use augflow::data_loader::{DatasetError, Sample};
use augflow::{AugmenterOptions, DataLoader, Dataset};
use ndarray::{arr0, ArrayD, IxDyn};

/// Sample `i` holds `x = i` (scalar), `label = i % num_classes` and a
/// 2x2 `image` filled with `i`.
pub fn labelled_samples(n: usize, num_classes: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| {
            Sample::from([
                ("x".to_string(), arr0(i as f32).into_dyn()),
                ("label".to_string(), arr0((i % num_classes) as f32).into_dyn()),
                ("image".to_string(), ArrayD::from_elem(IxDyn(&[2, 2]), i as f32)),
            ])
        })
        .collect()
}

pub fn loader(n: usize) -> DataLoader {
    DataLoader::new(labelled_samples(n, 3)).expect("valid samples")
}

/// Options tuned for tests: short poll interval so aborts are noticed fast.
pub fn fast_opts(batch_size: usize, workers: usize) -> AugmenterOptions {
    AugmenterOptions::default()
        .with_batch_size(batch_size)
        .num_workers(workers)
        .seed(7)
        .poll_interval(Duration::from_millis(10))
}

/// Dataset whose `get` fails for one index, optionally sleeping per sample so
/// workers are still busy when the failure happens.
pub struct FailingDataset {
    pub len: usize,
    pub fail_at: usize,
    pub delay: Duration,
}

impl Dataset for FailingDataset {
    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: usize) -> Result<Sample, DatasetError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if index == self.fail_at {
            return Err(format!("corrupt sample {}", index).into());
        }
        Ok(Sample::from([("x".to_string(), arr0(index as f32).into_dyn())]))
    }
}

pub fn failing_loader(len: usize, fail_at: usize, delay: Duration) -> DataLoader {
    let ds: Arc<dyn Dataset> = Arc::new(FailingDataset { len, fail_at, delay });
    DataLoader::new(ds).expect("dataset source")
}

/// Flatten the indices of every batch in a pass.
pub fn indices_of<I>(batches: I) -> Vec<usize>
where
    I: IntoIterator<Item = Result<augflow::Batch, augflow::AugmentError>>,
{
    batches
        .into_iter()
        .flat_map(|b| b.expect("batch").indices)
        .collect()
}
