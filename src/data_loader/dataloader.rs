//! Indexed data source.
//!
//! * Wraps any [`DataSource`] into a canonical dataset once, at construction.
//! * `fetch(indices)` loads every indexed sample and collates them into a [`Batch`].
//! * Holds no thread affinity: a clone can be moved into a worker and used
//!   purely as a function of (dataset, index group).

use std::sync::Arc;

use crate::data_loader::batch::{collate, Batch};
use crate::data_loader::dataset::{DataSource, Dataset, Sample};
use crate::error::AugmentError;

/// Loads and collates the samples of one index group.
#[derive(Clone)]
pub struct DataLoader {
    dataset: Arc<dyn Dataset>,
    process_id: Option<usize>,
}

impl DataLoader {
    /// Create a new loader.
    pub fn new(data: impl Into<DataSource>) -> Result<Self, AugmentError> {
        Ok(Self {
            dataset: data.into().into_dataset()?,
            process_id: None,
        })
    }

    pub fn dataset(&self) -> &Arc<dyn Dataset> {
        &self.dataset
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Fetch the samples for `indices` and stack them into a batch.
    pub fn fetch(&self, indices: &[usize]) -> Result<Batch, AugmentError> {
        let samples = indices
            .iter()
            .map(|&i| self.dataset.get(i))
            .collect::<Result<Vec<Sample>, _>>()?;
        collate(indices, &samples)
    }

    /// Identity of the worker owning this loader; `0` until set.
    pub fn process_id(&self) -> usize {
        self.process_id.unwrap_or(0)
    }

    /// Set the worker identity.  May be called only once per loader.
    pub fn set_process_id(&mut self, id: usize) -> Result<(), AugmentError> {
        if let Some(current) = self.process_id {
            return Err(AugmentError::ProcessIdentityReuse { current });
        }
        self.process_id = Some(id);
        Ok(())
    }
}

impl std::fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoader")
            .field("len", &self.dataset.len())
            .field("process_id", &self.process_id)
            .finish()
    }
}
