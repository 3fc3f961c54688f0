//! Core dataset abstractions for augflow's data loader.
//!
//! A dataset is an ordered, indexable collection of samples.  Each sample is
//! a map from field name to an n-dimensional `f32` array.  Datasets are
//! immutable while a pass is running and are shared read-only between the
//! coordinator and every worker, so implementors must be `Send + Sync`.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Error as AnyError;
use ndarray::ArrayD;
use thiserror::Error;

use crate::error::AugmentError;

/// One sample: field name -> array.  Ordered so batches list fields stably.
pub type Sample = BTreeMap<String, ArrayD<f32>>;

/// Item-level error type for dataset operations.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("index out of range: {index} (dataset size: {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("sample {index} has no field '{field}'")]
    MissingField { index: usize, field: String },

    #[error("field '{field}' of sample {index} is not a scalar")]
    NotScalar { index: usize, field: String },

    // generic backend error
    #[error(transparent)]
    Backend(#[from] AnyError),
}

impl From<String> for DatasetError {
    fn from(s: String) -> Self {
        DatasetError::Backend(AnyError::msg(s))
    }
}

impl From<&str> for DatasetError {
    fn from(s: &str) -> Self {
        DatasetError::Backend(AnyError::msg(s.to_string()))
    }
}

/// A logical, map-style collection of **samples**.
pub trait Dataset: Send + Sync + 'static {
    /// Total number of samples.
    fn len(&self) -> usize;

    /// Retrieve a sample by zero-based index.
    fn get(&self, index: usize) -> Result<Sample, DatasetError>;

    /// Convenience helper.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Class label of sample `index`, read from the scalar field `key`.
    ///
    /// Per-class samplers call this once per sample when they are built.
    fn label(&self, index: usize, key: &str) -> Result<i64, DatasetError> {
        let sample = self.get(index)?;
        let value = sample.get(key).ok_or_else(|| DatasetError::MissingField {
            index,
            field: key.to_string(),
        })?;
        if value.len() != 1 {
            return Err(DatasetError::NotScalar {
                index,
                field: key.to_string(),
            });
        }
        Ok(value.iter().next().map(|v| v.round() as i64).unwrap_or_default())
    }
}

/// Column-layout dataset: every field holds one value per sample.
#[derive(Debug, Clone)]
pub struct DictDataset {
    columns: BTreeMap<String, Vec<ArrayD<f32>>>,
    len: usize,
}

impl DictDataset {
    /// Wrap a column mapping; every column must have the same length.
    pub fn new(columns: BTreeMap<String, Vec<ArrayD<f32>>>) -> Result<Self, AugmentError> {
        let mut lens = columns.iter().map(|(k, v)| (k, v.len()));
        let Some((first_key, len)) = lens.next() else {
            return Err(AugmentError::InvalidDataSource(
                "mapping has no fields".to_string(),
            ));
        };
        if let Some((key, other)) = lens.find(|(_, l)| *l != len) {
            return Err(AugmentError::InvalidDataSource(format!(
                "field '{}' has {} values but field '{}' has {}",
                key, other, first_key, len
            )));
        }
        Ok(Self { columns, len })
    }
}

impl Dataset for DictDataset {
    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: usize) -> Result<Sample, DatasetError> {
        if index >= self.len {
            return Err(DatasetError::IndexOutOfRange { index, len: self.len });
        }
        Ok(self
            .columns
            .iter()
            .map(|(k, col)| (k.clone(), col[index].clone()))
            .collect())
    }
}

/// Row-layout dataset backed by a `Vec` of samples.
#[derive(Debug, Clone, Default)]
pub struct SequenceDataset {
    samples: Vec<Sample>,
}

impl SequenceDataset {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }
}

impl Dataset for SequenceDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<Sample, DatasetError> {
        self.samples
            .get(index)
            .cloned()
            .ok_or(DatasetError::IndexOutOfRange {
                index,
                len: self.samples.len(),
            })
    }
}

/// View of another dataset restricted to a list of indices.
#[derive(Clone)]
pub struct SubsetDataset {
    inner: Arc<dyn Dataset>,
    indices: Vec<usize>,
}

impl SubsetDataset {
    /// Every index must be valid for `inner`.
    pub fn new(inner: Arc<dyn Dataset>, indices: Vec<usize>) -> Result<Self, DatasetError> {
        let len = inner.len();
        if let Some(&index) = indices.iter().find(|&&i| i >= len) {
            return Err(DatasetError::IndexOutOfRange { index, len });
        }
        Ok(Self { inner, indices })
    }
}

impl Dataset for SubsetDataset {
    fn len(&self) -> usize {
        self.indices.len()
    }

    fn get(&self, index: usize) -> Result<Sample, DatasetError> {
        let inner_index = *self
            .indices
            .get(index)
            .ok_or(DatasetError::IndexOutOfRange {
                index,
                len: self.indices.len(),
            })?;
        self.inner.get(inner_index)
    }
}

/// Input accepted by the data loader, resolved once into a canonical dataset.
pub enum DataSource {
    /// field -> one value per sample
    Mapping(BTreeMap<String, Vec<ArrayD<f32>>>),
    /// one map per sample
    Sequence(Vec<Sample>),
    Dataset(Arc<dyn Dataset>),
}

impl DataSource {
    pub fn into_dataset(self) -> Result<Arc<dyn Dataset>, AugmentError> {
        match self {
            DataSource::Mapping(columns) => Ok(Arc::new(DictDataset::new(columns)?)),
            DataSource::Sequence(samples) => Ok(Arc::new(SequenceDataset::new(samples))),
            DataSource::Dataset(ds) => Ok(ds),
        }
    }
}

impl From<Vec<Sample>> for DataSource {
    fn from(samples: Vec<Sample>) -> Self {
        DataSource::Sequence(samples)
    }
}

impl From<BTreeMap<String, Vec<ArrayD<f32>>>> for DataSource {
    fn from(columns: BTreeMap<String, Vec<ArrayD<f32>>>) -> Self {
        DataSource::Mapping(columns)
    }
}

impl From<Arc<dyn Dataset>> for DataSource {
    fn from(ds: Arc<dyn Dataset>) -> Self {
        DataSource::Dataset(ds)
    }
}
