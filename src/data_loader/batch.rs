//! Mini-batches and sample collation.

use std::collections::BTreeMap;

use ndarray::{ArrayD, ArrayViewD, Axis};

use crate::data_loader::dataset::Sample;
use crate::error::AugmentError;

/// A collated mini-batch: every field is the per-sample arrays stacked along a
/// new leading axis, in index-group order.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Dataset indices the batch was built from.
    pub indices: Vec<usize>,
    pub fields: BTreeMap<String, ArrayD<f32>>,
}

impl Batch {
    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&ArrayD<f32>> {
        self.fields.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut ArrayD<f32>> {
        self.fields.get_mut(field)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// Stack `samples` (fetched for `indices`) into one [`Batch`].
///
/// All samples must expose the same field names, and per field the same shape.
pub fn collate(indices: &[usize], samples: &[Sample]) -> Result<Batch, AugmentError> {
    let Some(first) = samples.first() else {
        return Err(AugmentError::MalformedBatch("empty index group".to_string()));
    };

    for (pos, sample) in samples.iter().enumerate().skip(1) {
        if !sample.keys().eq(first.keys()) {
            return Err(AugmentError::MalformedBatch(format!(
                "sample {} has fields {:?}, expected {:?}",
                indices.get(pos).copied().unwrap_or(pos),
                sample.keys().collect::<Vec<_>>(),
                first.keys().collect::<Vec<_>>(),
            )));
        }
    }

    let mut fields = BTreeMap::new();
    for key in first.keys() {
        let views: Vec<ArrayViewD<'_, f32>> = samples.iter().map(|s| s[key].view()).collect();
        let stacked = ndarray::stack(Axis(0), &views).map_err(|e| {
            AugmentError::MalformedBatch(format!("cannot stack field '{}': {}", key, e))
        })?;
        fields.insert(key.clone(), stacked);
    }

    Ok(Batch {
        indices: indices.to_vec(),
        fields,
    })
}
