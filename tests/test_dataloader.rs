//! Integration tests for the data loader layer.
//!
//! We use small, in-memory datasets so the tests are deterministic
//! and do not need any external services.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use augflow::data_loader::{DataSource, SubsetDataset};
use augflow::{AugmentError, DataLoader, Dataset};
use ndarray::{arr0, ArrayD, IxDyn};

// ────────────────────────────────────────────────────────────────────────────
// Mapping source: one column per field
// ────────────────────────────────────────────────────────────────────────────
#[test]
fn mapping_source_fetches_rows() {
    let mut columns = BTreeMap::new();
    columns.insert(
        "x".to_string(),
        (0..6).map(|i| arr0(i as f32).into_dyn()).collect::<Vec<_>>(),
    );
    columns.insert(
        "y".to_string(),
        (0..6).map(|i| ArrayD::from_elem(IxDyn(&[3]), -(i as f32))).collect(),
    );
    let dl = DataLoader::new(columns).unwrap();
    assert_eq!(dl.len(), 6);

    let batch = dl.fetch(&[4, 1]).unwrap();
    assert_eq!(batch.indices, vec![4, 1]);
    assert_eq!(batch.get("x").unwrap().as_slice().unwrap(), &[4.0, 1.0]);
    assert_eq!(batch.get("y").unwrap().shape(), &[2, 3]);
}

#[test]
fn ragged_mapping_is_invalid() {
    let mut columns = BTreeMap::new();
    columns.insert("x".to_string(), vec![arr0(0.0f32).into_dyn(); 3]);
    columns.insert("y".to_string(), vec![arr0(0.0f32).into_dyn(); 2]);
    let err = DataLoader::new(DataSource::Mapping(columns)).unwrap_err();
    assert!(matches!(err, AugmentError::InvalidDataSource(_)));
}

// ────────────────────────────────────────────────────────────────────────────
// Sequence source: one map per sample
// ────────────────────────────────────────────────────────────────────────────
#[test]
fn sequence_source_stacks_fields() {
    let dl = common::loader(10);
    let batch = dl.fetch(&[0, 9, 3]).unwrap();
    assert_eq!(batch.len(), 3);
    assert_eq!(batch.get("image").unwrap().shape(), &[3, 2, 2]);
    assert_eq!(batch.get("label").unwrap().as_slice().unwrap(), &[0.0, 0.0, 0.0]);
    assert_eq!(batch.keys().collect::<Vec<_>>(), vec!["image", "label", "x"]);
}

#[test]
fn fetch_is_a_pure_function_of_the_indices() {
    let dl = common::loader(8);
    let clone = dl.clone();
    assert_eq!(dl.fetch(&[2, 3]).unwrap(), clone.fetch(&[2, 3]).unwrap());
}

// ────────────────────────────────────────────────────────────────────────────
// Dataset source and subsets
// ────────────────────────────────────────────────────────────────────────────
#[test]
fn subset_remaps_indices() {
    let full = common::loader(10);
    let subset = SubsetDataset::new(full.dataset().clone(), vec![7, 2, 5]).unwrap();
    let ds: Arc<dyn Dataset> = Arc::new(subset);
    let dl = DataLoader::new(ds).unwrap();
    assert_eq!(dl.len(), 3);
    let batch = dl.fetch(&[0, 2]).unwrap();
    assert_eq!(batch.get("x").unwrap().as_slice().unwrap(), &[7.0, 5.0]);
    assert!(matches!(dl.fetch(&[3]), Err(AugmentError::Dataset(_))));
}

#[test]
fn dataset_errors_surface_unchanged() {
    let dl = common::failing_loader(4, 2, std::time::Duration::ZERO);
    assert!(dl.fetch(&[0, 1]).is_ok());
    let err = dl.fetch(&[1, 2]).unwrap_err();
    assert!(err.to_string().contains("corrupt sample 2"));
}

#[test]
fn process_identity_is_write_once() {
    let mut dl = common::loader(2);
    dl.set_process_id(3).unwrap();
    let err = dl.set_process_id(3).unwrap_err();
    assert!(matches!(err, AugmentError::ProcessIdentityReuse { current: 3 }));
}
