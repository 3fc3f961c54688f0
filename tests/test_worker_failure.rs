//! Failure propagation: one failing worker must bring the whole pass down
//! with `PoolAbort`, and no worker may outlive the pass.

mod common;

use std::time::{Duration, Instant};

use augflow::augment::ParallelAugmenter;
use augflow::data_loader::{BatchSampler, FnTransform, SequentialSampler, UniformNoise};
use augflow::{AugmentError, Augmenter, Batch};

fn sampler(n: usize, batch_size: usize) -> BatchSampler {
    BatchSampler::new(Box::new(SequentialSampler::new(n)), batch_size, false).unwrap()
}

#[test]
fn failing_sample_aborts_the_pass() {
    let loader = common::failing_loader(200, 37, Duration::from_millis(1));
    let opts = common::fast_opts(4, 4);
    let mut aug = Augmenter::new(loader, sampler(200, 4), None, &opts).unwrap();

    let results: Vec<_> = aug.batches().unwrap().collect();
    let last = results.last().expect("at least one result");
    assert!(matches!(last, Err(AugmentError::PoolAbort)));
    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    // the failing group (36..40) never reaches the caller
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .all(|b| !b.indices.contains(&37)));
    assert!(aug.abort_flag().unwrap().is_set());
}

#[test]
fn failing_transform_aborts_the_pass() {
    let fail = FnTransform::new(|b: Batch| {
        anyhow::ensure!(!b.indices.contains(&5), "bad augmentation");
        Ok(b)
    });
    let opts = common::fast_opts(2, 3);
    let mut aug =
        Augmenter::new(common::loader(30), sampler(30, 2), Some(Box::new(fail)), &opts).unwrap();
    let err = aug
        .batches()
        .unwrap()
        .find_map(Result::err)
        .expect("pass should fail");
    assert!(err.is_pool_abort());
}

#[test]
fn non_finite_noise_aborts_the_pass() {
    let opts = common::fast_opts(2, 3);
    let noise = UniformNoise::new("x", f32::INFINITY);
    let mut aug =
        Augmenter::new(common::loader(30), sampler(30, 2), Some(Box::new(noise)), &opts).unwrap();
    let results: Vec<_> = aug.batches().unwrap().collect();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(AugmentError::PoolAbort)));
}

#[test]
fn worker_failure_raises_the_flag_before_the_caller_looks() {
    // sample 0 is in the first group; the delay lets the prefill finish first
    let loader = common::failing_loader(400, 0, Duration::from_millis(50));
    let opts = common::fast_opts(2, 4);
    let mut aug = ParallelAugmenter::new(loader, sampler(400, 2), None, 4, &opts).unwrap();

    let mut pass = aug.start_pass().unwrap();
    let flag = pass.abort_flag().unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !flag.is_set() {
        assert!(Instant::now() < deadline, "worker failure never set the abort flag");
        std::thread::sleep(Duration::from_millis(1));
    }
    let err = pass.next().expect("an error item").unwrap_err();
    assert!(matches!(err, AugmentError::PoolAbort));
    assert!(pass.next().is_none());
}

#[test]
fn clean_pass_keeps_the_flag_down_while_running() {
    let opts = common::fast_opts(2, 4);
    let mut aug = ParallelAugmenter::new(common::loader(40), sampler(40, 2), None, 4, &opts).unwrap();
    let mut pass = aug.start_pass().unwrap();
    let flag = pass.abort_flag().unwrap();
    for _ in 0..19 {
        assert!(pass.next().unwrap().is_ok());
        assert!(!flag.is_set());
    }
    assert!(pass.next().unwrap().is_ok());
    // end of pass shuts the pool down
    assert!(pass.next().is_none());
    assert!(flag.is_set());
}

#[test]
fn augmenter_recovers_on_the_next_pass() {
    let fail_once = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
    let flag = fail_once.clone();
    let fail = FnTransform::new(move |b: Batch| {
        if b.indices.contains(&3) && flag.swap(false, std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("transient failure");
        }
        Ok(b)
    });
    let opts = common::fast_opts(2, 2);
    let mut aug =
        Augmenter::new(common::loader(12), sampler(12, 2), Some(Box::new(fail)), &opts).unwrap();

    assert!(aug.batches().unwrap().any(|r| r.is_err()));
    let second: Vec<_> = aug.batches().unwrap().collect();
    assert_eq!(second.len(), 6);
    assert!(second.iter().all(Result::is_ok));
}
