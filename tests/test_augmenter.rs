//! End-to-end tests for the augmenter facade: batch counts, coverage,
//! equivalence of the sequential and parallel paths, and pass lifecycle.

mod common;

use std::collections::HashMap;

use augflow::augment::ParallelAugmenter;
use augflow::data_loader::{
    BatchSampler, FnTransform, RandomFlip, Sampler, SamplerSource, SequentialSampler,
};
use augflow::{AugmentError, Augmenter, Batch, SamplerKind, Transform};

fn sequential(n: usize) -> Box<dyn Sampler> {
    Box::new(SequentialSampler::new(n))
}

fn random(n: usize) -> SamplerSource {
    let kind = SamplerKind::random();
    let ds = common::loader(n);
    SamplerSource::Element(kind.from_dataset(ds.dataset().as_ref()).unwrap())
}

#[test]
fn batch_count_follows_drop_last() {
    for (n, b) in [(10, 3), (9, 3), (1, 4), (17, 5)] {
        let opts = common::fast_opts(b, 2);
        let keep = Augmenter::new(common::loader(n), sequential(n), None, &opts).unwrap();
        assert_eq!(keep.num_batches(), n.div_ceil(b), "n={} b={}", n, b);

        let opts = opts.drop_last(true);
        let drop = Augmenter::new(common::loader(n), sequential(n), None, &opts).unwrap();
        assert_eq!(drop.num_batches(), n / b, "n={} b={}", n, b);
    }
}

#[test]
fn drop_last_omits_the_short_batch() {
    let opts = common::fast_opts(4, 3).drop_last(true);
    let mut aug = Augmenter::new(common::loader(10), sequential(10), None, &opts).unwrap();
    let sizes: Vec<usize> = aug.batches().unwrap().map(|b| b.unwrap().len()).collect();
    assert_eq!(sizes, vec![4, 4]);
}

#[test]
fn parallel_pass_covers_every_sample_once() {
    for workers in 1..=4 {
        let opts = common::fast_opts(3, workers);
        let mut aug = Augmenter::new(common::loader(25), sequential(25), None, &opts).unwrap();
        assert!(aug.is_parallel());
        assert_eq!(aug.num_workers(), workers);

        let batches: Vec<Batch> = aug.batches().unwrap().map(Result::unwrap).collect();
        assert_eq!(batches.len(), 9);
        assert_eq!(batches.iter().map(Batch::len).sum::<usize>(), 25);

        let mut seen: Vec<usize> = batches.into_iter().flat_map(|b| b.indices).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..25).collect::<Vec<_>>(), "workers={}", workers);
    }
}

#[test]
fn sequential_and_parallel_yield_the_same_index_multiset() {
    let seq_opts = common::fast_opts(4, 0);
    let par_opts = common::fast_opts(4, 3);
    let mut seq = Augmenter::new(common::loader(30), random(30), None, &seq_opts).unwrap();
    let mut par = Augmenter::new(common::loader(30), random(30), None, &par_opts).unwrap();
    assert!(!seq.is_parallel());

    let mut a = common::indices_of(seq.batches().unwrap());
    let mut b = common::indices_of(par.batches().unwrap());
    // same seed, same pass number: same shuffle
    let groups_a: Vec<usize> = a.clone();
    a.sort_unstable();
    b.sort_unstable();
    assert_eq!(a, b);
    assert_ne!(groups_a, a, "random sampler should shuffle");
}

#[test]
fn one_worker_matches_sequential_exactly() {
    let transforms: Box<dyn Transform> = Box::new(RandomFlip::new("image", 0, 0.5));
    let seq_opts = common::fast_opts(4, 0);
    let par_opts = common::fast_opts(4, 1);
    let mut seq =
        Augmenter::new(common::loader(20), random(20), Some(transforms.clone()), &seq_opts).unwrap();
    let mut par = Augmenter::new(common::loader(20), random(20), Some(transforms), &par_opts).unwrap();

    for _ in 0..2 {
        let a: Vec<Batch> = seq.batches().unwrap().map(Result::unwrap).collect();
        let b: Vec<Batch> = par.batches().unwrap().map(Result::unwrap).collect();
        assert_eq!(a, b);
    }
}

#[test]
fn reiteration_yields_the_same_count() {
    let opts = common::fast_opts(3, 2);
    let mut aug = Augmenter::new(common::loader(11), random(11), None, &opts).unwrap();
    let first = aug.batches().unwrap().count();
    let second = aug.batches().unwrap().count();
    assert_eq!(first, 4);
    assert_eq!(first, second);
}

#[test]
fn passes_reshuffle() {
    let opts = common::fast_opts(50, 0);
    let mut aug = Augmenter::new(common::loader(50), random(50), None, &opts).unwrap();
    let first = common::indices_of(aug.batches().unwrap());
    let second = common::indices_of(aug.batches().unwrap());
    assert_ne!(first, second);
}

#[test]
fn zero_workers_runs_on_the_calling_thread() {
    let check = FnTransform::new(|b: Batch| {
        let name = std::thread::current().name().unwrap_or_default().to_string();
        anyhow::ensure!(
            !name.starts_with(augflow::constants::WORKER_THREAD_PREFIX),
            "ran on worker thread {}",
            name
        );
        Ok(b)
    });
    let opts = common::fast_opts(2, 0);
    let mut aug = Augmenter::new(common::loader(6), sequential(6), Some(Box::new(check)), &opts).unwrap();
    assert_eq!(aug.num_workers(), 0);
    assert!(aug.abort_flag().is_none());
    assert!(aug.batches().unwrap().all(|b| b.is_ok()));
}

#[test]
fn workers_run_on_named_threads() {
    let check = FnTransform::new(|b: Batch| {
        let name = std::thread::current().name().unwrap_or_default().to_string();
        anyhow::ensure!(
            name.starts_with(augflow::constants::WORKER_THREAD_PREFIX),
            "ran on thread {}",
            name
        );
        Ok(b)
    });
    let opts = common::fast_opts(2, 2);
    let mut aug = Augmenter::new(common::loader(6), sequential(6), Some(Box::new(check)), &opts).unwrap();
    assert!(aug.batches().unwrap().all(|b| b.is_ok()));
}

#[test]
fn abandoning_a_pass_releases_the_workers() {
    let opts = common::fast_opts(1, 3);
    let bs = BatchSampler::new(sequential(40), 1, false).unwrap();
    let mut aug = ParallelAugmenter::new(common::loader(40), bs, None, 3, &opts).unwrap();
    let first = {
        let mut pass = aug.start_pass().unwrap();
        assert!(pass.next().unwrap().is_ok());
        let flag = pass.abort_flag().unwrap();
        assert!(!flag.is_set());
        assert_eq!(in_flight(&pass), 6);
        flag
    };
    assert!(first.is_set());
    assert!(!aug.pool().is_running());

    // a new pass starts cleanly with a fresh flag
    let mut pass = aug.start_pass().unwrap();
    let second = pass.abort_flag().unwrap();
    assert!(!second.same_as(&first));
    assert!(!second.is_set());
    assert_eq!(pass.by_ref().count(), 40);
}

fn in_flight(pass: &augflow::augment::ParallelPass<'_>) -> usize {
    pass.pending().iter().sum()
}

#[test]
fn per_class_sampler_balances_classes() {
    let n = 30;
    let ds = common::loader(n);
    let sampler = SamplerKind::per_class_random()
        .from_dataset(ds.dataset().as_ref())
        .unwrap();
    let opts = common::fast_opts(5, 2);
    let mut aug = Augmenter::new(ds, sampler, None, &opts).unwrap();
    let mut counts: HashMap<usize, usize> = HashMap::new();
    for i in common::indices_of(aug.batches().unwrap()) {
        *counts.entry(i % 3).or_default() += 1;
    }
    let (lo, hi) = (counts.values().min().copied(), counts.values().max().copied());
    assert_eq!(lo, hi);
}

#[test]
fn ready_batch_sampler_keeps_its_own_settings() {
    let bs = BatchSampler::new(sequential(10), 4, true).unwrap();
    let opts = common::fast_opts(100, 2);
    let aug = Augmenter::new(common::loader(10), bs, None, &opts).unwrap();
    assert_eq!(aug.num_batches(), 2);
}

#[test]
fn empty_sampler_is_rejected() {
    let opts = common::fast_opts(2, 2);
    let err = Augmenter::new(common::loader(3), sequential(0), None, &opts).unwrap_err();
    assert!(matches!(err, AugmentError::InvalidSampler(_)));
}
