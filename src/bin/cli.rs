// src/bin/cli.rs
//
//! Benchmark CLI for the augmentation pipeline.
//!
//! Examples:
//! ```bash
//! augflow-cli bench --samples 10000 --batch-size 64 --workers auto
//! augflow-cli bench --workers 0 --sampler per-class-random      # sequential
//! augflow-cli -vv bench --workers 4 --fail-at 1234              # inject a failure
//! augflow-cli bench --passes 3 --json > summary.json
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::io::{self, ErrorKind, Write};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use augflow::data_loader::{
    Compose, DataManager, Dataset, DatasetError, FnTransform, RandomFlip, Sample, UniformNoise,
};
use augflow::{AugmenterOptions, Batch, DataLoader, NumWorkers, SamplerKind, Transform};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // Gracefully exit on broken pipe (e.g., when piped to head/tail)
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Augment a synthetic labelled image dataset and report throughput.
    Bench(BenchArgs),
}

#[derive(clap::Args)]
struct BenchArgs {
    /// Number of synthetic samples
    #[arg(long, default_value_t = 4096)]
    samples: usize,

    /// Samples per batch
    #[arg(short = 'b', long, default_value_t = 32)]
    batch_size: usize,

    /// Worker threads: `auto` or a count (0 = sequential)
    #[arg(short = 'w', long, default_value = "auto")]
    workers: NumWorkers,

    /// Passes over the dataset
    #[arg(short = 'p', long, default_value_t = 1)]
    passes: usize,

    #[arg(long, value_enum, default_value_t = SamplerArg::Random)]
    sampler: SamplerArg,

    /// Side length of the square synthetic images
    #[arg(long, default_value_t = 32)]
    image_size: usize,

    #[arg(long, default_value_t = 1)]
    seed: u64,

    #[arg(long)]
    drop_last: bool,

    /// Fail the transform of the batch containing this sample index
    #[arg(long, value_name = "INDEX")]
    fail_at: Option<usize>,

    /// Worker poll interval in milliseconds
    #[arg(long, default_value_t = augflow::constants::DEFAULT_POLL_INTERVAL_MS)]
    poll_ms: u64,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum SamplerArg {
    Sequential,
    Random,
    PerClassRandom,
    WeightedPrevalence,
}

impl From<SamplerArg> for SamplerKind {
    fn from(s: SamplerArg) -> Self {
        match s {
            SamplerArg::Sequential => SamplerKind::Sequential,
            SamplerArg::Random => SamplerKind::random(),
            SamplerArg::PerClassRandom => SamplerKind::per_class_random(),
            SamplerArg::WeightedPrevalence => SamplerKind::weighted_prevalence(),
        }
    }
}

/// Single-channel images whose pixels are a function of the sample index,
/// with an imbalanced label distribution.
struct SyntheticImages {
    len: usize,
    side: usize,
}

impl Dataset for SyntheticImages {
    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: usize) -> Result<Sample, DatasetError> {
        if index >= self.len {
            return Err(DatasetError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        let side = self.side;
        let data = ArrayD::from_shape_fn(IxDyn(&[1, side, side]), |ix| {
            ((index + ix[1] * side + ix[2]) % 255) as f32 / 255.0
        });
        // classes 0..4 in proportion 1:2:3:4
        let label = match index % 10 {
            0 => 0,
            1..=2 => 1,
            3..=5 => 2,
            _ => 3,
        };
        Ok(Sample::from([
            ("data".to_string(), data),
            ("label".to_string(), ArrayD::from_elem(IxDyn(&[]), label as f32)),
        ]))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunSummary {
    started_at: String,
    finished_at: String,
    elapsed_seconds: f64,
    workers: usize,
    passes: usize,
    batches: u64,
    samples: u64,
}

impl RunSummary {
    fn batches_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.batches as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }

    fn samples_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.samples as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }
}

fn build_transforms(fail_at: Option<usize>) -> Box<dyn Transform> {
    let mut pipeline = Compose::default()
        .push(RandomFlip::new("data", 2, 0.5))
        .push(UniformNoise::new("data", 0.05));
    if let Some(bad) = fail_at {
        pipeline = pipeline.push(FnTransform::new(move |b: Batch| {
            if b.indices.contains(&bad) {
                anyhow::bail!("injected failure at sample {}", bad);
            }
            Ok(b)
        }));
    }
    Box::new(pipeline)
}

fn run_bench(args: BenchArgs) -> Result<RunSummary> {
    let dataset: std::sync::Arc<dyn Dataset> = std::sync::Arc::new(SyntheticImages {
        len: args.samples,
        side: args.image_size,
    });
    let opts = AugmenterOptions::default()
        .with_batch_size(args.batch_size)
        .drop_last(args.drop_last)
        .num_workers(args.workers)
        .poll_interval(Duration::from_millis(args.poll_ms))
        .from_env()?;
    let manager = DataManager::with_options(
        DataLoader::new(dataset)?,
        args.sampler.into(),
        Some(build_transforms(args.fail_at)),
        opts,
    )?;
    let mut augmenter = manager.augmenter(args.seed)?;
    info!(
        samples = manager.n_samples(),
        batches = augmenter.num_batches(),
        workers = augmenter.num_workers(),
        "starting benchmark"
    );

    let started_at = chrono::Utc::now().to_rfc3339();
    let start = Instant::now();
    let (mut batches, mut samples) = (0u64, 0u64);
    for pass in 0..args.passes {
        for batch in augmenter.batches()? {
            let batch = batch.with_context(|| format!("pass {} failed", pass))?;
            batches += 1;
            samples += batch.len() as u64;
        }
        info!(pass, batches, "pass complete");
    }

    Ok(RunSummary {
        started_at,
        finished_at: chrono::Utc::now().to_rfc3339(),
        elapsed_seconds: start.elapsed().as_secs_f64(),
        workers: augmenter.num_workers(),
        passes: args.passes,
        batches,
        samples,
    })
}

fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",        // no -v: WARN level
        1 => "info",        // -v: INFO level
        _ => "debug",       // -vv or more: DEBUG level
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    match cli.cmd {
        Command::Bench(args) => {
            let json = args.json;
            let summary = run_bench(args).inspect_err(|e| warn!("benchmark aborted: {:#}", e))?;
            if json {
                safe_println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                safe_println!("Workers         : {}", summary.workers);
                safe_println!("Passes          : {}", summary.passes);
                safe_println!("Batches         : {}", summary.batches);
                safe_println!("Samples         : {}", summary.samples);
                safe_println!("Elapsed         : {:.3} s", summary.elapsed_seconds);
                safe_println!("Batches/s       : {:.1}", summary.batches_per_second());
                safe_println!("Samples/s       : {:.1}", summary.samples_per_second());
            }
        }
    }

    Ok(())
}
