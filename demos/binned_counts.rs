//! Histogram a few integer ranges on any backend.
//!
//! ```text
//! cargo run --example binned_counts -- --mode pool --processes 4
//! cargo run --example binned_counts -- --mode subprocess --max-items 50000
//! RUST_LOG=ironloop=debug cargo run --example binned_counts -- --mode threads
//! ```
//!
//! In `subprocess` mode the binary re-invokes itself as
//! `binned_counts worker <package>` for every unit.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ironloop::dataset::{RangeDataset, RangeSource};
use ironloop::dropbox::execute_package;
use ironloop::{MergingCollector, ParallelConfig, ParallelMode, Reader, WorkerCommand, build_parallel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(about = "Count integers per bin across several ranges")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON run configuration; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// sequential, pool, subprocess or threads.
    #[arg(long)]
    mode: Option<String>,

    #[arg(long)]
    processes: Option<usize>,

    /// Largest number of items a single unit may hold.
    #[arg(long)]
    max_items: Option<usize>,

    #[arg(long, default_value_t = 1_000)]
    bin_width: u64,

    /// Show progress.
    #[arg(long)]
    progress: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run one task package (used by the subprocess backend).
    Worker { package: PathBuf },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct BinningReader {
    width: u64,
    bins: BTreeMap<u64, u64>,
    results: Option<BTreeMap<u64, u64>>,
}

impl Reader for BinningReader {
    type Item = u64;
    type Results = BTreeMap<u64, u64>;

    fn read(&mut self, item: &u64) {
        *self.bins.entry(item / self.width * self.width).or_default() += 1;
    }

    fn end(&mut self) -> Self::Results {
        std::mem::take(&mut self.bins)
    }

    fn set_results(&mut self, results: Self::Results) {
        self.results = Some(results);
    }

    fn results(&self) -> Option<&Self::Results> {
        self.results.as_ref()
    }
}

fn config_from(cli: &Cli) -> Result<ParallelConfig> {
    let mut config = match &cli.config {
        Some(path) => ParallelConfig::from_json_file(path)?,
        None => ParallelConfig::default(),
    };
    if let Some(mode) = &cli.mode {
        config.mode = ParallelMode::from_name_or_default(mode);
    }
    if let Some(n) = cli.processes {
        config.processes = n;
    }
    if let Some(n) = cli.max_items {
        config.split.max_items_per_unit = Some(n);
    }
    if cli.progress {
        config.quiet = false;
    }
    if config.mode == ParallelMode::Subprocess && config.worker.is_none() {
        config.worker = Some(WorkerCommand {
            program: std::env::current_exe().context("cannot locate own executable")?,
            args: vec!["worker".to_string()],
        });
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Some(Command::Worker { package }) = &cli.command {
        execute_package::<RangeSource, BinningReader>(package)?;
        return Ok(());
    }

    let config = config_from(&cli)?;
    let reader = BinningReader {
        width: cli.bin_width.max(1),
        ..BinningReader::default()
    };
    let mut runner = build_parallel::<RangeSource, BinningReader>(&config)?
        .into_runner(reader, MergingCollector::new());

    runner.begin()?;
    for (name, range) in [("low", 0..25_000), ("mid", 40_000..90_000), ("high", 1_000_000..1_003_500)] {
        let units = runner.run(&RangeDataset::new(name, range))?;
        info!(dataset = name, units, "submitted");
    }
    let outcome = runner.end()?;

    println!("{}", serde_json::to_string_pretty(&outcome.output)?);
    if let Some(shortfall) = &outcome.shortfall {
        eprintln!("{shortfall}");
        std::process::exit(1);
    }
    Ok(())
}
