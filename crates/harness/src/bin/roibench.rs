//! roibench — distributed event-compression benchmark.
//!
//! Streams synthetic event frames out of an in-memory store, feeds the
//! per-event peak lists to the codec as a region-of-interest side channel,
//! and reports global compression ratio and bandwidth figures.
//!
//! # Usage
//!
//! ```bash
//! # Four rank threads in one process, two synthetic nodes
//! roibench --ranks 4 --ranks-per-node 2 --events 256 --chunk-size 8
//!
//! # Persist (decompress + write) the first 100 events, with diagnostics
//! roibench --ranks 2 --persist --write-events 100 --debug-records
//!
//! # Real MPI launch (build with --features mpi)
//! mpiexec -n 8 roibench --mpi --events 1024 --chunk-size 16
//! ```
//!
//! # Configuration
//!
//! Defaults can come from a TOML file (`--config bench.toml`); CLI flags
//! override it. Example:
//!
//! ```toml
//! [run]
//! chunk_size = 8
//! workers_per_node = 2
//!
//! [synthetic]
//! events = 256
//! rows = 512
//! cols = 512
//! max_peaks = 32
//! seed = 7
//!
//! [harness]
//! ranks = 4
//! ranks_per_node = 2
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use roibench_core::{DebugConfig, RunConfig};
use roibench_harness::{
    generate_store, load_codec_options, run_in_process, HarnessError, InProcessOptions,
    SyntheticConfig,
};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Distributed event-compression benchmark.
#[derive(Parser, Debug)]
#[command(name = "roibench")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of in-process rank threads (overrides config)
    #[arg(long)]
    ranks: Option<usize>,

    /// Synthetic node size for the in-process mode (overrides config)
    #[arg(long)]
    ranks_per_node: Option<usize>,

    /// Work-group cap per node, 0 = all ranks on the node
    #[arg(short = 'n', long)]
    workers_per_node: Option<usize>,

    /// Events per chunk per rank
    #[arg(short = 'c', long)]
    chunk_size: Option<u64>,

    /// Number of synthetic events
    #[arg(long)]
    events: Option<u64>,

    /// First event to process
    #[arg(short = 's', long)]
    start_event: Option<u64>,

    /// Enable the decompression and write stages
    #[arg(short = 'o', long)]
    persist: bool,

    /// Number of events to persist (defaults to all with --persist)
    #[arg(short = 'w', long)]
    write_events: Option<u64>,

    /// Codec option tree (JSON file)
    #[arg(short = 'p', long)]
    codec_config: Option<PathBuf>,

    /// Write one diagnostic JSON document per chunk
    #[arg(short = 'd', long)]
    debug_records: bool,

    /// Directory for diagnostic documents (defaults to the temp dir)
    #[arg(short = 'D', long)]
    debug_dir: Option<PathBuf>,

    /// Seed for the synthetic dataset
    #[arg(long)]
    seed: Option<u64>,

    /// Log level filter (overrides RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run over MPI instead of in-process rank threads
    #[cfg(feature = "mpi")]
    #[arg(long)]
    mpi: bool,
}

/// TOML configuration, all sections optional.
#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    run: RunSection,
    #[serde(default)]
    synthetic: SyntheticSection,
    #[serde(default)]
    harness: HarnessSection,
}

#[derive(Debug, Clone, Deserialize)]
struct RunSection {
    #[serde(default = "default_chunk_size")]
    chunk_size: u64,
    #[serde(default)]
    start_event: u64,
    #[serde(default)]
    write_events: Option<u64>,
    #[serde(default)]
    workers_per_node: usize,
    #[serde(default)]
    persist_output: bool,
}

impl Default for RunSection {
    fn default() -> Self {
        RunSection {
            chunk_size: default_chunk_size(),
            start_event: 0,
            write_events: None,
            workers_per_node: 0,
            persist_output: false,
        }
    }
}

fn default_chunk_size() -> u64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
struct SyntheticSection {
    #[serde(default = "default_events")]
    events: u64,
    #[serde(default = "default_rows")]
    rows: u64,
    #[serde(default = "default_rows")]
    cols: u64,
    #[serde(default = "default_max_peaks")]
    max_peaks: u64,
    #[serde(default = "default_seed")]
    seed: u64,
}

impl Default for SyntheticSection {
    fn default() -> Self {
        SyntheticSection {
            events: default_events(),
            rows: default_rows(),
            cols: default_rows(),
            max_peaks: default_max_peaks(),
            seed: default_seed(),
        }
    }
}

fn default_events() -> u64 {
    64
}

fn default_rows() -> u64 {
    128
}

fn default_max_peaks() -> u64 {
    16
}

fn default_seed() -> u64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
struct HarnessSection {
    #[serde(default = "default_ranks")]
    ranks: usize,
    #[serde(default)]
    ranks_per_node: usize,
}

impl Default for HarnessSection {
    fn default() -> Self {
        HarnessSection {
            ranks: default_ranks(),
            ranks_per_node: 0,
        }
    }
}

fn default_ranks() -> usize {
    1
}

impl FileConfig {
    fn load(path: &PathBuf) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Apply CLI overrides to the configuration.
    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(chunk_size) = cli.chunk_size {
            self.run.chunk_size = chunk_size;
        }
        if let Some(start_event) = cli.start_event {
            self.run.start_event = start_event;
        }
        if let Some(write_events) = cli.write_events {
            self.run.write_events = Some(write_events);
        }
        if let Some(workers) = cli.workers_per_node {
            self.run.workers_per_node = workers;
        }
        if cli.persist {
            self.run.persist_output = true;
        }
        if let Some(events) = cli.events {
            self.synthetic.events = events;
        }
        if let Some(seed) = cli.seed {
            self.synthetic.seed = seed;
        }
        if let Some(ranks) = cli.ranks {
            self.harness.ranks = ranks;
        }
        if let Some(ranks_per_node) = cli.ranks_per_node {
            self.harness.ranks_per_node = ranks_per_node;
        }
    }
}

fn build_run_config(cli: &Cli, file: &FileConfig) -> RunConfig {
    let debug = cli.debug_records.then(|| DebugConfig {
        dir: cli
            .debug_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir),
        source: format!(
            "synthetic-{}ev-seed{}",
            file.synthetic.events, file.synthetic.seed
        ),
        config: cli
            .codec_config
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "builtin".to_string()),
    });

    RunConfig {
        chunk_size: file.run.chunk_size,
        start_event: file.run.start_event,
        write_events: file.run.write_events,
        workers_per_node: file.run.workers_per_node,
        persist_output: file.run.persist_output,
        paths: Default::default(),
        debug,
    }
}

#[cfg(feature = "mpi")]
fn run_mpi(
    config: &RunConfig,
    codec_options: &serde_json::Value,
    synthetic: &SyntheticConfig,
) -> Result<()> {
    use roibench_comm::Collective;
    use roibench_harness::run_rank;
    use roibench_store_memory::MemoryStore;

    let runtime = roibench_comm_mpi::MpiRuntime::init()
        .context("MPI was already initialized in this process")?;
    let world = runtime.world();

    // Every process holds its own replica of the synthetic store; the seed
    // makes them identical, so reads behave like a shared source file.
    let input = generate_store(synthetic, &config.paths);
    let output = config.persist_output.then(|| {
        let output = MemoryStore::new();
        output.copy_from(&input);
        output
    });

    match run_rank(&world, config, codec_options, &input, output.as_ref()) {
        Ok(Some(report)) => {
            print!("{}", report.render());
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(HarnessError::Setup(err)) => {
            // Pre-pipeline failure: report locally and exit without group
            // coordination.
            eprintln!("rank {}: {err}", world.rank());
            std::process::exit(1);
        }
        Err(err) => {
            // The pipeline already escalated into a group abort; in case
            // the substrate returned control, exit with the same code.
            let code = match &err {
                HarnessError::Chunk(chunk) => chunk.exit_code(),
                _ => 1,
            };
            eprintln!("rank {}: {err}", world.rank());
            std::process::exit(code);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    config.apply_overrides(&cli);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let run_config = build_run_config(&cli, &config);
    let codec_options = load_codec_options(cli.codec_config.as_deref())
        .context("failed to load codec options")?;
    let synthetic = SyntheticConfig {
        events: config.synthetic.events,
        rows: config.synthetic.rows,
        cols: config.synthetic.cols,
        max_peaks: config.synthetic.max_peaks,
        seed: config.synthetic.seed,
    };

    #[cfg(feature = "mpi")]
    if cli.mpi {
        return run_mpi(&run_config, &codec_options, &synthetic);
    }

    let opts = InProcessOptions {
        ranks: config.harness.ranks,
        ranks_per_node: config.harness.ranks_per_node,
    };
    let input = generate_store(&synthetic, &run_config.paths);
    let output = run_config
        .persist_output
        .then(roibench_store_memory::MemoryStore::new);
    match run_in_process(&opts, &run_config, &codec_options, input, output) {
        Ok(Some(report)) => {
            print!("{}", report.render());
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(HarnessError::Chunk(err)) => {
            eprintln!("{err}");
            std::process::exit(err.exit_code());
        }
        Err(err) => Err(err.into()),
    }
}
