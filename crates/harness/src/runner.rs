//! Per-rank execution and the in-process SPMD driver.

use roibench_codec::{Codec, Lz4Codec};
use roibench_comm::{Collective, CommError};
use roibench_comm_memory::MemoryUniverse;
use roibench_core::{ChunkError, EventPipeline, RunConfig, RunReport, SetupError, Topology};
use roibench_store_memory::MemoryStore;
use std::thread;
use thiserror::Error;
use tracing::{error, info};

/// Errors from the harness layer.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error("rank thread panicked")]
    RankPanic,
}

/// In-process SPMD settings.
#[derive(Debug, Clone)]
pub struct InProcessOptions {
    /// Number of rank threads.
    pub ranks: usize,
    /// Synthetic node size for the shared-resource split; 0 co-locates
    /// every rank on one node.
    pub ranks_per_node: usize,
}

impl Default for InProcessOptions {
    fn default() -> Self {
        InProcessOptions {
            ranks: 1,
            ranks_per_node: 0,
        }
    }
}

/// The routine every rank executes: derive topology, meet the setup
/// barrier, then run the pipeline if this rank is a work-group member.
///
/// The barrier orders the run after any shared output preparation the
/// designated rank performed, so all ranks observe a consistent artifact.
/// Non-members return `None` right after the barrier; members return the
/// report on the reporting rank and `None` elsewhere.
pub fn run_rank(
    world: &dyn Collective,
    config: &RunConfig,
    codec_options: &serde_json::Value,
    input: &MemoryStore,
    output: Option<&MemoryStore>,
) -> Result<Option<RunReport>, HarnessError> {
    let topology = Topology::derive(world, config.workers_per_node)?;
    world.barrier().map_err(SetupError::from)?;

    let Some(work) = topology.work else {
        info!(
            global_rank = topology.identity.global_rank,
            "rank is not in the work group; idling until the run ends"
        );
        return Ok(None);
    };

    let mut codec = Lz4Codec::new();
    codec.set_options(codec_options).map_err(SetupError::from)?;
    let mut pipeline = EventPipeline::open(config.clone(), input, output, codec, work)?;
    Ok(pipeline.run()?)
}

/// Run the whole benchmark as rank threads inside this process.
///
/// With `persist_output` the caller supplies the (initially empty) output
/// store; rank 0 prepares it from the input (the in-memory analogue of
/// copying the source file) before entering the collectives, so everyone
/// else first meets it after [`run_rank`]'s topology split and barrier.
pub fn run_in_process(
    opts: &InProcessOptions,
    config: &RunConfig,
    codec_options: &serde_json::Value,
    input: MemoryStore,
    output: Option<MemoryStore>,
) -> Result<Option<RunReport>, HarnessError> {
    if config.persist_output && output.is_none() {
        return Err(HarnessError::Setup(SetupError::Config(
            "persist_output requires an output store".into(),
        )));
    }
    let node_of: Vec<usize> = (0..opts.ranks)
        .map(|rank| {
            if opts.ranks_per_node == 0 {
                0
            } else {
                rank / opts.ranks_per_node
            }
        })
        .collect();
    let (_universe, collectives) = MemoryUniverse::with_nodes(node_of);
    let handles: Vec<_> = collectives
        .into_iter()
        .map(|comm| {
            let config = config.clone();
            let codec_options = codec_options.clone();
            let input = input.clone();
            let output = output.clone();
            thread::spawn(move || {
                if comm.rank() == 0 {
                    if let Some(output) = &output {
                        output.copy_from(&input);
                        info!("prepared shared output store");
                    }
                }
                let result = run_rank(&comm, &config, &codec_options, &input, output.as_ref());
                if let Err(HarnessError::Setup(err)) = &result {
                    // A real process would exit locally here; a rank thread
                    // must instead release its peers from the collectives.
                    error!(rank = comm.rank(), "setup failed: {err}");
                    comm.abort(1);
                }
                result
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.join().map_err(|_| HarnessError::RankPanic)?);
    }

    // Rank 0 is always a work-group member and carries the report. Prefer
    // surfacing the originating failure over the aborts it propagated.
    let mut report = None;
    let mut propagated_abort = None;
    for result in results {
        match result {
            Ok(r) => report = report.or(r),
            Err(HarnessError::Chunk(ChunkError::Comm(CommError::Aborted { code }))) => {
                propagated_abort = Some(HarnessError::Chunk(ChunkError::Comm(
                    CommError::Aborted { code },
                )));
            }
            Err(err) => return Err(err),
        }
    }
    if let Some(err) = propagated_abort {
        return Err(err);
    }
    Ok(report)
}
