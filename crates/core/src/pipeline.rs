//! The per-chunk event pipeline.
//!
//! Each work-group member runs the same strictly sequential stage sequence
//! per iteration:
//!
//! ```text
//! READ_INDEX -> READ_POSITIONS -> BUILD_PEAKS -> READ_FRAMES ->
//! COMPRESS -> [DECOMPRESS] -> WRITE -> ACCUMULATE
//! ```
//!
//! Slab reads and writes are collective: a rank whose chunk is empty still
//! issues the calls with a zero-count selection so peers in collective I/O
//! never stall. Compression is skipped for empty chunks, but the rank still
//! contributes a zero to the per-iteration timing reduction.
//!
//! Stream buffers are allocated once and reused across iterations; the
//! final partial chunk just shortens their logical length. There is no
//! double buffering, so `read(i+1)` never overlaps `compress(i)` — a
//! deliberate simplicity tradeoff.
//!
//! Any collaborator error is not retried: it is reported with the rank id
//! and escalated into a coordinated abort of the work group, because the
//! remaining ranks would otherwise block forever on the next collective
//! call.

use crate::aggregate::{reduce_totals, MetricsAccumulator, RunReport, REPORT_RANK};
use crate::config::RunConfig;
use crate::diagnostics::DiagnosticsSink;
use crate::error::{ChunkError, SetupError};
use crate::partition::chunk_for;
use crate::peaks::build_peak_index;
use crate::topology::WorkGroup;
use roibench_codec::{Codec, FrameSlab, FrameSlabMut};
use roibench_comm::{CommError, ReduceOp};
use roibench_metrics as metrics;
use roibench_store::{Dataset, EventStore, Selection};
use roibench_types::{EventChunk, ScalarType, SlabBuffer};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, info, trace};

/// Stage of the per-chunk state machine. Strictly sequential; recorded for
/// logging and status snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStage {
    ReadIndex,
    ReadPositions,
    BuildPeaks,
    ReadFrames,
    Compress,
    Decompress,
    Write,
    Accumulate,
}

impl ChunkStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStage::ReadIndex => "read_index",
            ChunkStage::ReadPositions => "read_positions",
            ChunkStage::BuildPeaks => "build_peaks",
            ChunkStage::ReadFrames => "read_frames",
            ChunkStage::Compress => "compress",
            ChunkStage::Decompress => "decompress",
            ChunkStage::Write => "write",
            ChunkStage::Accumulate => "accumulate",
        }
    }
}

/// Pipeline progress snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub iteration_base: u64,
    pub stage: &'static str,
    pub chunks_processed: u64,
}

/// Dataset geometry resolved once at setup.
struct Geometry {
    total_events: u64,
    max_peaks: u64,
    /// Per-event frame dims, storage order (event axis removed).
    frame_dims: Vec<u64>,
    frame_bytes_per_event: usize,
    /// Events below this global index are persisted; 0 without output.
    write_limit: u64,
}

/// One reused buffer per input stream.
struct StreamBuffers {
    counts: SlabBuffer<i64>,
    pos_x: SlabBuffer<f64>,
    pos_y: SlabBuffer<f64>,
    /// Frame bytes; the engine never interprets frame values.
    frames: SlabBuffer<u8>,
}

/// The per-chunk event pipeline of one work-group member.
pub struct EventPipeline<D: Dataset, C: Codec> {
    config: RunConfig,
    work: WorkGroup,
    codec: C,

    frames: D,
    peak_x: D,
    peak_y: D,
    peak_count: D,
    output: Option<D>,

    geometry: Geometry,
    bufs: StreamBuffers,
    acc: MetricsAccumulator,
    diagnostics: Option<DiagnosticsSink>,

    stage: ChunkStage,
    iteration_base: u64,
    chunks_processed: u64,
}

impl<D: Dataset, C: Codec> EventPipeline<D, C> {
    /// Open datasets, validate geometry and allocate the stream buffers.
    ///
    /// Errors here are [`SetupError`]s: nothing collective has started, so
    /// the process reports locally and exits without group coordination.
    pub fn open<S>(
        config: RunConfig,
        store: &S,
        output_store: Option<&S>,
        codec: C,
        work: WorkGroup,
    ) -> Result<Self, SetupError>
    where
        S: EventStore<Dataset = D>,
    {
        config.validate()?;

        let frames = store.dataset(&config.paths.frames)?;
        let peak_x = store.dataset(&config.paths.peak_x)?;
        let peak_y = store.dataset(&config.paths.peak_y)?;
        let peak_count = store.dataset(&config.paths.peak_count)?;

        expect_type(&config.paths.frames, &frames, ScalarType::F32)?;
        expect_type(&config.paths.peak_x, &peak_x, ScalarType::F64)?;
        expect_type(&config.paths.peak_y, &peak_y, ScalarType::F64)?;
        expect_type(&config.paths.peak_count, &peak_count, ScalarType::I64)?;

        let frame_shape = frames.shape();
        if frame_shape.rank() < 2 {
            return Err(SetupError::BadDataset {
                path: config.paths.frames.clone(),
                detail: format!("frames need an event axis plus image axes, got {frame_shape}"),
            });
        }
        let total_events = frame_shape.dims()[0];

        let pos_shape = peak_x.shape();
        if pos_shape.rank() != 2 || peak_y.shape() != pos_shape {
            return Err(SetupError::BadDataset {
                path: config.paths.peak_x.clone(),
                detail: format!(
                    "peak positions must share one [events, max_peaks] shape, got {} and {}",
                    pos_shape,
                    peak_y.shape()
                ),
            });
        }
        let max_peaks = pos_shape.dims()[1];

        for (path, dset_events) in [
            (&config.paths.peak_x, pos_shape.dims()[0]),
            (&config.paths.peak_count, peak_count.shape().dims()[0]),
        ] {
            if dset_events != total_events {
                return Err(SetupError::BadDataset {
                    path: path.clone(),
                    detail: format!("covers {dset_events} events, frames hold {total_events}"),
                });
            }
        }

        // The max_peaks attribute, when present, must agree with the
        // position matrices.
        match store.attribute_u64(&config.paths.peak_x, "max_peaks") {
            Ok(actual) if actual != max_peaks => {
                return Err(SetupError::BadAttribute {
                    path: config.paths.peak_x.clone(),
                    name: "max_peaks".to_string(),
                    expected: max_peaks,
                    actual,
                })
            }
            _ => {}
        }

        let output = if config.persist_output {
            let out_store = output_store.ok_or_else(|| {
                SetupError::Config("persist_output requires an output store".into())
            })?;
            let out = out_store.dataset(&config.paths.frames)?;
            if out.shape() != frame_shape || out.scalar_type() != ScalarType::F32 {
                return Err(SetupError::BadDataset {
                    path: config.paths.frames.clone(),
                    detail: "output frames dataset does not match the input geometry".into(),
                });
            }
            Some(out)
        } else {
            None
        };

        // Open question resolved: the persisted range is clamped against
        // the write limit alone, never mixed with the total event count.
        let write_limit = if config.persist_output {
            config
                .write_events
                .unwrap_or(total_events)
                .min(total_events)
        } else {
            0
        };

        let frame_dims = frame_shape.per_event();
        let frame_bytes_per_event =
            frame_dims.element_count() as usize * ScalarType::F32.byte_width();
        let chunk = config.chunk_size as usize;
        let bufs = StreamBuffers {
            counts: SlabBuffer::new(chunk),
            pos_x: SlabBuffer::new(chunk * max_peaks as usize),
            pos_y: SlabBuffer::new(chunk * max_peaks as usize),
            frames: SlabBuffer::new(chunk * frame_bytes_per_event),
        };

        info!(
            work_rank = work.rank(),
            work_size = work.size(),
            total_events,
            max_peaks,
            chunk_size = config.chunk_size,
            write_limit,
            frame_shape = %frame_shape,
            "pipeline ready"
        );

        Ok(EventPipeline {
            diagnostics: config.debug.as_ref().map(DiagnosticsSink::new),
            config,
            work,
            codec,
            frames,
            peak_x,
            peak_y,
            peak_count,
            output,
            geometry: Geometry {
                total_events,
                max_peaks,
                frame_dims: frame_dims.dims().to_vec(),
                frame_bytes_per_event,
                write_limit,
            },
            bufs,
            acc: MetricsAccumulator::default(),
            stage: ChunkStage::ReadIndex,
            iteration_base: 0,
            chunks_processed: 0,
        })
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            iteration_base: self.iteration_base,
            stage: self.stage.as_str(),
            chunks_processed: self.chunks_processed,
        }
    }

    /// Per-rank running totals.
    pub fn accumulator(&self) -> &MetricsAccumulator {
        &self.acc
    }

    /// Run every iteration and the terminal reduction.
    ///
    /// Returns the global report on [`REPORT_RANK`], `None` elsewhere. On
    /// error the failure has already been escalated: reported with this
    /// rank's id and turned into a group-wide abort (unless the error *is*
    /// a peer's abort).
    pub fn run(&mut self) -> Result<Option<RunReport>, ChunkError> {
        match self.run_inner() {
            Ok(report) => Ok(report),
            Err(err) => {
                self.escalate(&err);
                Err(err)
            }
        }
    }

    fn run_inner(&mut self) -> Result<Option<RunReport>, ChunkError> {
        let begin = Instant::now();
        let stride = self.config.chunk_size * self.work.size() as u64;
        let mut base = self.config.start_event;
        while base < self.geometry.total_events {
            self.run_iteration(base, stride)?;
            base += stride;
        }

        let wallclock_ms = begin.elapsed().as_millis() as u64;
        let report = reduce_totals(
            &self.acc,
            self.work.comm(),
            wallclock_ms,
            self.config.persist_output,
        )?;
        if let Some(report) = &report {
            metrics::record_run_totals(
                report.global_raw_bytes,
                report.global_compressed_bytes,
                wallclock_ms as f64 / 1e3,
            );
            info!(
                raw_bytes = report.global_raw_bytes,
                compressed_bytes = report.global_compressed_bytes,
                wallclock_ms,
                "run complete"
            );
        }
        Ok(report)
    }

    fn run_iteration(&mut self, base: u64, stride: u64) -> Result<(), ChunkError> {
        let chunk = chunk_for(
            base,
            self.config.chunk_size,
            self.work.rank(),
            self.geometry.total_events,
        );
        self.iteration_base = base;
        metrics::set_iteration_base(base);
        if self.work.rank() == REPORT_RANK {
            debug!(base, end = base + stride, "processing iteration");
        }

        let read_begin = Instant::now();
        self.read_index(&chunk)?;
        self.read_positions(&chunk)?;

        self.stage = ChunkStage::BuildPeaks;
        let peaks = build_peak_index(
            self.bufs.counts.as_slice(),
            self.bufs.pos_x.as_slice(),
            self.bufs.pos_y.as_slice(),
            self.geometry.max_peaks,
        )
        .map_err(|e| ChunkError::CorruptPeakCount {
            chunk,
            event_offset: e.event_offset,
            count: e.count,
            max_peaks: e.max_peaks,
        })?;

        self.read_frames(&chunk)?;
        let raw_bytes = self.bufs.frames.logical_len() as u64;
        metrics::record_chunk_read(chunk.count, raw_bytes, read_begin.elapsed().as_secs_f64());
        trace!(chunk = %chunk, peaks = peaks.len(), "chunk read");

        // COMPRESS. Empty chunks skip the codec but still contribute a
        // zero to the timing reduction below.
        self.stage = ChunkStage::Compress;
        let mut compress_ms = 0u64;
        let mut compressed = None;
        if !chunk.is_empty() {
            let shape = roibench_types::Shape::new(
                std::iter::once(chunk.count)
                    .chain(self.geometry.frame_dims.iter().copied())
                    .collect(),
            )
            .reversed();
            let slab = FrameSlab {
                bytes: self.bufs.frames.as_slice(),
                shape,
                scalar_type: ScalarType::F32,
            };
            let begin = Instant::now();
            let buf = self
                .codec
                .compress(&slab, &peaks)
                .map_err(|source| ChunkError::Codec { chunk, source })?;
            compress_ms = begin.elapsed().as_millis() as u64;
            metrics::record_chunk_compressed(
                raw_bytes,
                buf.len() as u64,
                begin.elapsed().as_secs_f64(),
            );
            compressed = Some(buf);
        }

        let mut decompress_ms = 0u64;
        if self.output.is_some() {
            decompress_ms = self.restore_and_write(base, &chunk, compressed.as_ref())?;
        }

        if let Some(sink) = &self.diagnostics {
            let path = sink
                .write_chunk(&chunk, &self.codec.metrics())
                .map_err(|source| ChunkError::Diagnostics {
                    path: sink.record_path(&chunk),
                    source,
                })?;
            debug!(path = %path.display(), "wrote chunk diagnostic record");
        }

        // ACCUMULATE. The per-iteration group maximum lands on the
        // reporting rank, which sums it across iterations.
        self.stage = ChunkStage::Accumulate;
        self.acc
            .add_chunk(raw_bytes, compressed.as_ref().map_or(0, |b| b.len() as u64));
        if let Some(ms) = self
            .work
            .comm()
            .reduce_u64(compress_ms, ReduceOp::Max, REPORT_RANK)?
        {
            self.acc.add_compress_maximum(ms);
        }
        if self.config.persist_output {
            if let Some(ms) = self
                .work
                .comm()
                .reduce_u64(decompress_ms, ReduceOp::Max, REPORT_RANK)?
            {
                self.acc.add_decompress_maximum(ms);
            }
        }

        self.chunks_processed += 1;
        metrics::record_iteration(base);
        Ok(())
    }

    fn read_index(&mut self, chunk: &EventChunk) -> Result<(), ChunkError> {
        self.stage = ChunkStage::ReadIndex;
        self.bufs
            .counts
            .set_logical_len(chunk.count as usize)
            .map_err(|source| ChunkError::Buffer {
                chunk: *chunk,
                source,
            })?;
        let selection = Selection::new(vec![chunk.start], vec![chunk.count]);
        self.peak_count
            .read_slab(
                &selection,
                bytemuck::cast_slice_mut(self.bufs.counts.as_mut_slice()),
            )
            .map_err(|source| ChunkError::Store {
                chunk: *chunk,
                source,
            })
    }

    fn read_positions(&mut self, chunk: &EventChunk) -> Result<(), ChunkError> {
        self.stage = ChunkStage::ReadPositions;
        let logical = (chunk.count * self.geometry.max_peaks) as usize;
        let selection = Selection::new(
            vec![chunk.start, 0],
            vec![chunk.count, self.geometry.max_peaks],
        );
        for (buf, dset) in [
            (&mut self.bufs.pos_x, &self.peak_x),
            (&mut self.bufs.pos_y, &self.peak_y),
        ] {
            buf.set_logical_len(logical)
                .map_err(|source| ChunkError::Buffer {
                    chunk: *chunk,
                    source,
                })?;
            dset.read_slab(&selection, bytemuck::cast_slice_mut(buf.as_mut_slice()))
                .map_err(|source| ChunkError::Store {
                    chunk: *chunk,
                    source,
                })?;
        }
        Ok(())
    }

    fn read_frames(&mut self, chunk: &EventChunk) -> Result<(), ChunkError> {
        self.stage = ChunkStage::ReadFrames;
        self.bufs
            .frames
            .set_logical_len(chunk.count as usize * self.geometry.frame_bytes_per_event)
            .map_err(|source| ChunkError::Buffer {
                chunk: *chunk,
                source,
            })?;
        let selection = self.frame_selection(chunk.start, chunk.count);
        self.frames
            .read_slab(&selection, self.bufs.frames.as_mut_slice())
            .map_err(|source| ChunkError::Store {
                chunk: *chunk,
                source,
            })
    }

    /// DECOMPRESS + WRITE with output persistence enabled.
    ///
    /// Only the sub-range below the write limit is restored and persisted;
    /// the write call itself is collective and issued unconditionally.
    /// Returns the decompress wall time in milliseconds.
    fn restore_and_write(
        &mut self,
        base: u64,
        chunk: &EventChunk,
        compressed: Option<&roibench_codec::CompressedBuf>,
    ) -> Result<u64, ChunkError> {
        self.stage = ChunkStage::Decompress;
        let write_chunk = chunk_for(
            base,
            self.config.chunk_size,
            self.work.rank(),
            self.geometry.write_limit,
        );
        debug_assert!(write_chunk.count <= chunk.count);

        // Decompression never aliases the compressed buffer: it restores
        // into a scratch buffer freshly allocated per chunk.
        let mut scratch = Vec::new();
        let mut decompress_ms = 0u64;
        if !write_chunk.is_empty() {
            if let Some(buf) = compressed {
                scratch = vec![0u8; chunk.count as usize * self.geometry.frame_bytes_per_event];
                let begin = Instant::now();
                self.codec
                    .decompress(
                        buf,
                        &mut FrameSlabMut {
                            bytes: &mut scratch,
                            shape: buf.shape.clone(),
                            scalar_type: buf.scalar_type,
                        },
                    )
                    .map_err(|source| ChunkError::Codec {
                        chunk: *chunk,
                        source,
                    })?;
                decompress_ms = begin.elapsed().as_millis() as u64;
                metrics::record_chunk_decompressed(
                    scratch.len() as u64,
                    begin.elapsed().as_secs_f64(),
                );
            }
        }

        self.stage = ChunkStage::Write;
        let write_bytes = write_chunk.count as usize * self.geometry.frame_bytes_per_event;
        let selection = self.frame_selection(write_chunk.start, write_chunk.count);
        let write_begin = Instant::now();
        if let Some(output) = &self.output {
            output
                .write_slab(&selection, &scratch[..write_bytes])
                .map_err(|source| ChunkError::Store {
                    chunk: write_chunk,
                    source,
                })?;
        }
        metrics::record_chunk_written(
            write_chunk.count,
            write_bytes as u64,
            write_begin.elapsed().as_secs_f64(),
        );
        Ok(decompress_ms)
    }

    fn frame_selection(&self, start: u64, count: u64) -> Selection {
        let mut sel_start = vec![start];
        sel_start.extend(std::iter::repeat(0).take(self.geometry.frame_dims.len()));
        let mut sel_count = vec![count];
        sel_count.extend(self.geometry.frame_dims.iter().copied());
        Selection::new(sel_start, sel_count)
    }

    /// Report the failure with this rank's id and abort the work group so
    /// peers blocked in a collective terminate instead of hanging. A
    /// peer-initiated abort is not re-escalated.
    fn escalate(&self, err: &ChunkError) {
        if matches!(err, ChunkError::Comm(CommError::Aborted { .. })) {
            return;
        }
        let code = err.exit_code();
        error!(
            work_rank = self.work.rank(),
            stage = self.stage.as_str(),
            code,
            "{err}"
        );
        metrics::record_abort(code);
        self.work.comm().abort(code);
    }
}

fn expect_type<D: Dataset>(path: &str, dset: &D, expected: ScalarType) -> Result<(), SetupError> {
    let actual = dset.scalar_type();
    if actual != expected {
        return Err(SetupError::BadDataset {
            path: path.to_string(),
            detail: format!("expected {expected} elements, store holds {actual}"),
        });
    }
    Ok(())
}
