//! The executor: turns an inert task graph into a materialized result.
//!
//! Execution is synchronous from the caller's perspective; internally it
//! fans out to many concurrent chunk tasks on a bounded pool. Combining
//! is structured so the result never depends on task completion order:
//!
//! - materialization chunks write disjoint windows of the output array;
//! - spatial reductions keep one partial aggregate per chunk and fold
//!   them in canonical chunk order after the last task finishes;
//! - temporal reductions give each spatial window to a single task that
//!   walks the time axis in ascending order.
//!
//! Repeated executions of the same graph are therefore bit-identical.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use ndarray::Array4;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use raster_common::{crs, Tile};
use virtual_array::{CompositePolicy, VirtualArray};

use crate::cache::{CacheStats, TileCache};
use crate::chunk::{plan_chunks, spatial_windows, ChunkCoords};
use crate::config::{ComputeConfig, ExecuteOptions, ExecutionMode};
use crate::error::ComputeError;
use crate::plan::{PlanNode, ReduceDims, Reducer, TaskGraph};
use crate::reader::{ReadError, TileReader};
use crate::result::MaterializedResult;
use crate::sink::{result_chunk_path, ChunkSink};

/// Handle for cancelling in-flight executions on an executor.
///
/// Cancellation is sticky: once cancelled, the executor refuses further
/// work, matching a shutdown broadcast.
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    tx: broadcast::Sender<()>,
}

impl CancelHandle {
    /// Stop all outstanding chunk tasks. In-flight executions return
    /// [`ComputeError::Cancelled`]; buffers and connections held by
    /// dropped tasks are released.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Executes task graphs against a tile reader.
pub struct Executor {
    reader: Arc<dyn TileReader>,
    sink: Option<Arc<dyn ChunkSink>>,
    config: ComputeConfig,
    cancelled: Arc<AtomicBool>,
    cancel_tx: broadcast::Sender<()>,
}

impl Executor {
    /// Create an executor with default configuration.
    pub fn new(reader: Arc<dyn TileReader>) -> Self {
        Self::with_config(reader, ComputeConfig::default())
    }

    /// Create an executor with an explicit configuration.
    pub fn with_config(reader: Arc<dyn TileReader>, config: ComputeConfig) -> Self {
        let (cancel_tx, _) = broadcast::channel(1);
        Self {
            reader,
            sink: None,
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
            cancel_tx,
        }
    }

    /// Attach a chunk sink for persist-mode executions.
    pub fn with_sink(mut self, sink: Arc<dyn ChunkSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Get a handle that cancels in-flight executions.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancelled),
            tx: self.cancel_tx.clone(),
        }
    }

    /// Execute a task graph and return the materialized result.
    ///
    /// The call blocks until every chunk task has finished (or one has
    /// failed past its retry budget). See [`ExecuteOptions`] for the
    /// persist and partial-tolerance switches.
    pub async fn execute(
        &self,
        graph: &TaskGraph,
        opts: &ExecuteOptions,
    ) -> Result<MaterializedResult, ComputeError> {
        if self.config.workers == 0 {
            return Err(ComputeError::PoolUnavailable(
                "configured with zero workers".to_string(),
            ));
        }
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(ComputeError::Cancelled);
        }

        let (array, reduction) = resolve_plan(graph)?;

        if opts.mode == ExecutionMode::Persist {
            if self.sink.is_none() {
                return Err(ComputeError::InvalidPlan(
                    "persist mode requires a chunk sink".to_string(),
                ));
            }
            if reduction.is_some() {
                return Err(ComputeError::InvalidPlan(
                    "persist mode applies to materialization graphs, not reductions".to_string(),
                ));
            }
        }

        let execution_id = Uuid::new_v4();
        let array = Arc::new(array);
        let cache = Arc::new(Mutex::new(TileCache::new(self.config.cache_bytes)));

        let work = match reduction {
            Some(Reduction {
                dims: ReduceDims::Time,
                ..
            }) => spatial_windows(&array),
            _ => plan_chunks(&array),
        };

        info!(
            execution = %execution_id,
            chunks = work.len(),
            workers = self.config.workers,
            reduced = reduction.is_some(),
            "Starting execution"
        );

        let mut accumulator = Accumulator::new(&array, reduction, work.len());
        let mut warnings: Vec<String> = Vec::new();

        let persist_to = match opts.mode {
            ExecutionMode::Persist => self.sink.clone(),
            ExecutionMode::Compute => None,
        };

        let mut tasks = stream::iter(work.into_iter().enumerate().map(|(index, chunk)| {
            let array = Arc::clone(&array);
            let reader = Arc::clone(&self.reader);
            let cache = Arc::clone(&cache);
            let config = self.config.clone();
            let cancelled = Arc::clone(&self.cancelled);
            let mut cancel_rx = self.cancel_tx.subscribe();
            let persist_to = persist_to.clone();
            let reduce = reduction;

            async move {
                if cancelled.load(Ordering::SeqCst) {
                    return Err(ComputeError::Cancelled);
                }

                tokio::select! {
                    _ = cancel_rx.recv() => Err(ComputeError::Cancelled),
                    outcome = run_chunk_task(
                        &array,
                        index,
                        chunk,
                        reduce,
                        reader.as_ref(),
                        &cache,
                        &config,
                        persist_to.as_deref(),
                        execution_id,
                    ) => outcome,
                }
            }
        }))
        .buffer_unordered(self.config.workers);

        while let Some(outcome) = tasks.next().await {
            match outcome {
                Ok(chunk_outcome) => accumulator.merge(chunk_outcome),
                Err(ComputeError::Cancelled) => {
                    info!(execution = %execution_id, "Execution cancelled");
                    return Err(ComputeError::Cancelled);
                }
                Err(err @ ComputeError::ChunkFailed { .. }) if opts.allow_partial => {
                    warn!(execution = %execution_id, error = %err, "Filling failed chunk with no-data");
                    warnings.push(err.to_string());
                }
                Err(err) => return Err(err),
            }
        }
        drop(tasks);

        let cache_stats: CacheStats = cache.lock().await.stats();
        info!(
            execution = %execution_id,
            cache_hits = cache_stats.hits,
            cache_misses = cache_stats.misses,
            cache_evictions = cache_stats.evictions,
            warnings = warnings.len(),
            "Execution complete"
        );

        Ok(accumulator.into_result(&array, warnings))
    }
}

/// A terminal reduction captured from the plan.
#[derive(Debug, Clone, Copy)]
struct Reduction {
    dims: ReduceDims,
    reducer: Reducer,
}

/// Fold the graph into an effective array view plus an optional terminal
/// reduction.
fn resolve_plan(graph: &TaskGraph) -> Result<(VirtualArray, Option<Reduction>), ComputeError> {
    fn walk(
        nodes: &[PlanNode],
        idx: usize,
    ) -> Result<(VirtualArray, Option<Reduction>), ComputeError> {
        match &nodes[idx] {
            PlanNode::Source(array) => Ok((array.clone(), None)),
            PlanNode::Select {
                input,
                time,
                bands,
                bounds,
            } => {
                let (array, reduction) = walk(nodes, *input)?;
                if reduction.is_some() {
                    return Err(ComputeError::InvalidPlan(
                        "select after reduce is not supported".to_string(),
                    ));
                }
                Ok((array.select(*time, bands.as_deref(), *bounds)?, None))
            }
            PlanNode::Resample {
                input,
                resolution,
                method,
            } => {
                let (array, reduction) = walk(nodes, *input)?;
                if reduction.is_some() {
                    return Err(ComputeError::InvalidPlan(
                        "resample after reduce is not supported".to_string(),
                    ));
                }
                Ok((array.resample(*resolution, *method)?, None))
            }
            PlanNode::Reduce {
                input,
                dims,
                reducer,
            } => {
                let (array, reduction) = walk(nodes, *input)?;
                if reduction.is_some() {
                    return Err(ComputeError::InvalidPlan(
                        "nested reductions are not supported".to_string(),
                    ));
                }
                Ok((
                    array,
                    Some(Reduction {
                        dims: *dims,
                        reducer: *reducer,
                    }),
                ))
            }
        }
    }

    if graph.is_empty() {
        return Err(ComputeError::InvalidPlan("empty task graph".to_string()));
    }
    walk(graph.nodes(), graph.root())
}

/// Order-independent per-cell aggregate.
#[derive(Debug, Clone, Copy)]
struct ReduceCell {
    sum: f64,
    count: u64,
    max: f32,
    min: f32,
}

impl Default for ReduceCell {
    fn default() -> Self {
        Self {
            sum: 0.0,
            count: 0,
            max: f32::NEG_INFINITY,
            min: f32::INFINITY,
        }
    }
}

impl ReduceCell {
    fn push(&mut self, value: f32) {
        if value.is_nan() {
            return;
        }
        self.sum += value as f64;
        self.count += 1;
        self.max = self.max.max(value);
        self.min = self.min.min(value);
    }

    fn merge(&mut self, other: &ReduceCell) {
        self.sum += other.sum;
        self.count += other.count;
        self.max = self.max.max(other.max);
        self.min = self.min.min(other.min);
    }

    fn resolve(&self, reducer: Reducer) -> f32 {
        if self.count == 0 {
            return f32::NAN;
        }
        match reducer {
            Reducer::Mean => (self.sum / self.count as f64) as f32,
            Reducer::Max => self.max,
            Reducer::Min => self.min,
            Reducer::Sum => self.sum as f32,
        }
    }
}

/// Result of one chunk task.
enum ChunkOutcome {
    /// Materialized window values (no reduction).
    Window { coords: ChunkCoords, values: Vec<f32> },
    /// Spatial-reduction partial for one chunk, indexed for canonical
    /// ordering during the final fold.
    SpacePartial {
        index: usize,
        coords: ChunkCoords,
        cell: ReduceCell,
    },
    /// Per-cell aggregates over the full time axis for one window.
    TimeWindow {
        coords: ChunkCoords,
        cells: Vec<ReduceCell>,
    },
}

/// Streaming accumulator for chunk outcomes.
enum Accumulator {
    Full {
        data: Array4<f32>,
    },
    Space {
        partials: Vec<Option<(ChunkCoords, ReduceCell)>>,
        reducer: Reducer,
    },
    Time {
        data: Array4<f32>,
        reducer: Reducer,
    },
}

impl Accumulator {
    fn new(array: &VirtualArray, reduction: Option<Reduction>, work_len: usize) -> Self {
        let (times, bands, rows, cols) = array.shape();
        match reduction {
            None => Accumulator::Full {
                data: Array4::from_elem((times, bands, rows, cols), f32::NAN),
            },
            Some(Reduction {
                dims: ReduceDims::Space,
                reducer,
            }) => Accumulator::Space {
                partials: vec![None; work_len],
                reducer,
            },
            Some(Reduction {
                dims: ReduceDims::Time,
                reducer,
            }) => Accumulator::Time {
                data: Array4::from_elem((1, bands, rows, cols), f32::NAN),
                reducer,
            },
        }
    }

    fn merge(&mut self, outcome: ChunkOutcome) {
        match (self, outcome) {
            (Accumulator::Full { data }, ChunkOutcome::Window { coords, values }) => {
                for row in 0..coords.height {
                    for col in 0..coords.width {
                        data[[
                            coords.time_idx,
                            coords.band_idx,
                            coords.row0 + row,
                            coords.col0 + col,
                        ]] = values[row * coords.width + col];
                    }
                }
            }
            (
                Accumulator::Space { partials, .. },
                ChunkOutcome::SpacePartial {
                    index,
                    coords,
                    cell,
                },
            ) => {
                partials[index] = Some((coords, cell));
            }
            (
                Accumulator::Time { data, reducer },
                ChunkOutcome::TimeWindow { coords, cells },
            ) => {
                let reducer = *reducer;
                for row in 0..coords.height {
                    for col in 0..coords.width {
                        data[[0, coords.band_idx, coords.row0 + row, coords.col0 + col]] =
                            cells[row * coords.width + col].resolve(reducer);
                    }
                }
            }
            _ => unreachable!("chunk outcome kind matches the planned reduction"),
        }
    }

    fn into_result(self, array: &VirtualArray, warnings: Vec<String>) -> MaterializedResult {
        let (times, bands, _, _) = array.shape();
        match self {
            Accumulator::Full { data } => MaterializedResult {
                data,
                times: array.times.clone(),
                bands: array.bands.clone(),
                y: array.y_coords(),
                x: array.x_coords(),
                warnings,
            },
            Accumulator::Space { partials, reducer } => {
                // Canonical-order fold: partials are merged by chunk
                // index, so scheduling order cannot change the result.
                let mut cells = vec![ReduceCell::default(); times * bands];
                for entry in partials.iter().flatten() {
                    let (coords, cell) = entry;
                    cells[coords.time_idx * bands + coords.band_idx].merge(cell);
                }

                let mut data = Array4::from_elem((times, bands, 1, 1), f32::NAN);
                for t in 0..times {
                    for b in 0..bands {
                        data[[t, b, 0, 0]] = cells[t * bands + b].resolve(reducer);
                    }
                }

                let (cx, cy) = array.grid.bbox().center();
                MaterializedResult {
                    data,
                    times: array.times.clone(),
                    bands: array.bands.clone(),
                    y: vec![cy],
                    x: vec![cx],
                    warnings,
                }
            }
            Accumulator::Time { data, .. } => MaterializedResult {
                data,
                times: array.times.first().copied().into_iter().collect(),
                bands: array.bands.clone(),
                y: array.y_coords(),
                x: array.x_coords(),
                warnings,
            },
        }
    }
}

/// Run one chunk task: materialize (and optionally persist) a window, or
/// produce reduction partials.
#[allow(clippy::too_many_arguments)]
async fn run_chunk_task(
    array: &VirtualArray,
    index: usize,
    chunk: ChunkCoords,
    reduction: Option<Reduction>,
    reader: &dyn TileReader,
    cache: &Mutex<TileCache>,
    config: &ComputeConfig,
    sink: Option<&dyn ChunkSink>,
    execution_id: Uuid,
) -> Result<ChunkOutcome, ComputeError> {
    match reduction {
        None => {
            let values =
                materialize_window(array, chunk.time_idx, chunk.band_idx, &chunk, reader, cache, config)
                    .await?;

            if let Some(sink) = sink {
                let path = result_chunk_path(&execution_id.to_string(), &chunk);
                let tile = Tile::new(chunk.width, chunk.height, values.clone());
                sink.write_chunk(&path, &tile)
                    .await
                    .map_err(|e| ComputeError::PersistFailed {
                        path,
                        message: e.to_string(),
                    })?;
            }

            Ok(ChunkOutcome::Window {
                coords: chunk,
                values,
            })
        }
        Some(Reduction {
            dims: ReduceDims::Space,
            ..
        }) => {
            let values =
                materialize_window(array, chunk.time_idx, chunk.band_idx, &chunk, reader, cache, config)
                    .await?;

            let mut cell = ReduceCell::default();
            for value in values {
                cell.push(value);
            }

            Ok(ChunkOutcome::SpacePartial {
                index,
                coords: chunk,
                cell,
            })
        }
        Some(Reduction {
            dims: ReduceDims::Time,
            ..
        }) => {
            // One task owns the whole time column for this window and
            // walks it in ascending order, keeping the combine
            // deterministic without cross-task merging.
            let mut cells = vec![ReduceCell::default(); chunk.len()];
            for time_idx in 0..array.times.len() {
                let values =
                    materialize_window(array, time_idx, chunk.band_idx, &chunk, reader, cache, config)
                        .await?;
                for (cell, value) in cells.iter_mut().zip(values) {
                    cell.push(value);
                }
            }

            Ok(ChunkOutcome::TimeWindow {
                coords: chunk,
                cells,
            })
        }
    }
}

/// Materialize one (time, band, window) region: composite the slot's
/// source layers onto the output grid.
async fn materialize_window(
    array: &VirtualArray,
    time_idx: usize,
    band_idx: usize,
    window: &ChunkCoords,
    reader: &dyn TileReader,
    cache: &Mutex<TileCache>,
    config: &ComputeConfig,
) -> Result<Vec<f32>, ComputeError> {
    let grid = &array.grid;
    let mut values = vec![f32::NAN; window.len()];

    let window_bbox = window.bbox(array);
    let failure_coords = ChunkCoords {
        time_idx,
        band_idx,
        ..*window
    };

    // Layers are pre-sorted ascending by (acquired_at, uri); writing them
    // in order makes LatestWins a plain overwrite and EarliestWins a
    // fill-gaps-only pass.
    for layer in array.slot(time_idx, band_idx) {
        let footprint = crs::transform_bbox(layer.crs, grid.crs, &layer.footprint);
        if !footprint.intersects(&window_bbox) {
            continue;
        }

        let tile = fetch_tile(reader, cache, config, &layer.uri, &failure_coords).await?;

        for row in 0..window.height {
            for col in 0..window.width {
                let i = row * window.width + col;
                if array.policy == CompositePolicy::EarliestWins && !values[i].is_nan() {
                    continue;
                }

                let (x, y) = grid.cell_center(window.col0 + col, window.row0 + row);
                let (sx, sy) = crs::transform_point(grid.crs, layer.crs, x, y);
                let Some((px, py)) = layer.point_to_pixel(sx, sy) else {
                    continue;
                };

                // point_to_pixel puts pixel centers at half-integers;
                // the kernels put them at integers.
                let sample =
                    array
                        .resampling
                        .sample(&tile.data, tile.width, tile.height, px - 0.5, py - 0.5);
                if !sample.is_nan() {
                    values[i] = sample;
                }
            }
        }
    }

    Ok(values)
}

/// Fetch a tile through the cache, retrying transient failures with
/// exponential backoff.
async fn fetch_tile(
    reader: &dyn TileReader,
    cache: &Mutex<TileCache>,
    config: &ComputeConfig,
    uri: &str,
    chunk: &ChunkCoords,
) -> Result<Arc<Tile>, ComputeError> {
    if let Some(tile) = cache.lock().await.get(uri) {
        return Ok(tile);
    }

    let mut attempts = 0u32;
    let mut delay = config.initial_retry_delay;

    loop {
        attempts += 1;
        match reader.read_tile(uri).await {
            Ok(tile) => {
                let tile = Arc::new(tile);
                cache.lock().await.insert(uri, Arc::clone(&tile));
                return Ok(tile);
            }
            Err(ReadError::Transient(message)) => {
                if attempts > config.max_retries {
                    return Err(ComputeError::ChunkFailed {
                        chunk: *chunk,
                        uri: uri.to_string(),
                        attempts,
                        message,
                    });
                }

                warn!(
                    uri = %uri,
                    attempt = attempts,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Tile read failed, retrying"
                );

                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, config.max_retry_delay);
            }
            Err(err) => {
                // Not-found and corrupt tiles will not improve with
                // retries.
                return Err(ComputeError::ChunkFailed {
                    chunk: *chunk,
                    uri: uri.to_string(),
                    attempts,
                    message: err.to_string(),
                });
            }
        }
    }
}
