//! Deferred execution engine for virtual array task graphs.
//!
//! Transformations over a [`virtual_array::VirtualArray`] are recorded as
//! an inert [`TaskGraph`]; nothing touches the network until the graph is
//! handed to an [`Executor`]. Execution then:
//!
//! - partitions the view into chunks aligned to the source tiling,
//! - fans chunk tasks onto a bounded worker pool,
//! - deduplicates remote tile reads through a per-execution LRU cache,
//! - retries transient read failures with exponential backoff,
//! - folds finished chunks into the result as they arrive, so the
//!   working set stays bounded by one chunk per in-flight worker,
//! - combines reductions with order-independent accumulators, making the
//!   result identical regardless of scheduling order.
//!
//! ```text
//! VirtualArray ──lazy()──► LazyArray ──select/resample/reduce──► TaskGraph
//!                                                                   │
//!                                              Executor::execute ◄──┘
//!                                                   │
//!                        ┌──────────────────────────┤
//!                        ▼                          ▼
//!                  chunk tasks (pool)         tile cache / reader
//!                        │
//!                        ▼
//!                streaming combine ──► MaterializedResult
//! ```

pub mod cache;
pub mod chunk;
pub mod config;
pub mod error;
pub mod executor;
pub mod plan;
pub mod reader;
pub mod result;
pub mod sink;

pub use cache::{CacheStats, TileCache};
pub use chunk::ChunkCoords;
pub use config::{ComputeConfig, ExecuteOptions, ExecutionMode};
pub use error::ComputeError;
pub use executor::{CancelHandle, Executor};
pub use plan::{ArrayOps, IntoLazy, LazyArray, PlanNode, ReduceDims, Reducer, TaskGraph};
pub use reader::{ObjectStoreTileReader, ReadError, TileReader};
pub use result::MaterializedResult;
pub use sink::{ChunkSink, ObjectStoreChunkSink, SinkError};
