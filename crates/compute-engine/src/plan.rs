//! Task graphs: inert descriptions of work over virtual arrays.
//!
//! A [`TaskGraph`] is a DAG of pending operations. Nodes are stored in a
//! vector and may only reference earlier entries, so the graph is acyclic
//! by construction. Nodes carry pure descriptions (no captured state or
//! side effects), which keeps re-execution idempotent.
//!
//! Graph construction is purely local and never blocks; errors such as a
//! selection that empties the array surface when the graph is executed.
//!
//! # Example
//!
//! ```rust,ignore
//! use compute_engine::{ArrayOps, IntoLazy, ReduceDims, Reducer};
//!
//! let graph = array
//!     .lazy()
//!     .select(Some(march), None, None)
//!     .reduce(ReduceDims::Space, Reducer::Mean)
//!     .into_graph();
//! let result = executor.execute(&graph, &opts).await?;
//! ```

use serde::{Deserialize, Serialize};

use raster_common::{BoundingBox, TimeInterval};
use virtual_array::{Resampling, VirtualArray};

/// Reduction operator. All reducers combine associatively and
/// commutatively across chunks, so results do not depend on scheduling
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    /// Arithmetic mean of valid samples (kept as sum + count until the
    /// final combine).
    Mean,
    /// Maximum valid sample.
    Max,
    /// Minimum valid sample.
    Min,
    /// Sum of valid samples.
    Sum,
}

/// Which axes a reduction collapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReduceDims {
    /// Collapse y and x, leaving one value per (time, band).
    Space,
    /// Collapse time, leaving one composite grid per band.
    Time,
}

/// One pending operation in a task graph.
#[derive(Debug, Clone)]
pub enum PlanNode {
    /// The source virtual array.
    Source(VirtualArray),
    /// Narrow along time/band/space.
    Select {
        input: usize,
        time: Option<TimeInterval>,
        bands: Option<Vec<String>>,
        bounds: Option<BoundingBox>,
    },
    /// Change output resolution and resampling method.
    Resample {
        input: usize,
        resolution: f64,
        method: Resampling,
    },
    /// Reduce along the given axes.
    Reduce {
        input: usize,
        dims: ReduceDims,
        reducer: Reducer,
    },
}

impl PlanNode {
    /// Index of the input node, if any.
    pub fn input(&self) -> Option<usize> {
        match self {
            PlanNode::Source(_) => None,
            PlanNode::Select { input, .. }
            | PlanNode::Resample { input, .. }
            | PlanNode::Reduce { input, .. } => Some(*input),
        }
    }
}

/// A directed acyclic graph of pending operations.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: Vec<PlanNode>,
    root: usize,
}

impl TaskGraph {
    /// Create a graph holding a single source node.
    pub fn from_source(array: VirtualArray) -> Self {
        Self {
            nodes: vec![PlanNode::Source(array)],
            root: 0,
        }
    }

    /// Append a node referencing an existing node and make it the root.
    ///
    /// Panics if the node references itself or a node not yet in the
    /// graph; the `LazyArray` builders never do.
    pub fn push(&mut self, node: PlanNode) -> usize {
        if let Some(input) = node.input() {
            assert!(
                input < self.nodes.len(),
                "plan node references a node not yet in the graph"
            );
        }
        self.nodes.push(node);
        self.root = self.nodes.len() - 1;
        self.root
    }

    /// The root node index.
    pub fn root(&self) -> usize {
        self.root
    }

    /// All nodes, in insertion order.
    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    /// Node count.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A virtual array with pending operations attached.
///
/// All methods are lazy: they record an operation and return a new
/// handle. Nothing executes until the graph is passed to an executor.
#[derive(Debug, Clone)]
pub struct LazyArray {
    graph: TaskGraph,
}

impl LazyArray {
    /// Wrap a virtual array as the source of a new graph.
    pub fn from_array(array: VirtualArray) -> Self {
        Self {
            graph: TaskGraph::from_source(array),
        }
    }

    /// Borrow the underlying graph.
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Consume the handle, returning the graph.
    pub fn into_graph(self) -> TaskGraph {
        self.graph
    }
}

/// The capability surface of a lazy array: selection, resampling,
/// reduction. Concrete array types opt in by producing a [`LazyArray`].
pub trait ArrayOps {
    /// Narrow along time, band, and spatial axes.
    fn select(
        self,
        time: Option<TimeInterval>,
        bands: Option<Vec<String>>,
        bounds: Option<BoundingBox>,
    ) -> LazyArray;

    /// Change output resolution and resampling method.
    fn resample(self, resolution: f64, method: Resampling) -> LazyArray;

    /// Reduce along the given axes.
    fn reduce(self, dims: ReduceDims, reducer: Reducer) -> LazyArray;
}

impl ArrayOps for LazyArray {
    fn select(
        mut self,
        time: Option<TimeInterval>,
        bands: Option<Vec<String>>,
        bounds: Option<BoundingBox>,
    ) -> LazyArray {
        let input = self.graph.root();
        self.graph.push(PlanNode::Select {
            input,
            time,
            bands,
            bounds,
        });
        self
    }

    fn resample(mut self, resolution: f64, method: Resampling) -> LazyArray {
        let input = self.graph.root();
        self.graph.push(PlanNode::Resample {
            input,
            resolution,
            method,
        });
        self
    }

    fn reduce(mut self, dims: ReduceDims, reducer: Reducer) -> LazyArray {
        let input = self.graph.root();
        self.graph.push(PlanNode::Reduce {
            input,
            dims,
            reducer,
        });
        self
    }
}

/// Entry point from a virtual array into the lazy op surface.
pub trait IntoLazy {
    fn lazy(self) -> LazyArray;
}

impl IntoLazy for VirtualArray {
    fn lazy(self) -> LazyArray {
        LazyArray::from_array(self)
    }
}
