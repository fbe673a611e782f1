//! Virtual array views over remote tiled rasters.
//!
//! A [`VirtualArray`] is a 4-D (time × band × y × x) coordinate-labeled
//! array description backed by many independent remote tiles. Building
//! one reads no pixel data: the builder derives a common output grid,
//! sorted and deduplicated coordinate axes, and a per-(time, band) layer
//! list that maps every coordinate to at most one source tile region.
//!
//! Virtual arrays are never mutated in place; selection and resampling
//! produce new values. Pixel I/O happens only when a compute engine
//! executes a task graph over the view.

pub mod array;
pub mod builder;
pub mod error;
pub mod grid;
pub mod resample;

pub use array::{CompositePolicy, VirtualArray};
pub use builder::{BuildParams, VirtualArrayBuilder};
pub use error::BuildError;
pub use grid::OutputGrid;
pub use resample::Resampling;
