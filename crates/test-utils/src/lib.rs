//! Shared test fixtures for the raster-stack workspace.
//!
//! Provides an in-memory tile store with failure injection, an in-memory
//! catalog transport with real pagination, and synthetic grid/descriptor
//! generators with predictable, verifiable values.

pub mod fixtures;
pub mod generators;

pub use fixtures::{asset, asset_with_properties, MemoryCatalog, MemoryTileStore};
pub use generators::{create_constant_grid, create_grid_with_nans, create_test_grid};
