//! Common types shared across the raster-stack workspace.

pub mod asset;
pub mod bbox;
pub mod crs;
pub mod tile;
pub mod time;

pub use asset::AssetDescriptor;
pub use bbox::BoundingBox;
pub use crs::{CrsCode, CrsError};
pub use tile::{Tile, TileCodecError, TileEncoding};
pub use time::{TimeInterval, TimeParseError};
