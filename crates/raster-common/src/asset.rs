//! Asset descriptors: metadata records pointing at remotely stored tiles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{BoundingBox, CrsCode};

/// Metadata for one remotely stored data tile.
///
/// Descriptors are produced by catalog searches and consumed by the
/// virtual-array builder. They are immutable once retrieved; no pixel
/// data is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Storage location of the tile, resolvable by a tile reader.
    pub uri: String,

    /// Collection the asset belongs to (e.g., "sentinel-2-l2a").
    pub collection: String,

    /// Band/variable identifier (e.g., "B04", "red").
    pub band: String,

    /// Acquisition timestamp.
    pub acquired_at: DateTime<Utc>,

    /// Spatial footprint in the asset's own CRS.
    pub footprint: BoundingBox,

    /// CRS of the footprint and the tile's pixel grid.
    pub crs: CrsCode,

    /// Tile pixel dimensions.
    pub tile_width: usize,
    pub tile_height: usize,

    /// Numeric attributes reported by the catalog (e.g., "cloud_cover").
    #[serde(default)]
    pub properties: HashMap<String, f64>,
}

impl AssetDescriptor {
    /// Pixel resolution of the source tile in CRS units per pixel (x, y).
    pub fn resolution(&self) -> (f64, f64) {
        (
            self.footprint.width() / self.tile_width as f64,
            self.footprint.height() / self.tile_height as f64,
        )
    }

    /// Look up a numeric catalog attribute.
    pub fn property(&self, field: &str) -> Option<f64> {
        self.properties.get(field).copied()
    }

    /// Map a point in the asset's CRS to fractional pixel coordinates.
    ///
    /// Row 0 is the top (maximum y) edge of the footprint. Returns `None`
    /// when the point lies outside the footprint.
    pub fn point_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if !self.footprint.contains_point(x, y) {
            return None;
        }

        let (res_x, res_y) = self.resolution();
        let col = (x - self.footprint.min_x) / res_x;
        let row = (self.footprint.max_y - y) / res_y;
        Some((col, row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn descriptor() -> AssetDescriptor {
        AssetDescriptor {
            uri: "tiles/a/B04.rtl".to_string(),
            collection: "test".to_string(),
            band: "B04".to_string(),
            acquired_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap(),
            footprint: BoundingBox::new(0.0, 0.0, 10.0, 20.0),
            crs: CrsCode::Epsg4326,
            tile_width: 100,
            tile_height: 200,
            properties: HashMap::from([("cloud_cover".to_string(), 4.5)]),
        }
    }

    #[test]
    fn test_resolution() {
        let (rx, ry) = descriptor().resolution();
        assert!((rx - 0.1).abs() < 1e-12);
        assert!((ry - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_point_to_pixel() {
        let d = descriptor();

        // Top-left corner maps to pixel (0, 0)
        let (col, row) = d.point_to_pixel(0.0, 20.0).unwrap();
        assert!((col - 0.0).abs() < 1e-12);
        assert!((row - 0.0).abs() < 1e-12);

        // Center of the footprint
        let (col, row) = d.point_to_pixel(5.0, 10.0).unwrap();
        assert!((col - 50.0).abs() < 1e-12);
        assert!((row - 100.0).abs() < 1e-12);

        assert!(d.point_to_pixel(-1.0, 5.0).is_none());
    }

    #[test]
    fn test_property_lookup() {
        let d = descriptor();
        assert_eq!(d.property("cloud_cover"), Some(4.5));
        assert_eq!(d.property("snow_cover"), None);
    }
}
