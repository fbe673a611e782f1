//! Coordinate Reference System types and transforms.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::BoundingBox;

/// Earth radius used by the spherical web-mercator projection, in meters.
const WEB_MERCATOR_RADIUS: f64 = 6378137.0;

/// Well-known CRS codes supported by the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 Geographic (lon/lat in degrees)
    Epsg4326,
    /// Web Mercator (meters)
    Epsg3857,
}

impl CrsCode {
    /// Parse a CRS string.
    ///
    /// Accepts formats like:
    /// - "EPSG:4326"
    /// - "epsg:3857"
    /// - "CRS:84" (equivalent to EPSG:4326 with lon/lat axis order)
    pub fn from_authority_string(s: &str) -> Result<Self, CrsError> {
        let normalized = s.to_uppercase();

        match normalized.as_str() {
            "EPSG:4326" | "CRS:84" => Ok(CrsCode::Epsg4326),
            "EPSG:3857" | "EPSG:900913" => Ok(CrsCode::Epsg3857),
            _ => Err(CrsError::Unsupported(s.to_string())),
        }
    }

    /// Check if this is a geographic (lon/lat) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326)
    }

    /// Get the valid coordinate bounds for this CRS.
    pub fn valid_bounds(&self) -> BoundingBox {
        match self {
            CrsCode::Epsg4326 => BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
            CrsCode::Epsg3857 => {
                // Web Mercator bounds (approx ±85.06° latitude)
                let max_extent = 20037508.342789244;
                BoundingBox::new(-max_extent, -max_extent, max_extent, max_extent)
            }
        }
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            CrsCode::Epsg4326 => "EPSG:4326",
            CrsCode::Epsg3857 => "EPSG:3857",
        };
        write!(f, "{}", code)
    }
}

/// Transform a point between supported CRS.
///
/// Identity when `from == to`. Latitudes are clamped to the web-mercator
/// valid range before projection.
pub fn transform_point(from: CrsCode, to: CrsCode, x: f64, y: f64) -> (f64, f64) {
    match (from, to) {
        (a, b) if a == b => (x, y),
        (CrsCode::Epsg4326, CrsCode::Epsg3857) => mercator_forward(x, y),
        (CrsCode::Epsg3857, CrsCode::Epsg4326) => mercator_inverse(x, y),
        _ => unreachable!("all pairs of supported CRS are handled"),
    }
}

/// Transform a bounding box between supported CRS by transforming its corners.
///
/// Exact for axis-aligned transforms between the supported cylindrical CRS.
pub fn transform_bbox(from: CrsCode, to: CrsCode, bbox: &BoundingBox) -> BoundingBox {
    let (min_x, min_y) = transform_point(from, to, bbox.min_x, bbox.min_y);
    let (max_x, max_y) = transform_point(from, to, bbox.max_x, bbox.max_y);
    BoundingBox::new(min_x, min_y, max_x, max_y)
}

/// Project lon/lat degrees to web-mercator meters.
fn mercator_forward(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-85.05112878, 85.05112878);
    let x = WEB_MERCATOR_RADIUS * lon.to_radians();
    let y = WEB_MERCATOR_RADIUS * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0)
        .tan()
        .ln();
    (x, y)
}

/// Unproject web-mercator meters to lon/lat degrees.
fn mercator_inverse(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / WEB_MERCATOR_RADIUS).to_degrees();
    let lat = (2.0 * (y / WEB_MERCATOR_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2)
        .to_degrees();
    (lon, lat)
}

#[derive(Debug, thiserror::Error)]
pub enum CrsError {
    #[error("Unsupported CRS: {0}")]
    Unsupported(String),
}
