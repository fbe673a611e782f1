//! Search request types with a fluent builder API.
//!
//! # Examples
//!
//! ```rust
//! use catalog_client::{CompareOp, SearchRequest};
//! use raster_common::BoundingBox;
//!
//! let request = SearchRequest::collections(["sentinel-2-l2a"])
//!     .within(BoundingBox::new(-105.3, 39.9, -104.9, 40.1))
//!     .filter("cloud_cover", CompareOp::Lt, 10.0)
//!     .page_size(50);
//!
//! assert!(request.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use raster_common::{AssetDescriptor, BoundingBox, CrsCode, TimeInterval};

use crate::error::QueryError;

/// Default number of descriptors requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Spatial constraint for a search, in geographic (EPSG:4326) coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpatialFilter {
    /// Axis-aligned bounding box.
    Bbox(BoundingBox),
    /// Closed polygon ring as (lon, lat) vertices.
    Polygon(Vec<(f64, f64)>),
}

impl SpatialFilter {
    /// The envelope of the filter geometry.
    pub fn bounding_box(&self) -> BoundingBox {
        match self {
            SpatialFilter::Bbox(bbox) => *bbox,
            SpatialFilter::Polygon(ring) => {
                let mut bbox = BoundingBox::new(
                    f64::INFINITY,
                    f64::INFINITY,
                    f64::NEG_INFINITY,
                    f64::NEG_INFINITY,
                );
                for &(x, y) in ring {
                    bbox.min_x = bbox.min_x.min(x);
                    bbox.min_y = bbox.min_y.min(y);
                    bbox.max_x = bbox.max_x.max(x);
                    bbox.max_y = bbox.max_y.max(y);
                }
                bbox
            }
        }
    }

    fn validate(&self) -> Result<(), QueryError> {
        match self {
            SpatialFilter::Bbox(bbox) => {
                if !bbox.is_valid() {
                    return Err(QueryError::InvalidRequest(format!(
                        "bbox corners are inverted: {:?}",
                        bbox
                    )));
                }
            }
            SpatialFilter::Polygon(ring) => {
                if ring.len() < 3 {
                    return Err(QueryError::InvalidRequest(format!(
                        "polygon needs at least 3 vertices, got {}",
                        ring.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Comparison operator for attribute filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    /// Apply the operator to an observed value.
    pub fn matches(&self, actual: f64, expected: f64) -> bool {
        match self {
            CompareOp::Lt => actual < expected,
            CompareOp::Le => actual <= expected,
            CompareOp::Gt => actual > expected,
            CompareOp::Ge => actual >= expected,
            CompareOp::Eq => actual == expected,
            CompareOp::Ne => actual != expected,
        }
    }
}

/// A numeric attribute predicate: field, operator, value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub field: String,
    pub op: CompareOp,
    pub value: f64,
}

impl AttributeFilter {
    /// Check a descriptor against the predicate.
    ///
    /// Descriptors that do not report the attribute fail the filter.
    pub fn matches(&self, descriptor: &AssetDescriptor) -> bool {
        descriptor
            .property(&self.field)
            .map(|actual| self.op.matches(actual, self.value))
            .unwrap_or(false)
    }
}

/// A catalog search request.
///
/// Use the builder methods to construct one; `validate` runs before any
/// network I/O and rejects malformed filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Collections to search. Must be non-empty.
    pub collections: Vec<String>,

    /// Spatial constraint; `None` means no spatial restriction.
    pub region: Option<SpatialFilter>,

    /// Time interval; either bound may be open.
    #[serde(default)]
    pub time: TimeInterval,

    /// Attribute predicates, all of which must hold.
    #[serde(default)]
    pub filters: Vec<AttributeFilter>,

    /// Requested page size.
    pub page_size: usize,
}

impl SearchRequest {
    /// Start a request over the given collections.
    pub fn collections<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            collections: collections.into_iter().map(Into::into).collect(),
            region: None,
            time: TimeInterval::unbounded(),
            filters: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Restrict results to a bounding box (geographic coordinates).
    pub fn within(mut self, bbox: BoundingBox) -> Self {
        self.region = Some(SpatialFilter::Bbox(bbox));
        self
    }

    /// Restrict results to a polygon (geographic coordinates).
    pub fn within_polygon(mut self, ring: Vec<(f64, f64)>) -> Self {
        self.region = Some(SpatialFilter::Polygon(ring));
        self
    }

    /// Restrict results to a closed time interval.
    pub fn between(
        mut self,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        self.time = TimeInterval::new(start, end);
        self
    }

    /// Restrict results to a time interval with optional bounds.
    pub fn during(mut self, interval: TimeInterval) -> Self {
        self.time = interval;
        self
    }

    /// Add an attribute predicate.
    pub fn filter(mut self, field: impl Into<String>, op: CompareOp, value: f64) -> Self {
        self.filters.push(AttributeFilter {
            field: field.into(),
            op,
            value,
        });
        self
    }

    /// Set the page size.
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Validate the request. Runs locally, before any network I/O.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.collections.is_empty() {
            return Err(QueryError::InvalidRequest(
                "at least one collection is required".to_string(),
            ));
        }

        if let Some(region) = &self.region {
            region.validate()?;
        }

        if !self.time.is_ordered() {
            return Err(QueryError::InvalidRequest(format!(
                "time interval end precedes start: {:?}..{:?}",
                self.time.start, self.time.end
            )));
        }

        if self.page_size == 0 {
            return Err(QueryError::InvalidRequest(
                "page size must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Check that a descriptor lies within the requested spatial and
    /// temporal bounds.
    ///
    /// Applied to every descriptor the catalog returns, so callers can
    /// rely on containment regardless of server behavior. Footprints in a
    /// projected CRS are compared in geographic coordinates.
    pub fn contains(&self, descriptor: &AssetDescriptor) -> bool {
        if !self.time.contains(&descriptor.acquired_at) {
            return false;
        }

        if let Some(region) = &self.region {
            let footprint = raster_common::crs::transform_bbox(
                descriptor.crs,
                CrsCode::Epsg4326,
                &descriptor.footprint,
            );
            if !region.bounding_box().intersects(&footprint) {
                return false;
            }
        }

        true
    }
}
