//! Building virtual arrays from asset descriptors.
//!
//! Construction reads no pixel data. The builder derives the output
//! grid and coordinate axes from descriptor metadata alone and registers
//! source layers per (time, band) slot; reads are deferred until a
//! compute engine executes over the result.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use raster_common::{crs, AssetDescriptor, BoundingBox, CrsCode};

use crate::array::{CompositePolicy, VirtualArray};
use crate::error::BuildError;
use crate::grid::OutputGrid;
use crate::resample::Resampling;

/// Output parameters for a virtual array.
#[derive(Debug, Clone)]
pub struct BuildParams {
    /// CRS of the output grid.
    pub target_crs: CrsCode,
    /// Output cell size in target CRS units.
    pub resolution: f64,
    /// Explicit output extent in the target CRS. `None` derives the
    /// union extent of the descriptors.
    pub bounds: Option<BoundingBox>,
    /// Resampling method for deferred reads.
    pub resampling: Resampling,
    /// Band selection, in output order. `None` takes the sorted union
    /// of descriptor bands.
    pub bands: Option<Vec<String>>,
    /// Overlap resolution policy.
    pub policy: CompositePolicy,
    /// Acquisitions closer together than this share one time slot, so
    /// scenes mosaicked along an orbit swath land on a single slice.
    pub time_tolerance: Duration,
}

impl BuildParams {
    /// Parameters with the given resolution in EPSG:4326 degrees.
    pub fn new(resolution: f64) -> Self {
        Self {
            target_crs: CrsCode::Epsg4326,
            resolution,
            bounds: None,
            resampling: Resampling::default(),
            bands: None,
            policy: CompositePolicy::default(),
            time_tolerance: Duration::zero(),
        }
    }

    pub fn with_crs(mut self, crs: CrsCode) -> Self {
        self.target_crs = crs;
        self
    }

    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    pub fn with_bands<I, S>(mut self, bands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bands = Some(bands.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_policy(mut self, policy: CompositePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_time_tolerance(mut self, tolerance: Duration) -> Self {
        self.time_tolerance = tolerance;
        self
    }
}

/// Builds [`VirtualArray`] values from descriptor sets.
pub struct VirtualArrayBuilder {
    params: BuildParams,
}

impl VirtualArrayBuilder {
    pub fn new(params: BuildParams) -> Self {
        Self { params }
    }

    /// Construct a virtual array over the given descriptors.
    ///
    /// Fails with:
    /// - [`BuildError::EmptyIntersection`] when no descriptor intersects
    ///   the requested bounds (or the input is empty);
    /// - [`BuildError::MissingBand`] when a requested band is supplied by
    ///   no descriptor;
    /// - [`BuildError::CrsMismatch`] when descriptors disagree on their
    ///   source CRS.
    pub fn build(&self, descriptors: &[AssetDescriptor]) -> Result<VirtualArray, BuildError> {
        let params = &self.params;

        if params.time_tolerance < Duration::zero() {
            return Err(BuildError::InvalidParams(
                "time tolerance must be non-negative".to_string(),
            ));
        }
        if let Some(bounds) = &params.bounds {
            if !bounds.is_valid() {
                return Err(BuildError::InvalidParams(format!(
                    "bounds corners are inverted: {:?}",
                    bounds
                )));
            }
        }
        if descriptors.is_empty() {
            return Err(BuildError::EmptyIntersection);
        }

        // All sources must agree on one CRS; reprojection to the target
        // CRS is handled at read time from that single source CRS.
        let mut source_crs: Vec<CrsCode> = descriptors.iter().map(|d| d.crs).collect();
        source_crs.sort_by_key(|c| c.to_string());
        source_crs.dedup();
        if source_crs.len() > 1 {
            return Err(BuildError::CrsMismatch {
                found: source_crs.iter().map(|c| c.to_string()).collect(),
            });
        }

        // Band axis: requested order, or sorted union.
        let bands: Vec<String> = match &params.bands {
            Some(requested) => {
                for band in requested {
                    if !descriptors.iter().any(|d| &d.band == band) {
                        return Err(BuildError::MissingBand(band.clone()));
                    }
                }
                requested.clone()
            }
            None => {
                let mut bands: Vec<String> =
                    descriptors.iter().map(|d| d.band.clone()).collect();
                bands.sort();
                bands.dedup();
                bands
            }
        };

        // Candidates: band-selected, transformed footprints, clipped to
        // explicit bounds when given.
        let mut candidates: Vec<(&AssetDescriptor, BoundingBox)> = descriptors
            .iter()
            .filter(|d| bands.contains(&d.band))
            .map(|d| {
                let footprint = crs::transform_bbox(d.crs, params.target_crs, &d.footprint);
                (d, footprint)
            })
            .collect();

        if let Some(bounds) = &params.bounds {
            candidates.retain(|(_, footprint)| footprint.intersects(bounds));
        }
        if candidates.is_empty() {
            return Err(BuildError::EmptyIntersection);
        }

        // Output grid: explicit bounds, or the union extent.
        let extent = match params.bounds {
            Some(bounds) => bounds,
            None => candidates
                .iter()
                .skip(1)
                .fold(candidates[0].1, |acc, (_, footprint)| acc.union(footprint)),
        };
        let grid = OutputGrid::from_bounds(params.target_crs, &extent, params.resolution)?;

        // Time axis: sorted, deduplicated, grouped within tolerance.
        let mut stamps: Vec<DateTime<Utc>> =
            candidates.iter().map(|(d, _)| d.acquired_at).collect();
        stamps.sort();
        stamps.dedup();

        let mut times: Vec<DateTime<Utc>> = Vec::new();
        for stamp in stamps {
            match times.last() {
                Some(&label) if stamp - label <= params.time_tolerance => {}
                _ => times.push(stamp),
            }
        }

        // Register layers per (time, band) slot.
        let mut slots: Vec<Vec<Vec<AssetDescriptor>>> =
            vec![vec![Vec::new(); bands.len()]; times.len()];

        for (descriptor, _) in &candidates {
            let time_idx = slot_index(&times, descriptor.acquired_at);
            let band_idx = bands
                .iter()
                .position(|b| b == &descriptor.band)
                .expect("candidate bands are on the band axis");
            slots[time_idx][band_idx].push((*descriptor).clone());
        }

        // Deterministic layer order: ascending acquisition, uri tie-break.
        for row in &mut slots {
            for layers in row {
                layers.sort_by(|a, b| {
                    a.acquired_at
                        .cmp(&b.acquired_at)
                        .then_with(|| a.uri.cmp(&b.uri))
                });
            }
        }

        let array = VirtualArray {
            grid,
            times,
            bands,
            slots,
            resampling: params.resampling,
            policy: params.policy,
        };

        let (nt, nb, ny, nx) = array.shape();
        debug!(
            times = nt,
            bands = nb,
            rows = ny,
            cols = nx,
            coverage = array.coverage(),
            "Built virtual array"
        );

        Ok(array)
    }
}

/// Index of the time slot a stamp belongs to: the last label at or
/// before the stamp.
fn slot_index(times: &[DateTime<Utc>], stamp: DateTime<Utc>) -> usize {
    match times.binary_search(&stamp) {
        Ok(idx) => idx,
        Err(0) => 0,
        Err(idx) => idx - 1,
    }
}
