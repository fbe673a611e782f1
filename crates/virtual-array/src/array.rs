//! The virtual array: a lazy 4-D view over remote tiles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use raster_common::{crs, AssetDescriptor, BoundingBox, TimeInterval};

use crate::error::BuildError;
use crate::grid::OutputGrid;
use crate::resample::Resampling;

/// How overlapping source tiles within one (time, band) slot combine.
///
/// Layers are always ordered by ascending (acquisition time, uri), so
/// either policy is deterministic regardless of input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompositePolicy {
    /// Later acquisitions overwrite earlier ones in overlap regions.
    #[default]
    LatestWins,
    /// Earlier acquisitions win; later layers only fill remaining gaps.
    EarliestWins,
}

/// A multi-dimensional (time × band × y × x) array whose values are not
/// materialized.
///
/// Every coordinate resolves to at most one source tile region through
/// the slot layer lists; coordinates no layer covers are no-data.
/// Transformations produce new arrays; an existing array is never
/// mutated.
#[derive(Debug, Clone)]
pub struct VirtualArray {
    /// Spatial axes.
    pub grid: OutputGrid,
    /// Time axis: sorted, deduplicated acquisition timestamps.
    pub times: Vec<DateTime<Utc>>,
    /// Band axis: deduplicated band identifiers.
    pub bands: Vec<String>,
    /// Source layers per (time, band) slot, ascending (acquired_at, uri).
    /// An empty slot is no-data.
    pub slots: Vec<Vec<Vec<AssetDescriptor>>>,
    /// Resampling method for reads from source tiles.
    pub resampling: Resampling,
    /// Overlap resolution policy.
    pub policy: CompositePolicy,
}

impl VirtualArray {
    /// Array shape as (time, band, y, x).
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        (
            self.times.len(),
            self.bands.len(),
            self.grid.height,
            self.grid.width,
        )
    }

    /// Source layers registered for a (time, band) slot.
    pub fn slot(&self, time_idx: usize, band_idx: usize) -> &[AssetDescriptor] {
        &self.slots[time_idx][band_idx]
    }

    /// Whether a slot has no source coverage at all.
    pub fn slot_is_nodata(&self, time_idx: usize, band_idx: usize) -> bool {
        self.slots[time_idx][band_idx].is_empty()
    }

    /// Fraction of (time, band) slots with at least one source layer.
    pub fn coverage(&self) -> f64 {
        let total = self.times.len() * self.bands.len();
        if total == 0 {
            return 0.0;
        }
        let covered = self
            .slots
            .iter()
            .flatten()
            .filter(|layers| !layers.is_empty())
            .count();
        covered as f64 / total as f64
    }

    /// X axis labels.
    pub fn x_coords(&self) -> Vec<f64> {
        self.grid.x_coords()
    }

    /// Y axis labels.
    pub fn y_coords(&self) -> Vec<f64> {
        self.grid.y_coords()
    }

    /// Narrow the view along time, band, and spatial axes.
    ///
    /// The spatial bounds are interpreted in the grid's CRS and the
    /// clipped grid stays cell-aligned with the original. Fails with
    /// [`BuildError::EmptyIntersection`] when the narrowed view has no
    /// source coverage left, and with [`BuildError::MissingBand`] when a
    /// requested band is not on the band axis.
    pub fn select(
        &self,
        time: Option<TimeInterval>,
        bands: Option<&[String]>,
        bounds: Option<BoundingBox>,
    ) -> Result<VirtualArray, BuildError> {
        // Band axis, in requested order
        let band_indices: Vec<usize> = match bands {
            Some(requested) => requested
                .iter()
                .map(|band| {
                    self.bands
                        .iter()
                        .position(|b| b == band)
                        .ok_or_else(|| BuildError::MissingBand(band.clone()))
                })
                .collect::<Result<_, _>>()?,
            None => (0..self.bands.len()).collect(),
        };

        // Time axis
        let time_indices: Vec<usize> = match time {
            Some(interval) => (0..self.times.len())
                .filter(|&t| interval.contains(&self.times[t]))
                .collect(),
            None => (0..self.times.len()).collect(),
        };
        if time_indices.is_empty() {
            return Err(BuildError::EmptyIntersection);
        }

        // Spatial axes
        let grid = match bounds {
            Some(b) => self.grid.clip(&b).ok_or(BuildError::EmptyIntersection)?,
            None => self.grid,
        };
        let grid_bbox = grid.bbox();

        let mut slots = Vec::with_capacity(time_indices.len());
        let mut any_coverage = false;
        for &t in &time_indices {
            let mut row = Vec::with_capacity(band_indices.len());
            for &b in &band_indices {
                let layers: Vec<AssetDescriptor> = self.slots[t][b]
                    .iter()
                    .filter(|d| {
                        let footprint = crs::transform_bbox(d.crs, grid.crs, &d.footprint);
                        footprint.intersects(&grid_bbox)
                    })
                    .cloned()
                    .collect();
                any_coverage |= !layers.is_empty();
                row.push(layers);
            }
            slots.push(row);
        }

        if !any_coverage {
            return Err(BuildError::EmptyIntersection);
        }

        Ok(VirtualArray {
            grid,
            times: time_indices.iter().map(|&t| self.times[t]).collect(),
            bands: band_indices
                .iter()
                .map(|&b| self.bands[b].clone())
                .collect(),
            slots,
            resampling: self.resampling,
            policy: self.policy,
        })
    }

    /// Produce a view over the same extent at a different resolution.
    pub fn resample(
        &self,
        resolution: f64,
        method: Resampling,
    ) -> Result<VirtualArray, BuildError> {
        let grid = self.grid.with_resolution(resolution)?;
        Ok(VirtualArray {
            grid,
            times: self.times.clone(),
            bands: self.bands.clone(),
            slots: self.slots.clone(),
            resampling: method,
            policy: self.policy,
        })
    }
}
