//! Materialized results: fully computed, caller-owned arrays.

use chrono::{DateTime, Utc};
use ndarray::Array4;

/// An in-memory, fully computed array with labeled axes.
///
/// Dimension order is (time, band, y, x); reduced axes keep a single
/// label. No-data is `f32::NAN`. Ownership transfers to the caller; no
/// lazy semantics remain.
#[derive(Debug, Clone)]
pub struct MaterializedResult {
    /// Computed values, shape (time, band, y, x).
    pub data: Array4<f32>,
    /// Time axis labels.
    pub times: Vec<DateTime<Utc>>,
    /// Band axis labels.
    pub bands: Vec<String>,
    /// Y axis labels (cell centers, decreasing).
    pub y: Vec<f64>,
    /// X axis labels (cell centers, increasing).
    pub x: Vec<f64>,
    /// Warnings surfaced during execution (partial-tolerance fills).
    pub warnings: Vec<String>,
}

impl MaterializedResult {
    /// Array shape as (time, band, y, x).
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        let s = self.data.shape();
        (s[0], s[1], s[2], s[3])
    }

    /// Value at the given coordinates, if in range.
    pub fn value(&self, time: usize, band: usize, row: usize, col: usize) -> Option<f32> {
        self.data.get([time, band, row, col]).copied()
    }

    /// Index of a band label.
    pub fn band_index(&self, band: &str) -> Option<usize> {
        self.bands.iter().position(|b| b == band)
    }

    /// One value per timestamp for a band.
    ///
    /// Meaningful after a spatial reduction (y and x are singleton);
    /// returns `None` otherwise.
    pub fn time_series(&self, band: &str) -> Option<Vec<(DateTime<Utc>, f32)>> {
        let (_, _, rows, cols) = self.shape();
        if rows != 1 || cols != 1 {
            return None;
        }
        let band_idx = self.band_index(band)?;

        Some(
            self.times
                .iter()
                .enumerate()
                .map(|(t, &stamp)| (stamp, self.data[[t, band_idx, 0, 0]]))
                .collect(),
        )
    }

    /// Fraction of values that are valid (non-NaN).
    pub fn valid_fraction(&self) -> f64 {
        let total = self.data.len();
        if total == 0 {
            return 0.0;
        }
        let valid = self.data.iter().filter(|v| !v.is_nan()).count();
        valid as f64 / total as f64
    }
}
