//! Output grid specification: the spatial axes of a virtual array.

use serde::{Deserialize, Serialize};

use raster_common::{BoundingBox, CrsCode};

use crate::error::BuildError;

/// A regular, axis-aligned output grid with square cells.
///
/// The origin is the top-left corner (minimum x, maximum y); row 0 is
/// the top row. Cell centers carry the coordinate labels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputGrid {
    /// CRS the grid coordinates are expressed in.
    pub crs: CrsCode,
    /// X coordinate of the left edge.
    pub origin_x: f64,
    /// Y coordinate of the top edge.
    pub origin_y: f64,
    /// Cell size in CRS units per pixel.
    pub resolution: f64,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl OutputGrid {
    /// Derive a grid covering `bounds` at the given resolution.
    ///
    /// The extent is expanded to a whole number of cells; cell edges are
    /// anchored at the bounds' top-left corner.
    pub fn from_bounds(
        crs: CrsCode,
        bounds: &BoundingBox,
        resolution: f64,
    ) -> Result<Self, BuildError> {
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(BuildError::InvalidParams(format!(
                "resolution must be positive, got {}",
                resolution
            )));
        }
        if !bounds.is_valid() {
            return Err(BuildError::InvalidParams(format!(
                "bounds corners are inverted: {:?}",
                bounds
            )));
        }

        let width = (bounds.width() / resolution).ceil().max(1.0) as usize;
        let height = (bounds.height() / resolution).ceil().max(1.0) as usize;

        Ok(Self {
            crs,
            origin_x: bounds.min_x,
            origin_y: bounds.max_y,
            resolution,
            width,
            height,
        })
    }

    /// The grid's spatial extent.
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(
            self.origin_x,
            self.origin_y - self.height as f64 * self.resolution,
            self.origin_x + self.width as f64 * self.resolution,
            self.origin_y,
        )
    }

    /// Center coordinates of a cell.
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.resolution,
            self.origin_y - (row as f64 + 0.5) * self.resolution,
        )
    }

    /// Cell indices containing a coordinate, if inside the grid.
    pub fn coord_to_cell(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = ((x - self.origin_x) / self.resolution).floor();
        let row = ((self.origin_y - y) / self.resolution).floor();

        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        if col >= self.width || row >= self.height {
            return None;
        }
        Some((col, row))
    }

    /// X axis labels (cell centers, increasing).
    pub fn x_coords(&self) -> Vec<f64> {
        (0..self.width)
            .map(|col| self.origin_x + (col as f64 + 0.5) * self.resolution)
            .collect()
    }

    /// Y axis labels (cell centers, decreasing: row 0 is the top).
    pub fn y_coords(&self) -> Vec<f64> {
        (0..self.height)
            .map(|row| self.origin_y - (row as f64 + 0.5) * self.resolution)
            .collect()
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Check if the grid has no cells.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clip to `bounds`, keeping cell alignment with this grid.
    ///
    /// The result covers every cell whose extent intersects `bounds`.
    /// Returns `None` when the bounds miss the grid entirely.
    pub fn clip(&self, bounds: &BoundingBox) -> Option<OutputGrid> {
        let own = self.bbox();
        let clipped = own.intersection(bounds)?;

        let col0 = ((clipped.min_x - self.origin_x) / self.resolution).floor() as usize;
        let row0 = ((self.origin_y - clipped.max_y) / self.resolution).floor() as usize;
        let col1 = ((clipped.max_x - self.origin_x) / self.resolution).ceil() as usize;
        let row1 = ((self.origin_y - clipped.min_y) / self.resolution).ceil() as usize;

        let col1 = col1.min(self.width);
        let row1 = row1.min(self.height);
        if col0 >= col1 || row0 >= row1 {
            return None;
        }

        Some(OutputGrid {
            crs: self.crs,
            origin_x: self.origin_x + col0 as f64 * self.resolution,
            origin_y: self.origin_y - row0 as f64 * self.resolution,
            resolution: self.resolution,
            width: col1 - col0,
            height: row1 - row0,
        })
    }

    /// Same extent, different resolution.
    pub fn with_resolution(&self, resolution: f64) -> Result<OutputGrid, BuildError> {
        OutputGrid::from_bounds(self.crs, &self.bbox(), resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> OutputGrid {
        OutputGrid::from_bounds(
            CrsCode::Epsg4326,
            &BoundingBox::new(0.0, 0.0, 10.0, 5.0),
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn test_from_bounds_shape() {
        let g = grid();
        assert_eq!(g.width, 10);
        assert_eq!(g.height, 5);
        assert_eq!(g.origin_x, 0.0);
        assert_eq!(g.origin_y, 5.0);
    }

    #[test]
    fn test_from_bounds_rounds_up() {
        let g = OutputGrid::from_bounds(
            CrsCode::Epsg4326,
            &BoundingBox::new(0.0, 0.0, 10.5, 5.0),
            1.0,
        )
        .unwrap();
        assert_eq!(g.width, 11);
    }

    #[test]
    fn test_rejects_bad_resolution() {
        let bounds = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert!(OutputGrid::from_bounds(CrsCode::Epsg4326, &bounds, 0.0).is_err());
        assert!(OutputGrid::from_bounds(CrsCode::Epsg4326, &bounds, -2.0).is_err());
    }

    #[test]
    fn test_cell_center_roundtrip() {
        let g = grid();
        let (x, y) = g.cell_center(3, 2);
        assert_eq!(g.coord_to_cell(x, y), Some((3, 2)));
    }

    #[test]
    fn test_coord_to_cell_outside() {
        let g = grid();
        assert_eq!(g.coord_to_cell(-0.5, 2.0), None);
        assert_eq!(g.coord_to_cell(3.0, 6.0), None);
    }

    #[test]
    fn test_axis_labels() {
        let g = grid();
        let xs = g.x_coords();
        let ys = g.y_coords();

        assert_eq!(xs.len(), 10);
        assert_eq!(ys.len(), 5);
        assert_eq!(xs[0], 0.5);
        assert_eq!(ys[0], 4.5);
        assert!(xs.windows(2).all(|w| w[0] < w[1]));
        assert!(ys.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_clip_keeps_alignment() {
        let g = grid();
        let clipped = g.clip(&BoundingBox::new(2.3, 1.2, 6.7, 3.8)).unwrap();

        assert_eq!(clipped.origin_x, 2.0);
        assert_eq!(clipped.origin_y, 4.0);
        assert_eq!(clipped.width, 5);
        assert_eq!(clipped.height, 3);
    }

    #[test]
    fn test_clip_outside_returns_none() {
        let g = grid();
        assert!(g.clip(&BoundingBox::new(20.0, 20.0, 30.0, 30.0)).is_none());
    }
}
