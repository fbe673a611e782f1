//! Chunk partitioning: the unit of scheduling.

use std::fmt;

use raster_common::BoundingBox;
use virtual_array::VirtualArray;

/// Fallback chunk edge when the sources carry no tiling hint.
const DEFAULT_CHUNK_EDGE: usize = 256;

/// Coordinates of one schedulable chunk: a (time, band) slot crossed
/// with a rectangular pixel window of the output grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkCoords {
    pub time_idx: usize,
    pub band_idx: usize,
    /// Top row of the window.
    pub row0: usize,
    /// Left column of the window.
    pub col0: usize,
    pub height: usize,
    pub width: usize,
}

impl ChunkCoords {
    /// Spatial extent of the chunk in grid CRS units.
    pub fn bbox(&self, array: &VirtualArray) -> BoundingBox {
        let grid = &array.grid;
        BoundingBox::new(
            grid.origin_x + self.col0 as f64 * grid.resolution,
            grid.origin_y - (self.row0 + self.height) as f64 * grid.resolution,
            grid.origin_x + (self.col0 + self.width) as f64 * grid.resolution,
            grid.origin_y - self.row0 as f64 * grid.resolution,
        )
    }

    /// Number of cells in the chunk.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Whether the window is degenerate.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for ChunkCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(t={}, b={}, y={}..{}, x={}..{})",
            self.time_idx,
            self.band_idx,
            self.row0,
            self.row0 + self.height,
            self.col0,
            self.col0 + self.width
        )
    }
}

/// Partition an array into chunks: one per (time, band) slot and spatial
/// tile window.
///
/// The spatial chunk edge follows the most common source tile size so a
/// chunk read usually maps onto whole remote tiles instead of partial
/// re-reads. Arrays with no sources fall back to a fixed edge.
pub fn plan_chunks(array: &VirtualArray) -> Vec<ChunkCoords> {
    let (chunk_w, chunk_h) = dominant_tile_size(array);
    let (times, bands, rows, cols) = array.shape();

    let mut chunks = Vec::new();
    for time_idx in 0..times {
        for band_idx in 0..bands {
            for row0 in (0..rows).step_by(chunk_h) {
                for col0 in (0..cols).step_by(chunk_w) {
                    chunks.push(ChunkCoords {
                        time_idx,
                        band_idx,
                        row0,
                        col0,
                        height: chunk_h.min(rows - row0),
                        width: chunk_w.min(cols - col0),
                    });
                }
            }
        }
    }
    chunks
}

/// Partition an array into per-band spatial windows only.
///
/// Used for temporal reductions, where one task owns a window's whole
/// time column: `time_idx` is fixed at 0 and the task walks the time
/// axis itself.
pub fn spatial_windows(array: &VirtualArray) -> Vec<ChunkCoords> {
    let (chunk_w, chunk_h) = dominant_tile_size(array);
    let (_, bands, rows, cols) = array.shape();

    let mut windows = Vec::new();
    for band_idx in 0..bands {
        for row0 in (0..rows).step_by(chunk_h) {
            for col0 in (0..cols).step_by(chunk_w) {
                windows.push(ChunkCoords {
                    time_idx: 0,
                    band_idx,
                    row0,
                    col0,
                    height: chunk_h.min(rows - row0),
                    width: chunk_w.min(cols - col0),
                });
            }
        }
    }
    windows
}

/// The most common (tile_width, tile_height) among source layers,
/// clamped to the grid dimensions.
fn dominant_tile_size(array: &VirtualArray) -> (usize, usize) {
    use std::collections::HashMap;

    let mut counts: HashMap<(usize, usize), usize> = HashMap::new();
    for row in &array.slots {
        for layers in row {
            for layer in layers {
                *counts
                    .entry((layer.tile_width, layer.tile_height))
                    .or_insert(0) += 1;
            }
        }
    }

    let (mut w, mut h) = counts
        .into_iter()
        .max_by_key(|&(size, count)| (count, size))
        .map(|(size, _)| size)
        .unwrap_or((DEFAULT_CHUNK_EDGE, DEFAULT_CHUNK_EDGE));

    w = w.clamp(1, array.grid.width.max(1));
    h = h.clamp(1, array.grid.height.max(1));
    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use raster_common::CrsCode;
    use virtual_array::{CompositePolicy, OutputGrid, Resampling};

    fn empty_array(width: usize, height: usize, times: usize, bands: usize) -> VirtualArray {
        let grid = OutputGrid::from_bounds(
            CrsCode::Epsg4326,
            &BoundingBox::new(0.0, 0.0, width as f64, height as f64),
            1.0,
        )
        .unwrap();

        VirtualArray {
            grid,
            times: (0..times)
                .map(|i| {
                    chrono::DateTime::from_timestamp(i as i64 * 3600, 0)
                        .unwrap()
                })
                .collect(),
            bands: (0..bands).map(|i| format!("b{}", i)).collect(),
            slots: vec![vec![Vec::new(); bands]; times],
            resampling: Resampling::Nearest,
            policy: CompositePolicy::LatestWins,
        }
    }

    #[test]
    fn test_plan_chunks_covers_grid_exactly() {
        let array = empty_array(600, 500, 2, 3);
        let chunks = plan_chunks(&array);

        // Default 256-edge chunking: 3 x 2 spatial windows per slot
        assert_eq!(chunks.len(), 2 * 3 * 3 * 2);

        let cells: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(cells, 600 * 500 * 2 * 3);
    }

    #[test]
    fn test_chunk_bbox() {
        let array = empty_array(10, 10, 1, 1);
        let chunk = ChunkCoords {
            time_idx: 0,
            band_idx: 0,
            row0: 0,
            col0: 5,
            height: 5,
            width: 5,
        };

        let bbox = chunk.bbox(&array);
        assert_eq!(bbox.min_x, 5.0);
        assert_eq!(bbox.max_x, 10.0);
        assert_eq!(bbox.max_y, 10.0);
        assert_eq!(bbox.min_y, 5.0);
    }

    #[test]
    fn test_display_names_coordinates() {
        let chunk = ChunkCoords {
            time_idx: 2,
            band_idx: 1,
            row0: 0,
            col0: 256,
            height: 256,
            width: 128,
        };
        let text = chunk.to_string();
        assert!(text.contains("t=2"));
        assert!(text.contains("b=1"));
        assert!(text.contains("x=256..384"));
    }
}
