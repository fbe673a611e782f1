//! Resampling methods and interpolation kernels.

use serde::{Deserialize, Serialize};

/// Resampling method used when mapping output cells to source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    /// Nearest neighbor (preserves exact values).
    #[default]
    Nearest,
    /// Bilinear interpolation (smooth, slight value changes).
    Bilinear,
    /// Bicubic interpolation (smoothest, more compute).
    Cubic,
}

impl Resampling {
    /// Parse from string (case-insensitive). Unknown strings fall back
    /// to nearest.
    pub fn from_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "bilinear" => Self::Bilinear,
            "cubic" | "bicubic" => Self::Cubic,
            _ => Self::Nearest,
        }
    }

    /// Sample a source grid at fractional pixel coordinates.
    pub fn sample(&self, data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
        match self {
            Resampling::Nearest => nearest_sample(data, width, height, x, y),
            Resampling::Bilinear => bilinear_sample(data, width, height, x, y),
            Resampling::Cubic => cubic_sample(data, width, height, x, y),
        }
    }
}

impl std::fmt::Display for Resampling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Bilinear => write!(f, "bilinear"),
            Self::Cubic => write!(f, "cubic"),
        }
    }
}

/// Nearest neighbor: value of the closest pixel.
pub fn nearest_sample(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if x < -0.5 || y < -0.5 {
        return f32::NAN;
    }
    let col = x.round() as usize;
    let row = y.round() as usize;

    if col >= width || row >= height {
        return f32::NAN;
    }

    data[row * width + col]
}

/// Bilinear: smooth blend of the four surrounding pixels.
///
/// Returns NaN if any contributing pixel is NaN, so no-data never bleeds
/// into valid output as a half-weighted value.
pub fn bilinear_sample(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if x < 0.0 || y < 0.0 {
        return f32::NAN;
    }

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    if x0 >= width || y0 >= height {
        return f32::NAN;
    }
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let xf = (x - x0 as f64) as f32;
    let yf = (y - y0 as f64) as f32;

    let v00 = data[y0 * width + x0];
    let v10 = data[y0 * width + x1];
    let v01 = data[y1 * width + x0];
    let v11 = data[y1 * width + x1];

    if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
        return f32::NAN;
    }

    let top = v00 * (1.0 - xf) + v10 * xf;
    let bottom = v01 * (1.0 - xf) + v11 * xf;
    top * (1.0 - yf) + bottom * yf
}

/// Bicubic: Catmull-Rom over a 4x4 neighborhood.
///
/// Falls back to bilinear when the neighborhood contains NaN.
pub fn cubic_sample(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if x < 0.0 || y < 0.0 || x.floor() as usize >= width || y.floor() as usize >= height {
        return f32::NAN;
    }

    let xi = x.floor() as i32;
    let yi = y.floor() as i32;

    let xf = (x - xi as f64) as f32;
    let yf = (y - yi as f64) as f32;

    let mut values = [[0.0f32; 4]; 4];

    for j in 0..4 {
        for i in 0..4 {
            let px = (xi + i - 1).clamp(0, width as i32 - 1) as usize;
            let py = (yi + j - 1).clamp(0, height as i32 - 1) as usize;
            values[j as usize][i as usize] = data[py * width + px];

            if values[j as usize][i as usize].is_nan() {
                return bilinear_sample(data, width, height, x, y);
            }
        }
    }

    let mut row_values = [0.0f32; 4];
    for j in 0..4 {
        row_values[j] = cubic_1d(values[j][0], values[j][1], values[j][2], values[j][3], xf);
    }

    cubic_1d(row_values[0], row_values[1], row_values[2], row_values[3], yf)
}

/// 1D cubic interpolation using Catmull-Rom spline.
fn cubic_1d(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;

    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    let d = p1;

    a * t3 + b * t2 + c * t + d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_sample() {
        let data: Vec<f32> = vec![
            1.0, 2.0, 3.0, //
            4.0, 5.0, 6.0, //
            7.0, 8.0, 9.0,
        ];

        assert_eq!(nearest_sample(&data, 3, 3, 0.0, 0.0), 1.0);
        assert_eq!(nearest_sample(&data, 3, 3, 1.0, 1.0), 5.0);
        assert_eq!(nearest_sample(&data, 3, 3, 0.4, 0.4), 1.0);
        assert_eq!(nearest_sample(&data, 3, 3, 0.6, 0.6), 5.0);
        assert!(nearest_sample(&data, 3, 3, 3.0, 0.0).is_nan());
    }

    #[test]
    fn test_bilinear_sample() {
        let data: Vec<f32> = vec![
            1.0, 2.0, //
            3.0, 4.0,
        ];

        // Corners
        assert_eq!(bilinear_sample(&data, 2, 2, 0.0, 0.0), 1.0);
        assert_eq!(bilinear_sample(&data, 2, 2, 1.0, 0.0), 2.0);
        assert_eq!(bilinear_sample(&data, 2, 2, 0.0, 1.0), 3.0);
        assert_eq!(bilinear_sample(&data, 2, 2, 1.0, 1.0), 4.0);

        // Center
        let center = bilinear_sample(&data, 2, 2, 0.5, 0.5);
        assert!((center - 2.5).abs() < 0.001);
    }

    #[test]
    fn test_bilinear_with_nan() {
        let data: Vec<f32> = vec![
            1.0,
            f32::NAN, //
            3.0,
            4.0,
        ];

        let result = bilinear_sample(&data, 2, 2, 0.5, 0.5);
        assert!(result.is_nan());
    }

    #[test]
    fn test_cubic_smooth_region() {
        let data: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let value = cubic_sample(&data, 4, 4, 1.5, 1.5);
        // Linear ramp: cubic must reproduce the midpoint
        assert!((value - 7.5).abs() < 0.01);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Resampling::from_name("nearest"), Resampling::Nearest);
        assert_eq!(Resampling::from_name("BILINEAR"), Resampling::Bilinear);
        assert_eq!(Resampling::from_name("bicubic"), Resampling::Cubic);
        assert_eq!(Resampling::from_name("unknown"), Resampling::Nearest);
    }
}
