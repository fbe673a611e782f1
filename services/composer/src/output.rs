//! Result output: raw f32 samples plus a JSON metadata sidecar.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use compute_engine::MaterializedResult;

/// Sidecar metadata describing the raw output file.
#[derive(Debug, Serialize)]
struct OutputMetadata<'a> {
    /// Dimension order of the raw file.
    layout: &'static str,
    shape: [usize; 4],
    times: &'a [DateTime<Utc>],
    bands: &'a [String],
    y: &'a [f64],
    x: &'a [f64],
    nodata: &'static str,
    warnings: &'a [String],
}

/// Write the result as little-endian f32 samples in (time, band, y, x)
/// order, with a `.json` sidecar next to it.
pub fn write_result(result: &MaterializedResult, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut raw = Vec::with_capacity(result.data.len() * 4);
    for value in result.data.iter() {
        raw.extend_from_slice(&value.to_le_bytes());
    }
    std::fs::write(path, &raw)
        .with_context(|| format!("failed to write {}", path.display()))?;

    let (nt, nb, ny, nx) = result.shape();
    let metadata = OutputMetadata {
        layout: "time,band,y,x",
        shape: [nt, nb, ny, nx],
        times: &result.times,
        bands: &result.bands,
        y: &result.y,
        x: &result.x,
        nodata: "NaN",
        warnings: &result.warnings,
    };

    let sidecar = path.with_extension("json");
    let json = serde_json::to_string_pretty(&metadata)?;
    std::fs::write(&sidecar, json)
        .with_context(|| format!("failed to write {}", sidecar.display()))?;

    info!(
        path = %path.display(),
        bytes = raw.len(),
        sidecar = %sidecar.display(),
        "Wrote result"
    );

    Ok(())
}
