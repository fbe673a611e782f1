//! Chunk sinks: where persist-mode executions write computed chunks.

use async_trait::async_trait;
use object_store::{path::Path, ObjectStore};
use std::sync::Arc;
use tracing::debug;

use raster_common::{Tile, TileEncoding};

use crate::chunk::ChunkCoords;

/// Sink write failure.
#[derive(Debug, thiserror::Error)]
#[error("sink write failed: {0}")]
pub struct SinkError(pub String);

/// Writes one computed chunk.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    async fn write_chunk(&self, path: &str, tile: &Tile) -> Result<(), SinkError>;
}

/// Storage layout for persisted results.
/// Format: results/{execution}/t{time}/b{band}/r{row}_c{col}.rtl
pub fn result_chunk_path(execution_id: &str, chunk: &ChunkCoords) -> String {
    format!(
        "results/{}/t{:03}/b{:02}/r{}_c{}.rtl",
        execution_id, chunk.time_idx, chunk.band_idx, chunk.row0, chunk.col0
    )
}

/// Chunk sink over an [`ObjectStore`], writing deflate-compressed tiles.
pub struct ObjectStoreChunkSink {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreChunkSink {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ChunkSink for ObjectStoreChunkSink {
    async fn write_chunk(&self, path: &str, tile: &Tile) -> Result<(), SinkError> {
        let encoded = tile
            .encode(TileEncoding::Deflate)
            .map_err(|e| SinkError(format!("{}: {}", path, e)))?;

        let location = Path::from(path);
        self.store
            .put(&location, encoded.into())
            .await
            .map_err(|e| SinkError(format!("{}: {}", path, e)))?;

        debug!(path = %path, "Persisted chunk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_chunk_path() {
        let chunk = ChunkCoords {
            time_idx: 3,
            band_idx: 1,
            row0: 512,
            col0: 0,
            height: 256,
            width: 256,
        };
        assert_eq!(
            result_chunk_path("run-42", &chunk),
            "results/run-42/t003/b01/r512_c0.rtl"
        );
    }
}
