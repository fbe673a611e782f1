//! Tile readers: fetch and decode remote tiles.

use async_trait::async_trait;
use object_store::{path::Path, ObjectStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use raster_common::{Tile, TileCodecError};

/// Read failure, classified for retry handling.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// Worth retrying: timeouts, connection failures, throttling.
    #[error("transient read failure: {0}")]
    Transient(String),

    /// The tile does not exist; retrying will not help.
    #[error("tile not found: {0}")]
    NotFound(String),

    /// The tile exists but its payload is unusable.
    #[error("corrupt tile: {0}")]
    Corrupt(String),
}

impl From<TileCodecError> for ReadError {
    fn from(err: TileCodecError) -> Self {
        ReadError::Corrupt(err.to_string())
    }
}

/// Reads one tile by URI.
///
/// Implementations are shared across concurrent chunk tasks; source
/// tiles are read-only, so reads never contend on the data itself.
#[async_trait]
pub trait TileReader: Send + Sync {
    async fn read_tile(&self, uri: &str) -> Result<Tile, ReadError>;
}

/// Tile reader over an [`ObjectStore`] (S3, local filesystem, ...).
///
/// Each read carries an independent timeout so a hang on one tile never
/// blocks unrelated tiles.
pub struct ObjectStoreTileReader {
    store: Arc<dyn ObjectStore>,
    read_timeout: Duration,
}

impl ObjectStoreTileReader {
    pub fn new(store: Arc<dyn ObjectStore>, read_timeout: Duration) -> Self {
        Self {
            store,
            read_timeout,
        }
    }
}

#[async_trait]
impl TileReader for ObjectStoreTileReader {
    async fn read_tile(&self, uri: &str) -> Result<Tile, ReadError> {
        let location = Path::from(uri);

        let fetch = async {
            let result = self.store.get(&location).await.map_err(|e| match e {
                object_store::Error::NotFound { .. } => ReadError::NotFound(uri.to_string()),
                other => ReadError::Transient(format!("{}: {}", uri, other)),
            })?;

            result
                .bytes()
                .await
                .map_err(|e| ReadError::Transient(format!("{}: {}", uri, e)))
        };

        let bytes = tokio::time::timeout(self.read_timeout, fetch)
            .await
            .map_err(|_| {
                ReadError::Transient(format!(
                    "read of {} timed out after {:?}",
                    uri, self.read_timeout
                ))
            })??;

        debug!(uri = %uri, size = bytes.len(), "Fetched tile");
        Ok(Tile::decode(bytes)?)
    }
}
