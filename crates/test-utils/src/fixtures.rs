//! In-memory implementations of the storage and catalog seams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use catalog_client::{CatalogTransport, SearchPage, SearchRequest, TransportError};
use compute_engine::{ReadError, TileReader};
use raster_common::{AssetDescriptor, BoundingBox, CrsCode, Tile};

/// Build a descriptor with defaults suitable for tests (EPSG:4326, no
/// attributes).
pub fn asset(
    uri: &str,
    collection: &str,
    band: &str,
    acquired_at: DateTime<Utc>,
    footprint: BoundingBox,
    tile_width: usize,
    tile_height: usize,
) -> AssetDescriptor {
    AssetDescriptor {
        uri: uri.to_string(),
        collection: collection.to_string(),
        band: band.to_string(),
        acquired_at,
        footprint,
        crs: CrsCode::Epsg4326,
        tile_width,
        tile_height,
        properties: HashMap::new(),
    }
}

/// Like [`asset`], with numeric catalog attributes attached.
pub fn asset_with_properties(
    uri: &str,
    collection: &str,
    band: &str,
    acquired_at: DateTime<Utc>,
    footprint: BoundingBox,
    tile_width: usize,
    tile_height: usize,
    properties: &[(&str, f64)],
) -> AssetDescriptor {
    let mut descriptor = asset(
        uri,
        collection,
        band,
        acquired_at,
        footprint,
        tile_width,
        tile_height,
    );
    descriptor.properties = properties
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();
    descriptor
}

/// Decrements the active-read gauge even when the read future is
/// dropped mid-flight (cancellation tests rely on this).
struct ActiveReadGuard<'a>(&'a AtomicI64);

impl Drop for ActiveReadGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory tile store with failure injection and read accounting.
#[derive(Default)]
pub struct MemoryTileStore {
    tiles: Mutex<HashMap<String, Tile>>,
    /// Remaining injected transient failures per URI.
    transient_failures: Mutex<HashMap<String, u32>>,
    /// Artificial latency per read.
    delay: Mutex<Option<Duration>>,
    attempts: Mutex<HashMap<String, u64>>,
    total_reads: AtomicU64,
    active_reads: AtomicI64,
}

impl MemoryTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a tile under a URI.
    pub fn insert_tile(&self, uri: &str, tile: Tile) {
        self.tiles.lock().unwrap().insert(uri.to_string(), tile);
    }

    /// Make the next `times` reads of `uri` fail with a transient error.
    pub fn inject_transient_failures(&self, uri: &str, times: u32) {
        self.transient_failures
            .lock()
            .unwrap()
            .insert(uri.to_string(), times);
    }

    /// Delay every read by `delay` (used by cancellation and timeout
    /// tests).
    pub fn set_read_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Total read attempts across all URIs.
    pub fn total_reads(&self) -> u64 {
        self.total_reads.load(Ordering::SeqCst)
    }

    /// Read attempts for one URI.
    pub fn attempts_for(&self, uri: &str) -> u64 {
        self.attempts.lock().unwrap().get(uri).copied().unwrap_or(0)
    }

    /// Reads currently in flight.
    pub fn active_reads(&self) -> i64 {
        self.active_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TileReader for MemoryTileStore {
    async fn read_tile(&self, uri: &str) -> Result<Tile, ReadError> {
        self.active_reads.fetch_add(1, Ordering::SeqCst);
        let _guard = ActiveReadGuard(&self.active_reads);

        self.total_reads.fetch_add(1, Ordering::SeqCst);
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(uri.to_string())
            .or_insert(0) += 1;

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.transient_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(uri) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ReadError::Transient(format!(
                        "injected failure for {}",
                        uri
                    )));
                }
            }
        }

        self.tiles
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| ReadError::NotFound(uri.to_string()))
    }
}

/// In-memory catalog transport with real pagination semantics.
///
/// Filtering (collections, region, time, attributes) runs server-side,
/// the way a remote catalog would; page tokens are offsets into the
/// filtered, deterministically ordered result set.
#[derive(Default)]
pub struct MemoryCatalog {
    assets: Vec<AssetDescriptor>,
    page_fetches: AtomicU64,
    /// Transient failures injected before the next successful fetch.
    transient_failures: AtomicU32,
    reject_auth: bool,
}

impl MemoryCatalog {
    pub fn new(assets: Vec<AssetDescriptor>) -> Self {
        Self {
            assets,
            ..Self::default()
        }
    }

    /// Fail the next `times` page fetches with a transient error.
    pub fn inject_transient_failures(&self, times: u32) {
        self.transient_failures.store(times, Ordering::SeqCst);
    }

    /// Reject every fetch as unauthenticated.
    pub fn with_auth_rejection(mut self) -> Self {
        self.reject_auth = true;
        self
    }

    /// Number of page fetches served (including injected failures).
    pub fn page_fetches(&self) -> u64 {
        self.page_fetches.load(Ordering::SeqCst)
    }

    fn matching(&self, request: &SearchRequest) -> Vec<AssetDescriptor> {
        let mut matches: Vec<AssetDescriptor> = self
            .assets
            .iter()
            .filter(|a| request.collections.contains(&a.collection))
            .filter(|a| request.contains(a))
            .filter(|a| request.filters.iter().all(|f| f.matches(a)))
            .cloned()
            .collect();

        matches.sort_by(|a, b| {
            a.acquired_at
                .cmp(&b.acquired_at)
                .then_with(|| a.uri.cmp(&b.uri))
        });
        matches
    }
}

#[async_trait]
impl CatalogTransport for MemoryCatalog {
    async fn fetch_page(
        &self,
        request: &SearchRequest,
        page_token: Option<&str>,
    ) -> Result<SearchPage, TransportError> {
        self.page_fetches.fetch_add(1, Ordering::SeqCst);

        if self.reject_auth {
            return Err(TransportError::Auth("credentials rejected".to_string()));
        }

        loop {
            let remaining = self.transient_failures.load(Ordering::SeqCst);
            if remaining == 0 {
                break;
            }
            if self
                .transient_failures
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Err(TransportError::Transient(
                    "injected catalog failure".to_string(),
                ));
            }
        }

        let offset: usize = match page_token {
            Some(token) => token
                .parse()
                .map_err(|_| TransportError::Rejected(format!("bad page token: {}", token)))?,
            None => 0,
        };

        let matches = self.matching(request);
        let end = (offset + request.page_size).min(matches.len());
        let items = matches[offset.min(matches.len())..end].to_vec();
        let next_token = if end < matches.len() {
            Some(end.to_string())
        } else {
            None
        };

        Ok(SearchPage { items, next_token })
    }
}
