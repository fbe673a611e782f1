//! LRU cache for decoded tiles, scoped to one execution.
//!
//! Multiple chunk tasks frequently read the same remote tile (a chunk
//! window rarely lines up exactly with one source tile). Caching decoded
//! tiles for the duration of an execution deduplicates those reads.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use raster_common::Tile;

/// Cache key: hash of the tile URI.
pub type TileKey = u64;

/// Statistics for one execution's tile cache.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub memory_bytes: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Memory-bounded LRU cache of decoded tiles.
pub struct TileCache {
    cache: LruCache<TileKey, Arc<Tile>>,
    memory_limit: usize,
    current_memory: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TileCache {
    /// Create a cache with the given memory limit in bytes.
    pub fn new(memory_limit: usize) -> Self {
        // Estimate max entries assuming ~256KB per tile (256×256×4 bytes)
        let tile_size_estimate = 256 * 256 * 4;
        let max_entries = (memory_limit / tile_size_estimate).max(16);

        Self {
            cache: LruCache::new(NonZeroUsize::new(max_entries).unwrap()),
            memory_limit,
            current_memory: 0,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a tile by URI.
    pub fn get(&mut self, uri: &str) -> Option<Arc<Tile>> {
        let key = hash_uri(uri);
        if let Some(tile) = self.cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(Arc::clone(tile))
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Insert a decoded tile, evicting least recently used entries until
    /// it fits.
    pub fn insert(&mut self, uri: &str, tile: Arc<Tile>) {
        let key = hash_uri(uri);
        let tile_size = tile.byte_size();

        while self.current_memory + tile_size > self.memory_limit && !self.cache.is_empty() {
            if let Some((_, evicted)) = self.cache.pop_lru() {
                self.current_memory = self.current_memory.saturating_sub(evicted.byte_size());
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        if tile_size <= self.memory_limit {
            self.cache.put(key, tile);
            self.current_memory += tile_size;
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.len(),
            memory_bytes: self.current_memory as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Current memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        self.current_memory
    }

    /// Number of cached tiles.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Hash a tile URI into a cache key.
fn hash_uri(uri: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    uri.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(edge: usize, value: f32) -> Arc<Tile> {
        Arc::new(Tile::new(edge, edge, vec![value; edge * edge]))
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = TileCache::new(1024 * 1024);

        assert!(cache.get("tiles/a.rtl").is_none());
        cache.insert("tiles/a.rtl", tile(8, 1.0));

        let cached = cache.get("tiles/a.rtl").unwrap();
        assert_eq!(cached.data[0], 1.0);
    }

    #[test]
    fn test_lru_eviction_under_memory_pressure() {
        // Room for ~4 8x8 tiles (256 bytes each)
        let mut cache = TileCache::new(1024);

        for i in 0..10 {
            cache.insert(&format!("tiles/{}.rtl", i), tile(8, i as f32));
        }

        assert!(cache.get("tiles/0.rtl").is_none());
        assert!(cache.get("tiles/9.rtl").is_some());

        let stats = cache.stats();
        assert!(stats.evictions > 0);
        assert!(cache.memory_usage() <= 1024);
    }

    #[test]
    fn test_stats() {
        let mut cache = TileCache::new(1024 * 1024);
        cache.insert("tiles/a.rtl", tile(8, 1.0));

        cache.get("tiles/a.rtl");
        cache.get("tiles/b.rtl");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_hit_rate() {
        let mut stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);

        stats.hits = 80;
        stats.misses = 20;
        assert!((stats.hit_rate() - 0.8).abs() < f64::EPSILON);
    }
}
