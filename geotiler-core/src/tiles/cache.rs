use std::time::Duration;

use geotiler_tile_utils::TileCoord;
use moka::sync::Cache;
use tracing::{debug, trace};

use crate::tiles::Tile;

/// Cache of encoded tiles, bounded by the total size of their data.
///
/// Entries are keyed by the index generation they were produced from, so a tile can never
/// be served for an index other than its own.
#[derive(Clone, Debug)]
pub struct TileCache(Cache<TileCacheKey, Tile>);

impl TileCache {
    /// Creates a new tile cache.
    ///
    /// # Arguments
    ///
    /// * `max_size_bytes` - Maximum cache size in bytes (based on tile data size)
    /// * `idle_timeout` - Optional idle timeout (TTI - time to idle since last access)
    #[must_use]
    pub fn new(max_size_bytes: u64, idle_timeout: Option<Duration>) -> Self {
        let mut builder = Cache::builder()
            .name("tile_cache")
            .weigher(|_key: &TileCacheKey, value: &Tile| -> u32 {
                value.data.len().try_into().unwrap_or(u32::MAX)
            })
            .max_capacity(max_size_bytes);

        if let Some(tti) = idle_timeout {
            builder = builder.time_to_idle(tti);
            trace!("Tile cache configured with TTI of {:?}", tti);
        }

        Self(builder.build())
    }

    fn get(&self, key: &TileCacheKey) -> Option<Tile> {
        let result = self.0.get(key);

        if result.is_some() {
            trace!(
                "Tile cache HIT for {key:?} (entries={entries}, size={size}B)",
                entries = self.0.entry_count(),
                size = self.0.weighted_size()
            );
        } else {
            trace!("Tile cache MISS for {key:?}");
        }

        result
    }

    /// Gets a tile from cache or computes it using the provided function.
    pub fn get_or_insert<F, E>(&self, generation: u64, xyz: TileCoord, compute: F) -> Result<Tile, E>
    where
        F: FnOnce() -> Result<Tile, E>,
    {
        let key = TileCacheKey { generation, xyz };
        if let Some(tile) = self.get(&key) {
            return Ok(tile);
        }

        let tile = compute()?;
        self.0.insert(key, tile.clone());
        Ok(tile)
    }

    /// Invalidates all cached tiles.
    pub fn invalidate_all(&self) {
        self.0.invalidate_all();
        debug!("Invalidated all tile cache entries");
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.0.entry_count()
    }

    /// Returns the total size of cached data in bytes.
    #[must_use]
    pub fn weighted_size(&self) -> u64 {
        self.0.weighted_size()
    }
}

/// Optional wrapper for `TileCache`.
pub type OptTileCache = Option<TileCache>;

/// Constant representing no tile cache configuration.
pub const NO_TILE_CACHE: OptTileCache = None;

/// Cache key for tile data.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
struct TileCacheKey {
    generation: u64,
    xyz: TileCoord,
}
