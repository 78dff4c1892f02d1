use bytes::Bytes;
use geotiler_tile_utils::TileCoord;

/// An encoded Mapbox Vector Tile together with the generation of the index it was produced from.
///
/// # Examples
///
/// ```rust
/// use geotiler_core::tiles::Tile;
/// use geotiler_tile_utils::TileCoord;
///
/// let tile = Tile::new(TileCoord::new_unchecked(0, 0, 0), 1, vec![0x1a, 0x00]);
/// assert_eq!(tile.etag, Tile::new(tile.xyz, 7, vec![0x1a, 0x00]).etag);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub xyz: TileCoord,
    /// Generation of the index the tile was produced from.
    pub generation: u64,
    /// Protobuf encoded tile.
    pub data: Bytes,
    /// `xxh3_128` hash of `data`, `"0"` for an empty tile.
    pub etag: String,
}

impl Tile {
    /// Creates a tile, computing its etag from the encoded data.
    #[must_use]
    pub fn new(xyz: TileCoord, generation: u64, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let etag = if data.is_empty() {
            0
        } else {
            xxhash_rust::xxh3::xxh3_128(&data)
        };
        Self {
            xyz,
            generation,
            data,
            etag: etag.to_string(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
