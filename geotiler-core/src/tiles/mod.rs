//! Tile production for dynamic `GeoJSON` data.
//!
//! - [`geojson`] holds the source, its document, and the two kinds of index it can build.
//! - [`Tile`] is an encoded tile with its etag, optionally kept in a [`TileCache`].

/// Dynamic `GeoJSON` sources.
pub mod geojson;

mod cache;
pub use cache::{NO_TILE_CACHE, OptTileCache, TileCache};

mod tile;
pub use tile::Tile;
