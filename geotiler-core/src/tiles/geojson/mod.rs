//! Dynamic [GeoJSON](https://datatracker.ietf.org/doc/html/rfc7946) tiling.
//!
//! A [`GeoJsonSource`] holds one [`GeoJsonDocument`] at a time and answers tile queries from an
//! index built from it: a [`TileIndex`] that clips and simplifies all geometries per tile, or,
//! when clustering is enabled, a [`ClusterIndex`] that merges nearby points.
//!
//! `GeoJSON` uses WGS84 EPSG:4326 while tiles are addressed in Web Mercator EPSG:3857.
//! Tile contents use tile-local coordinates where `0..`[`TILE_EXTENT`] spans the tile.

mod clip;
mod cluster;
mod convert;
mod document;
mod error;
mod index;
mod mvt;
mod options;
mod response;
mod simplify;
mod source;
mod tile_index;

pub use cluster::ClusterIndex;
pub use document::{Bounds, GeoJsonDocument};
pub use error::{BuildError, GeoJsonError, GeoJsonResult};
pub use index::SourceIndex;
pub use options::{GeoJsonOptions, MAX_CLUSTER_ZOOM, MAX_SOURCE_ZOOM, TILE_EXTENT};
pub use response::{
    ClusterEntry, ClusterExpansion, ClusterMarker, TileContents, TileFeature, TileGeometry,
};
pub use source::{GeoJsonSource, SourceError, SourceEvent};
pub use tile_index::TileIndex;
