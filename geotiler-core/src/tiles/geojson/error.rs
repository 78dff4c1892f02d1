//! Error types for `GeoJSON` operations.

use crate::fetch::FetchError;

/// Errors that can occur while loading `GeoJSON` data or building its tile indexes.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum GeoJsonError {
    /// The payload could not be retrieved.
    #[error(transparent)]
    FetchError(#[from] FetchError),

    /// The payload is not valid `GeoJSON`.
    #[error("Unable to parse GeoJSON: {0}")]
    ParseError(#[from] geojson::Error),

    /// The payload is `GeoJSON`, but its contents cannot be tiled.
    #[error("Invalid GeoJSON document: {0}")]
    InvalidDocument(String),

    /// The simplification or clustering index rejected the document.
    #[error(transparent)]
    BuildError(#[from] BuildError),

    /// The source options are out of range.
    #[error("Invalid GeoJSON source options: {0}")]
    InvalidOptions(String),

    /// A source was created outside of a Tokio runtime.
    #[error("GeoJSON sources must be created within a Tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// Encoding a tile as MVT failed.
    #[error("Unable to encode tile as MVT: {0}")]
    MvtEncoding(String),
}

/// Reasons an index builder refuses a document.
#[non_exhaustive]
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A line has fewer than two positions.
    #[allow(missing_docs)]
    #[error("Feature {feature}: a LineString needs at least 2 positions, got {len}")]
    InvalidLine { feature: usize, len: usize },

    /// A polygon ring has fewer than four positions.
    #[allow(missing_docs)]
    #[error("Feature {feature}: a polygon ring needs at least 4 positions, got {len}")]
    InvalidRing { feature: usize, len: usize },

    /// The first and last positions of a polygon ring differ.
    #[allow(missing_docs)]
    #[error("Feature {feature}: polygon ring is not closed")]
    UnclosedRing { feature: usize },
}

/// A convenience [`Result`] for `GeoJSON` sources.
pub type GeoJsonResult<T> = Result<T, GeoJsonError>;
