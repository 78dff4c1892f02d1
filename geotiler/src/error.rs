use std::io;
use std::path::PathBuf;

use geotiler_core::tiles::geojson::{GeoJsonError, SourceError};
use geotiler_tile_utils::TileCoordError;

/// A convenience [`Result`] for the geotiler crate.
pub type GeotilerResult<T> = Result<T, GeotilerError>;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum GeotilerError {
    #[error("No input given. Pass a file, a URL, or use a config file with a url, path or inline document")]
    NoInput,

    #[error(transparent)]
    InvalidTile(#[from] TileCoordError),

    #[error("Unable to load data: {0}")]
    LoadFailed(#[source] SourceError),

    #[error("Cluster {0} does not exist, or the source is not clustered")]
    UnknownCluster(u64),

    #[error("Path {} is not valid UTF-8", .0.display())]
    InvalidPath(PathBuf),

    #[error("Unable to write {1}: {0}")]
    OutputError(#[source] io::Error, PathBuf),

    #[error(transparent)]
    GeoJsonError(#[from] GeoJsonError),

    #[error(transparent)]
    ConfigFileError(#[from] crate::config::ConfigFileError),

    #[error(transparent)]
    IoError(#[from] io::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
}
