use std::sync::Arc;

use geotiler_tile_utils::TileCoord;

use super::response::TileContents;
use super::{BuildError, ClusterIndex, GeoJsonDocument, GeoJsonOptions, TileIndex};

/// The index a source answers tile queries from.
///
/// Which of the two kinds is built is decided by [`GeoJsonOptions::cluster`].
#[derive(Clone, Debug, Default)]
pub enum SourceIndex {
    /// No document has been indexed yet.
    #[default]
    None,
    Simplified(Arc<TileIndex>),
    Clustered(Arc<ClusterIndex>),
}

impl SourceIndex {
    /// Builds the index kind selected by `options` for `document`.
    pub fn build(document: &GeoJsonDocument, options: &GeoJsonOptions) -> Result<Self, BuildError> {
        Ok(if options.cluster {
            Self::Clustered(Arc::new(ClusterIndex::build(document, options)?))
        } else {
            Self::Simplified(Arc::new(TileIndex::build(document, options)?))
        })
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Answers a tile query. Never fails: no index, or nothing in the tile, yields an empty result.
    #[must_use]
    pub fn get_tile(&self, xyz: TileCoord) -> TileContents {
        match self {
            Self::None => TileContents::Empty,
            Self::Simplified(index) => TileContents::Features(index.get_tile(xyz)),
            Self::Clustered(index) => TileContents::Clusters(index.get_tile(xyz)),
        }
    }

    #[must_use]
    pub fn as_clusters(&self) -> Option<&ClusterIndex> {
        match self {
            Self::Clustered(index) => Some(index),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POINT: &str = r#"{"type":"Point","coordinates":[10,10]}"#;

    #[test]
    fn empty_without_document() {
        let index = SourceIndex::default();
        assert!(index.is_none());
        assert_eq!(index.get_tile(TileCoord::new_unchecked(0, 0, 0)), TileContents::Empty);
    }

    #[test]
    fn selects_index_kind_from_options() {
        let document: GeoJsonDocument = POINT.parse().unwrap();

        let simplified = SourceIndex::build(&document, &GeoJsonOptions::default()).unwrap();
        assert!(matches!(simplified, SourceIndex::Simplified(_)));
        assert!(simplified.as_clusters().is_none());
        assert!(matches!(
            simplified.get_tile(TileCoord::new_unchecked(0, 0, 0)),
            TileContents::Features(f) if f.len() == 1
        ));

        let clustered = SourceIndex::build(&document, &GeoJsonOptions::clustered(50, 14)).unwrap();
        assert!(clustered.as_clusters().is_some());
        assert!(matches!(
            clustered.get_tile(TileCoord::new_unchecked(0, 0, 0)),
            TileContents::Clusters(e) if e.len() == 1
        ));
    }
}
