//! JSON views of sources, tiles and clusters, as printed by the CLI.

use geojson::{Feature, FeatureCollection, JsonObject, feature::Id};
use geotiler_core::tiles::geojson::{
    Bounds, ClusterEntry, ClusterExpansion, ClusterMarker, GeoJsonSource, TileContents,
    TileFeature, TileGeometry,
};
use geotiler_tile_utils::TileCoord;
use serde::Serialize;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Simplify,
    Cluster,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SourceSummary {
    pub id: String,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub generation: u64,
    pub features: usize,
    pub bounds: Option<Bounds>,
}

impl SourceSummary {
    #[must_use]
    pub fn new(source: &GeoJsonSource) -> Self {
        Self {
            id: source.id().to_string(),
            mode: if source.options().cluster {
                Mode::Cluster
            } else {
                Mode::Simplify
            },
            url: source.get_url(),
            generation: source.installed_generation(),
            features: source.document().map_or(0, |doc| doc.len()),
            bounds: source.bounds(),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TileKind {
    Empty,
    Features,
    Clusters,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TileSummary {
    pub tile: String,
    pub kind: TileKind,
    pub point_count: u64,
    pub entries: Vec<EntrySummary>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntrySummary {
    Feature {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Id>,
        geometry: &'static str,
        vertices: usize,
        properties: JsonObject,
    },
    Cluster {
        cluster_id: u64,
        point_count: u32,
        point_count_abbreviated: String,
        position: [i32; 2],
        coordinates: [f64; 2],
        #[serde(skip_serializing_if = "Option::is_none")]
        expansion_zoom: Option<u8>,
    },
}

impl TileSummary {
    /// Summarizes `contents`, looking up cluster expansion zooms with `expansion_zoom`.
    pub fn new(
        xyz: TileCoord,
        contents: &TileContents,
        expansion_zoom: impl Fn(u64) -> Option<u8>,
    ) -> Self {
        let (kind, entries) = match contents {
            TileContents::Empty => (TileKind::Empty, Vec::new()),
            TileContents::Features(features) => (
                TileKind::Features,
                features.iter().map(EntrySummary::feature).collect(),
            ),
            TileContents::Clusters(entries) => (
                TileKind::Clusters,
                entries
                    .iter()
                    .map(|entry| match entry {
                        ClusterEntry::Marker(marker) => {
                            EntrySummary::cluster(marker, expansion_zoom(marker.cluster_id))
                        }
                        ClusterEntry::Feature(feature) => EntrySummary::feature(feature),
                    })
                    .collect(),
            ),
        };
        Self {
            tile: xyz.to_string(),
            kind,
            point_count: contents.point_count(),
            entries,
        }
    }
}

impl EntrySummary {
    fn feature(feature: &TileFeature) -> Self {
        Self::Feature {
            id: feature.id.clone(),
            geometry: match feature.geometry {
                TileGeometry::Point(_) => "Point",
                TileGeometry::LineString(_) => "LineString",
                TileGeometry::Polygon(_) => "Polygon",
            },
            vertices: feature.geometry.vertex_count(),
            properties: feature.properties.as_ref().clone(),
        }
    }

    fn cluster(marker: &ClusterMarker, expansion_zoom: Option<u8>) -> Self {
        Self::Cluster {
            cluster_id: marker.cluster_id,
            point_count: marker.point_count,
            point_count_abbreviated: marker.point_count_abbreviated(),
            position: marker.position,
            coordinates: marker.coordinates,
            expansion_zoom,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionKind {
    Children,
    Leaves,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ExpansionSummary {
    pub cluster_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansion_zoom: Option<u8>,
    pub kind: ExpansionKind,
    pub features: FeatureCollection,
}

impl ExpansionSummary {
    #[must_use]
    pub fn new(cluster_id: u64, expansion: ClusterExpansion, expansion_zoom: Option<u8>) -> Self {
        let (kind, features): (_, Vec<Feature>) = match expansion {
            ClusterExpansion::Children(features) => (ExpansionKind::Children, features),
            ClusterExpansion::Leaves(features) => (ExpansionKind::Leaves, features),
        };
        Self {
            cluster_id,
            expansion_zoom,
            kind,
            features: FeatureCollection {
                bbox: None,
                features,
                foreign_members: None,
            },
        }
    }
}
