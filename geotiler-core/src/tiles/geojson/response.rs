//! Tile query results in tile-local coordinates.

use std::sync::Arc;

use geojson::feature::Id;
use geojson::{Feature, Geometry, JsonObject, JsonValue, Value};
use geotiler_tile_utils::{unit_x_to_lng, unit_y_to_lat};

use super::mvt::LayerBuilder;
use super::GeoJsonResult;

/// Geometry of a tile feature in tile-local coordinates, where `0..extent` covers the tile.
///
/// Coordinates outside of that range belong to the tile buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TileGeometry {
    Point(Vec<[i32; 2]>),
    LineString(Vec<Vec<[i32; 2]>>),
    /// Closed rings. Every outer ring (positive area) is followed by its holes (negative area).
    Polygon(Vec<Vec<[i32; 2]>>),
}

impl TileGeometry {
    /// Number of vertices across all parts.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        match self {
            Self::Point(points) => points.len(),
            Self::LineString(parts) | Self::Polygon(parts) => parts.iter().map(Vec::len).sum(),
        }
    }
}

/// A document feature clipped and simplified for a single tile.
#[derive(Clone, Debug, PartialEq)]
pub struct TileFeature {
    pub id: Option<Id>,
    pub properties: Arc<JsonObject>,
    pub geometry: TileGeometry,
}

/// An aggregate of several nearby points.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterMarker {
    /// Identifier accepted by the cluster inspection operations.
    pub cluster_id: u64,
    pub point_count: u32,
    /// Position in tile-local coordinates.
    pub position: [i32; 2],
    /// Count-weighted centroid of all points, as longitude and latitude.
    pub coordinates: [f64; 2],
}

impl ClusterMarker {
    pub(crate) fn new(cluster_id: u64, point_count: u32, position: [i32; 2], unit: [f64; 2]) -> Self {
        Self {
            cluster_id,
            point_count,
            position,
            coordinates: [unit_x_to_lng(unit[0]), unit_y_to_lat(unit[1])],
        }
    }

    /// Point count for labels, e.g. `"3"`, `"1.2k"`, or `"15k"`.
    #[must_use]
    pub fn point_count_abbreviated(&self) -> String {
        abbreviate(self.point_count)
    }

    /// The properties renderers expect on a cluster feature.
    #[must_use]
    pub fn properties(&self) -> JsonObject {
        let mut properties = JsonObject::new();
        properties.insert("cluster".to_string(), JsonValue::Bool(true));
        properties.insert("cluster_id".to_string(), self.cluster_id.into());
        properties.insert("point_count".to_string(), self.point_count.into());
        properties.insert(
            "point_count_abbreviated".to_string(),
            self.point_count_abbreviated().into(),
        );
        properties
    }

    /// The marker as a `GeoJSON` point feature in WGS84.
    #[must_use]
    pub fn to_feature(&self) -> Feature {
        Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::Point(self.coordinates.to_vec()))),
            id: Some(Id::Number(self.cluster_id.into())),
            properties: Some(self.properties()),
            foreign_members: None,
        }
    }
}

fn abbreviate(count: u32) -> String {
    if count >= 10_000 {
        format!("{}k", (f64::from(count) / 1000.0).round())
    } else if count >= 1000 {
        format!("{}k", (f64::from(count) / 100.0).round() / 10.0)
    } else {
        count.to_string()
    }
}

/// An element of a clustered tile.
#[derive(Clone, Debug, PartialEq)]
pub enum ClusterEntry {
    Marker(ClusterMarker),
    /// An unclustered point, or a non-point feature of the document.
    Feature(TileFeature),
}

/// Result of expanding a cluster.
#[derive(Clone, Debug, PartialEq)]
pub enum ClusterExpansion {
    /// Sub-clusters (and individual points) of the next zoom level.
    Children(Vec<Feature>),
    /// The original point features the cluster was made of.
    Leaves(Vec<Feature>),
}

impl ClusterExpansion {
    #[must_use]
    pub fn features(&self) -> &[Feature] {
        match self {
            Self::Children(features) | Self::Leaves(features) => features,
        }
    }
}

/// Answer to a tile query.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum TileContents {
    /// No index is installed yet.
    #[default]
    Empty,
    /// Simplified and clipped features.
    Features(Vec<TileFeature>),
    /// Cluster markers, unclustered points, and non-point features.
    Clusters(Vec<ClusterEntry>),
}

impl TileContents {
    /// Number of entries in the tile.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Features(features) => features.len(),
            Self::Clusters(entries) => entries.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of document points represented in this tile:
    /// the point count of every marker plus all individual points.
    #[must_use]
    pub fn point_count(&self) -> u64 {
        let point_features = |f: &TileFeature| match &f.geometry {
            TileGeometry::Point(points) => points.len() as u64,
            _ => 0,
        };
        match self {
            Self::Empty => 0,
            Self::Features(features) => features.iter().map(point_features).sum(),
            Self::Clusters(entries) => entries
                .iter()
                .map(|e| match e {
                    ClusterEntry::Marker(m) => u64::from(m.point_count),
                    ClusterEntry::Feature(f) => point_features(f),
                })
                .sum(),
        }
    }

    /// Encodes the tile as a single-layer Mapbox Vector Tile.
    ///
    /// Geometries are rescaled when `extent` differs from the extent tiles are produced in.
    pub fn to_mvt(&self, layer: &str, extent: u32) -> GeoJsonResult<Vec<u8>> {
        let mut builder = LayerBuilder::new(layer.to_string(), extent);
        match self {
            Self::Empty => {}
            Self::Features(features) => {
                for feature in features {
                    builder.add_feature(feature)?;
                }
            }
            Self::Clusters(entries) => {
                for entry in entries {
                    match entry {
                        ClusterEntry::Marker(marker) => builder.add_marker(marker)?,
                        ClusterEntry::Feature(feature) => builder.add_feature(feature)?,
                    }
                }
            }
        }
        Ok(builder.encode())
    }
}
