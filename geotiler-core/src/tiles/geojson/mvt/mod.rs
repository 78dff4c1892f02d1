mod geometry_encoding;

use geojson::JsonObject;
use geojson::feature::Id;
use geometry_encoding::GeometryEncoder;
use geozero::mvt::{Message as _, TagsBuilder, Tile, TileValue, tile};

use super::options::TILE_EXTENT;
use super::response::{ClusterMarker, TileFeature, TileGeometry};
use super::GeoJsonResult;

/// Collects tile features into a single MVT layer.
pub(crate) struct LayerBuilder {
    name: String,
    tag_builder: TagsBuilder<String>,
    features: Vec<tile::Feature>,
    extent: u32,
}

impl LayerBuilder {
    pub fn new(name: String, extent: u32) -> Self {
        Self {
            name,
            tag_builder: TagsBuilder::new(),
            features: Vec::new(),
            extent,
        }
    }

    fn encoder(&self) -> GeometryEncoder {
        if self.extent == TILE_EXTENT {
            GeometryEncoder::new(None)
        } else {
            GeometryEncoder::new(Some(f64::from(self.extent) / f64::from(TILE_EXTENT)))
        }
    }

    fn tags(&mut self, properties: &JsonObject) -> Vec<u32> {
        let mut tags = Vec::with_capacity(properties.len() * 2);
        for (key, value) in properties {
            // null has no MVT representation
            let Some(value) = tile_value_from_json(value) else {
                continue;
            };
            let (key_idx, val_idx) = self.tag_builder.insert(key.clone(), value);
            tags.push(key_idx);
            tags.push(val_idx);
        }
        tags
    }

    pub fn add_feature(&mut self, feature: &TileFeature) -> GeoJsonResult<()> {
        let encoder = self.encoder();
        let (geom_type, geometry) = match &feature.geometry {
            TileGeometry::Point(points) => (tile::GeomType::Point, encoder.points(points)?),
            TileGeometry::LineString(lines) => (tile::GeomType::Linestring, encoder.lines(lines)?),
            TileGeometry::Polygon(rings) => (tile::GeomType::Polygon, encoder.rings(rings)?),
        };
        // MVT ids are unsigned integers, string ids are dropped
        let id = match &feature.id {
            Some(Id::Number(n)) => n.as_u64(),
            _ => None,
        };
        let tags = self.tags(&feature.properties);
        self.features.push(tile::Feature {
            id,
            tags,
            r#type: Some(geom_type as i32),
            geometry,
        });
        Ok(())
    }

    pub fn add_marker(&mut self, marker: &ClusterMarker) -> GeoJsonResult<()> {
        let geometry = self.encoder().points(&[marker.position])?;
        let tags = self.tags(&marker.properties());
        self.features.push(tile::Feature {
            id: Some(marker.cluster_id),
            tags,
            r#type: Some(tile::GeomType::Point as i32),
            geometry,
        });
        Ok(())
    }

    pub fn build(self) -> tile::Layer {
        let (keys, values) = self.tag_builder.into_tags();
        let values = values.into_iter().map(Into::into).collect();
        tile::Layer {
            name: self.name,
            features: self.features,
            version: 2,
            extent: Some(self.extent),
            keys,
            values,
        }
    }

    /// Builds the layer and encodes it as a protobuf tile.
    pub fn encode(self) -> Vec<u8> {
        Tile {
            layers: vec![self.build()],
        }
        .encode_to_vec()
    }
}

fn tile_value_from_json(value: &serde_json::Value) -> Option<TileValue> {
    match value {
        serde_json::Value::String(s) => Some(TileValue::Str(s.clone())),
        serde_json::Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                Some(TileValue::Uint(v))
            } else if let Some(v) = n.as_i64() {
                Some(TileValue::Sint(v))
            } else {
                n.as_f64().map(TileValue::Double)
            }
        }
        serde_json::Value::Bool(b) => Some(TileValue::Bool(*b)),
        serde_json::Value::Null => None,
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            Some(TileValue::Str(value.to_string()))
        }
    }
}
