//! Normalization of supplied `GeoJSON` into the document a source tiles.

use std::str::FromStr;

use geojson::{Feature, GeoJson, Value};

use super::{GeoJsonError, GeoJsonResult};

/// West, south, east, north in WGS84 degrees.
pub type Bounds = [f64; 4];

/// The normalized geometry collection a source serves tiles from.
///
/// Whatever was supplied (a feature collection, a single feature, or a bare geometry)
/// becomes a flat list of features which all carry a geometry.
/// A document is never modified after it was created.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeoJsonDocument {
    features: Vec<Feature>,
    bounds: Option<Bounds>,
}

impl GeoJsonDocument {
    /// Normalizes already parsed `GeoJSON`, validating all positions.
    pub fn from_geojson(geojson: GeoJson) -> GeoJsonResult<Self> {
        let features = match geojson {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(f) => vec![f],
            GeoJson::Geometry(g) => vec![Feature {
                bbox: None,
                geometry: Some(g),
                id: None,
                properties: None,
                foreign_members: None,
            }],
        };

        // only features that have a geometry can be tiled
        let features: Vec<Feature> = features
            .into_iter()
            .filter(|f| f.geometry.is_some())
            .collect();

        let mut bounds: Option<Bounds> = None;
        for (idx, feature) in features.iter().enumerate() {
            if let Some(geom) = &feature.geometry {
                validate_value(&geom.value, idx)?;
                extend_bounds(&mut bounds, &geom.value);
            }
        }

        Ok(Self { features, bounds })
    }

    /// Parses a raw payload, e.g. the body of a fetched URL.
    pub fn from_slice(data: &[u8]) -> GeoJsonResult<Self> {
        let value: serde_json::Value =
            serde_json::from_slice(data).map_err(geojson::Error::from)?;
        Self::from_geojson(GeoJson::try_from(value)?)
    }

    /// Features of the document, each with a geometry.
    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Bounding box of all geometries, or `None` for an empty document.
    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }
}

impl FromStr for GeoJsonDocument {
    type Err = GeoJsonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_geojson(GeoJson::from_str(s)?)
    }
}

impl TryFrom<GeoJson> for GeoJsonDocument {
    type Error = GeoJsonError;

    fn try_from(geojson: GeoJson) -> Result<Self, Self::Error> {
        Self::from_geojson(geojson)
    }
}

fn validate_position(position: &[f64], feature: usize) -> GeoJsonResult<()> {
    if position.len() < 2 {
        return Err(GeoJsonError::InvalidDocument(format!(
            "feature {feature} has a position with {} coordinates",
            position.len()
        )));
    }
    if !position[0].is_finite() || !position[1].is_finite() {
        return Err(GeoJsonError::InvalidDocument(format!(
            "feature {feature} has a non-finite position"
        )));
    }
    Ok(())
}

fn validate_value(value: &Value, feature: usize) -> GeoJsonResult<()> {
    match value {
        Value::Point(p) => validate_position(p, feature),
        Value::MultiPoint(ps) | Value::LineString(ps) => ps
            .iter()
            .try_for_each(|p| validate_position(p, feature)),
        Value::MultiLineString(ls) | Value::Polygon(ls) => ls
            .iter()
            .flatten()
            .try_for_each(|p| validate_position(p, feature)),
        Value::MultiPolygon(polys) => polys
            .iter()
            .flatten()
            .flatten()
            .try_for_each(|p| validate_position(p, feature)),
        Value::GeometryCollection(gs) => gs
            .iter()
            .try_for_each(|g| validate_value(&g.value, feature)),
    }
}

fn update_bounds(bounds: &mut Option<Bounds>, position: &[f64]) {
    let (x, y) = (position[0], position[1]);
    match bounds {
        Some(b) => {
            b[0] = b[0].min(x);
            b[1] = b[1].min(y);
            b[2] = b[2].max(x);
            b[3] = b[3].max(y);
        }
        None => *bounds = Some([x, y, x, y]),
    }
}

fn extend_bounds(bounds: &mut Option<Bounds>, value: &Value) {
    match value {
        Value::Point(p) => update_bounds(bounds, p),
        Value::MultiPoint(ps) | Value::LineString(ps) => {
            ps.iter().for_each(|p| update_bounds(bounds, p));
        }
        Value::MultiLineString(ls) | Value::Polygon(ls) => {
            ls.iter().flatten().for_each(|p| update_bounds(bounds, p));
        }
        Value::MultiPolygon(polys) => {
            polys
                .iter()
                .flatten()
                .flatten()
                .for_each(|p| update_bounds(bounds, p));
        }
        Value::GeometryCollection(gs) => {
            gs.iter().for_each(|g| extend_bounds(bounds, &g.value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_geometry() {
        let doc: GeoJsonDocument = r#"{"type": "Point", "coordinates": [10.0, 20.0]}"#
            .parse()
            .unwrap();
        assert_eq!(doc.len(), 1);
        assert!(doc.features()[0].properties.is_none());
        assert_eq!(doc.bounds(), Some([10.0, 20.0, 10.0, 20.0]));
    }

    #[test]
    fn normalizes_single_feature() {
        let doc: GeoJsonDocument = r#"{
            "type": "Feature",
            "properties": {"name": "line"},
            "geometry": {"type": "LineString", "coordinates": [[0, 0], [5, -3]]}
        }"#
        .parse()
        .unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.bounds(), Some([0.0, -3.0, 5.0, 0.0]));
    }

    #[test]
    fn drops_features_without_geometry() {
        let doc: GeoJsonDocument = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {}, "geometry": null},
                {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [1, 2]}}
            ]
        }"#
        .parse()
        .unwrap();
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn empty_collection_has_no_bounds() {
        let doc: GeoJsonDocument = r#"{"type": "FeatureCollection", "features": []}"#
            .parse()
            .unwrap();
        assert!(doc.is_empty());
        assert_eq!(doc.bounds(), None);
    }

    #[test]
    fn rejects_malformed_json() {
        let err = GeoJsonDocument::from_slice(b"{\"type\": \"Feature").unwrap_err();
        assert!(matches!(err, GeoJsonError::ParseError(_)));
    }

    #[test]
    fn rejects_unknown_type() {
        let err = "{\"type\": \"Banana\"}".parse::<GeoJsonDocument>().unwrap_err();
        assert!(matches!(err, GeoJsonError::ParseError(_)));
    }

    #[test]
    fn rejects_short_positions() {
        let err = GeoJsonDocument::from_geojson(GeoJson::Geometry(geojson::Geometry::new(
            Value::LineString(vec![vec![1.0, 2.0], vec![3.0]]),
        )))
        .unwrap_err();
        assert!(matches!(err, GeoJsonError::InvalidDocument(_)));
    }

    #[test]
    fn collects_bounds_of_geometry_collections() {
        let doc: GeoJsonDocument = r#"{
            "type": "GeometryCollection",
            "geometries": [
                {"type": "Point", "coordinates": [-10, 5]},
                {"type": "Polygon", "coordinates": [[[0, 0], [20, 0], [20, 30], [0, 0]]]}
            ]
        }"#
        .parse()
        .unwrap();
        assert_eq!(doc.bounds(), Some([-10.0, 0.0, 20.0, 30.0]));
    }
}
