//! Projection of document features into the unit square.
//!
//! Every feature is converted once per index build. Lines and rings carry a per-vertex
//! importance (see [`super::simplify`]) so tile queries can simplify without recomputing.

use std::sync::Arc;

use geojson::feature::Id;
use geojson::{Feature, JsonObject, Value};
use geotiler_tile_utils::{lat_to_unit_y, lng_to_unit_x};

use super::BuildError;
use super::simplify::{ring_area, simplify, sq_seg_length};

/// A projected vertex: `x`, `y` in the unit square, and its simplification importance.
pub(crate) type Vertex = [f64; 3];

/// A line or ring together with its length (lines) or absolute area (rings),
/// used to drop whole paths that are smaller than the tolerance of a zoom level.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Path {
    pub vertices: Vec<Vertex>,
    pub size: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ProjectedGeometry {
    Point(Vec<[f64; 2]>),
    LineString(Vec<Path>),
    /// Polygons, each with its outer ring first.
    Polygon(Vec<Vec<Path>>),
}

/// A document feature in unit-square space, ready to be clipped into tiles.
#[derive(Clone, Debug)]
pub(crate) struct ProjectedFeature {
    pub id: Option<Id>,
    pub properties: Arc<JsonObject>,
    pub geometry: ProjectedGeometry,
    /// `[min_x, min_y, max_x, max_y]` in the unit square.
    pub bbox: [f64; 4],
}

impl ProjectedGeometry {
    /// `[min_x, min_y, max_x, max_y]` of all vertices.
    pub fn bbox(&self) -> [f64; 4] {
        let mut bbox = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
        let mut extend = |x: f64, y: f64| {
            bbox[0] = bbox[0].min(x);
            bbox[1] = bbox[1].min(y);
            bbox[2] = bbox[2].max(x);
            bbox[3] = bbox[3].max(y);
        };
        match self {
            Self::Point(points) => points.iter().for_each(|p| extend(p[0], p[1])),
            Self::LineString(lines) => lines
                .iter()
                .flat_map(|l| &l.vertices)
                .for_each(|v| extend(v[0], v[1])),
            Self::Polygon(polygons) => polygons
                .iter()
                .flatten()
                .flat_map(|r| &r.vertices)
                .for_each(|v| extend(v[0], v[1])),
        }
        bbox
    }
}

impl ProjectedFeature {
    fn new(id: Option<Id>, properties: Arc<JsonObject>, geometry: ProjectedGeometry) -> Self {
        Self {
            id,
            properties,
            bbox: geometry.bbox(),
            geometry,
        }
    }
}

/// Project a single position.
pub(crate) fn project(position: &[f64]) -> [f64; 2] {
    [lng_to_unit_x(position[0]), lat_to_unit_y(position[1])]
}

/// Projects all features of a document.
///
/// Geometry collections are flattened into separate features sharing the id and properties
/// of their parent. Empty multi-geometries produce nothing.
pub(crate) fn project_features(
    features: &[Feature],
    sq_tolerance: f64,
) -> Result<Vec<ProjectedFeature>, BuildError> {
    let mut projected = Vec::with_capacity(features.len());
    for (idx, feature) in features.iter().enumerate() {
        project_feature(feature, idx, sq_tolerance, &mut projected)?;
    }
    Ok(projected)
}

/// Projects a single feature, `idx` is its position in the document for error reporting.
pub(crate) fn project_feature(
    feature: &Feature,
    idx: usize,
    sq_tolerance: f64,
    out: &mut Vec<ProjectedFeature>,
) -> Result<(), BuildError> {
    let Some(geometry) = &feature.geometry else {
        return Ok(());
    };
    let properties = Arc::new(feature.properties.clone().unwrap_or_default());
    project_value(
        &geometry.value,
        idx,
        feature.id.as_ref(),
        &properties,
        sq_tolerance,
        out,
    )
}

fn project_value(
    value: &Value,
    feature: usize,
    id: Option<&Id>,
    properties: &Arc<JsonObject>,
    sq_tolerance: f64,
    out: &mut Vec<ProjectedFeature>,
) -> Result<(), BuildError> {
    let geometry = match value {
        Value::Point(p) => ProjectedGeometry::Point(vec![project(p)]),
        Value::MultiPoint(ps) => ProjectedGeometry::Point(ps.iter().map(|p| project(p)).collect()),
        Value::LineString(line) => {
            ProjectedGeometry::LineString(vec![project_line(line, feature, sq_tolerance)?])
        }
        Value::MultiLineString(lines) => ProjectedGeometry::LineString(
            lines
                .iter()
                .map(|l| project_line(l, feature, sq_tolerance))
                .collect::<Result<_, _>>()?,
        ),
        Value::Polygon(rings) => {
            ProjectedGeometry::Polygon(vec![project_polygon(rings, feature, sq_tolerance)?])
        }
        Value::MultiPolygon(polygons) => ProjectedGeometry::Polygon(
            polygons
                .iter()
                .map(|rings| project_polygon(rings, feature, sq_tolerance))
                .collect::<Result<_, _>>()?,
        ),
        Value::GeometryCollection(geometries) => {
            for geometry in geometries {
                project_value(&geometry.value, feature, id, properties, sq_tolerance, out)?;
            }
            return Ok(());
        }
    };

    let is_empty = match &geometry {
        ProjectedGeometry::Point(p) => p.is_empty(),
        ProjectedGeometry::LineString(l) => l.is_empty(),
        ProjectedGeometry::Polygon(p) => p.iter().all(Vec::is_empty),
    };
    if !is_empty {
        out.push(ProjectedFeature::new(id.cloned(), properties.clone(), geometry));
    }
    Ok(())
}

fn project_vertices(positions: &[Vec<f64>]) -> Vec<Vertex> {
    positions
        .iter()
        .map(|p| {
            let [x, y] = project(p);
            [x, y, 0.0]
        })
        .collect()
}

fn project_line(
    positions: &[Vec<f64>],
    feature: usize,
    sq_tolerance: f64,
) -> Result<Path, BuildError> {
    if positions.len() < 2 {
        return Err(BuildError::InvalidLine {
            feature,
            len: positions.len(),
        });
    }
    let mut vertices = project_vertices(positions);
    let size = vertices
        .windows(2)
        .map(|w| sq_seg_length(&w[0], &w[1]).sqrt())
        .sum();
    simplify(&mut vertices, sq_tolerance);
    Ok(Path { vertices, size })
}

fn project_polygon(
    rings: &[Vec<Vec<f64>>],
    feature: usize,
    sq_tolerance: f64,
) -> Result<Vec<Path>, BuildError> {
    rings
        .iter()
        .map(|ring| {
            if ring.len() < 4 {
                return Err(BuildError::InvalidRing {
                    feature,
                    len: ring.len(),
                });
            }
            if ring.first() != ring.last() {
                return Err(BuildError::UnclosedRing { feature });
            }
            let mut vertices = project_vertices(ring);
            let size = ring_area(&vertices).abs();
            simplify(&mut vertices, sq_tolerance);
            Ok(Path { vertices, size })
        })
        .collect()
}
