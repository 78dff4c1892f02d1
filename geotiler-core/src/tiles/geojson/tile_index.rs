//! Simplification index: serves clipped and simplified tiles of a document.

use geotiler_tile_utils::{MAX_ZOOM, TileCoord, unit_to_tile_local};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};
use tracing::debug;

use super::clip::clip_geometry;
use super::convert::{Path, ProjectedFeature, ProjectedGeometry, project_features};
use super::options::TILE_EXTENT;
use super::response::{TileFeature, TileGeometry};
use super::{BuildError, GeoJsonDocument, GeoJsonOptions};

type IndexedBox = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Tile parameters of a simplification index.
#[derive(Clone, Copy, Debug, PartialEq)]
struct TileParams {
    maxzoom: u8,
    tolerance: f64,
    buffer: f64,
}

impl From<&GeoJsonOptions> for TileParams {
    fn from(options: &GeoJsonOptions) -> Self {
        Self {
            maxzoom: options.maxzoom,
            tolerance: options.tolerance,
            buffer: options.buffer_ratio(),
        }
    }
}

/// A spatial index of projected, pre-ranked features of one document.
///
/// Built once per document and never modified afterwards, so it can be shared between
/// any number of concurrent tile queries.
pub struct TileIndex {
    features: Vec<ProjectedFeature>,
    tree: RTree<IndexedBox>,
    params: TileParams,
}

impl std::fmt::Debug for TileIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileIndex")
            .field("features", &self.features.len())
            .field("params", &self.params)
            .finish()
    }
}

impl TileIndex {
    /// Projects and ranks all features of `document`.
    ///
    /// Fails when a line or a polygon ring of the document is malformed.
    pub fn build(document: &GeoJsonDocument, options: &GeoJsonOptions) -> Result<Self, BuildError> {
        let features = project_features(document.features(), build_sq_tolerance(options))?;
        Ok(Self::from_projected(features, options))
    }

    /// Builds an index from features that have already been projected (see [`super::cluster`]).
    pub(crate) fn from_projected(features: Vec<ProjectedFeature>, options: &GeoJsonOptions) -> Self {
        Self::with_params(features, TileParams::from(options))
    }

    fn with_params(features: Vec<ProjectedFeature>, params: TileParams) -> Self {
        let boxes = features
            .iter()
            .enumerate()
            .map(|(idx, f)| {
                let [min_x, min_y, max_x, max_y] = f.bbox;
                GeomWithData::new(Rectangle::from_corners([min_x, min_y], [max_x, max_y]), idx)
            })
            .collect();
        let tree = RTree::bulk_load(boxes);
        debug!(features = features.len(), "Built simplification index");
        Self {
            features,
            tree,
            params,
        }
    }

    /// Number of indexed features, after geometry collections were flattened.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Deepest zoom level with its own simplification; deeper tiles are overzoomed.
    #[must_use]
    pub fn maxzoom(&self) -> u8 {
        self.params.maxzoom
    }

    /// Returns the simplified features of `xyz`, clipped to the tile plus buffer,
    /// in tile-local coordinates of extent 4096.
    ///
    /// Tiles deeper than `maxzoom` are cut out of their `maxzoom` ancestor.
    /// Zoom levels past [`MAX_ZOOM`] have no tiles.
    #[must_use]
    pub fn get_tile(&self, xyz: TileCoord) -> Vec<TileFeature> {
        if xyz.z > MAX_ZOOM {
            return Vec::new();
        }
        let source = xyz.ancestor(xyz.z.min(self.params.maxzoom));
        let source_bounds = buffered_bounds(source, self.params.buffer);
        let bounds = buffered_bounds(xyz, self.params.buffer);
        let overzoomed = source != xyz;
        let tolerance = tolerance(&self.params, xyz.z);

        let mut result = Vec::new();
        for offset in world_offsets(&source_bounds) {
            let source_bounds = shifted(&source_bounds, offset);
            let bounds = shifted(&bounds, offset);
            let envelope = AABB::from_corners(
                [source_bounds[0], source_bounds[1]],
                [source_bounds[2], source_bounds[3]],
            );

            for candidate in self.tree.locate_in_envelope_intersecting(&envelope) {
                let feature = &self.features[candidate.data];
                let Some(mut geometry) =
                    clip_geometry(&feature.geometry, &feature.bbox, &source_bounds)
                else {
                    continue;
                };
                if overzoomed {
                    let bbox = geometry.bbox();
                    let Some(clipped) = clip_geometry(&geometry, &bbox, &bounds) else {
                        continue;
                    };
                    geometry = clipped;
                }
                if let Some(geometry) = to_tile_geometry(&geometry, xyz, offset, tolerance) {
                    result.push(TileFeature {
                        id: feature.id.clone(),
                        properties: feature.properties.clone(),
                        geometry,
                    });
                }
            }
        }
        result
    }
}

/// Simplification tolerance at zoom `z` in unit-square distance, `0` from `maxzoom` on.
fn tolerance(params: &TileParams, z: u8) -> f64 {
    if z >= params.maxzoom {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let scale = TileCoord::tiles_per_side(z) as f64 * f64::from(TILE_EXTENT);
        params.tolerance / scale
    }
}

/// Squared tolerance of `maxzoom`, which vertex importance is ranked against.
pub(crate) fn build_sq_tolerance(options: &GeoJsonOptions) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let scale = TileCoord::tiles_per_side(options.maxzoom) as f64 * f64::from(TILE_EXTENT);
    let tolerance = options.tolerance / scale;
    tolerance * tolerance
}

/// Unit-square bounds of `xyz` extended by `buffer` tiles on each side.
pub(crate) fn buffered_bounds(xyz: TileCoord, buffer: f64) -> [f64; 4] {
    #[allow(clippy::cast_precision_loss)]
    let size = TileCoord::tiles_per_side(xyz.z) as f64;
    [
        (f64::from(xyz.x) - buffer) / size,
        (f64::from(xyz.y) - buffer) / size,
        (f64::from(xyz.x) + 1.0 + buffer) / size,
        (f64::from(xyz.y) + 1.0 + buffer) / size,
    ]
}

/// World copies a tile buffer reaches into: `-1` left of the antimeridian, `1` right of it.
fn world_offsets(bounds: &[f64; 4]) -> Vec<f64> {
    let (min_x, max_x) = (bounds[0], bounds[2]);
    [-1.0, 0.0, 1.0]
        .into_iter()
        .filter(|offset| min_x - offset < 1.0 && max_x - offset > 0.0)
        .collect()
}

fn shifted(bounds: &[f64; 4], offset: f64) -> [f64; 4] {
    [bounds[0] - offset, bounds[1], bounds[2] - offset, bounds[3]]
}

fn transform(x: f64, y: f64, xyz: TileCoord, offset: f64) -> [i32; 2] {
    let (tx, ty) = unit_to_tile_local(x + offset, y, xyz, TILE_EXTENT);
    [tx, ty]
}

/// Keeps the vertices that are significant at `tolerance` and converts them to tile coordinates.
fn simplified_path(path: &Path, xyz: TileCoord, offset: f64, tolerance: f64) -> Vec<[i32; 2]> {
    let sq_tolerance = tolerance * tolerance;
    let mut points: Vec<[i32; 2]> = Vec::with_capacity(path.vertices.len());
    for v in &path.vertices {
        if tolerance > 0.0 && v[2] <= sq_tolerance {
            continue;
        }
        let point = transform(v[0], v[1], xyz, offset);
        if points.last() != Some(&point) {
            points.push(point);
        }
    }
    points
}

fn ring_area(ring: &[[i32; 2]]) -> i64 {
    ring.windows(2)
        .map(|w| {
            i64::from(w[0][0]) * i64::from(w[1][1]) - i64::from(w[1][0]) * i64::from(w[0][1])
        })
        .sum()
}

fn to_tile_geometry(
    geometry: &ProjectedGeometry,
    xyz: TileCoord,
    offset: f64,
    tolerance: f64,
) -> Option<TileGeometry> {
    let sq_tolerance = tolerance * tolerance;
    let geometry = match geometry {
        ProjectedGeometry::Point(points) => TileGeometry::Point(
            points
                .iter()
                .map(|p| transform(p[0], p[1], xyz, offset))
                .collect(),
        ),
        ProjectedGeometry::LineString(lines) => {
            let lines: Vec<_> = lines
                .iter()
                .filter(|l| tolerance == 0.0 || l.size >= tolerance)
                .map(|l| simplified_path(l, xyz, offset, tolerance))
                .filter(|l| l.len() >= 2)
                .collect();
            if lines.is_empty() {
                return None;
            }
            TileGeometry::LineString(lines)
        }
        ProjectedGeometry::Polygon(polygons) => {
            let mut rings = Vec::new();
            for polygon in polygons {
                for (idx, ring) in polygon.iter().enumerate() {
                    let is_outer = idx == 0;
                    let mut points = if tolerance > 0.0 && ring.size < sq_tolerance {
                        Vec::new()
                    } else {
                        simplified_path(ring, xyz, offset, tolerance)
                    };
                    let area = ring_area(&points);
                    if points.len() < 4 || area == 0 {
                        if is_outer {
                            break;
                        }
                        continue;
                    }
                    // MVT: outer rings are clockwise in tile space, holes counterclockwise
                    if (area > 0) != is_outer {
                        points.reverse();
                    }
                    rings.push(points);
                }
            }
            if rings.is_empty() {
                return None;
            }
            TileGeometry::Polygon(rings)
        }
    };
    Some(geometry)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn index(json: &str, options: &GeoJsonOptions) -> TileIndex {
        TileIndex::build(&json.parse().unwrap(), options).unwrap()
    }

    const SQUARE: &str = r#"{"type": "Feature", "properties": {"name": "square"}, "geometry": {
        "type": "Polygon",
        "coordinates": [[[10, 10], [20, 10], [20, 20], [10, 20], [10, 10]]]
    }}"#;

    #[test]
    fn world_tile_contains_everything() {
        let index = index(SQUARE, &GeoJsonOptions::default());
        let tile = index.get_tile(TileCoord::new_unchecked(0, 0, 0));
        assert_eq!(tile.len(), 1);
        assert_eq!(tile[0].properties["name"], "square");
        let TileGeometry::Polygon(rings) = &tile[0].geometry else {
            panic!("expected polygon");
        };
        assert_eq!(rings.len(), 1);
        assert!(ring_area(&rings[0]) > 0);
        assert_eq!(rings[0].first(), rings[0].last());
    }

    #[test]
    fn tile_outside_of_bbox_is_empty() {
        let index = index(SQUARE, &GeoJsonOptions::default());
        assert!(index.get_tile(TileCoord::new_unchecked(4, 0, 0)).is_empty());
    }

    #[test]
    fn polygon_covering_tile_is_clipped_to_buffer() {
        let index = index(SQUARE, &GeoJsonOptions::default());
        // 10..20 degrees east and north contains this zoom 6 tile entirely
        let xyz = TileCoord::new_unchecked(6, 34, 29);
        let tile = index.get_tile(xyz);
        let TileGeometry::Polygon(rings) = &tile[0].geometry else {
            panic!("expected polygon");
        };
        for [x, y] in &rings[0] {
            assert!((-128..=4096 + 128).contains(x));
            assert!((-128..=4096 + 128).contains(y));
        }
    }

    #[test]
    fn simplifies_at_low_zoom() {
        let coords: Vec<String> = (0..=100)
            .map(|i| {
                let lat = if i % 2 == 0 { 0.0 } else { 0.000_01 };
                format!("[{}, {lat}]", f64::from(i) * 0.000_01)
            })
            .collect();
        let json = format!(
            r#"{{"type": "LineString", "coordinates": [{}]}}"#,
            coords.join(",")
        );
        let index = index(&json, &GeoJsonOptions::default());

        let shallow = index.get_tile(TileCoord::new_unchecked(10, 512, 511));
        assert_eq!(shallow[0].geometry.vertex_count(), 2);

        let deep = index.get_tile(TileCoord::new_unchecked(18, 131_072, 131_071));
        assert_eq!(deep[0].geometry.vertex_count(), 101);
    }

    #[rstest]
    #[case(TileCoord::new_unchecked(20, 524_288, 524_287))]
    #[case(TileCoord::new_unchecked(21, 1_048_576, 1_048_575))]
    fn overzooms_from_maxzoom(#[case] xyz: TileCoord) {
        let options = GeoJsonOptions {
            maxzoom: 10,
            ..GeoJsonOptions::default()
        };
        let index = index(
            r#"{"type": "LineString", "coordinates": [[0.00001, 0.00001], [0.0001, 0.00005]]}"#,
            &options,
        );
        let parent = xyz.ancestor(10);
        let scale = 1 << (xyz.z - 10);

        let deep = index.get_tile(xyz);
        let shallow = index.get_tile(parent);
        let (TileGeometry::LineString(deep), TileGeometry::LineString(shallow)) =
            (&deep[0].geometry, &shallow[0].geometry)
        else {
            panic!("expected lines");
        };
        let dx = i64::from(xyz.x - (parent.x << (xyz.z - 10))) * 4096;
        let dy = i64::from(xyz.y - (parent.y << (xyz.z - 10))) * 4096;
        for (d, s) in deep[0].iter().zip(&shallow[0]) {
            // the deep tile keeps the precision the shallow tile rounds away
            assert!((i64::from(d[0]) - (i64::from(s[0]) * scale - dx)).abs() <= scale);
            assert!((i64::from(d[1]) - (i64::from(s[1]) * scale - dy)).abs() <= scale);
        }
    }

    #[test]
    fn buffer_wraps_around_antimeridian() {
        let index = index(
            r#"{"type": "Point", "coordinates": [179.9, 0.1]}"#,
            &GeoJsonOptions::default(),
        );
        let west = index.get_tile(TileCoord::new_unchecked(1, 0, 0));
        let TileGeometry::Point(points) = &west[0].geometry else {
            panic!("expected point");
        };
        assert!(points[0][0] < 0);
    }

    #[test]
    fn keeps_holes_counterclockwise() {
        let index = index(
            r#"{"type": "Polygon", "coordinates": [
                [[0, 0], [0, 40], [40, 40], [40, 0], [0, 0]],
                [[10, 10], [30, 10], [30, 30], [10, 30], [10, 10]]
            ]}"#,
            &GeoJsonOptions::default(),
        );
        let tile = index.get_tile(TileCoord::new_unchecked(0, 0, 0));
        let TileGeometry::Polygon(rings) = &tile[0].geometry else {
            panic!("expected polygon");
        };
        assert_eq!(rings.len(), 2);
        assert!(ring_area(&rings[0]) > 0);
        assert!(ring_area(&rings[1]) < 0);
    }

    #[test]
    fn rejects_malformed_geometry() {
        let err = TileIndex::build(
            &r#"{"type": "LineString", "coordinates": [[0, 0]]}"#.parse().unwrap(),
            &GeoJsonOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::InvalidLine { .. }));
    }
}
