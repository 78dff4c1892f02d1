//! Point clustering index.
//!
//! Points are merged greedily, zoom level by zoom level: every level is built from the next
//! deeper one by merging all nodes within the cluster radius of a not yet merged node.
//! The deepest level (`cluster_max_zoom`) holds the original points.

use std::sync::Arc;

use geojson::feature::Id;
use geojson::{Feature, Geometry, JsonObject, Value};
use geotiler_tile_utils::{MAX_ZOOM, TileCoord, unit_to_tile_local};
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};
use tracing::debug;

use super::convert::{project, project_feature};
use super::options::TILE_EXTENT;
use super::response::{ClusterEntry, ClusterExpansion, ClusterMarker, TileFeature, TileGeometry};
use super::tile_index::{TileIndex, build_sq_tolerance};
use super::{BuildError, GeoJsonDocument, GeoJsonOptions};

/// Tile size the cluster radius is measured in.
const CLUSTER_EXTENT: f64 = 512.0;

/// Smallest number of points that form a cluster.
const MIN_POINTS: u32 = 2;

type IndexedNode = GeomWithData<[f64; 2], usize>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NodeKind {
    /// Index into [`ClusterIndex::points`].
    Point(usize),
    Cluster(u64),
}

#[derive(Clone, Debug)]
struct ClusterNode {
    x: f64,
    y: f64,
    /// Zoom level at which this node was merged, `None` while it is untouched.
    merged_at: Option<u8>,
    kind: NodeKind,
    /// Cluster this node became part of one level up.
    parent: Option<u64>,
    num_points: u32,
}

impl ClusterNode {
    fn is_free(&self, zoom: u8) -> bool {
        self.merged_at.is_none_or(|z| z > zoom)
    }
}

#[derive(Debug)]
struct ClusterLevel {
    nodes: Vec<ClusterNode>,
    tree: RTree<IndexedNode>,
}

impl ClusterLevel {
    fn new(nodes: Vec<ClusterNode>) -> Self {
        let tree = RTree::bulk_load(
            nodes
                .iter()
                .enumerate()
                .map(|(idx, n)| GeomWithData::new([n.x, n.y], idx))
                .collect(),
        );
        Self { nodes, tree }
    }
}

/// An original point feature of the document.
#[derive(Debug)]
struct ClusterPoint {
    id: Option<Id>,
    properties: Arc<JsonObject>,
    position: Vec<f64>,
}

impl ClusterPoint {
    fn to_feature(&self) -> Feature {
        Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::Point(self.position.clone()))),
            id: self.id.clone(),
            properties: Some(self.properties.as_ref().clone()),
            foreign_members: None,
        }
    }
}

/// Hierarchy of point clusters for zoom levels `0..=cluster_max_zoom`.
///
/// Features that are not single points bypass clustering and are served from an embedded
/// [`TileIndex`].
pub struct ClusterIndex {
    points: Vec<ClusterPoint>,
    levels: Vec<ClusterLevel>,
    others: TileIndex,
    radius: f64,
    cluster_max_zoom: u8,
}

impl std::fmt::Debug for ClusterIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterIndex")
            .field("points", &self.points.len())
            .field("others", &self.others.len())
            .field("radius", &self.radius)
            .field("cluster_max_zoom", &self.cluster_max_zoom)
            .finish()
    }
}

impl ClusterIndex {
    /// Clusters the point features of `document`.
    pub fn build(document: &GeoJsonDocument, options: &GeoJsonOptions) -> Result<Self, BuildError> {
        let mut points = Vec::new();
        let mut others = Vec::new();
        let sq_tolerance = build_sq_tolerance(options);
        for (idx, feature) in document.features().iter().enumerate() {
            match feature.geometry.as_ref().map(|g| &g.value) {
                Some(Value::Point(position)) => points.push(ClusterPoint {
                    id: feature.id.clone(),
                    properties: Arc::new(feature.properties.clone().unwrap_or_default()),
                    position: position.clone(),
                }),
                Some(_) => project_feature(feature, idx, sq_tolerance, &mut others)?,
                None => {}
            }
        }

        let cluster_max_zoom = options.cluster_max_zoom;
        let radius = f64::from(options.cluster_radius);
        let raw_nodes = points
            .iter()
            .enumerate()
            .map(|(idx, p)| {
                let [x, y] = project(&p.position);
                ClusterNode {
                    x,
                    y,
                    merged_at: None,
                    kind: NodeKind::Point(idx),
                    parent: None,
                    num_points: 1,
                }
            })
            .collect();

        // levels are built from the deepest up and reversed afterwards
        let mut levels = vec![ClusterLevel::new(raw_nodes)];
        for zoom in (0..cluster_max_zoom).rev() {
            let Some(deeper) = levels.last_mut() else {
                break;
            };
            let nodes = cluster_level(deeper, zoom, radius, points.len());
            levels.push(ClusterLevel::new(nodes));
        }
        levels.reverse();

        debug!(
            points = points.len(),
            others = others.len(),
            clusters_at_zero = levels.first().map_or(0, |l| l.nodes.len()),
            "Built cluster index"
        );

        Ok(Self {
            points,
            levels,
            others: TileIndex::from_projected(others, options),
            radius,
            cluster_max_zoom,
        })
    }

    /// Number of clustered points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.others.is_empty()
    }

    #[must_use]
    pub fn cluster_max_zoom(&self) -> u8 {
        self.cluster_max_zoom
    }

    fn level(&self, zoom: u8) -> &ClusterLevel {
        // there is always one level per zoom up to cluster_max_zoom
        &self.levels[usize::from(zoom.min(self.cluster_max_zoom))]
    }

    /// Cluster markers and individual points visible in `xyz`, in tile-local coordinates.
    ///
    /// Non-point features of the document are appended after them.
    /// Zoom levels past [`MAX_ZOOM`] have no tiles.
    #[must_use]
    pub fn get_tile(&self, xyz: TileCoord) -> Vec<ClusterEntry> {
        if xyz.z > MAX_ZOOM {
            return Vec::new();
        }
        let level = self.level(xyz.z);
        #[allow(clippy::cast_precision_loss)]
        let z2 = TileCoord::tiles_per_side(xyz.z) as f64;
        let p = self.radius / CLUSTER_EXTENT;
        let (x, y) = (f64::from(xyz.x), f64::from(xyz.y));
        let top = (y - p) / z2;
        let bottom = (y + 1.0 + p) / z2;

        let mut entries = Vec::new();
        self.add_entries(level, [(x - p) / z2, top, (x + 1.0 + p) / z2, bottom], xyz, 0.0, &mut entries);
        // wrap around the antimeridian
        if xyz.x == 0 {
            self.add_entries(level, [1.0 - p / z2, top, 1.0, bottom], xyz, -1.0, &mut entries);
        }
        if u64::from(xyz.x) + 1 == TileCoord::tiles_per_side(xyz.z) {
            self.add_entries(level, [0.0, top, p / z2, bottom], xyz, 1.0, &mut entries);
        }

        entries.extend(self.others.get_tile(xyz).into_iter().map(ClusterEntry::Feature));
        entries
    }

    fn add_entries(
        &self,
        level: &ClusterLevel,
        bounds: [f64; 4],
        xyz: TileCoord,
        offset: f64,
        entries: &mut Vec<ClusterEntry>,
    ) {
        let envelope = AABB::from_corners([bounds[0], bounds[1]], [bounds[2], bounds[3]]);
        for indexed in level.tree.locate_in_envelope(&envelope) {
            let node = &level.nodes[indexed.data];
            let (px, py) = unit_to_tile_local(node.x + offset, node.y, xyz, TILE_EXTENT);
            entries.push(match node.kind {
                NodeKind::Cluster(id) => {
                    ClusterEntry::Marker(ClusterMarker::new(id, node.num_points, [px, py], [node.x, node.y]))
                }
                NodeKind::Point(idx) => {
                    let point = &self.points[idx];
                    ClusterEntry::Feature(TileFeature {
                        id: point.id.clone(),
                        properties: point.properties.clone(),
                        geometry: TileGeometry::Point(vec![[px, py]]),
                    })
                }
            });
        }
    }

    /// Returns the level index and the zoom level a cluster was created from.
    fn origin(&self, cluster_id: u64) -> Option<(usize, u8)> {
        let relative = cluster_id.checked_sub(self.points.len() as u64)?;
        let origin_zoom = u8::try_from(relative % 32).ok()?;
        let origin_index = usize::try_from(relative >> 5).ok()?;
        if origin_zoom == 0 || origin_zoom > self.cluster_max_zoom {
            return None;
        }
        (origin_index < self.levels[usize::from(origin_zoom)].nodes.len())
            .then_some((origin_index, origin_zoom))
    }

    fn child_nodes(&self, cluster_id: u64) -> Option<Vec<&ClusterNode>> {
        let (origin_index, origin_zoom) = self.origin(cluster_id)?;
        let level = &self.levels[usize::from(origin_zoom)];
        let origin = &level.nodes[origin_index];
        let r = self.radius / (CLUSTER_EXTENT * f64::from(1_u32 << (origin_zoom - 1)));
        let children: Vec<_> = level
            .tree
            .locate_within_distance([origin.x, origin.y], r * r)
            .map(|indexed| &level.nodes[indexed.data])
            .filter(|node| node.parent == Some(cluster_id))
            .collect();
        (!children.is_empty()).then_some(children)
    }

    fn node_feature(&self, node: &ClusterNode) -> Feature {
        match node.kind {
            NodeKind::Cluster(id) => {
                ClusterMarker::new(id, node.num_points, [0, 0], [node.x, node.y]).to_feature()
            }
            NodeKind::Point(idx) => self.points[idx].to_feature(),
        }
    }

    /// The clusters and points a cluster splits into one zoom level deeper,
    /// or `None` if `cluster_id` is unknown.
    #[must_use]
    pub fn get_children(&self, cluster_id: u64) -> Option<Vec<Feature>> {
        let children = self.child_nodes(cluster_id)?;
        Some(children.into_iter().map(|n| self.node_feature(n)).collect())
    }

    /// Original point features of a cluster, skipping `offset` and returning at most `limit`.
    #[must_use]
    pub fn get_leaves(&self, cluster_id: u64, limit: usize, offset: usize) -> Option<Vec<Feature>> {
        let mut leaves = Vec::new();
        let mut skipped = 0;
        self.append_leaves(cluster_id, limit, offset, &mut skipped, &mut leaves)?;
        Some(leaves)
    }

    fn append_leaves(
        &self,
        cluster_id: u64,
        limit: usize,
        offset: usize,
        skipped: &mut usize,
        leaves: &mut Vec<Feature>,
    ) -> Option<()> {
        for child in self.child_nodes(cluster_id)? {
            if leaves.len() >= limit {
                break;
            }
            match child.kind {
                NodeKind::Cluster(id) => {
                    let count = child.num_points as usize;
                    if *skipped + count <= offset {
                        *skipped += count;
                    } else {
                        self.append_leaves(id, limit, offset, skipped, leaves)?;
                    }
                }
                NodeKind::Point(idx) => {
                    if *skipped < offset {
                        *skipped += 1;
                    } else {
                        leaves.push(self.points[idx].to_feature());
                    }
                }
            }
        }
        Some(())
    }

    /// The zoom level at which a cluster splits into more than one child.
    #[must_use]
    pub fn get_cluster_expansion_zoom(&self, cluster_id: u64) -> Option<u8> {
        let (_, origin_zoom) = self.origin(cluster_id)?;
        let mut expansion_zoom = origin_zoom - 1;
        let mut cluster_id = cluster_id;
        while expansion_zoom < self.cluster_max_zoom {
            let children = self.child_nodes(cluster_id)?;
            expansion_zoom += 1;
            match children.as_slice() {
                [only] => match only.kind {
                    NodeKind::Cluster(id) => cluster_id = id,
                    NodeKind::Point(_) => break,
                },
                _ => break,
            }
        }
        Some(expansion_zoom)
    }

    /// Expands a cluster: its sub-clusters if it has any, otherwise its original points.
    #[must_use]
    pub fn expand(&self, cluster_id: u64) -> Option<ClusterExpansion> {
        let children = self.child_nodes(cluster_id)?;
        if children
            .iter()
            .any(|n| matches!(n.kind, NodeKind::Cluster(_)))
        {
            Some(ClusterExpansion::Children(
                children.into_iter().map(|n| self.node_feature(n)).collect(),
            ))
        } else {
            self.get_leaves(cluster_id, usize::MAX, 0)
                .map(ClusterExpansion::Leaves)
        }
    }
}

/// Merges the nodes of `deeper` into the nodes of level `zoom`.
fn cluster_level(deeper: &mut ClusterLevel, zoom: u8, radius: f64, num_points_total: usize) -> Vec<ClusterNode> {
    let r = radius / (CLUSTER_EXTENT * f64::from(1_u32 << zoom));
    let ClusterLevel { nodes, tree } = deeper;
    let mut next = Vec::with_capacity(nodes.len());

    for i in 0..nodes.len() {
        if !nodes[i].is_free(zoom) {
            continue;
        }
        nodes[i].merged_at = Some(zoom);

        let (x, y) = (nodes[i].x, nodes[i].y);
        let neighbors: Vec<usize> = tree
            .locate_within_distance([x, y], r * r)
            .map(|indexed| indexed.data)
            .filter(|&n| nodes[n].is_free(zoom))
            .collect();

        let origin_points = nodes[i].num_points;
        let num_points = origin_points + neighbors.iter().map(|&n| nodes[n].num_points).sum::<u32>();

        if num_points > origin_points && num_points >= MIN_POINTS {
            let mut wx = x * f64::from(origin_points);
            let mut wy = y * f64::from(origin_points);
            let id = ((i as u64) << 5) + u64::from(zoom + 1) + num_points_total as u64;

            for &n in &neighbors {
                let neighbor = &mut nodes[n];
                neighbor.merged_at = Some(zoom);
                neighbor.parent = Some(id);
                wx += neighbor.x * f64::from(neighbor.num_points);
                wy += neighbor.y * f64::from(neighbor.num_points);
            }
            nodes[i].parent = Some(id);

            next.push(ClusterNode {
                x: wx / f64::from(num_points),
                y: wy / f64::from(num_points),
                merged_at: None,
                kind: NodeKind::Cluster(id),
                parent: None,
                num_points,
            });
        } else {
            next.push(ClusterNode {
                merged_at: None,
                parent: None,
                ..nodes[i].clone()
            });
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rstest::rstest;

    use super::*;

    fn points(coords: &[[f64; 2]]) -> GeoJsonDocument {
        let features: Vec<String> = coords
            .iter()
            .enumerate()
            .map(|(i, [lng, lat])| {
                format!(
                    r#"{{"type": "Feature", "id": {i}, "properties": {{"n": {i}}},
                        "geometry": {{"type": "Point", "coordinates": [{lng}, {lat}]}}}}"#
                )
            })
            .collect();
        format!(
            r#"{{"type": "FeatureCollection", "features": [{}]}}"#,
            features.join(",")
        )
        .parse()
        .unwrap()
    }

    fn markers(entries: &[ClusterEntry]) -> Vec<&ClusterMarker> {
        entries
            .iter()
            .filter_map(|e| match e {
                ClusterEntry::Marker(m) => Some(m),
                ClusterEntry::Feature(_) => None,
            })
            .collect()
    }

    /// Points represented by entries positioned inside the tile itself (not in its buffer).
    fn in_tile_count(entries: &[ClusterEntry]) -> u64 {
        let inside = |[x, y]: [i32; 2]| (0..4096).contains(&x) && (0..4096).contains(&y);
        entries
            .iter()
            .map(|e| match e {
                ClusterEntry::Marker(m) if inside(m.position) => u64::from(m.point_count),
                ClusterEntry::Feature(TileFeature {
                    geometry: TileGeometry::Point(p),
                    ..
                }) if inside(p[0]) => 1,
                _ => 0,
            })
            .sum()
    }

    const NEARBY: [[f64; 2]; 3] = [[10.0, 10.0], [10.000_1, 10.0], [10.0, 10.000_1]];

    #[test]
    fn merges_nearby_points() {
        let index = ClusterIndex::build(&points(&NEARBY), &GeoJsonOptions::clustered(50, 14)).unwrap();
        let tile = index.get_tile(TileCoord::new_unchecked(0, 0, 0));
        assert_eq!(tile.len(), 1);
        let marker = markers(&tile)[0];
        assert_eq!(marker.point_count, 3);
        assert_relative_eq!(marker.coordinates[0], 10.000_033, epsilon = 1e-5);
        assert_relative_eq!(marker.coordinates[1], 10.000_033, epsilon = 1e-5);
    }

    #[rstest]
    #[case(14)]
    #[case(15)]
    #[case(16)]
    fn no_clusters_from_cluster_max_zoom(#[case] z: u8) {
        let index = ClusterIndex::build(&points(&NEARBY), &GeoJsonOptions::clustered(50, 14)).unwrap();
        let [x, y] = [
            geotiler_tile_utils::lng_to_unit_x(10.0),
            geotiler_tile_utils::lat_to_unit_y(10.0),
        ];
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let size = TileCoord::tiles_per_side(z) as f64;
        let xyz = TileCoord::new_unchecked(z, (x * size) as u32, (y * size) as u32);
        let tile = index.get_tile(xyz);
        assert!(markers(&tile).is_empty());
        assert_eq!(tile.len(), 3);
    }

    #[test]
    fn counts_are_preserved_at_every_zoom() {
        let coords: Vec<[f64; 2]> = (0..200)
            .map(|i| {
                let i = f64::from(i);
                [(i * 37.0) % 340.0 - 170.0, (i * 13.0) % 160.0 - 80.0]
            })
            .collect();
        let index = ClusterIndex::build(&points(&coords), &GeoJsonOptions::clustered(60, 8)).unwrap();
        for level in &index.levels {
            let total: u32 = level.nodes.iter().map(|n| n.num_points).sum();
            assert_eq!(total, 200);
        }
        for z in 0..=3 {
            let size = 1_u32 << z;
            let mut total = 0;
            for x in 0..size {
                for y in 0..size {
                    total += in_tile_count(&index.get_tile(TileCoord::new_unchecked(z, x, y)));
                }
            }
            assert_eq!(total, 200, "zoom {z}");
        }
    }

    #[test]
    fn expands_clusters() {
        let index = ClusterIndex::build(&points(&NEARBY), &GeoJsonOptions::clustered(50, 14)).unwrap();
        let tile = index.get_tile(TileCoord::new_unchecked(0, 0, 0));
        let id = markers(&tile)[0].cluster_id;

        let leaves = index.get_leaves(id, usize::MAX, 0).unwrap();
        assert_eq!(leaves.len(), 3);
        assert_eq!(index.get_leaves(id, 2, 0).unwrap().len(), 2);
        assert_eq!(index.get_leaves(id, 10, 2).unwrap().len(), 1);

        let zoom = index.get_cluster_expansion_zoom(id).unwrap();
        assert!(zoom > 0 && zoom <= 14);

        let Some(ClusterExpansion::Leaves(features)) = index.expand(
            // the deepest cluster that still holds all three points
            descend(&index, id),
        ) else {
            panic!("expected leaves");
        };
        assert_eq!(features.len(), 3);
        assert!(features.iter().all(|f| f.contains_property("n")));
    }

    fn descend(index: &ClusterIndex, mut id: u64) -> u64 {
        loop {
            let Some(ClusterExpansion::Children(children)) = index.expand(id) else {
                return id;
            };
            let clusters: Vec<u64> = children
                .iter()
                .filter_map(|f| f.property("cluster_id").and_then(serde_json::Value::as_u64))
                .collect();
            if clusters.len() != 1 || children.len() != 1 {
                return id;
            }
            id = clusters[0];
        }
    }

    #[test]
    fn expansion_returns_children_first() {
        // two pairs, far enough apart to only merge at low zoom
        let coords = [[0.0, 0.0], [0.01, 0.0], [5.0, 0.0], [5.01, 0.0]];
        let index = ClusterIndex::build(&points(&coords), &GeoJsonOptions::clustered(50, 16)).unwrap();
        let tile = index.get_tile(TileCoord::new_unchecked(0, 0, 0));
        let top = markers(&tile);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].point_count, 4);

        let id = descend(&index, top[0].cluster_id);
        let Some(ClusterExpansion::Children(children)) = index.expand(id) else {
            panic!("expected sub-clusters");
        };
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.property("point_count") == Some(&2.into())));
    }

    #[test]
    fn unknown_cluster_ids() {
        let index = ClusterIndex::build(&points(&NEARBY), &GeoJsonOptions::clustered(50, 14)).unwrap();
        assert!(index.get_children(0).is_none());
        assert!(index.get_children(u64::MAX).is_none());
        assert!(index.expand(2).is_none());
        assert!(index.get_cluster_expansion_zoom(1).is_none());
    }

    #[test]
    fn passes_non_points_through() {
        let document: GeoJsonDocument = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [1, 1]}},
            {"type": "Feature", "properties": {"kind": "road"}, "geometry": {"type": "LineString", "coordinates": [[0, 0], [2, 2]]}}
        ]}"#
        .parse()
        .unwrap();
        let index = ClusterIndex::build(&document, &GeoJsonOptions::clustered(50, 14)).unwrap();
        assert_eq!(index.len(), 1);
        let tile = index.get_tile(TileCoord::new_unchecked(0, 0, 0));
        assert_eq!(tile.len(), 2);
        assert!(tile.iter().any(|e| matches!(
            e,
            ClusterEntry::Feature(TileFeature { geometry: TileGeometry::LineString(_), .. })
        )));
    }

    #[test]
    fn wraps_around_antimeridian() {
        let index =
            ClusterIndex::build(&points(&[[179.0, 0.0]]), &GeoJsonOptions::clustered(50, 14)).unwrap();
        let west = index.get_tile(TileCoord::new_unchecked(2, 0, 1));
        let [ClusterEntry::Feature(feature)] = west.as_slice() else {
            panic!("expected the wrapped point");
        };
        let TileGeometry::Point(points) = &feature.geometry else {
            panic!("expected point");
        };
        assert!(points[0][0] < 0);
    }
}
