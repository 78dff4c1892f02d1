//! Axis-aligned clipping of projected geometries.
//!
//! Geometries are clipped one axis at a time against `[k1, k2]`. Lines may split into several
//! slices; rings stay a single (re-closed) ring that runs along the clip edge.
//! Vertices created at the clip edge are always kept by simplification.

use super::convert::{Path, ProjectedGeometry, Vertex};
use super::simplify::KEEP;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    X = 0,
    Y = 1,
}

/// Clips `geometry` (with unit-square bounding box `bbox`) to `bounds`.
///
/// Returns `None` when nothing of the geometry remains.
pub(crate) fn clip_geometry(
    geometry: &ProjectedGeometry,
    bbox: &[f64; 4],
    bounds: &[f64; 4],
) -> Option<ProjectedGeometry> {
    let [min_x, min_y, max_x, max_y] = *bounds;
    if bbox[0] > max_x || bbox[2] < min_x || bbox[1] > max_y || bbox[3] < min_y {
        return None;
    }
    if bbox[0] >= min_x && bbox[2] <= max_x && bbox[1] >= min_y && bbox[3] <= max_y {
        return Some(geometry.clone());
    }

    let clipped = clip_axis(geometry, min_x, max_x, Axis::X)?;
    clip_axis(&clipped, min_y, max_y, Axis::Y)
}

fn clip_axis(geometry: &ProjectedGeometry, k1: f64, k2: f64, axis: Axis) -> Option<ProjectedGeometry> {
    let a = axis as usize;
    let clipped = match geometry {
        ProjectedGeometry::Point(points) => {
            let points: Vec<_> = points
                .iter()
                .filter(|p| p[a] >= k1 && p[a] <= k2)
                .copied()
                .collect();
            if points.is_empty() {
                return None;
            }
            ProjectedGeometry::Point(points)
        }
        ProjectedGeometry::LineString(lines) => {
            let mut slices = Vec::new();
            for line in lines {
                for vertices in clip_line(&line.vertices, k1, k2, axis, false) {
                    if vertices.len() >= 2 {
                        slices.push(Path {
                            vertices,
                            size: line.size,
                        });
                    }
                }
            }
            if slices.is_empty() {
                return None;
            }
            ProjectedGeometry::LineString(slices)
        }
        ProjectedGeometry::Polygon(polygons) => {
            let mut clipped = Vec::with_capacity(polygons.len());
            for rings in polygons {
                let mut polygon = Vec::with_capacity(rings.len());
                for (idx, ring) in rings.iter().enumerate() {
                    let vertices = clip_line(&ring.vertices, k1, k2, axis, true)
                        .pop()
                        .unwrap_or_default();
                    if vertices.len() >= 4 {
                        polygon.push(Path {
                            vertices,
                            size: ring.size,
                        });
                    } else if idx == 0 {
                        // outer ring is gone, so are its holes
                        break;
                    }
                }
                if !polygon.is_empty() {
                    clipped.push(polygon);
                }
            }
            if clipped.is_empty() {
                return None;
            }
            ProjectedGeometry::Polygon(clipped)
        }
    };
    Some(clipped)
}

fn intersect(a: &Vertex, b: &Vertex, k: f64, axis: Axis) -> Vertex {
    match axis {
        Axis::X => {
            let t = (k - a[0]) / (b[0] - a[0]);
            [k, a[1] + (b[1] - a[1]) * t, KEEP]
        }
        Axis::Y => {
            let t = (k - a[1]) / (b[1] - a[1]);
            [a[0] + (b[0] - a[0]) * t, k, KEEP]
        }
    }
}

/// Clips a path to `[k1, k2]` along `axis`. Polygon rings produce at most one closed slice.
fn clip_line(vertices: &[Vertex], k1: f64, k2: f64, axis: Axis, is_ring: bool) -> Vec<Vec<Vertex>> {
    let a_idx = axis as usize;
    let mut result = Vec::new();
    let mut slice = Vec::new();

    for segment in vertices.windows(2) {
        let (a, b) = (&segment[0], &segment[1]);
        let (av, bv) = (a[a_idx], b[a_idx]);
        let mut exited = false;

        if av < k1 {
            // entering from below k1
            if bv > k1 {
                slice.push(intersect(a, b, k1, axis));
            }
        } else if av > k2 {
            // entering from above k2
            if bv < k2 {
                slice.push(intersect(a, b, k2, axis));
            }
        } else {
            slice.push(*a);
        }

        if bv < k1 && av >= k1 {
            slice.push(intersect(a, b, k1, axis));
            exited = true;
        }
        if bv > k2 && av <= k2 {
            slice.push(intersect(a, b, k2, axis));
            exited = true;
        }

        if !is_ring && exited {
            result.push(std::mem::take(&mut slice));
        }
    }

    if let Some(last) = vertices.last() {
        if last[a_idx] >= k1 && last[a_idx] <= k2 {
            slice.push(*last);
        }
    }

    if is_ring {
        if let (Some(first), Some(last)) = (slice.first().copied(), slice.last()) {
            if slice.len() > 1 && (first[0] != last[0] || first[1] != last[1]) {
                slice.push(first);
            }
        }
    }

    if !slice.is_empty() {
        result.push(slice);
    }
    result
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn path(coords: &[[f64; 2]]) -> Path {
        Path {
            vertices: coords.iter().map(|c| [c[0], c[1], KEEP]).collect(),
            size: 1.0,
        }
    }

    fn bbox_of(coords: &[[f64; 2]]) -> [f64; 4] {
        coords.iter().fold(
            [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY],
            |b, c| [b[0].min(c[0]), b[1].min(c[1]), b[2].max(c[0]), b[3].max(c[1])],
        )
    }

    #[test]
    fn rejects_disjoint_geometry() {
        let coords = [[0.1, 0.1], [0.2, 0.2]];
        let line = ProjectedGeometry::LineString(vec![path(&coords)]);
        assert!(clip_geometry(&line, &bbox_of(&coords), &[0.5, 0.5, 1.0, 1.0]).is_none());
    }

    #[test]
    fn keeps_contained_geometry() {
        let coords = [[0.6, 0.6], [0.7, 0.7]];
        let line = ProjectedGeometry::LineString(vec![path(&coords)]);
        assert_eq!(
            clip_geometry(&line, &bbox_of(&coords), &[0.5, 0.5, 1.0, 1.0]),
            Some(line)
        );
    }

    #[test]
    fn splits_line_leaving_and_reentering() {
        let coords = [[0.0, 0.5], [0.4, 0.5], [0.4, 0.9], [0.0, 0.9], [0.0, 0.6]];
        let line = ProjectedGeometry::LineString(vec![path(&coords)]);
        let Some(ProjectedGeometry::LineString(slices)) =
            clip_geometry(&line, &bbox_of(&coords), &[0.0, 0.0, 1.0, 0.7])
        else {
            panic!("expected a line");
        };
        assert_eq!(slices.len(), 2);
        assert_relative_eq!(slices[0].vertices.last().unwrap()[1], 0.7);
        assert_relative_eq!(slices[1].vertices[0][1], 0.7);
        assert_relative_eq!(slices[1].vertices[0][2], KEEP);
    }

    #[test]
    fn clips_polygon_to_closed_ring() {
        let coords = [[0.2, 0.2], [0.8, 0.2], [0.8, 0.8], [0.2, 0.8], [0.2, 0.2]];
        let polygon = ProjectedGeometry::Polygon(vec![vec![path(&coords)]]);
        let Some(ProjectedGeometry::Polygon(polygons)) =
            clip_geometry(&polygon, &bbox_of(&coords), &[0.5, 0.0, 1.0, 1.0])
        else {
            panic!("expected a polygon");
        };
        let ring = &polygons[0][0].vertices;
        assert_eq!(ring.first().map(|v| [v[0], v[1]]), ring.last().map(|v| [v[0], v[1]]));
        assert!(ring.iter().all(|v| v[0] >= 0.5));
        assert_eq!(ring.len(), 5);
    }

    #[test]
    fn drops_holes_of_removed_polygons() {
        let outer = [[0.2, 0.2], [0.4, 0.2], [0.4, 0.4], [0.2, 0.4], [0.2, 0.2]];
        let hole = [[0.25, 0.25], [0.25, 0.3], [0.3, 0.3], [0.25, 0.25]];
        let polygon = ProjectedGeometry::Polygon(vec![vec![path(&outer), path(&hole)]]);
        assert!(clip_axis(&polygon, 0.5, 1.0, Axis::X).is_none());
    }

    #[test]
    fn filters_points() {
        let points = ProjectedGeometry::Point(vec![[0.1, 0.1], [0.6, 0.6]]);
        assert_eq!(
            clip_geometry(&points, &[0.1, 0.1, 0.6, 0.6], &[0.5, 0.5, 1.0, 1.0]),
            Some(ProjectedGeometry::Point(vec![[0.6, 0.6]]))
        );
    }
}
