//! Douglas-Peucker vertex ranking.
//!
//! Instead of simplifying a path for every zoom level, each vertex is ranked once with the
//! squared distance at which Douglas-Peucker would keep it. A tile query at zoom `z` then keeps
//! the vertices whose importance exceeds the squared tolerance of that zoom.

use super::convert::Vertex;

/// Importance of vertices that must never be dropped (endpoints and clip intersections).
pub(crate) const KEEP: f64 = 1.0;

/// Squared distance between two vertices.
pub(crate) fn sq_seg_length(a: &Vertex, b: &Vertex) -> f64 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    dx * dx + dy * dy
}

/// Squared distance from `p` to the segment `a`-`b`.
fn sq_seg_dist(p: &Vertex, a: &Vertex, b: &Vertex) -> f64 {
    let (mut x, mut y) = (a[0], a[1]);
    let mut dx = b[0] - x;
    let mut dy = b[1] - y;

    if dx != 0.0 || dy != 0.0 {
        let t = ((p[0] - x) * dx + (p[1] - y) * dy) / (dx * dx + dy * dy);
        if t > 1.0 {
            x = b[0];
            y = b[1];
        } else if t > 0.0 {
            x += dx * t;
            y += dy * t;
        }
    }

    dx = p[0] - x;
    dy = p[1] - y;
    dx * dx + dy * dy
}

/// Signed area of a ring (shoelace formula), positive for clockwise rings in unit space.
pub(crate) fn ring_area(ring: &[Vertex]) -> f64 {
    ring.windows(2)
        .map(|w| (w[1][0] - w[0][0]) * (w[0][1] + w[1][1]))
        .sum::<f64>()
        / -2.0
}

/// Stores the Douglas-Peucker importance of every vertex in its third component.
///
/// Vertices that would be dropped even at `sq_tolerance` get an importance of `0`.
pub(crate) fn simplify(vertices: &mut [Vertex], sq_tolerance: f64) {
    let Some(last) = vertices.len().checked_sub(1) else {
        return;
    };
    vertices[0][2] = KEEP;
    vertices[last][2] = KEEP;

    let mut stack = vec![(0, last)];
    while let Some((first, last)) = stack.pop() {
        let mut max_sq_dist = sq_tolerance;
        let mut index = None;
        let mid = first + (last - first) / 2;
        let mut min_pos_to_mid = last - first;

        for i in first + 1..last {
            let d = sq_seg_dist(&vertices[i], &vertices[first], &vertices[last]);
            if d > max_sq_dist {
                index = Some(i);
                max_sq_dist = d;
            } else if d == max_sq_dist && index.is_some() {
                // prefer the split closest to the middle to keep recursion balanced
                let pos_to_mid = i.abs_diff(mid);
                if pos_to_mid < min_pos_to_mid {
                    index = Some(i);
                    min_pos_to_mid = pos_to_mid;
                }
            }
        }

        if let Some(index) = index {
            vertices[index][2] = max_sq_dist;
            if index - first > 1 {
                stack.push((first, index));
            }
            if last - index > 1 {
                stack.push((index, last));
            }
        }
    }
}
