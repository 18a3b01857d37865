//! Polygon simplification using the Ramer-Douglas-Peucker algorithm.
//!
//! Reduces a traced workpiece outline (hundreds of border pixels) to its
//! few corner vertices. Open curves use the classic recursion; closed
//! outlines are split at the vertex farthest from the first one so both
//! halves are open curves, then vertices lying within tolerance of the
//! chord between their neighbours are pruned around the seam.

use crate::types::Point;

/// Simplify an open polyline, keeping both endpoints.
///
/// A vertex survives when it lies farther than `tolerance` pixels from
/// the chord of the span it was tested in. Zero tolerance keeps every
/// vertex that is not exactly on its chord.
#[must_use = "returns the simplified polyline"]
pub fn simplify_open(points: &[Point], tolerance: f64) -> Vec<Point> {
    let Some(last) = points.len().checked_sub(1) else {
        return Vec::new();
    };
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[last] = true;

    // Spans still to be split, as (first, last) index pairs.
    let mut spans = vec![(0, last)];
    while let Some((lo, hi)) = spans.pop() {
        if let Some((split, dist)) = farthest_from_chord(points, lo, hi)
            && dist > tolerance
        {
            keep[split] = true;
            spans.push((lo, split));
            spans.push((split, hi));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

/// Simplify a closed polygon (the last point connects back to the first).
///
/// Returns the polygon vertices without repeating the first one.
#[must_use = "returns the simplified polygon"]
pub fn simplify_closed(points: &[Point], tolerance: f64) -> Vec<Point> {
    if points.len() < 4 {
        return points.to_vec();
    }

    let anchor = points[0];
    let (far, _) = points
        .iter()
        .enumerate()
        .fold((0, 0.0), |(best, best_d), (i, p)| {
            let d = p.distance_squared(anchor);
            if d > best_d { (i, d) } else { (best, best_d) }
        });
    if far == 0 {
        return vec![anchor];
    }

    let mut first = simplify_open(&points[..=far], tolerance);
    let mut second_input = points[far..].to_vec();
    second_input.push(anchor);
    let mut second = simplify_open(&second_input, tolerance);

    // Drop the shared split vertex and the closing anchor.
    first.pop();
    second.pop();
    first.append(&mut second);

    prune_collinear(first, tolerance)
}

/// Remove vertices closer than `tolerance` to the chord between their
/// cyclic neighbours, until none remain or only a triangle is left.
fn prune_collinear(mut polygon: Vec<Point>, tolerance: f64) -> Vec<Point> {
    loop {
        let n = polygon.len();
        if n <= 3 {
            return polygon;
        }
        let flat = (0..n).find(|&i| {
            let prev = polygon[(i + n - 1) % n];
            let next = polygon[(i + 1) % n];
            perpendicular_distance(polygon[i], prev, next) <= tolerance
        });
        match flat {
            Some(i) => {
                polygon.remove(i);
            }
            None => return polygon,
        }
    }
}

/// Total length of a polyline, including the closing edge when `closed`.
#[must_use]
pub fn perimeter(points: &[Point], closed: bool) -> f64 {
    let open: f64 = points.windows(2).map(|w| w[0].distance(w[1])).sum();
    match (closed, points.first(), points.last()) {
        (true, Some(&first), Some(&last)) if points.len() > 1 => open + last.distance(first),
        _ => open,
    }
}

/// Interior vertex of `points[lo..=hi]` farthest from the chord
/// `lo -> hi`, with its distance. `None` when the span has no interior.
fn farthest_from_chord(points: &[Point], lo: usize, hi: usize) -> Option<(usize, f64)> {
    let (a, b) = (points[lo], points[hi]);
    (lo + 1..hi)
        .map(|i| (i, perpendicular_distance(points[i], a, b)))
        .max_by(|x, y| x.1.total_cmp(&y.1))
}

/// Distance from `p` to the infinite line through `a` and `b`, or to
/// `a` when the two coincide.
fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let chord = a.distance(b);
    if chord == 0.0 {
        return p.distance(a);
    }
    let (ux, uy) = (b.x - a.x, b.y - a.y);
    let (vx, vy) = (p.x - a.x, p.y - a.y);
    ux.mul_add(vy, -(uy * vx)).abs() / chord
}
