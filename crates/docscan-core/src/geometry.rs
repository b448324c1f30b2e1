//! Planar polygon helpers used by quadrilateral selection and rectification.
//!
//! All functions work in image coordinates (x right, y down). "Clockwise"
//! always means clockwise as seen on screen.

use nalgebra::Point2;
use std::cmp::Ordering;

#[inline]
pub fn distance(a: Point2<f32>, b: Point2<f32>) -> f32 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// z-component of `(b - a) × (c - a)`. Positive is a clockwise turn on screen.
#[inline]
fn cross(a: Point2<f32>, b: Point2<f32>, c: Point2<f32>) -> f64 {
    let (abx, aby) = (b.x as f64 - a.x as f64, b.y as f64 - a.y as f64);
    let (acx, acy) = (c.x as f64 - a.x as f64, c.y as f64 - a.y as f64);
    abx * acy - aby * acx
}

fn signed_area(poly: &[Point2<f32>]) -> f64 {
    let n = poly.len();
    if n < 3 {
        return 0.0;
    }
    let mut acc = 0.0f64;
    for i in 0..n {
        let p = poly[i];
        let q = poly[(i + 1) % n];
        acc += p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
    }
    acc * 0.5
}

/// Absolute shoelace area of a closed polygon.
pub fn polygon_area(poly: &[Point2<f32>]) -> f32 {
    signed_area(poly).abs() as f32
}

/// Length of the closed polyline through `poly`.
pub fn polygon_perimeter(poly: &[Point2<f32>]) -> f32 {
    let n = poly.len();
    if n < 2 {
        return 0.0;
    }
    (0..n).map(|i| distance(poly[i], poly[(i + 1) % n])).sum()
}

/// Convex hull by Andrew's monotone chain.
///
/// Collinear boundary points are dropped. The result is deterministic for a
/// given point multiset (it does not depend on the input order).
pub fn convex_hull(points: &[Point2<f32>]) -> Vec<Point2<f32>> {
    let mut pts: Vec<Point2<f32>> = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<Point2<f32>> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0
        {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<Point2<f32>> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0
        {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

fn point_line_distance(p: Point2<f32>, a: Point2<f32>, b: Point2<f32>) -> f32 {
    let len = distance(a, b);
    if len <= f32::EPSILON {
        return distance(p, a);
    }
    (cross(a, b, p).abs() / len as f64) as f32
}

/// Douglas–Peucker on an open chain; returns a keep-mask.
fn douglas_peucker(chain: &[Point2<f32>], epsilon: f32) -> Vec<bool> {
    let n = chain.len();
    let mut keep = vec![false; n];
    if n == 0 {
        return keep;
    }
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack = vec![(0usize, n - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let mut max_dist = -1.0f32;
        let mut max_index = start;
        for (i, &p) in chain.iter().enumerate().take(end).skip(start + 1) {
            let d = point_line_distance(p, chain[start], chain[end]);
            if d > max_dist {
                max_dist = d;
                max_index = i;
            }
        }
        if max_dist > epsilon {
            keep[max_index] = true;
            stack.push((start, max_index));
            stack.push((max_index, end));
        }
    }
    keep
}

/// Simplify a closed polygon with Douglas–Peucker tolerance `epsilon`.
///
/// The polygon is split at its first vertex and the vertex farthest from
/// it; each half is simplified separately. Vertices that end up within
/// `epsilon` of the line through their neighbours are removed afterwards, so
/// the arbitrary split vertex does not survive on a straight edge.
pub fn approx_closed_polygon(poly: &[Point2<f32>], epsilon: f32) -> Vec<Point2<f32>> {
    let n = poly.len();
    if n <= 3 {
        return poly.to_vec();
    }

    let origin = poly[0];
    let mut far = 0usize;
    let mut far_d = -1.0f32;
    for (i, &p) in poly.iter().enumerate() {
        let d = distance(origin, p);
        if d > far_d {
            far_d = d;
            far = i;
        }
    }
    if far == 0 {
        return vec![origin];
    }

    let first: Vec<Point2<f32>> = poly[..=far].to_vec();
    let mut second: Vec<Point2<f32>> = poly[far..].to_vec();
    second.push(origin);

    let keep_first = douglas_peucker(&first, epsilon);
    let keep_second = douglas_peucker(&second, epsilon);

    let mut out: Vec<Point2<f32>> = first
        .iter()
        .zip(&keep_first)
        .filter_map(|(&p, &k)| k.then_some(p))
        .collect();
    let last = second.len() - 1;
    out.extend(
        second
            .iter()
            .zip(&keep_second)
            .enumerate()
            .filter(|(i, _)| *i != 0 && *i != last)
            .filter_map(|(_, (&p, &k))| k.then_some(p)),
    );

    drop_near_collinear(&mut out, epsilon);
    out
}

fn drop_near_collinear(poly: &mut Vec<Point2<f32>>, epsilon: f32) {
    while poly.len() > 3 {
        let n = poly.len();
        let mut best: Option<(usize, f32)> = None;
        for i in 0..n {
            let d = point_line_distance(poly[i], poly[(i + n - 1) % n], poly[(i + 1) % n]);
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }
        match best {
            Some((i, d)) if d <= epsilon => {
                poly.remove(i);
            }
            _ => break,
        }
    }
}

/// True when every turn has the same, non-zero orientation and the polygon
/// winds exactly once.
pub fn is_strictly_convex(poly: &[Point2<f32>]) -> bool {
    let n = poly.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f64;
    let mut turning = 0.0f64;
    for i in 0..n {
        let a = poly[i];
        let b = poly[(i + 1) % n];
        let c = poly[(i + 2) % n];
        let z = cross(a, b, c);
        if !z.is_finite() || z.abs() < 1e-9 {
            return false;
        }
        if sign == 0.0 {
            sign = z.signum();
        } else if z.signum() != sign {
            return false;
        }
        let h0 = (b.y as f64 - a.y as f64).atan2(b.x as f64 - a.x as f64);
        let h1 = (c.y as f64 - b.y as f64).atan2(c.x as f64 - b.x as f64);
        let mut d = h1 - h0;
        while d <= -std::f64::consts::PI {
            d += std::f64::consts::TAU;
        }
        while d > std::f64::consts::PI {
            d -= std::f64::consts::TAU;
        }
        turning += d;
    }
    (turning.abs() - std::f64::consts::TAU).abs() < 1e-3
}

fn on_segment(a: Point2<f32>, b: Point2<f32>, p: Point2<f32>) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Whether closed segments `p1-p2` and `q1-q2` share at least one point.
pub fn segments_intersect(
    p1: Point2<f32>,
    p2: Point2<f32>,
    q1: Point2<f32>,
    q2: Point2<f32>,
) -> bool {
    let d1 = cross(q1, q2, p1);
    let d2 = cross(q1, q2, p2);
    let d3 = cross(p1, p2, q1);
    let d4 = cross(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }
    (d1 == 0.0 && on_segment(q1, q2, p1))
        || (d2 == 0.0 && on_segment(q1, q2, p2))
        || (d3 == 0.0 && on_segment(p1, p2, q1))
        || (d4 == 0.0 && on_segment(p1, p2, q2))
}

/// Interior angle at every vertex, in degrees.
pub fn interior_angles_deg(poly: &[Point2<f32>]) -> Vec<f32> {
    let n = poly.len();
    (0..n)
        .map(|i| {
            let prev = poly[(i + n - 1) % n];
            let cur = poly[i];
            let next = poly[(i + 1) % n];
            let (ux, uy) = (prev.x - cur.x, prev.y - cur.y);
            let (vx, vy) = (next.x - cur.x, next.y - cur.y);
            let denom = ux.hypot(uy) * vx.hypot(vy);
            if denom <= f32::EPSILON {
                return 0.0;
            }
            ((ux * vx + uy * vy) / denom).clamp(-1.0, 1.0).acos().to_degrees()
        })
        .collect()
}

/// Order four corners clockwise on screen, starting at the corner nearest
/// the image origin. For an upright quad this is TL, TR, BR, BL.
pub fn order_clockwise_from_origin(corners: [Point2<f32>; 4]) -> [Point2<f32>; 4] {
    let cx = corners.iter().map(|p| p.x).sum::<f32>() / 4.0;
    let cy = corners.iter().map(|p| p.y).sum::<f32>() / 4.0;

    let mut sorted = corners;
    // atan2 grows clockwise on screen because y points down.
    sorted.sort_by(|a, b| {
        let ta = (a.y - cy).atan2(a.x - cx);
        let tb = (b.y - cy).atan2(b.x - cx);
        ta.total_cmp(&tb)
    });

    let start = (0..4)
        .min_by(|&i, &j| {
            let (a, b) = (sorted[i], sorted[j]);
            let da = a.x * a.x + a.y * a.y;
            let db = b.x * b.x + b.y * b.y;
            match da.total_cmp(&db) {
                Ordering::Equal => a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)),
                o => o,
            }
        })
        .unwrap_or(0);

    [
        sorted[start],
        sorted[(start + 1) % 4],
        sorted[(start + 2) % 4],
        sorted[(start + 3) % 4],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn p(x: f32, y: f32) -> Point2<f32> {
        Point2::new(x, y)
    }

    #[test]
    fn area_and_perimeter_of_rectangle() {
        let rect = [p(0.0, 0.0), p(10.0, 0.0), p(10.0, 5.0), p(0.0, 5.0)];
        assert_abs_diff_eq!(polygon_area(&rect), 50.0, epsilon = 1e-4);
        assert_abs_diff_eq!(polygon_perimeter(&rect), 30.0, epsilon = 1e-4);
    }

    #[test]
    fn hull_drops_interior_and_collinear_points() {
        let pts = [
            p(0.0, 0.0),
            p(5.0, 0.0),
            p(10.0, 0.0),
            p(10.0, 10.0),
            p(3.0, 4.0),
            p(0.0, 10.0),
            p(6.0, 6.0),
        ];
        let hull = convex_hull(&pts);
        assert_eq!(hull.len(), 4);
        assert_abs_diff_eq!(polygon_area(&hull), 100.0, epsilon = 1e-4);
        assert!(!hull.contains(&p(5.0, 0.0)));
    }

    #[test]
    fn hull_is_independent_of_input_order() {
        let pts = vec![p(3.0, 1.0), p(0.0, 0.0), p(4.0, 4.0), p(1.0, 3.0), p(2.0, 2.0)];
        let mut reversed = pts.clone();
        reversed.reverse();
        assert_eq!(convex_hull(&pts), convex_hull(&reversed));
    }

    #[test]
    fn closed_approximation_recovers_corners_of_dense_square() {
        let mut pts = Vec::new();
        for i in 0..20 {
            pts.push(p(i as f32 * 5.0, 0.0));
        }
        for i in 0..20 {
            pts.push(p(100.0, i as f32 * 5.0));
        }
        for i in 0..20 {
            pts.push(p(100.0 - i as f32 * 5.0, 100.0));
        }
        for i in 0..20 {
            pts.push(p(0.0, 100.0 - i as f32 * 5.0));
        }
        // start in the middle of an edge
        pts.rotate_left(10);
        let approx = approx_closed_polygon(&pts, 2.0);
        assert_eq!(approx.len(), 4, "got {approx:?}");
        for corner in [p(0.0, 0.0), p(100.0, 0.0), p(100.0, 100.0), p(0.0, 100.0)] {
            assert!(approx.contains(&corner), "missing {corner:?}");
        }
    }

    #[test]
    fn convexity_rejects_bowtie_and_dart() {
        let square = [p(0.0, 0.0), p(4.0, 0.0), p(4.0, 4.0), p(0.0, 4.0)];
        let bowtie = [p(0.0, 0.0), p(4.0, 4.0), p(4.0, 0.0), p(0.0, 4.0)];
        let dart = [p(0.0, 0.0), p(4.0, 2.0), p(0.0, 4.0), p(1.0, 2.0)];
        assert!(is_strictly_convex(&square));
        assert!(!is_strictly_convex(&bowtie));
        assert!(!is_strictly_convex(&dart));
    }

    #[test]
    fn segment_intersection_cases() {
        assert!(segments_intersect(
            p(0.0, 0.0),
            p(4.0, 4.0),
            p(0.0, 4.0),
            p(4.0, 0.0)
        ));
        assert!(!segments_intersect(
            p(0.0, 0.0),
            p(4.0, 0.0),
            p(0.0, 1.0),
            p(4.0, 1.0)
        ));
        // touching at an endpoint counts
        assert!(segments_intersect(
            p(0.0, 0.0),
            p(2.0, 0.0),
            p(2.0, 0.0),
            p(2.0, 3.0)
        ));
    }

    #[test]
    fn right_angles_of_rectangle() {
        let rect = [p(0.0, 0.0), p(8.0, 0.0), p(8.0, 3.0), p(0.0, 3.0)];
        for a in interior_angles_deg(&rect) {
            assert_abs_diff_eq!(a, 90.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn corners_are_ordered_clockwise_from_top_left() {
        let shuffled = [
            p(880.0, 700.0),
            p(100.0, 100.0),
            p(120.0, 680.0),
            p(900.0, 120.0),
        ];
        let ordered = order_clockwise_from_origin(shuffled);
        assert_eq!(
            ordered,
            [
                p(100.0, 100.0),
                p(900.0, 120.0),
                p(880.0, 700.0),
                p(120.0, 680.0)
            ]
        );
    }
}
