//! Quadrilateral candidates: polygon approximation, validity filtering and
//! scoring of traced contours.

use docscan_core::{
    approx_closed_polygon, convex_hull, distance, interior_angles_deg, is_strictly_convex,
    order_clockwise_from_origin, polygon_area, polygon_perimeter, segments_intersect,
};
use log::{debug, trace};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::contours::Contour;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Candidate selection configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadParams {
    /// Initial approximation tolerance as a fraction of the hull perimeter.
    pub epsilon_frac: f32,
    /// Tolerance refinements tried while looking for exactly four vertices.
    pub max_approx_iters: usize,
    /// Smallest accepted quad area as a fraction of the image area.
    pub min_area_frac: f32,
    /// Largest accepted quad area as a fraction of the image area. Quads
    /// hugging the whole frame are usually the image border itself.
    pub max_area_frac: f32,
    /// Weight of the right-angle term in the score.
    pub right_angle_weight: f32,
    /// Weight of the aspect term in the score.
    pub aspect_weight: f32,
    /// Side ratio above which the aspect term starts to penalise.
    pub max_aspect: f32,
}

impl Default for QuadParams {
    fn default() -> Self {
        Self {
            epsilon_frac: 0.02,
            max_approx_iters: 16,
            min_area_frac: 0.10,
            max_area_frac: 0.98,
            right_angle_weight: 0.2,
            aspect_weight: 0.05,
            max_aspect: 4.0,
        }
    }
}

/// Four corners in TL, TR, BR, BL order (clockwise on screen).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub corners: [Point2<f32>; 4],
}

impl Quad {
    /// Wrap corners that are already in TL, TR, BR, BL order.
    pub fn new(corners: [Point2<f32>; 4]) -> Self {
        Self { corners }
    }

    /// Order arbitrary corners clockwise starting nearest the origin.
    pub fn from_unordered(corners: [Point2<f32>; 4]) -> Self {
        Self::new(order_clockwise_from_origin(corners))
    }

    /// Axis-aligned quad inset by `inset` pixels from the frame of a
    /// `width × height` image, with the inset clamped to a quarter of the
    /// shorter side. `None` when the image is under two pixels wide or tall,
    /// where no quad has positive area.
    pub fn inset_frame(width: usize, height: usize, inset: f32) -> Option<Self> {
        if width < 2 || height < 2 {
            return None;
        }
        let max_x = (width - 1) as f32;
        let max_y = (height - 1) as f32;
        let limit = (max_x.min(max_y) / 4.0).floor();
        let i = inset.max(0.0).min(limit);
        Some(Self::new([
            Point2::new(i, i),
            Point2::new(max_x - i, i),
            Point2::new(max_x - i, max_y - i),
            Point2::new(i, max_y - i),
        ]))
    }

    pub fn from_array(corners: [[f32; 2]; 4]) -> Self {
        Self::new(corners.map(|[x, y]| Point2::new(x, y)))
    }

    pub fn to_array(&self) -> [[f32; 2]; 4] {
        self.corners.map(|p| [p.x, p.y])
    }

    pub fn top_left(&self) -> Point2<f32> {
        self.corners[0]
    }

    pub fn top_right(&self) -> Point2<f32> {
        self.corners[1]
    }

    pub fn bottom_right(&self) -> Point2<f32> {
        self.corners[2]
    }

    pub fn bottom_left(&self) -> Point2<f32> {
        self.corners[3]
    }

    pub fn area(&self) -> f32 {
        polygon_area(&self.corners)
    }

    pub fn perimeter(&self) -> f32 {
        polygon_perimeter(&self.corners)
    }

    /// Side lengths: top, right, bottom, left.
    pub fn side_lengths(&self) -> [f32; 4] {
        let c = &self.corners;
        [
            distance(c[0], c[1]),
            distance(c[1], c[2]),
            distance(c[2], c[3]),
            distance(c[3], c[0]),
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.corners.iter().all(|p| p.x.is_finite() && p.y.is_finite())
    }

    /// Whether a pair of opposite sides cross.
    pub fn is_self_intersecting(&self) -> bool {
        let c = &self.corners;
        segments_intersect(c[0], c[1], c[2], c[3]) || segments_intersect(c[1], c[2], c[3], c[0])
    }

    pub fn is_convex(&self) -> bool {
        is_strictly_convex(&self.corners)
    }

    /// Apply `f` to every corner, keeping the order.
    pub fn map(&self, f: impl Fn(Point2<f32>) -> Point2<f32>) -> Self {
        Self::new(self.corners.map(f))
    }

    /// Push every corner `margin` pixels further from the centroid along
    /// both axes.
    pub fn expanded(&self, margin: f32) -> Self {
        let c = self
            .corners
            .iter()
            .fold(Point2::origin(), |acc, p| acc + p.coords / 4.0);
        self.map(|p| {
            Point2::new(
                p.x + margin * (p.x - c.x).signum(),
                p.y + margin * (p.y - c.y).signum(),
            )
        })
    }
}

/// Score components of a candidate. `total` is what candidates are ranked by.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuadScore {
    /// Quad area over image area.
    pub area_frac: f32,
    /// `1 - mean |angle - 90°| / 90°`, in `[0, 1]`.
    pub right_angle: f32,
    /// `1` up to `max_aspect`, decaying as `max_aspect / ratio` above it.
    pub aspect: f32,
    pub total: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuadCandidate {
    pub quad: Quad,
    /// Contour the quad was approximated from; `None` for quads fitted to
    /// Hough lines.
    pub contour_index: Option<usize>,
    pub score: QuadScore,
}

/// Approximate a convex polygon with exactly four vertices, refining the
/// tolerance by bisection. Returns `None` if no tolerance in the tried range
/// gives four vertices.
pub fn approximate_quad(hull: &[Point2<f32>], params: &QuadParams) -> Option<[Point2<f32>; 4]> {
    if hull.len() < 4 {
        return None;
    }
    let perimeter = polygon_perimeter(hull);
    if !perimeter.is_finite() || perimeter <= 0.0 {
        return None;
    }

    let mut eps = params.epsilon_frac.max(1e-4) * perimeter;
    let (mut lo, mut hi) = (0.0f32, f32::INFINITY);
    for _ in 0..params.max_approx_iters.max(1) {
        let poly = approx_closed_polygon(hull, eps);
        match poly.len().cmp(&4) {
            Ordering::Equal => return Some([poly[0], poly[1], poly[2], poly[3]]),
            Ordering::Greater => {
                lo = eps;
                eps = if hi.is_finite() { 0.5 * (lo + hi) } else { eps * 2.0 };
            }
            Ordering::Less => {
                hi = eps;
                eps = 0.5 * (lo + hi);
            }
        }
    }
    None
}

/// Score a quad against an image of `image_area` pixels.
pub fn score_quad(quad: &Quad, image_area: f32, params: &QuadParams) -> QuadScore {
    let area_frac = if image_area > 0.0 {
        quad.area() / image_area
    } else {
        0.0
    };

    let angles = interior_angles_deg(&quad.corners);
    let dev = angles.iter().map(|a| (a - 90.0).abs()).sum::<f32>() / angles.len().max(1) as f32;
    let right_angle = (1.0 - dev / 90.0).clamp(0.0, 1.0);

    let [top, right, bottom, left] = quad.side_lengths();
    let (w, h) = (top.max(bottom), left.max(right));
    let ratio = w.max(h) / w.min(h).max(f32::EPSILON);
    let aspect = if ratio <= params.max_aspect {
        1.0
    } else {
        params.max_aspect / ratio
    };

    let (wa, wr) = (params.right_angle_weight, params.aspect_weight);
    let total = area_frac * (1.0 + wa * right_angle + wr * aspect) / (1.0 + wa + wr);

    QuadScore {
        area_frac,
        right_angle,
        aspect,
        total,
    }
}

/// Turn one contour into a scored candidate, or `None` if it is not an
/// acceptable document outline.
pub fn quad_candidate(
    contour: &Contour,
    image_width: usize,
    image_height: usize,
    params: &QuadParams,
) -> Option<QuadCandidate> {
    let hull = convex_hull(&contour.to_f32());
    let corners = approximate_quad(&hull, params)?;
    let quad = Quad::from_unordered(corners);
    if !quad.is_convex() {
        trace!("contour {}: approximation not convex", contour.index);
        return None;
    }

    let image_area = (image_width * image_height) as f32;
    let score = score_quad(&quad, image_area, params);
    if score.area_frac < params.min_area_frac || score.area_frac > params.max_area_frac {
        trace!(
            "contour {}: area fraction {:.3} out of range",
            contour.index,
            score.area_frac
        );
        return None;
    }

    Some(QuadCandidate {
        quad,
        contour_index: Some(contour.index),
        score,
    })
}

/// Highest-scoring candidate among `contours`. Ties go to the smaller
/// contour index.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(contours, params), fields(num_contours = contours.len()))
)]
pub fn select_quad(
    contours: &[Contour],
    image_width: usize,
    image_height: usize,
    params: &QuadParams,
) -> Option<QuadCandidate> {
    let mut candidates: Vec<QuadCandidate> = contours
        .iter()
        .filter_map(|c| quad_candidate(c, image_width, image_height, params))
        .collect();
    candidates.sort_by(|a, b| {
        b.score
            .total
            .total_cmp(&a.score.total)
            .then(a.contour_index.cmp(&b.contour_index))
    });

    debug!(
        "{} of {} contours are quad candidates",
        candidates.len(),
        contours.len()
    );
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn p(x: f32, y: f32) -> Point2<f32> {
        Point2::new(x, y)
    }

    fn rect_contour(index: usize, x0: i32, y0: i32, x1: i32, y1: i32) -> Contour {
        let mut points = Vec::new();
        for x in x0..x1 {
            points.push(Point2::new(x, y0));
        }
        for y in y0..y1 {
            points.push(Point2::new(x1, y));
        }
        for x in (x0 + 1..=x1).rev() {
            points.push(Point2::new(x, y1));
        }
        for y in (y0 + 1..=y1).rev() {
            points.push(Point2::new(x0, y));
        }
        Contour { index, points }
    }

    #[test]
    fn inset_frame_is_clamped() {
        let q = Quad::inset_frame(1000, 800, 100.0).expect("frame");
        assert_eq!(q.top_left(), p(100.0, 100.0));
        assert_eq!(q.bottom_right(), p(899.0, 699.0));

        let small = Quad::inset_frame(40, 40, 100.0).expect("frame");
        assert!(small.is_convex());
        assert!(small.area() > 0.0);
    }

    #[test]
    fn inset_frame_needs_two_pixels_per_side() {
        assert!(Quad::inset_frame(1, 1, 100.0).is_none());
        assert!(Quad::inset_frame(300, 1, 100.0).is_none());
        let tiny = Quad::inset_frame(2, 2, 100.0).expect("frame");
        assert!(tiny.is_convex());
        assert!(!tiny.is_self_intersecting());
        assert_eq!(tiny.area(), 1.0);
    }

    #[test]
    fn expanded_moves_corners_outward() {
        let q = Quad::new([p(10.0, 10.0), p(50.0, 10.0), p(50.0, 30.0), p(10.0, 30.0)]);
        let e = q.expanded(3.0);
        assert_eq!(e.top_left(), p(7.0, 7.0));
        assert_eq!(e.bottom_right(), p(53.0, 33.0));
        assert_eq!(q.expanded(0.0), q);
    }

    #[test]
    fn self_intersection_detected() {
        let bowtie = Quad::new([p(0.0, 0.0), p(100.0, 100.0), p(100.0, 0.0), p(0.0, 100.0)]);
        assert!(bowtie.is_self_intersecting());
        let ok = Quad::new([p(0.0, 0.0), p(100.0, 0.0), p(100.0, 100.0), p(0.0, 100.0)]);
        assert!(!ok.is_self_intersecting());
    }

    #[test]
    fn approximation_collapses_noisy_rectangle() {
        let mut pts = Vec::new();
        for i in 0..=40 {
            let t = i as f32 * 5.0;
            let jitter = if i % 2 == 0 { 0.6 } else { -0.6 };
            pts.push(p(t, jitter));
            pts.push(p(200.0 + jitter, t * 0.75));
            pts.push(p(t, 150.0 + jitter));
            pts.push(p(jitter, t * 0.75));
        }
        let hull = convex_hull(&pts);
        let quad = approximate_quad(&hull, &QuadParams::default()).expect("four vertices");
        let q = Quad::from_unordered(quad);
        assert!((q.area() - 200.0 * 150.0).abs() / (200.0 * 150.0) < 0.03);
    }

    #[test]
    fn triangle_is_not_a_quad() {
        let hull = convex_hull(&[p(0.0, 0.0), p(100.0, 0.0), p(50.0, 80.0)]);
        assert!(approximate_quad(&hull, &QuadParams::default()).is_none());
    }

    #[test]
    fn rectangle_scores_full_angle_and_aspect() {
        let q = Quad::new([p(0.0, 0.0), p(100.0, 0.0), p(100.0, 50.0), p(0.0, 50.0)]);
        let s = score_quad(&q, 10_000.0, &QuadParams::default());
        assert_abs_diff_eq!(s.area_frac, 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(s.right_angle, 1.0, epsilon = 1e-4);
        assert_eq!(s.aspect, 1.0);
        assert_abs_diff_eq!(s.total, 0.5, epsilon = 1e-4);
    }

    #[test]
    fn sliver_is_penalised_for_aspect() {
        let q = Quad::new([p(0.0, 0.0), p(400.0, 0.0), p(400.0, 50.0), p(0.0, 50.0)]);
        let s = score_quad(&q, 100_000.0, &QuadParams::default());
        assert_abs_diff_eq!(s.aspect, 0.5, epsilon = 1e-5);
        assert!(s.total < s.area_frac);
    }

    #[test]
    fn area_bounds_filter_candidates() {
        let params = QuadParams::default();
        let tiny = rect_contour(0, 10, 10, 30, 30);
        assert!(quad_candidate(&tiny, 200, 200, &params).is_none());
        let frame = rect_contour(1, 0, 0, 199, 199);
        assert!(quad_candidate(&frame, 200, 200, &params).is_none());
        let doc = rect_contour(2, 20, 30, 170, 160);
        let c = quad_candidate(&doc, 200, 200, &params).expect("candidate");
        assert_eq!(c.quad.top_left(), p(20.0, 30.0));
        assert_eq!(c.quad.top_right(), p(170.0, 30.0));
        assert_eq!(c.quad.bottom_right(), p(170.0, 160.0));
        assert_eq!(c.quad.bottom_left(), p(20.0, 160.0));
    }

    #[test]
    fn largest_candidate_wins_and_ties_keep_first() {
        let params = QuadParams::default();
        let small = rect_contour(0, 10, 10, 110, 110);
        let large = rect_contour(1, 5, 5, 180, 180);
        let best = select_quad(&[small.clone(), large], 200, 200, &params).expect("best");
        assert_eq!(best.contour_index, Some(1));

        let mut twin = small.clone();
        twin.index = 3;
        let best = select_quad(&[twin, small], 200, 200, &params).expect("best");
        assert_eq!(best.contour_index, Some(0));
    }
}
