//! Line-fit fallback for outlines that no single contour covers.
//!
//! When the page border is broken into separate pieces (a corner hidden
//! under a hand, a worn edge, a border that fades into the background), the
//! contour search sees only fragments. Here the four sides are recovered as
//! Hough lines instead: the plane is smoothed with a grayscale closing that
//! removes dark detail such as text, edges are taken at low thresholds, and
//! every pair of near-horizontal lines is combined with every pair of
//! near-vertical lines. Candidates are scored like contour quads and must
//! lie on edge pixels along most of each side.

use image::GrayImage;
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};
use imageproc::morphology::{grayscale_close, Mask};
use log::{debug, trace};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::edges::{canny, dilate};
use crate::quad::{score_quad, Quad, QuadCandidate, QuadParams};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Line-fit fallback configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineFitParams {
    /// Run the fallback when the contour search finds no quad.
    pub enabled: bool,
    /// Half-size of the square grayscale closing applied before edge
    /// detection; `0` disables it.
    pub close_radius: u8,
    pub low_threshold: f32,
    pub high_threshold: f32,
    /// Minimum Hough votes as a fraction of the shorter working side.
    pub min_votes_frac: f32,
    /// Non-maximum suppression radius in the Hough accumulator.
    pub suppression_radius: u32,
    /// Largest deviation from horizontal or vertical, in degrees, for a
    /// line to count as a page side.
    pub angle_tolerance_deg: u32,
    /// Lines kept per orientation.
    pub max_lines: usize,
    /// Fraction of each side that must lie on edge pixels.
    pub min_side_support: f32,
    /// Margin (working pixels) added around a line-fit quad.
    pub border_px: f32,
}

impl Default for LineFitParams {
    fn default() -> Self {
        Self {
            enabled: true,
            close_radius: 4,
            low_threshold: 20.0,
            high_threshold: 200.0,
            min_votes_frac: 0.3,
            suppression_radius: 8,
            angle_tolerance_deg: 30,
            max_lines: 16,
            min_side_support: 0.6,
            border_px: 0.0,
        }
    }
}

/// Intersection of two lines in Hough form `x cos θ + y sin θ = r`, or
/// `None` when they are (nearly) parallel.
pub fn intersect_polar_lines(a: &PolarLine, b: &PolarLine) -> Option<Point2<f32>> {
    let (sin_a, cos_a) = (a.angle_in_degrees as f64).to_radians().sin_cos();
    let (sin_b, cos_b) = (b.angle_in_degrees as f64).to_radians().sin_cos();

    let denom = cos_a * sin_b - sin_a * cos_b;
    if denom.abs() < 1e-6 {
        return None;
    }
    let (r_a, r_b) = (a.r as f64, b.r as f64);
    let x = (r_a * sin_b - r_b * sin_a) / denom;
    let y = (r_b * cos_a - r_a * cos_b) / denom;
    Some(Point2::new(x as f32, y as f32))
}

/// Split lines into near-horizontal and near-vertical sets, in that order.
/// A horizontal line has its normal near 90°; a vertical one near 0° or
/// 180°. Lines in between are dropped.
pub fn split_lines(lines: &[PolarLine], tolerance_deg: u32) -> (Vec<PolarLine>, Vec<PolarLine>) {
    let tol = tolerance_deg.min(44);
    let mut horizontal = Vec::new();
    let mut vertical = Vec::new();
    for line in lines {
        let angle = line.angle_in_degrees % 180;
        if angle.abs_diff(90) <= tol {
            horizontal.push(*line);
        } else if angle <= tol || angle >= 180 - tol {
            vertical.push(*line);
        }
    }
    (horizontal, vertical)
}

/// Quad bounded by two horizontal and two vertical lines.
fn quad_from_lines(h: [&PolarLine; 2], v: [&PolarLine; 2]) -> Option<Quad> {
    let pairs = [(h[0], v[0]), (h[0], v[1]), (h[1], v[1]), (h[1], v[0])];
    let mut corners = [Point2::origin(); 4];
    for (corner, (a, b)) in corners.iter_mut().zip(pairs) {
        *corner = intersect_polar_lines(a, b)?;
    }
    Some(Quad::from_unordered(corners))
}

/// Fraction of the segment `a`–`b` (ends excluded) lying on edge pixels.
fn side_support(edges: &GrayImage, a: Point2<f32>, b: Point2<f32>) -> f32 {
    let n = ((nalgebra::distance(&a, &b) / 2.0) as usize).max(8);
    let hits = (0..n)
        .filter(|&i| {
            let t = 0.1 + 0.8 * (i as f32 + 0.5) / n as f32;
            let p = a + (b - a) * t;
            let (x, y) = (p.x.round(), p.y.round());
            x >= 0.0
                && y >= 0.0
                && edges
                    .get_pixel_checked(x as u32, y as u32)
                    .is_some_and(|px| px[0] > 0)
        })
        .count();
    hits as f32 / n as f32
}

/// Best quad formed by Hough lines on `gray`, in working coordinates.
///
/// `border_px` is not applied here; it is a margin for the caller to add
/// once the quad has been mapped and refined.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(gray, quad_params, params), fields(width = gray.width(), height = gray.height()))
)]
pub fn fit_quad_from_lines(
    gray: &GrayImage,
    quad_params: &QuadParams,
    params: &LineFitParams,
) -> Option<QuadCandidate> {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return None;
    }

    let edges = if params.close_radius > 0 {
        let closed = grayscale_close(gray, &Mask::square(params.close_radius));
        canny(&closed, params.low_threshold, params.high_threshold)
    } else {
        canny(gray, params.low_threshold, params.high_threshold)
    };
    let edges = dilate(&edges, 1);

    let vote_threshold = ((w.min(h) as f32 * params.min_votes_frac).round() as u32).max(1);
    let lines = detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold,
            suppression_radius: params.suppression_radius,
        },
    );
    let (mut horizontal, mut vertical) = split_lines(&lines, params.angle_tolerance_deg);
    horizontal.truncate(params.max_lines);
    vertical.truncate(params.max_lines);
    debug!(
        "{} Hough lines ({} horizontal, {} vertical) at {} votes",
        lines.len(),
        horizontal.len(),
        vertical.len(),
        vote_threshold
    );

    let (wf, hf) = (w as f32, h as f32);
    let image_area = wf * hf;
    let inside = |p: &Point2<f32>| p.x >= -1.0 && p.y >= -1.0 && p.x <= wf && p.y <= hf;

    let mut candidates = Vec::new();
    for (i, h1) in horizontal.iter().enumerate() {
        for h2 in &horizontal[i + 1..] {
            for (j, v1) in vertical.iter().enumerate() {
                for v2 in &vertical[j + 1..] {
                    let Some(quad) = quad_from_lines([h1, h2], [v1, v2]) else {
                        continue;
                    };
                    if !quad.corners.iter().all(inside) || !quad.is_convex() {
                        continue;
                    }
                    let score = score_quad(&quad, image_area, quad_params);
                    if score.area_frac < quad_params.min_area_frac
                        || score.area_frac > quad_params.max_area_frac
                    {
                        continue;
                    }
                    candidates.push(QuadCandidate {
                        quad,
                        contour_index: None,
                        score,
                    });
                }
            }
        }
    }
    // Stable: equal scores keep line enumeration order.
    candidates.sort_by(|a, b| b.score.total.total_cmp(&a.score.total));
    trace!("{} line quads before support check", candidates.len());

    candidates.into_iter().find(|c| {
        let k = &c.quad.corners;
        (0..4).all(|s| side_support(&edges, k[s], k[(s + 1) % 4]) >= params.min_side_support)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn line(r: f32, angle_in_degrees: u32) -> PolarLine {
        PolarLine {
            r,
            angle_in_degrees,
        }
    }

    /// Light frame on a gray table with every corner knocked out, so each
    /// side is a separate stroke.
    fn broken_frame(w: u32, h: u32, rect: [u32; 4], gap: u32) -> GrayImage {
        let [x0, y0, x1, y1] = rect;
        GrayImage::from_fn(w, h, |x, y| {
            let on_h = (y0..y0 + 3).contains(&y) || (y1 - 3..y1).contains(&y);
            let on_v = (x0..x0 + 3).contains(&x) || (x1 - 3..x1).contains(&x);
            let in_h = (x0 + gap..x1 - gap).contains(&x);
            let in_v = (y0 + gap..y1 - gap).contains(&y);
            if (on_h && in_h) || (on_v && in_v) {
                Luma([240])
            } else {
                Luma([90])
            }
        })
    }

    #[test]
    fn perpendicular_lines_meet() {
        let p = intersect_polar_lines(&line(30.0, 0), &line(20.0, 90)).expect("crossing");
        assert!((p.x - 30.0).abs() < 1e-4 && (p.y - 20.0).abs() < 1e-4, "{p:?}");
    }

    #[test]
    fn parallel_lines_do_not_meet() {
        assert!(intersect_polar_lines(&line(10.0, 45), &line(50.0, 45)).is_none());
    }

    #[test]
    fn lines_split_by_normal_angle() {
        let lines = [
            line(10.0, 90),
            line(20.0, 84),
            line(30.0, 0),
            line(40.0, 176),
            line(50.0, 45),
        ];
        let (horizontal, vertical) = split_lines(&lines, 30);
        assert_eq!(horizontal, vec![lines[0], lines[1]]);
        assert_eq!(vertical, vec![lines[2], lines[3]]);
    }

    #[test]
    fn recovers_frame_with_missing_corners() {
        let img = broken_frame(600, 450, [100, 80, 500, 370], 20);
        let found = fit_quad_from_lines(&img, &QuadParams::default(), &LineFitParams::default())
            .expect("line quad");
        assert_eq!(found.contour_index, None);
        let expected = [[101.0, 81.0], [498.0, 81.0], [498.0, 368.0], [101.0, 368.0]];
        for (got, want) in found.quad.to_array().iter().zip(expected.iter()) {
            assert!(
                (got[0] - want[0]).abs() <= 8.0 && (got[1] - want[1]).abs() <= 8.0,
                "{got:?} vs {want:?}"
            );
        }
    }

    #[test]
    fn flat_plane_has_no_lines() {
        let img = GrayImage::from_pixel(200, 150, Luma([128]));
        assert!(
            fit_quad_from_lines(&img, &QuadParams::default(), &LineFitParams::default()).is_none()
        );
    }

    #[test]
    fn tiny_plane_is_skipped() {
        let img = GrayImage::from_pixel(2, 2, Luma([255]));
        assert!(
            fit_quad_from_lines(&img, &QuadParams::default(), &LineFitParams::default()).is_none()
        );
    }
}
