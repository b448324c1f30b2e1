//! Full-resolution corner refinement.
//!
//! Corners found on the downscaled working plane are only accurate to a few
//! working pixels, which becomes tens of source pixels on large photos. Each
//! side is re-located in the source luminance by searching along its normal
//! for the strongest intensity step, a line is fitted through the hits, and
//! adjacent lines are intersected to give the new corners.

use image::GrayImage;
use log::{debug, trace};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

use crate::quad::Quad;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Corner refinement configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineParams {
    /// Refine corners whenever detection ran on a downscaled plane.
    pub enabled: bool,
    /// Search half-width across each side, in working pixels.
    pub search_radius: f32,
    /// Sample positions per side.
    pub samples_per_side: usize,
    /// Fraction of each side skipped at both ends.
    pub end_margin: f32,
    /// Smallest step (gray levels across two pixels) accepted as an edge.
    pub min_contrast: f32,
    /// Refinement passes; each later pass halves the search radius.
    pub iterations: usize,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            enabled: true,
            search_radius: 4.0,
            samples_per_side: 48,
            end_margin: 0.15,
            min_contrast: 20.0,
            iterations: 2,
        }
    }
}

/// Line through `point` along unit `dir`.
#[derive(Clone, Copy, Debug)]
struct Line {
    point: Point2<f32>,
    dir: Vector2<f32>,
}

impl Line {
    fn through(a: Point2<f32>, b: Point2<f32>) -> Self {
        Self {
            point: a,
            dir: (b - a).normalize(),
        }
    }

    fn distance(&self, p: &Point2<f32>) -> f32 {
        let d = p - self.point;
        (d.x * self.dir.y - d.y * self.dir.x).abs()
    }

    fn intersect(&self, other: &Line) -> Option<Point2<f32>> {
        let cross = self.dir.x * other.dir.y - self.dir.y * other.dir.x;
        if cross.abs() < 1e-6 {
            return None;
        }
        let d = other.point - self.point;
        let t = (d.x * other.dir.y - d.y * other.dir.x) / cross;
        Some(self.point + self.dir * t)
    }
}

fn luma_at(gray: &GrayImage, x: f32, y: f32) -> Option<f32> {
    if x < 0.0 || y < 0.0 {
        return None;
    }
    gray.get_pixel_checked(x as u32, y as u32)
        .map(|px| px[0] as f32)
}

/// Offset along `normal` from `p` of the strongest step within `radius`,
/// with sub-pixel parabolic interpolation.
fn strongest_step(
    gray: &GrayImage,
    p: Point2<f32>,
    normal: Vector2<f32>,
    radius: i32,
    min_contrast: f32,
) -> Option<f32> {
    // (offset of the sampled pixel along the normal, value)
    let profile: Vec<(f32, f32)> = (-radius - 1..=radius + 1)
        .map(|o| {
            let q = p + normal * o as f32;
            let (x, y) = (q.x.round(), q.y.round());
            let v = luma_at(gray, x, y)?;
            Some(((Point2::new(x, y) - p).dot(&normal), v))
        })
        .collect::<Option<_>>()?;
    // steps[i] is the central difference around profile[i + 1].
    let steps: Vec<f32> = profile
        .windows(3)
        .map(|w| (w[2].1 - w[0].1).abs())
        .collect();
    let at = |i: usize| profile[i + 1].0;

    let (best, &peak) = steps
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    if peak < min_contrast {
        return None;
    }
    let mut offset = at(best);
    if best > 0 && best + 1 < steps.len() {
        let (l, r) = (steps[best - 1], steps[best + 1]);
        let denom = l - 2.0 * peak + r;
        if denom < 0.0 {
            let delta = (0.5 * (l - r) / denom).clamp(-0.5, 0.5);
            let spacing = if delta > 0.0 {
                at(best + 1) - at(best)
            } else {
                at(best) - at(best - 1)
            };
            offset += delta * spacing;
        }
    }
    Some(offset)
}

/// Total least squares line through `points`.
fn fit_line(points: &[Point2<f32>]) -> Option<Line> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f32;
    let c = points
        .iter()
        .fold(Point2::origin(), |acc, p| acc + p.coords / n);
    let (mut sxx, mut syy, mut sxy) = (0.0f32, 0.0f32, 0.0f32);
    for p in points {
        let d = p - c;
        sxx += d.x * d.x;
        syy += d.y * d.y;
        sxy += d.x * d.y;
    }
    let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    Some(Line {
        point: c,
        dir: Vector2::new(theta.cos(), theta.sin()),
    })
}

/// Re-fit the side `a`–`b`; `None` when too few edge hits are found.
fn refine_side(
    gray: &GrayImage,
    a: Point2<f32>,
    b: Point2<f32>,
    radius: f32,
    params: &RefineParams,
) -> Option<Line> {
    let along = b - a;
    if along.norm() < 1.0 {
        return None;
    }
    let dir = along.normalize();
    let normal = Vector2::new(-dir.y, dir.x);
    let r = radius.ceil().max(1.0) as i32;

    let n = params.samples_per_side.max(2);
    let span = (1.0 - 2.0 * params.end_margin).clamp(0.0, 1.0);
    let hits: Vec<Point2<f32>> = (0..n)
        .filter_map(|i| {
            let t = params.end_margin + span * (i as f32 + 0.5) / n as f32;
            let p = a + along * t;
            strongest_step(gray, p, normal, r, params.min_contrast).map(|o| p + normal * o)
        })
        .collect();
    if hits.len() < (n / 3).max(5) {
        return None;
    }

    // One trimming pass drops hits on nearby clutter.
    let line = fit_line(&hits)?;
    let inliers: Vec<Point2<f32>> = hits
        .iter()
        .copied()
        .filter(|p| line.distance(p) <= 1.5)
        .collect();
    if inliers.len() * 2 < hits.len() || inliers.len() < 5 {
        return Some(line);
    }
    fit_line(&inliers)
}

fn refine_once(gray: &GrayImage, quad: &Quad, radius: f32, params: &RefineParams) -> Quad {
    let k = &quad.corners;
    let fitted: [Option<Line>; 4] =
        std::array::from_fn(|s| refine_side(gray, k[s], k[(s + 1) % 4], radius, params));
    if fitted.iter().all(Option::is_none) {
        return *quad;
    }
    let sides: [Line; 4] = std::array::from_fn(|s| {
        fitted[s].unwrap_or_else(|| Line::through(k[s], k[(s + 1) % 4]))
    });

    let mut corners = quad.corners;
    for (i, corner) in corners.iter_mut().enumerate() {
        // Corner i joins side i-1 (incoming) and side i (outgoing).
        let incoming = &sides[(i + 3) % 4];
        if let Some(p) = incoming.intersect(&sides[i]) {
            *corner = p;
        }
    }

    let refined = Quad::new(corners);
    let moved_too_far = corners
        .iter()
        .zip(quad.corners.iter())
        .any(|(n, o)| nalgebra::distance(n, o) > 2.0 * radius);
    let finite = corners.iter().all(|p| p.x.is_finite() && p.y.is_finite());
    if !finite || moved_too_far || !refined.is_convex() {
        trace!("refinement rejected, keeping corners");
        return *quad;
    }
    refined
}

/// Refine `quad` (source coordinates) against the full-resolution luma
/// plane. `radius` is the initial search half-width in source pixels. The
/// input corners are returned when no consistent refinement exists.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(gray, quad, params), fields(width = gray.width(), height = gray.height()))
)]
pub fn refine_corners(gray: &GrayImage, quad: &Quad, radius: f32, params: &RefineParams) -> Quad {
    let max_x = gray.width().saturating_sub(1) as f32;
    let max_y = gray.height().saturating_sub(1) as f32;
    let mut current = *quad;
    let mut r = radius;
    for _ in 0..params.iterations {
        current = refine_once(gray, &current, r, params);
        r = (r / 2.0).max(2.0);
    }
    let refined = current.map(|p| Point2::new(p.x.clamp(0.0, max_x), p.y.clamp(0.0, max_y)));
    debug!(
        "corners refined: {:?} -> {:?}",
        quad.to_array(),
        refined.to_array()
    );
    refined
}
