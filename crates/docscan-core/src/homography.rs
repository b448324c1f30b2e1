use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Planar projective transform, `p' ~ H * p` in homogeneous coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    /// Map a point. Points on the line at infinity map to non-finite
    /// coordinates; callers that can hit it should check `is_finite`.
    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.h * Vector3::new(p.x as f64, p.y as f64, 1.0);
        let w = v[2];
        Point2::new((v[0] / w) as f32, (v[1] / w) as f32)
    }

    pub fn inverse(&self) -> Option<Self> {
        let inv = self.h.try_inverse()?;
        normalize_scale(inv).map(Self::new)
    }

    pub fn is_finite(&self) -> bool {
        self.h.iter().all(|v| v.is_finite())
    }
}

/// Translate to the centroid and scale so the mean distance is sqrt(2).
fn hartley_normalize(pts: &[Point2<f32>; 4]) -> ([Point2<f64>; 4], Matrix3<f64>) {
    let (cx, cy) = pts.iter().fold((0.0f64, 0.0f64), |(sx, sy), p| {
        (sx + p.x as f64, sy + p.y as f64)
    });
    let (cx, cy) = (cx / 4.0, cy / 4.0);

    let mean_dist = pts
        .iter()
        .map(|p| (p.x as f64 - cx).hypot(p.y as f64 - cy))
        .sum::<f64>()
        / 4.0;
    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let out = pts.map(|p| Point2::new(s * (p.x as f64 - cx), s * (p.y as f64 - cy)));
    (out, t)
}

fn normalize_scale(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    if s.abs() < 1e-12 {
        return None;
    }
    Some(h / s)
}

/// Compute H such that `dst ~ H * src`, from exactly four correspondences.
///
/// Corner order must be consistent between `src` and `dst`. Returns `None`
/// when the configuration is degenerate (three collinear points, repeated
/// points, or a singular result).
#[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
pub fn homography_from_4pt(src: &[Point2<f32>; 4], dst: &[Point2<f32>; 4]) -> Option<Homography> {
    // Unknowns: [h11 h12 h13 h21 h22 h23 h31 h32], with h33 = 1
    // h11 x + h12 y + h13 - u h31 x - u h32 y = u
    // h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let (src_n, t_src) = hartley_normalize(src);
    let (dst_n, t_dst) = hartley_normalize(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for (k, (s, d)) in src_n.iter().zip(dst_n.iter()).enumerate() {
        let (x, y, u, v) = (s.x, s.y, d.x, d.y);

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = r0 + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b)?;
    let hn = Matrix3::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    // H = T_dst^{-1} * Hn * T_src
    let h = t_dst.try_inverse()? * hn * t_src;
    let h = normalize_scale(h)?;
    if !h.iter().all(|v| v.is_finite()) || h.determinant().abs() < 1e-12 {
        return None;
    }
    Some(Homography::new(h))
}

/// Estimate H such that `p_img ~ H * p_rect` for an upright `width × height`
/// rectangle whose corners (TL, TR, BR, BL) land on `img_quad`.
pub fn estimate_homography_rect_to_img(
    width: f32,
    height: f32,
    img_quad: &[Point2<f32>; 4],
) -> Option<Homography> {
    let rect = [
        Point2::new(0.0, 0.0),
        Point2::new(width, 0.0),
        Point2::new(width, height),
        Point2::new(0.0, height),
    ];
    homography_from_4pt(&rect, img_quad)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point2<f32>, b: Point2<f32>, tol: f32) {
        let dx = (a.x - b.x).abs();
        let dy = (a.y - b.y).abs();
        assert!(
            dx < tol && dy < tol,
            "expected ({:.6},{:.6}) ~ ({:.6},{:.6}) within {}",
            a.x,
            a.y,
            b.x,
            b.y,
            tol
        );
    }

    #[test]
    fn inverse_round_trips_points() {
        let h = Homography::new(Matrix3::new(
            1.2, 0.1, 5.0, //
            -0.05, 0.9, 3.0, //
            0.001, 0.0005, 1.0,
        ));
        let inv = h.inverse().expect("invertible");

        for p in [
            Point2::new(0.0_f32, 0.0),
            Point2::new(50.0_f32, -20.0),
            Point2::new(320.0_f32, 200.0),
        ] {
            assert_close(inv.apply(h.apply(p)), p, 1e-3);
        }
    }

    #[test]
    fn four_point_solve_recovers_known_transform() {
        let ground_truth = Homography::new(Matrix3::new(
            0.8, 0.05, 120.0, //
            -0.02, 1.1, 80.0, //
            0.0009, -0.0004, 1.0,
        ));

        let rect = [
            Point2::new(0.0_f32, 0.0),
            Point2::new(180.0_f32, 0.0),
            Point2::new(180.0_f32, 130.0),
            Point2::new(0.0_f32, 130.0),
        ];
        let dst = rect.map(|p| ground_truth.apply(p));

        let recovered = homography_from_4pt(&rect, &dst).expect("recoverable");
        for p in [
            Point2::new(0.0_f32, 0.0),
            Point2::new(60.0, 40.0),
            Point2::new(150.0, 120.0),
        ] {
            assert_close(recovered.apply(p), ground_truth.apply(p), 1e-3);
        }
    }

    #[test]
    fn rect_to_img_maps_corners_onto_quad() {
        let quad = [
            Point2::new(100.0_f32, 100.0),
            Point2::new(900.0, 120.0),
            Point2::new(880.0, 700.0),
            Point2::new(120.0, 680.0),
        ];
        let h = estimate_homography_rect_to_img(800.0, 580.0, &quad).expect("solvable");
        assert_close(h.apply(Point2::new(0.0, 0.0)), quad[0], 1e-2);
        assert_close(h.apply(Point2::new(800.0, 0.0)), quad[1], 1e-2);
        assert_close(h.apply(Point2::new(800.0, 580.0)), quad[2], 1e-2);
        assert_close(h.apply(Point2::new(0.0, 580.0)), quad[3], 1e-2);
    }

    #[test]
    fn collinear_points_are_rejected() {
        let src = [
            Point2::new(0.0_f32, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(20.0, 0.0),
            Point2::new(30.0, 0.0),
        ];
        let dst = [
            Point2::new(0.0_f32, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        assert!(homography_from_4pt(&src, &dst).is_none());
    }
}
