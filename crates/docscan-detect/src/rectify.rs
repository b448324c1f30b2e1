//! Perspective rectification of a quadrilateral region into an upright image.

use docscan_core::{distance, estimate_homography_rect_to_img, Homography, ImageBuffer};
use image::{Luma, Pixel, Rgb, Rgba};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::quad::Quad;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Why a quadrilateral cannot be rectified.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegenerateQuad {
    #[error("corner coordinates are not finite")]
    NonFinite,
    #[error("opposite sides intersect")]
    SelfIntersecting,
    #[error("quadrilateral is not strictly convex")]
    NonConvex,
    #[error("quadrilateral has zero width or height")]
    ZeroExtent,
    #[error("perspective transform is singular")]
    SingularTransform,
}

/// Quarter-turn applied to the rectified image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Clockwise rotation from degrees; only multiples of 90 are accepted.
    pub fn from_degrees(deg: i32) -> Option<Self> {
        match deg.rem_euclid(360) {
            0 => Some(Self::None),
            90 => Some(Self::Cw90),
            180 => Some(Self::Cw180),
            270 => Some(Self::Cw270),
            _ => None,
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }
}

/// A rectified document and the geometry that produced it.
#[derive(Clone, Debug)]
pub struct RectifiedDocument {
    /// Upright output, same channel count as the input.
    pub image: ImageBuffer,
    /// Source-image corners, TL, TR, BR, BL.
    pub quad: Quad,
    /// Maps rectified pixel coordinates (before rotation) to the source.
    pub h_img_from_rect: Homography,
    pub rotation: Rotation,
}

/// Check that a quad can be warped: finite corners, no crossing sides,
/// strictly convex.
pub fn validate_quad(quad: &Quad) -> Result<(), DegenerateQuad> {
    if !quad.is_finite() {
        return Err(DegenerateQuad::NonFinite);
    }
    if quad.is_self_intersecting() {
        return Err(DegenerateQuad::SelfIntersecting);
    }
    if !quad.is_convex() {
        return Err(DegenerateQuad::NonConvex);
    }
    Ok(())
}

/// Output size: the longer of each pair of opposite sides, rounded.
pub fn target_size(quad: &Quad) -> Result<(usize, usize), DegenerateQuad> {
    let [tl, tr, br, bl] = quad.corners;
    let w = distance(tl, tr).max(distance(bl, br));
    let h = distance(tl, bl).max(distance(tr, br));
    if !w.is_finite() || !h.is_finite() {
        return Err(DegenerateQuad::NonFinite);
    }
    if w <= 0.0 || h <= 0.0 {
        return Err(DegenerateQuad::ZeroExtent);
    }
    Ok(((w.round() as usize).max(1), (h.round() as usize).max(1)))
}

/// Bilinear resample of the region bounded by `quad` into an
/// `out_w × out_h` image whose corners land on the quad's corners.
///
/// Samples falling outside the source are black. Returns `None` when the
/// quad admits no projective map.
pub fn warp_perspective(
    src: &ImageBuffer,
    quad: &Quad,
    out_w: usize,
    out_h: usize,
) -> Option<ImageBuffer> {
    let (w, h) = (out_w as f32, out_h as f32);
    let from = quad.corners.map(|p| (p.x, p.y));
    let to = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
    let projection = Projection::from_control_points(from, to)?;

    let data = match src.channels() {
        1 => warp_channels::<Luma<u8>>(src, &projection, out_w, out_h),
        3 => warp_channels::<Rgb<u8>>(src, &projection, out_w, out_h),
        _ => warp_channels::<Rgba<u8>>(src, &projection, out_w, out_h),
    }?;
    ImageBuffer::new(out_w, out_h, src.channels(), data).ok()
}

fn warp_channels<P>(
    src: &ImageBuffer,
    projection: &Projection,
    out_w: usize,
    out_h: usize,
) -> Option<Vec<u8>>
where
    P: Pixel<Subpixel = u8> + Send + Sync + 'static,
{
    let input = image::ImageBuffer::<P, Vec<u8>>::from_raw(
        src.width() as u32,
        src.height() as u32,
        src.as_raw().to_vec(),
    )?;
    let mut output = image::ImageBuffer::<P, Vec<u8>>::new(out_w as u32, out_h as u32);
    let black = *P::from_slice(&[0u8; 4][..P::CHANNEL_COUNT as usize]);
    warp_into(&input, projection, Interpolation::Bilinear, black, &mut output);
    Some(output.into_raw())
}

/// Warp the region bounded by `quad` into an upright rectangle.
pub fn rectify(src: &ImageBuffer, quad: &Quad) -> Result<RectifiedDocument, DegenerateQuad> {
    rectify_rotated(src, quad, Rotation::None)
}

/// [`rectify`] followed by a quarter-turn of the output.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(src, quad), fields(width = src.width(), height = src.height()))
)]
pub fn rectify_rotated(
    src: &ImageBuffer,
    quad: &Quad,
    rotation: Rotation,
) -> Result<RectifiedDocument, DegenerateQuad> {
    validate_quad(quad)?;
    let (out_w, out_h) = target_size(quad)?;
    let h_img_from_rect = estimate_homography_rect_to_img(out_w as f32, out_h as f32, &quad.corners)
        .filter(Homography::is_finite)
        .ok_or(DegenerateQuad::SingularTransform)?;

    let warped =
        warp_perspective(src, quad, out_w, out_h).ok_or(DegenerateQuad::SingularTransform)?;
    let image = rotate_quarter(&warped, rotation);
    debug!(
        "rectified to {}x{} (rotation {}°)",
        image.width(),
        image.height(),
        rotation.degrees()
    );

    Ok(RectifiedDocument {
        image,
        quad: *quad,
        h_img_from_rect,
        rotation,
    })
}

/// Rotate by a multiple of 90° clockwise.
pub fn rotate_quarter(src: &ImageBuffer, rotation: Rotation) -> ImageBuffer {
    let (w, h) = (src.width(), src.height());
    let (out_w, out_h) = match rotation {
        Rotation::None => return src.clone(),
        Rotation::Cw180 => (w, h),
        Rotation::Cw90 | Rotation::Cw270 => (h, w),
    };

    src.resampled(out_w, out_h, |x, y, px| {
        let (sx, sy) = match rotation {
            Rotation::Cw90 => (y, h - 1 - x),
            Rotation::Cw180 => (w - 1 - x, h - 1 - y),
            Rotation::Cw270 => (w - 1 - y, x),
            Rotation::None => (x, y),
        };
        px.copy_from_slice(src.pixel(sx, sy));
    })
}
