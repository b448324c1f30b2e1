//! Canny edge detection and morphological closing of the edge map.

use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::{edges, morphology};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Edge detection configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeParams {
    /// Gradient magnitude (Sobel) that may continue an edge.
    pub low_threshold: f32,
    /// Gradient magnitude that starts an edge.
    pub high_threshold: f32,
    /// Half-size of the square closing kernel; `0` disables closing.
    pub close_radius: u8,
}

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            low_threshold: 50.0,
            high_threshold: 150.0,
            close_radius: 1,
        }
    }
}

/// Canny edges followed by closing. Edge pixels are 255, the rest 0.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(gray, params), fields(width = gray.width(), height = gray.height()))
)]
pub fn detect_edges(gray: &GrayImage, params: &EdgeParams) -> GrayImage {
    let edges = canny(gray, params.low_threshold, params.high_threshold);
    close(&edges, params.close_radius)
}

/// Canny edge detector on a single plane. Planes narrower or shorter than
/// three pixels have no interior and yield an empty map.
pub fn canny(gray: &GrayImage, low: f32, high: f32) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return GrayImage::new(w, h);
    }
    edges::canny(gray, low, high)
}

/// Grow foreground by `radius` pixels (square neighbourhood).
pub fn dilate(src: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return src.clone();
    }
    morphology::dilate(src, Norm::LInf, radius)
}

/// Dilation followed by erosion with a `(2r+1)²` square. Bridges gaps up to
/// `2 * radius` pixels.
pub fn close(src: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 || src.width() == 0 || src.height() == 0 {
        return src.clone();
    }
    morphology::close(src, Norm::LInf, radius)
}
