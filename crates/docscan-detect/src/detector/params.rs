use crate::contours::ContourParams;
use crate::edges::EdgeParams;
use crate::lines::LineFitParams;
use crate::preprocess::{ChannelMode, PreprocessParams};
use crate::quad::QuadParams;
use crate::rectify::Rotation;
use crate::refine::RefineParams;
use serde::{Deserialize, Serialize};

/// What to do when no document outline is found.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoQuadPolicy {
    /// Return the input unchanged along with suggested corners.
    #[default]
    PassThrough,
    /// Fail with [`DocumentDetectError::NoDocumentFound`](super::DocumentDetectError::NoDocumentFound).
    Fail,
}

/// Configuration for the document detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentDetectorParams {
    /// Planes searched for an outline. The best candidate over all planes wins.
    pub channel_mode: ChannelMode,
    pub preprocess: PreprocessParams,
    pub edges: EdgeParams,
    pub contours: ContourParams,
    pub quad: QuadParams,
    /// Hough-line fallback, tried only when no contour yields a quad.
    pub line_fit: LineFitParams,
    /// Full-resolution corner refinement after a downscaled detection.
    pub refine: RefineParams,
    pub no_quad_policy: NoQuadPolicy,
    /// Quarter-turn applied to the rectified output.
    pub rotation: Rotation,
    /// Inset (source pixels) of the suggested corners returned when nothing
    /// is detected.
    pub fallback_inset_px: f32,
}

impl Default for DocumentDetectorParams {
    fn default() -> Self {
        Self {
            channel_mode: ChannelMode::default(),
            preprocess: PreprocessParams::default(),
            edges: EdgeParams::default(),
            contours: ContourParams::default(),
            quad: QuadParams::default(),
            line_fit: LineFitParams::default(),
            refine: RefineParams::default(),
            no_quad_policy: NoQuadPolicy::default(),
            rotation: Rotation::default(),
            fallback_inset_px: 100.0,
        }
    }
}
