use crate::quad::{Quad, QuadScore};
use crate::rectify::RectifiedDocument;
use docscan_core::ImageBuffer;
use serde::{Deserialize, Serialize};

/// Pipeline progress markers, logged as the detector runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Start,
    Preprocessed,
    ContoursExtracted,
    /// Contours gave no quad; Hough lines were tried instead.
    LineFit,
    QuadSelected,
    CornersRefined,
    NoQuadFound,
    Rectified,
    PassThrough,
}

/// Output of [`DocumentDetector::detect_and_rectify`](super::DocumentDetector::detect_and_rectify).
#[derive(Clone, Debug)]
pub enum RectificationResult {
    /// A document was found and rectified.
    Detected {
        document: RectifiedDocument,
        score: QuadScore,
    },
    /// Nothing was found; the input comes back untouched together with a
    /// default quad a caller can offer for manual adjustment. There is no
    /// suggestion for images under two pixels wide or tall.
    NotDetected {
        image: ImageBuffer,
        suggested_corners: Option<Quad>,
    },
}

impl RectificationResult {
    pub fn detected(&self) -> bool {
        matches!(self, Self::Detected { .. })
    }

    /// The rectified image, or the unchanged input.
    pub fn image(&self) -> &ImageBuffer {
        match self {
            Self::Detected { document, .. } => &document.image,
            Self::NotDetected { image, .. } => image,
        }
    }

    pub fn into_image(self) -> ImageBuffer {
        match self {
            Self::Detected { document, .. } => document.image,
            Self::NotDetected { image, .. } => image,
        }
    }

    /// Detected corners in source coordinates.
    pub fn corners(&self) -> Option<&Quad> {
        match self {
            Self::Detected { document, .. } => Some(&document.quad),
            Self::NotDetected { .. } => None,
        }
    }

    /// Detected corners, or the suggestion when nothing was found.
    pub fn corners_or_suggestion(&self) -> Option<&Quad> {
        match self {
            Self::Detected { document, .. } => Some(&document.quad),
            Self::NotDetected {
                suggested_corners, ..
            } => suggested_corners.as_ref(),
        }
    }

    /// Score of the selected quad; `None` when nothing was detected.
    pub fn confidence(&self) -> Option<f32> {
        match self {
            Self::Detected { score, .. } => Some(score.total),
            Self::NotDetected { .. } => None,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::Detected { .. } => PipelineStage::Rectified,
            Self::NotDetected { .. } => PipelineStage::PassThrough,
        }
    }
}
