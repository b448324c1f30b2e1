//! Document boundary detection and perspective rectification.
//!
//! The pipeline takes a photo of a document lying on a background, finds the
//! four corners of the page and warps the page into an upright rectangle:
//!
//! 1. luminance (and optionally per-channel) planes at a working resolution,
//!    smoothed and contrast-normalised ([`preprocess`]);
//! 2. Canny edges with a morphological close ([`detect_edges`]);
//! 3. outer contours of the edge components ([`extract_contours`]);
//! 4. four-vertex convex approximations, filtered by area and ranked by a
//!    score favouring large, rectangular outlines ([`select_quad`]);
//! 5. if no contour qualifies, quads built from Hough lines
//!    ([`fit_quad_from_lines`]);
//! 6. corner refinement against the full-resolution image
//!    ([`refine_corners`]);
//! 7. a projective warp of the chosen quad ([`rectify`]).
//!
//! When nothing is found the input is returned unchanged together with a
//! suggested quad for manual correction ([`rectify_with_corners`]).
//!
//! ```no_run
//! use docscan_core::ImageBuffer;
//! use docscan_detect::{DocumentDetector, DocumentDetectorParams};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let image = ImageBuffer::from_pixel(640, 480, &[200, 200, 200])?;
//! let detector = DocumentDetector::new(DocumentDetectorParams::default());
//! let result = detector.detect_and_rectify(image)?;
//! println!("detected: {}", result.detected());
//! # Ok(())
//! # }
//! ```

mod contours;
mod detector;
mod edges;
mod io;
mod lines;
mod preprocess;
mod quad;
mod rectify;
mod refine;

pub use contours::{extract_contours, Contour, ContourParams};
pub use detector::{
    rectify_with_corners, DocumentDetectError, DocumentDetector, DocumentDetectorParams,
    NoQuadPolicy, PipelineStage, RectificationResult,
};
pub use edges::{canny, close, detect_edges, dilate, EdgeParams};
pub use io::{DocumentDetectConfig, DocumentDetectReport, DocumentIoError};
pub use lines::{fit_quad_from_lines, intersect_polar_lines, split_lines, LineFitParams};
pub use preprocess::{
    channel_planes, downscale, normalize_contrast, otsu_binarize, otsu_threshold, preprocess,
    to_luma, ChannelMode, PreprocessParams, Preprocessed,
};
pub use quad::{
    approximate_quad, quad_candidate, score_quad, select_quad, Quad, QuadCandidate, QuadParams,
    QuadScore,
};
pub use rectify::{
    rectify, rectify_rotated, rotate_quarter, target_size, validate_quad, warp_perspective,
    DegenerateQuad, RectifiedDocument, Rotation,
};
pub use refine::{refine_corners, RefineParams};

pub use docscan_core::{Homography, ImageBuffer, ImageError};

/// Run the detector with default parameters.
pub fn detect_and_rectify(image: ImageBuffer) -> Result<RectificationResult, DocumentDetectError> {
    DocumentDetector::default().detect_and_rectify(image)
}
