//! Document detection pipeline.
//!
//! Preprocessing, edge detection, contour tracing and quad selection run on
//! a downscaled copy of the input, with a Hough-line fallback when no contour
//! qualifies. The winning quad is mapped back to source coordinates, its
//! corners refined against the full-resolution image, and rectified.

mod error;
mod params;
mod pipeline;
mod result;

pub use error::DocumentDetectError;
pub use params::{DocumentDetectorParams, NoQuadPolicy};
pub use pipeline::{rectify_with_corners, DocumentDetector};
pub use result::{PipelineStage, RectificationResult};
