use crate::rectify::DegenerateQuad;
use docscan_core::ImageError;

/// Errors returned by the document detector.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DocumentDetectError {
    #[error("invalid input image: {0}")]
    InvalidInput(#[from] ImageError),
    #[error("degenerate quadrilateral: {0}")]
    DegenerateQuadrilateral(#[from] DegenerateQuad),
    #[error("no document boundary found")]
    NoDocumentFound,
}
