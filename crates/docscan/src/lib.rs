//! High-level facade crate for the `docscan-*` workspace.
//!
//! This crate provides:
//! - re-exports of the core and detector crates
//! - (feature-gated) helpers that run the detector directly on
//!   `image::DynamicImage` values or raw pixel buffers.
//!
//! ## Quickstart
//!
//! ```no_run
//! use docscan::detect;
//! use docscan::DocumentDetectorParams;
//! use image::ImageReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let img = ImageReader::open("photo.jpg")?.decode()?;
//! let scan = detect::detect_and_rectify_image(&img, &DocumentDetectorParams::default())?;
//! println!("detected: {}", scan.detected);
//! scan.image.save("page.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `docscan::core`: pixel buffers, homographies, polygon helpers.
//! - `docscan::detector`: the detection pipeline and its stages.
//! - `docscan::detect` (feature `image`): helpers from `image::DynamicImage`.

pub use docscan_core as core;
pub use docscan_detect as detector;

pub use docscan_core::{Homography, ImageBuffer, ImageError};
pub use docscan_detect::{
    detect_and_rectify, rectify_with_corners, ChannelMode, DegenerateQuad, DocumentDetectError,
    DocumentDetector, DocumentDetectorParams, NoQuadPolicy, Quad, RectificationResult,
    RectifiedDocument, Rotation,
};

#[cfg(feature = "image")]
pub mod detect;
