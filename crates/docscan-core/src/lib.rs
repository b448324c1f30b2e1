//! Core types and utilities for document boundary detection.
//!
//! This crate is intentionally small and purely geometric. It owns the pixel
//! buffer handed to the detector, the projective transform solver and the
//! planar polygon helpers. It does *not* depend on any image codec;
//! decoding and encoding belong to the caller.

mod geometry;
mod homography;
mod image;
mod logger;

pub use geometry::{
    approx_closed_polygon, convex_hull, distance, interior_angles_deg, is_strictly_convex,
    order_clockwise_from_origin, polygon_area, polygon_perimeter, segments_intersect,
};
pub use homography::{estimate_homography_rect_to_img, homography_from_4pt, Homography};
pub use image::{ImageBuffer, ImageError};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_env, init_with_level};
