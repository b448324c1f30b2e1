//! Outer boundary tracing of connected edge components.

use docscan_core::{polygon_area, polygon_perimeter};
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Contour filtering configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourParams {
    /// Contours whose closed length is below this (working pixels) are
    /// dropped as noise.
    pub min_perimeter: f32,
    /// Minimum number of boundary pixels.
    pub min_points: usize,
}

impl Default for ContourParams {
    fn default() -> Self {
        Self {
            min_perimeter: 60.0,
            min_points: 8,
        }
    }
}

/// Closed boundary of one edge component, in pixel coordinates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contour {
    /// Position in extraction order; used as the deterministic tie-breaker.
    pub index: usize,
    pub points: Vec<Point2<i32>>,
}

impl Contour {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn to_f32(&self) -> Vec<Point2<f32>> {
        self.points
            .iter()
            .map(|p| Point2::new(p.x as f32, p.y as f32))
            .collect()
    }

    pub fn area(&self) -> f32 {
        polygon_area(&self.to_f32())
    }

    pub fn perimeter(&self) -> f32 {
        polygon_perimeter(&self.to_f32())
    }
}

/// Extract outer contours from a binary edge map (non-zero is foreground).
///
/// Hole borders are skipped. Contours come out in raster order of their
/// first pixel and `index` counts the kept ones.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(edges, params), fields(width = edges.width(), height = edges.height()))
)]
pub fn extract_contours(edges: &GrayImage, params: &ContourParams) -> Vec<Contour> {
    let traced = find_contours::<i32>(edges);
    let outer = traced
        .iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .count();

    let mut contours = Vec::new();
    for c in traced {
        if c.border_type != BorderType::Outer {
            continue;
        }
        let contour = Contour {
            index: contours.len(),
            points: c.points.iter().map(|p| Point2::new(p.x, p.y)).collect(),
        };
        if contour.len() >= params.min_points && contour.perimeter() >= params.min_perimeter {
            contours.push(contour);
        }
    }

    debug!("{} outer borders, {} contours kept", outer, contours.len());
    contours
}
