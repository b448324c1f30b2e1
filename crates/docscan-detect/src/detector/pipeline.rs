use super::{
    DocumentDetectError, DocumentDetectorParams, NoQuadPolicy, PipelineStage, RectificationResult,
};
use crate::contours::extract_contours;
use crate::edges::detect_edges;
use crate::lines::fit_quad_from_lines;
use crate::preprocess::{preprocess, to_luma, Preprocessed};
use crate::quad::{select_quad, Quad, QuadCandidate};
use crate::rectify::{rectify_rotated, RectifiedDocument, Rotation};
use crate::refine::refine_corners;
use docscan_core::{ImageBuffer, ImageError};
use log::{debug, info};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

fn log_stage(stage: PipelineStage, detail: std::fmt::Arguments<'_>) {
    debug!("[{:?}] {}", stage, detail);
}

/// Finds the document outline in a photo and rectifies it.
#[derive(Clone, Debug, Default)]
pub struct DocumentDetector {
    params: DocumentDetectorParams,
}

impl DocumentDetector {
    pub fn new(params: DocumentDetectorParams) -> Self {
        Self { params }
    }

    /// Detector parameters.
    #[inline]
    pub fn params(&self) -> &DocumentDetectorParams {
        &self.params
    }

    /// Locate the best document quad in source coordinates without
    /// rectifying. `Ok(None)` means no acceptable outline was found.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, image), fields(width = image.width(), height = image.height()))
    )]
    pub fn find_document(
        &self,
        image: &ImageBuffer,
    ) -> Result<Option<QuadCandidate>, DocumentDetectError> {
        log_stage(
            PipelineStage::Start,
            format_args!(
                "{}x{} with {} channel(s)",
                image.width(),
                image.height(),
                image.channels()
            ),
        );

        let pre = preprocess(image, &self.params.preprocess, self.params.channel_mode)?;
        log_stage(
            PipelineStage::Preprocessed,
            format_args!("working size {}x{}", pre.width(), pre.height()),
        );

        let mut best: Option<QuadCandidate> = None;
        for (plane_idx, plane) in pre.planes.iter().enumerate() {
            let edges = detect_edges(plane, &self.params.edges);
            let contours = extract_contours(&edges, &self.params.contours);
            log_stage(
                PipelineStage::ContoursExtracted,
                format_args!("plane {}: {} contour(s)", plane_idx, contours.len()),
            );

            let Some(candidate) =
                select_quad(&contours, pre.width(), pre.height(), &self.params.quad)
            else {
                continue;
            };
            // Earlier planes win ties.
            if best
                .as_ref()
                .is_none_or(|b| candidate.score.total > b.score.total)
            {
                best = Some(candidate);
            }
        }

        if best.is_none() && self.params.line_fit.enabled {
            log_stage(
                PipelineStage::LineFit,
                format_args!("no contour quad, trying Hough lines"),
            );
            for plane in &pre.planes {
                let Some(candidate) =
                    fit_quad_from_lines(plane, &self.params.quad, &self.params.line_fit)
                else {
                    continue;
                };
                if best
                    .as_ref()
                    .is_none_or(|b| candidate.score.total > b.score.total)
                {
                    best = Some(candidate);
                }
            }
        }

        let Some(candidate) = best else {
            log_stage(PipelineStage::NoQuadFound, format_args!("no candidate"));
            return Ok(None);
        };
        let mut candidate = to_source(candidate, &pre, image);
        log_stage(
            PipelineStage::QuadSelected,
            format_args!(
                "contour {:?} score {:.3} corners {:?}",
                candidate.contour_index,
                candidate.score.total,
                candidate.quad.to_array()
            ),
        );

        let scale = pre.scale_x.max(pre.scale_y);
        if self.params.refine.enabled && scale > 1.0 {
            let radius = self.params.refine.search_radius * scale + 1.0;
            candidate.quad =
                refine_corners(&to_luma(image), &candidate.quad, radius, &self.params.refine);
            log_stage(
                PipelineStage::CornersRefined,
                format_args!("corners {:?}", candidate.quad.to_array()),
            );
        }

        let border = self.params.line_fit.border_px * scale;
        if candidate.contour_index.is_none() && border > 0.0 {
            candidate.quad = clamp_to_image(candidate.quad.expanded(border), image);
        }
        Ok(Some(candidate))
    }

    /// Detect the document and return it rectified, or pass the input
    /// through when nothing is found (see [`NoQuadPolicy`]).
    pub fn detect_and_rectify(
        &self,
        image: ImageBuffer,
    ) -> Result<RectificationResult, DocumentDetectError> {
        match self.find_document(&image)? {
            Some(candidate) => {
                let document = rectify_rotated(&image, &candidate.quad, self.params.rotation)?;
                log_stage(
                    PipelineStage::Rectified,
                    format_args!("{}x{}", document.image.width(), document.image.height()),
                );
                info!(
                    "document found (score {:.3}), rectified to {}x{}",
                    candidate.score.total,
                    document.image.width(),
                    document.image.height()
                );
                Ok(RectificationResult::Detected {
                    document,
                    score: candidate.score,
                })
            }
            None => match self.params.no_quad_policy {
                NoQuadPolicy::Fail => Err(DocumentDetectError::NoDocumentFound),
                NoQuadPolicy::PassThrough => {
                    let suggested_corners = Quad::inset_frame(
                        image.width(),
                        image.height(),
                        self.params.fallback_inset_px,
                    );
                    log_stage(
                        PipelineStage::PassThrough,
                        format_args!("returning input unchanged"),
                    );
                    info!("no document found, returning input unchanged");
                    Ok(RectificationResult::NotDetected {
                        image,
                        suggested_corners,
                    })
                }
            },
        }
    }
}

/// Rectify with caller-supplied corners in TL, TR, BR, BL order, e.g. after
/// manual adjustment of a suggestion. Corners are used as given; a crossing
/// order is reported as degenerate rather than silently reordered.
pub fn rectify_with_corners(
    image: &ImageBuffer,
    corners: [Point2<f32>; 4],
    rotation: Rotation,
) -> Result<RectifiedDocument, DocumentDetectError> {
    if image.is_empty() {
        return Err(ImageError::ZeroArea {
            width: image.width(),
            height: image.height(),
        }
        .into());
    }
    Ok(rectify_rotated(image, &Quad::new(corners), rotation)?)
}

/// Map a working-resolution candidate back to source pixel coordinates.
fn to_source(candidate: QuadCandidate, pre: &Preprocessed, image: &ImageBuffer) -> QuadCandidate {
    let (sx, sy) = (pre.scale_x, pre.scale_y);
    let quad = candidate
        .quad
        .map(|p| Point2::new((p.x + 0.5) * sx - 0.5, (p.y + 0.5) * sy - 0.5));
    QuadCandidate {
        quad: clamp_to_image(quad, image),
        ..candidate
    }
}

fn clamp_to_image(quad: Quad, image: &ImageBuffer) -> Quad {
    let max_x = image.width().saturating_sub(1) as f32;
    let max_y = image.height().saturating_sub(1) as f32;
    quad.map(|p| Point2::new(p.x.clamp(0.0, max_x), p.y.clamp(0.0, max_y)))
}
