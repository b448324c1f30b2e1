use crate::{
    core, detector, DocumentDetectError, DocumentDetector, DocumentDetectorParams, Quad,
    RectificationResult, Rotation,
};
use ::image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors produced by the high-level facade helpers.
#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error("invalid image buffer length (expected {expected} bytes, got {got})")]
    InvalidBuffer { expected: usize, got: usize },

    #[error("invalid image dimensions (width={width}, height={height}, channels={channels})")]
    InvalidDimensions {
        width: u32,
        height: u32,
        channels: usize,
    },

    #[error(transparent)]
    Image(#[from] core::ImageError),

    #[error(transparent)]
    Detect(#[from] DocumentDetectError),
}

/// Outcome of running the detector on an `image::DynamicImage`.
#[derive(Clone, Debug)]
pub struct DocumentScan {
    /// Rectified page, or the untouched input when nothing was detected.
    pub image: DynamicImage,
    pub detected: bool,
    /// Detected corners, or the suggested inset quad when nothing was found
    /// (absent for images under two pixels wide or tall).
    pub corners: Option<Quad>,
    pub confidence: Option<f32>,
}

/// Convert any `DynamicImage` into an [`core::ImageBuffer`]. Gray images stay
/// single-channel, images with alpha become RGBA, everything else RGB.
pub fn image_buffer_from_dynamic(img: &DynamicImage) -> Result<core::ImageBuffer, DetectError> {
    let color = img.color();
    let (w, h) = (img.width() as usize, img.height() as usize);
    let buf = match (color.has_color(), color.has_alpha()) {
        (false, false) => core::ImageBuffer::new(w, h, 1, img.to_luma8().into_raw())?,
        (_, true) => core::ImageBuffer::new(w, h, 4, img.to_rgba8().into_raw())?,
        (true, false) => core::ImageBuffer::new(w, h, 3, img.to_rgb8().into_raw())?,
    };
    Ok(buf)
}

/// Convert an [`core::ImageBuffer`] back into a `DynamicImage`.
pub fn dynamic_from_image_buffer(buf: core::ImageBuffer) -> Result<DynamicImage, DetectError> {
    let (width, height, channels) = (buf.width() as u32, buf.height() as u32, buf.channels());
    let invalid = DetectError::InvalidDimensions {
        width,
        height,
        channels,
    };
    let raw = buf.into_raw();
    match channels {
        1 => GrayImage::from_raw(width, height, raw)
            .map(DynamicImage::ImageLuma8)
            .ok_or(invalid),
        3 => RgbImage::from_raw(width, height, raw)
            .map(DynamicImage::ImageRgb8)
            .ok_or(invalid),
        4 => RgbaImage::from_raw(width, height, raw)
            .map(DynamicImage::ImageRgba8)
            .ok_or(invalid),
        _ => Err(invalid),
    }
}

/// Wrap a raw interleaved 8-bit buffer (1, 3 or 4 channels).
pub fn image_buffer_from_slice(
    width: u32,
    height: u32,
    channels: usize,
    pixels: &[u8],
) -> Result<core::ImageBuffer, DetectError> {
    let w = usize::try_from(width).ok();
    let h = usize::try_from(height).ok();
    let invalid = DetectError::InvalidDimensions {
        width,
        height,
        channels,
    };
    let Some((w, h)) = w.zip(h) else {
        return Err(invalid);
    };
    let Some(expected) = w.checked_mul(h).and_then(|n| n.checked_mul(channels)) else {
        return Err(invalid);
    };
    if pixels.len() != expected {
        return Err(DetectError::InvalidBuffer {
            expected,
            got: pixels.len(),
        });
    }
    Ok(core::ImageBuffer::new(w, h, channels, pixels.to_vec())?)
}

/// Detect and rectify a document in a decoded image.
///
/// When nothing is found (and the policy is pass-through) the input image is
/// returned as is, without any colour conversion.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(img, params), fields(width = img.width(), height = img.height()))
)]
pub fn detect_and_rectify_image(
    img: &DynamicImage,
    params: &DocumentDetectorParams,
) -> Result<DocumentScan, DetectError> {
    let buf = image_buffer_from_dynamic(img)?;
    let detector = DocumentDetector::new(params.clone());
    match detector.detect_and_rectify(buf)? {
        RectificationResult::Detected { document, score } => Ok(DocumentScan {
            corners: Some(document.quad),
            image: dynamic_from_image_buffer(document.image)?,
            detected: true,
            confidence: Some(score.total),
        }),
        RectificationResult::NotDetected {
            suggested_corners, ..
        } => Ok(DocumentScan {
            image: img.clone(),
            detected: false,
            corners: suggested_corners,
            confidence: None,
        }),
    }
}

/// Convenience overload using default parameters.
pub fn detect_and_rectify_image_default(img: &DynamicImage) -> Result<DocumentScan, DetectError> {
    detect_and_rectify_image(img, &DocumentDetectorParams::default())
}

/// Rectify with caller-supplied corners (TL, TR, BR, BL), e.g. a suggestion
/// the user has adjusted by hand.
pub fn rectify_image_with_corners(
    img: &DynamicImage,
    corners: [[f32; 2]; 4],
    rotation: Rotation,
) -> Result<DynamicImage, DetectError> {
    let buf = image_buffer_from_dynamic(img)?;
    let corners = corners.map(|[x, y]| Point2::new(x, y));
    let document = detector::rectify_with_corners(&buf, corners, rotation)?;
    dynamic_from_image_buffer(document.image)
}

/// Detect from a raw interleaved buffer.
pub fn detect_and_rectify_from_u8(
    width: u32,
    height: u32,
    channels: usize,
    pixels: &[u8],
    params: &DocumentDetectorParams,
) -> Result<RectificationResult, DetectError> {
    let buf = image_buffer_from_slice(width, height, channels, pixels)?;
    Ok(DocumentDetector::new(params.clone()).detect_and_rectify(buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{Luma, Rgb};

    fn page_photo() -> DynamicImage {
        let img = RgbImage::from_fn(240, 180, |x, y| {
            if (40..200).contains(&x) && (30..150).contains(&y) {
                Rgb([238, 236, 230])
            } else {
                Rgb([35, 38, 44])
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn slice_length_is_checked() {
        let err = image_buffer_from_slice(4, 4, 3, &[0u8; 47]).unwrap_err();
        assert!(matches!(
            err,
            DetectError::InvalidBuffer {
                expected: 48,
                got: 47
            }
        ));
    }

    #[test]
    fn unsupported_channels_are_rejected() {
        let err = image_buffer_from_slice(2, 2, 2, &[0u8; 8]).unwrap_err();
        assert!(matches!(err, DetectError::Image(_)));
    }

    #[test]
    fn gray_images_stay_single_channel() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 6, Luma([77])));
        let buf = image_buffer_from_dynamic(&img).expect("convert");
        assert_eq!(buf.channels(), 1);
        let back = dynamic_from_image_buffer(buf).expect("back");
        assert_eq!(back.to_luma8().get_pixel(3, 3).0, [77]);
    }

    #[test]
    fn rgba_keeps_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(3, 3));
        assert_eq!(image_buffer_from_dynamic(&img).expect("convert").channels(), 4);
    }

    #[test]
    fn detects_page_in_dynamic_image() {
        let scan = detect_and_rectify_image_default(&page_photo()).expect("scan");
        assert!(scan.detected);
        assert!(matches!(scan.image, DynamicImage::ImageRgb8(_)));
        assert!((scan.image.width() as i32 - 160).abs() <= 3);
        assert!((scan.image.height() as i32 - 120).abs() <= 3);
    }

    #[test]
    fn pass_through_returns_input_as_is() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 80, Rgb([9, 9, 9])));
        let scan = detect_and_rectify_image_default(&img).expect("scan");
        assert!(!scan.detected);
        assert_eq!(scan.image, img);
        assert!(scan.corners.is_some());
    }

    #[test]
    fn single_pixel_image_has_no_suggestion() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([200, 10, 10])));
        let scan = detect_and_rectify_image_default(&img).expect("scan");
        assert!(!scan.detected);
        assert!(scan.corners.is_none());
    }

    #[test]
    fn manual_corners_rectify() {
        let out = rectify_image_with_corners(
            &page_photo(),
            [[40.0, 30.0], [200.0, 30.0], [200.0, 150.0], [40.0, 150.0]],
            Rotation::Cw270,
        )
        .expect("rectify");
        assert_eq!((out.width(), out.height()), (120, 160));
    }
}
