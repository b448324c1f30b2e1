//! Grayscale conversion, working-resolution downscale, smoothing and
//! contrast normalisation ahead of edge detection.

use docscan_core::{ImageBuffer, ImageError};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;
use log::debug;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Which single-channel planes the detector searches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    /// Luminance only.
    #[default]
    Luminance,
    /// Luminance followed by each colour plane. Finds documents that differ
    /// from the background in hue but not in brightness.
    PerChannel,
}

/// Preprocessing configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessParams {
    /// Downscale so the image is at most this many rows before detection.
    /// `None` keeps the full resolution. Images are never upscaled.
    pub working_height: Option<usize>,
    /// Gaussian sigma in working pixels; `<= 0` disables smoothing.
    pub blur_sigma: f32,
    /// Fraction of pixels clipped at each end of the histogram before the
    /// linear contrast stretch. `None` disables normalisation.
    pub contrast_clip: Option<f32>,
    /// Binarise each plane with a global Otsu threshold after smoothing.
    pub otsu_binarize: bool,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            working_height: Some(500),
            blur_sigma: 1.1,
            contrast_clip: Some(0.01),
            otsu_binarize: false,
        }
    }
}

/// Output of the preprocessing stage.
#[derive(Clone, Debug)]
pub struct Preprocessed {
    /// Smoothed planes at working resolution; the first one is luminance.
    pub planes: Vec<GrayImage>,
    /// Source pixels per working pixel along x.
    pub scale_x: f32,
    /// Source pixels per working pixel along y.
    pub scale_y: f32,
}

impl Preprocessed {
    pub fn width(&self) -> usize {
        self.planes.first().map_or(0, |p| p.width() as usize)
    }

    pub fn height(&self) -> usize {
        self.planes.first().map_or(0, |p| p.height() as usize)
    }
}

/// Run the full preprocessing stage.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(image, params), fields(width = image.width(), height = image.height()))
)]
pub fn preprocess(
    image: &ImageBuffer,
    params: &PreprocessParams,
    mode: ChannelMode,
) -> Result<Preprocessed, ImageError> {
    if image.is_empty() {
        return Err(ImageError::ZeroArea {
            width: image.width(),
            height: image.height(),
        });
    }

    let mut planes = vec![to_luma(image)];
    if mode == ChannelMode::PerChannel && image.channels() > 1 {
        planes.extend(channel_planes(image));
    }

    let (w, h) = (image.width(), image.height());
    let (work_w, work_h) = match params.working_height {
        Some(target) if target > 0 && h > target => {
            let s = h as f32 / target as f32;
            (((w as f32 / s).round() as usize).max(1), target)
        }
        _ => (w, h),
    };
    let scale_x = w as f32 / work_w as f32;
    let scale_y = h as f32 / work_h as f32;

    let planes: Vec<GrayImage> = planes
        .into_iter()
        .map(|plane| {
            let mut p = if (work_w, work_h) == (w, h) {
                plane
            } else {
                downscale(&plane, work_w, work_h)
            };
            if params.blur_sigma > 0.0 {
                p = gaussian_blur_f32(&p, params.blur_sigma);
            }
            if let Some(clip) = params.contrast_clip {
                p = normalize_contrast(&p, clip);
            }
            if params.otsu_binarize {
                p = otsu_binarize(&p);
            }
            p
        })
        .collect();

    debug!(
        "preprocessed {}x{} -> {}x{} ({} plane(s))",
        w,
        h,
        work_w,
        work_h,
        planes.len()
    );

    Ok(Preprocessed {
        planes,
        scale_x,
        scale_y,
    })
}

/// Luminance with Rec. 601 weights in 8.8 fixed point. Alpha is ignored.
pub fn to_luma(image: &ImageBuffer) -> GrayImage {
    let c = image.channels();
    GrayImage::from_fn(image.width() as u32, image.height() as u32, |x, y| {
        let px = image.pixel(x as usize, y as usize);
        if c == 1 {
            return Luma([px[0]]);
        }
        let y = 77 * px[0] as u32 + 150 * px[1] as u32 + 29 * px[2] as u32 + 128;
        Luma([(y >> 8).min(255) as u8])
    })
}

/// Colour planes (R, G, B) without alpha. A gray image yields one plane.
pub fn channel_planes(image: &ImageBuffer) -> Vec<GrayImage> {
    let colour = if image.channels() == 1 { 1 } else { 3 };
    (0..colour)
        .map(|k| {
            GrayImage::from_fn(image.width() as u32, image.height() as u32, |x, y| {
                Luma([image.pixel(x as usize, y as usize)[k]])
            })
        })
        .collect()
}

/// Resize a plane to `out_w × out_h` with a triangle filter, which averages
/// over the source footprint when shrinking.
pub fn downscale(src: &GrayImage, out_w: usize, out_h: usize) -> GrayImage {
    imageops::resize(src, out_w as u32, out_h as u32, FilterType::Triangle)
}

fn histogram(src: &GrayImage) -> [u32; 256] {
    let mut hist = [0u32; 256];
    for &v in src.as_raw() {
        hist[v as usize] += 1;
    }
    hist
}

/// Percentile-clipped linear stretch to the full 0..=255 range.
///
/// A flat image (or one whose clipped range collapses) is returned as is.
pub fn normalize_contrast(src: &GrayImage, clip_frac: f32) -> GrayImage {
    let total = src.as_raw().len();
    if total == 0 {
        return src.clone();
    }
    let hist = histogram(src);
    let clip = ((clip_frac.clamp(0.0, 0.49) * total as f32) as usize).min(total - 1);

    let mut acc = 0usize;
    let mut lo = 0usize;
    for (v, &n) in hist.iter().enumerate() {
        acc += n as usize;
        if acc > clip {
            lo = v;
            break;
        }
    }
    acc = 0;
    let mut hi = 255usize;
    for (v, &n) in hist.iter().enumerate().rev() {
        acc += n as usize;
        if acc > clip {
            hi = v;
            break;
        }
    }
    if hi <= lo {
        return src.clone();
    }

    let range = (hi - lo) as f32;
    let lut: Vec<u8> = (0..256usize)
        .map(|v| {
            let t = (v as f32 - lo as f32) * 255.0 / range;
            t.round().clamp(0.0, 255.0) as u8
        })
        .collect();
    let mut out = src.clone();
    out.pixels_mut().for_each(|p| p.0[0] = lut[p.0[0] as usize]);
    out
}

/// Otsu threshold over the whole plane.
pub fn otsu_threshold(src: &GrayImage) -> u8 {
    if src.as_raw().is_empty() {
        return 127;
    }
    let hist = histogram(src);
    let total = src.as_raw().len() as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }
        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;
        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }
    best_t
}

/// Pixels above the Otsu threshold become 255, the rest 0.
pub fn otsu_binarize(src: &GrayImage) -> GrayImage {
    let t = otsu_threshold(src);
    let mut out = src.clone();
    out.pixels_mut()
        .for_each(|p| p.0[0] = if p.0[0] > t { 255 } else { 0 });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_area_input_is_rejected() {
        let img = ImageBuffer::new(0, 5, 3, Vec::new()).expect("empty");
        let err = preprocess(&img, &PreprocessParams::default(), ChannelMode::Luminance)
            .unwrap_err();
        assert_eq!(
            err,
            ImageError::ZeroArea {
                width: 0,
                height: 5
            }
        );
    }

    #[test]
    fn luma_uses_weighted_channels() {
        let img = ImageBuffer::new(3, 1, 3, vec![255, 0, 0, 0, 255, 0, 0, 0, 255]).expect("rgb");
        let gray = to_luma(&img);
        assert_eq!(gray.as_raw(), &vec![77, 149, 29]);
    }

    #[test]
    fn luma_ignores_alpha() {
        let a = ImageBuffer::from_pixel(2, 2, &[10, 200, 30, 0]).expect("rgba");
        let b = ImageBuffer::from_pixel(2, 2, &[10, 200, 30, 255]).expect("rgba");
        assert_eq!(to_luma(&a), to_luma(&b));
    }

    #[test]
    fn channel_planes_split_colour() {
        let img = ImageBuffer::from_pixel(2, 1, &[1, 2, 3, 4]).expect("rgba");
        let planes = channel_planes(&img);
        assert_eq!(planes.len(), 3);
        assert_eq!(planes[0].as_raw(), &vec![1, 1]);
        assert_eq!(planes[2].as_raw(), &vec![3, 3]);
    }

    #[test]
    fn blur_softens_step_edge() {
        let mut data = Vec::new();
        for _ in 0..5 {
            for x in 0..20 {
                data.push(if x < 10 { 0 } else { 255 });
            }
        }
        let img = ImageBuffer::new(20, 5, 1, data).expect("gray");
        let params = PreprocessParams {
            blur_sigma: 1.0,
            contrast_clip: None,
            ..PreprocessParams::default()
        };
        let pre = preprocess(&img, &params, ChannelMode::Luminance).expect("preprocess");
        let left = pre.planes[0].get_pixel(9, 2)[0];
        let right = pre.planes[0].get_pixel(10, 2)[0];
        assert!(left > 0 && left < 128, "left={left}");
        assert!(right > 128 && right < 255, "right={right}");
    }

    #[test]
    fn downscale_keeps_flat_plane_flat() {
        let flat = GrayImage::from_pixel(40, 30, Luma([123]));
        let small = downscale(&flat, 20, 15);
        assert_eq!(small.dimensions(), (20, 15));
        assert!(small.pixels().all(|p| p[0] == 123));
    }

    #[test]
    fn contrast_stretch_spans_full_range() {
        let mut img = GrayImage::from_pixel(10, 10, Luma([100]));
        for x in 0..10 {
            img.put_pixel(x, 0, Luma([150]));
        }
        let out = normalize_contrast(&img, 0.0);
        assert_eq!(*out.as_raw().iter().min().expect("min"), 0);
        assert_eq!(*out.as_raw().iter().max().expect("max"), 255);
    }

    #[test]
    fn contrast_stretch_leaves_flat_image() {
        let flat = GrayImage::from_pixel(8, 8, Luma([42]));
        assert_eq!(normalize_contrast(&flat, 0.01), flat);
    }

    #[test]
    fn otsu_splits_bimodal_plane() {
        let mut img = GrayImage::from_pixel(10, 10, Luma([40]));
        for y in 0..10 {
            for x in 5..10 {
                img.put_pixel(x, y, Luma([210]));
            }
        }
        let t = otsu_threshold(&img);
        assert!((40..210).contains(&t), "t={t}");
        let bin = otsu_binarize(&img);
        assert_eq!(bin.get_pixel(0, 0)[0], 0);
        assert_eq!(bin.get_pixel(9, 9)[0], 255);
    }

    #[test]
    fn downscale_to_working_height_tracks_scale() {
        let img = ImageBuffer::from_pixel(1000, 800, &[90, 90, 90]).expect("rgb");
        let params = PreprocessParams {
            working_height: Some(400),
            ..PreprocessParams::default()
        };
        let pre = preprocess(&img, &params, ChannelMode::Luminance).expect("preprocess");
        assert_eq!((pre.width(), pre.height()), (500, 400));
        assert!((pre.scale_x - 2.0).abs() < 1e-6);
        assert!((pre.scale_y - 2.0).abs() < 1e-6);
        assert!(pre.planes[0].as_raw().iter().all(|&v| v == 90));
    }

    #[test]
    fn per_channel_mode_adds_colour_planes() {
        let img = ImageBuffer::from_pixel(4, 4, &[10, 20, 30]).expect("rgb");
        let pre = preprocess(&img, &PreprocessParams::default(), ChannelMode::PerChannel)
            .expect("preprocess");
        assert_eq!(pre.planes.len(), 4);
    }
}
