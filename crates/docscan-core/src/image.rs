/// Errors raised when a pixel buffer cannot be used as pipeline input.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    #[error("unsupported channel count {channels} (expected 1, 3 or 4)")]
    UnsupportedChannels { channels: usize },
    #[error("invalid buffer length (expected {expected} bytes, got {got})")]
    BufferLength { expected: usize, got: usize },
    #[error("image has zero area (width={width}, height={height})")]
    ZeroArea { width: usize, height: usize },
}

/// Owned interleaved 8-bit image with 1 (gray), 3 (RGB) or 4 (RGBA) channels.
///
/// Fields are private: once built, a buffer is never mutated. Pipeline stages
/// produce new buffers instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageBuffer {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// Wrap a row-major interleaved buffer.
    ///
    /// Zero-sized buffers are accepted here; the detector rejects them.
    pub fn new(
        width: usize,
        height: usize,
        channels: usize,
        data: Vec<u8>,
    ) -> Result<Self, ImageError> {
        if !matches!(channels, 1 | 3 | 4) {
            return Err(ImageError::UnsupportedChannels { channels });
        }
        let expected = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(channels))
            .ok_or(ImageError::BufferLength {
                expected: usize::MAX,
                got: data.len(),
            })?;
        if data.len() != expected {
            return Err(ImageError::BufferLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Uniform image filled with `pixel` (its length is the channel count).
    pub fn from_pixel(width: usize, height: usize, pixel: &[u8]) -> Result<Self, ImageError> {
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(width * height * pixel.len())
            .collect();
        Self::new(width, height, pixel.len(), data)
    }

    /// New `width × height` buffer with this image's channel layout, each
    /// pixel written by `f(x, y, pixel)`.
    pub fn resampled(
        &self,
        width: usize,
        height: usize,
        mut f: impl FnMut(usize, usize, &mut [u8]),
    ) -> Self {
        let c = self.channels;
        let mut data = vec![0u8; width * height * c];
        if c > 0 {
            for (i, px) in data.chunks_exact_mut(c).enumerate() {
                f(i % width, i / width, px);
            }
        }
        Self {
            width,
            height,
            channels: c,
            data,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Channel values of pixel `(x, y)`.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let i = (y * self.width + x) * self.channels;
        &self.data[i..i + self.channels]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_channel_counts() {
        let err = ImageBuffer::new(2, 2, 2, vec![0; 8]).unwrap_err();
        assert_eq!(err, ImageError::UnsupportedChannels { channels: 2 });
    }

    #[test]
    fn rejects_mismatched_length() {
        let err = ImageBuffer::new(4, 3, 3, vec![0; 35]).unwrap_err();
        assert_eq!(
            err,
            ImageError::BufferLength {
                expected: 36,
                got: 35
            }
        );
    }

    #[test]
    fn zero_sized_buffers_can_be_built() {
        let img = ImageBuffer::new(0, 10, 3, Vec::new()).expect("empty buffer");
        assert!(img.is_empty());
    }

    #[test]
    fn from_pixel_repeats_channels() {
        let img = ImageBuffer::from_pixel(3, 2, &[10, 20, 30]).expect("rgb");
        assert_eq!(img.channels(), 3);
        assert_eq!(img.pixel(2, 1), &[10, 20, 30]);
        assert_eq!(img.as_raw().len(), 18);
    }

    #[test]
    fn resampled_keeps_channel_layout() {
        let img = ImageBuffer::from_pixel(2, 2, &[1, 2, 3]).expect("rgb");
        let out = img.resampled(3, 1, |x, _, px| px.fill(x as u8));
        assert_eq!(out.channels(), 3);
        assert_eq!(out.as_raw(), &[0, 0, 0, 1, 1, 1, 2, 2, 2]);
    }
}
