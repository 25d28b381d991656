//! Sample reconstruction and per-channel images.

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

/// One channel of one frame: `height × width` unsigned samples, row-major.
///
/// Samples are held as `u32` whatever the wire width (8 to 32 bits).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelImage {
    width: usize,
    height: usize,
    data: Vec<u32>,
}

impl ChannelImage {
    /// Wrap row-major samples. Returns `None` if `data` is not `width * height` long.
    pub fn new(width: usize, height: usize, data: Vec<u32>) -> Option<Self> {
        (width.checked_mul(height)? == data.len()).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Row-major samples.
    pub fn data(&self) -> &[u32] {
        &self.data
    }

    /// One row of samples.
    pub fn row(&self, row: usize) -> Option<&[u32]> {
        if row >= self.height {
            return None;
        }
        let start = row * self.width;
        Some(&self.data[start..start + self.width])
    }

    /// Sample at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<u32> {
        self.row(row)?.get(col).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy out a sub-rectangle.
    ///
    /// The rectangle is clamped to the image the way array slicing clamps:
    /// a partly outside rectangle yields a smaller image, a fully outside one
    /// yields an empty image.
    pub fn crop(&self, rect: &CropRect) -> ChannelImage {
        let x0 = rect.x.min(self.width);
        let y0 = rect.y.min(self.height);
        let x1 = rect.x.saturating_add(rect.width).min(self.width);
        let y1 = rect.y.saturating_add(rect.height).min(self.height);
        let (w, h) = (x1 - x0, y1 - y0);

        let mut data = Vec::with_capacity(w * h);
        for row in y0..y1 {
            let start = row * self.width;
            data.extend_from_slice(&self.data[start + x0..start + x1]);
        }
        ChannelImage {
            width: w,
            height: h,
            data,
        }
    }

    /// Keep the top 8 bits of every sample (`value >> (bits - 8)`).
    pub fn to_gray8(&self, sample_bit_width: u8) -> GrayImage {
        let shift = u32::from(sample_bit_width.saturating_sub(8));
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let value = self.data[y as usize * self.width + x as usize];
            Luma([(value >> shift) as u8])
        })
    }

    /// Minimum, maximum, and mean sample value.
    pub fn stats(&self) -> Option<SampleStats> {
        let min = *self.data.iter().min()?;
        let max = *self.data.iter().max()?;
        let sum: u64 = self.data.iter().map(|&v| u64::from(v)).sum();
        Some(SampleStats {
            min,
            max,
            mean: sum as f64 / self.data.len() as f64,
        })
    }
}

/// Summary of one channel image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampleStats {
    pub min: u32,
    pub max: u32,
    pub mean: f64,
}

/// Viewport applied to every channel before display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    /// First column.
    pub x: usize,
    /// First row.
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl CropRect {
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rows 15..415, columns 5..485 of a 640×480 sensor frame.
    pub const STANDARD: CropRect = CropRect::new(5, 15, 480, 400);

    /// Rows 0..400, columns 0..480, used with the fast link timing.
    pub const FAST: CropRect = CropRect::new(0, 0, 480, 400);

    /// Keeps the whole frame.
    pub const FULL: CropRect = CropRect::new(0, 0, usize::MAX, usize::MAX);
}

impl std::str::FromStr for CropRect {
    type Err = String;

    /// Parse `X,Y,W,H`, or `full`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("full") {
            return Ok(Self::FULL);
        }
        let parts = s
            .split(',')
            .map(|part| part.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid crop '{s}': {e}"))?;
        match parts.as_slice() {
            [x, y, width, height] => Ok(Self::new(*x, *y, *width, *height)),
            _ => Err(format!("invalid crop '{s}': expected X,Y,W,H")),
        }
    }
}

/// Combine big-endian groups of `sample_bytes` bytes into samples.
///
/// Works for any group size up to 4 bytes (8, 16, 24, 32 bits). Trailing
/// bytes that do not fill a whole group are ignored.
pub fn combine_samples(payload: &[u8], sample_bytes: usize) -> Vec<u32> {
    if sample_bytes == 1 {
        return payload.iter().map(|&b| u32::from(b)).collect();
    }
    payload
        .chunks_exact(sample_bytes)
        .map(|group| {
            group
                .iter()
                .fold(0u32, |value, &byte| (value << 8) | u32::from(byte))
        })
        .collect()
}

/// Split interleaved samples into `channels` images of `height × width`.
///
/// Sample `i` belongs to channel `i % channels`. Returns `None` when the
/// sample count is not `width * height * channels`.
pub fn deinterleave(
    samples: &[u32],
    channels: usize,
    width: usize,
    height: usize,
) -> Option<Vec<ChannelImage>> {
    let pixels = width.checked_mul(height)?;
    if channels == 0 || pixels.checked_mul(channels)? != samples.len() {
        return None;
    }

    let mut planes: Vec<Vec<u32>> = (0..channels).map(|_| Vec::with_capacity(pixels)).collect();
    for pixel in samples.chunks_exact(channels) {
        for (plane, &sample) in planes.iter_mut().zip(pixel) {
            plane.push(sample);
        }
    }

    Some(
        planes
            .into_iter()
            .map(|data| ChannelImage {
                width,
                height,
                data,
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_is_msb_first() {
        assert_eq!(combine_samples(&[0x12, 0x34, 0xAB, 0xCD], 2), vec![0x1234, 0xABCD]);
        assert_eq!(
            combine_samples(&[0x01, 0x02, 0x03, 0xFF, 0xFE, 0xFD], 3),
            vec![0x010203, 0xFFFEFD]
        );
        assert_eq!(
            combine_samples(&[0xDE, 0xAD, 0xBE, 0xEF], 4),
            vec![0xDEAD_BEEF]
        );
        assert_eq!(combine_samples(&[7, 8, 9], 1), vec![7, 8, 9]);
    }

    #[test]
    fn deinterleave_two_channels() {
        let samples: Vec<u32> = (1..=16).collect();
        let images = deinterleave(&samples, 2, 4, 2).unwrap();

        assert_eq!(images.len(), 2);
        assert_eq!(images[0].data(), &[1, 3, 5, 7, 9, 11, 13, 15]);
        assert_eq!(images[1].data(), &[2, 4, 6, 8, 10, 12, 14, 16]);
        assert_eq!(images[0].row(1), Some(&[9, 11, 13, 15][..]));
        assert_eq!(images[1].get(0, 3), Some(8));
    }

    #[test]
    fn deinterleave_rejects_wrong_count() {
        assert!(deinterleave(&[1, 2, 3], 2, 1, 2).is_none());
        assert!(deinterleave(&[1, 2], 0, 1, 2).is_none());
    }

    #[test]
    fn crop_inside_bounds() {
        let image = ChannelImage::new(4, 3, (0..12).collect()).unwrap();
        let cropped = image.crop(&CropRect::new(1, 1, 2, 2));
        assert_eq!((cropped.width(), cropped.height()), (2, 2));
        assert_eq!(cropped.data(), &[5, 6, 9, 10]);
    }

    #[test]
    fn crop_clamps_like_slicing() {
        let image = ChannelImage::new(4, 3, (0..12).collect()).unwrap();

        let partial = image.crop(&CropRect::STANDARD);
        assert_eq!((partial.width(), partial.height()), (0, 0));

        let clipped = image.crop(&CropRect::new(2, 1, 100, 100));
        assert_eq!((clipped.width(), clipped.height()), (2, 2));
        assert_eq!(clipped.data(), &[6, 7, 10, 11]);

        let whole = image.crop(&CropRect::FAST);
        assert_eq!(whole, image);
        assert_eq!(image.crop(&CropRect::FULL), image);
    }

    #[test]
    fn crop_rect_parses() {
        assert_eq!("5,15,480,400".parse::<CropRect>().unwrap(), CropRect::STANDARD);
        assert_eq!("FULL".parse::<CropRect>().unwrap(), CropRect::FULL);
        assert!("1,2,3".parse::<CropRect>().is_err());
        assert!("a,b,c,d".parse::<CropRect>().is_err());
    }

    #[test]
    fn gray8_keeps_top_bits() {
        let image = ChannelImage::new(3, 1, vec![0xABCD, 0x00FF, 0xFFFF]).unwrap();
        let gray = image.to_gray8(16);
        assert_eq!(gray.as_raw(), &vec![0xAB, 0x00, 0xFF]);

        let image = ChannelImage::new(2, 1, vec![0x12, 0xFE]).unwrap();
        assert_eq!(image.to_gray8(8).as_raw(), &vec![0x12, 0xFE]);

        let image = ChannelImage::new(2, 1, vec![0x00AB_CDEF, 0x0000_FFFF]).unwrap();
        assert_eq!(image.to_gray8(24).as_raw(), &vec![0xAB, 0x00]);

        let image = ChannelImage::new(1, 1, vec![0x89AB_CDEF]).unwrap();
        assert_eq!(image.to_gray8(32).as_raw(), &vec![0x89]);
    }

    #[test]
    fn stats_summarize_samples() {
        let image = ChannelImage::new(2, 2, vec![1, 5, 3, 7]).unwrap();
        let stats = image.stats().unwrap();
        assert_eq!((stats.min, stats.max), (1, 7));
        assert!((stats.mean - 4.0).abs() < f64::EPSILON);

        let empty = image.crop(&CropRect::new(9, 9, 1, 1));
        assert!(empty.is_empty());
        assert!(empty.stats().is_none());
    }

    #[test]
    fn new_checks_dimensions() {
        assert!(ChannelImage::new(2, 2, vec![0; 3]).is_none());
        assert!(ChannelImage::new(0, 5, Vec::new()).is_some());
    }
}
