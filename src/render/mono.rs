//! # Monochrome Conversion
//!
//! Thermal heads print dots, not grays. This module thresholds a rendered
//! raster and packs it into the 1-bit row format the printer's BITMAP
//! command expects.
//!
//! ## Luminance
//!
//! | Channels | Luminance |
//! |----------|-----------|
//! | 1 (gray) | the value itself |
//! | 3 (RGB) | `(299 R + 587 G + 114 B) / 1000` |
//! | 4 (RGBA) | RGB composited over white, then as above |
//!
//! A pixel prints when its luminance is below the threshold.
//!
//! ## Packing
//!
//! ```text
//! pixels:  ■ ■ □ ■ □ □ □ □ | ■ ■ ■ □
//! bits:    0 0 1 0 1 1 1 1 | 0 0 0 1 1 1 1 1
//!                                   └─ padding
//! ```
//!
//! Rows are `ceil(width / 8)` bytes, most significant bit first, and every
//! row starts on a fresh byte. Ink is a **0** bit, paper and padding are
//! **1** bits (TSPL `BITMAP` overwrite mode).

use image::GrayImage;
use thiserror::Error;

use super::PixelRaster;
use crate::printer::{PixelDimensions, width_bytes};

/// Default luminance cut-off.
pub const DEFAULT_THRESHOLD: u8 = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Image is empty ({0})")]
    Empty(PixelDimensions),

    #[error("Image is {actual} but the label is {expected}")]
    DimensionMismatch {
        expected: PixelDimensions,
        actual: PixelDimensions,
    },

    #[error("Packed bitmap needs {expected} bytes, got {actual}")]
    BufferLength { expected: usize, actual: usize },
}

/// Packed 1-bit image, ready for the printer.
///
/// `data.len() == width_bytes * height` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedBitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PackedBitmap {
    pub fn from_packed(width: u32, height: u32, data: Vec<u8>) -> Result<Self, ConversionError> {
        let dims = PixelDimensions::new(width, height);
        if dims.is_empty() {
            return Err(ConversionError::Empty(dims));
        }
        if data.len() != dims.packed_len() {
            return Err(ConversionError::BufferLength {
                expected: dims.packed_len(),
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width_bytes(&self) -> usize {
        width_bytes(self.width)
    }

    pub fn dimensions(&self) -> PixelDimensions {
        PixelDimensions::new(self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let wb = self.width_bytes();
        let start = y as usize * wb;
        &self.data[start..start + wb]
    }

    /// Whether the dot at (x, y) prints.
    pub fn is_ink(&self, x: u32, y: u32) -> bool {
        let byte = self.row(y)[x as usize / 8];
        byte & (0x80 >> (x % 8)) == 0
    }

    /// Number of printed dots, padding excluded.
    pub fn ink_count(&self) -> usize {
        (0..self.height)
            .map(|y| (0..self.width).filter(|&x| self.is_ink(x, y)).count())
            .sum()
    }

    /// Expand back to a black and white image, for previews.
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            image::Luma([if self.is_ink(x, y) { 0 } else { 255 }])
        })
    }
}

/// Luminance of the pixel starting at `px`.
#[inline]
fn luminance(px: &[u8]) -> u8 {
    match px.len() {
        1 => px[0],
        3 => weighted(px[0], px[1], px[2]),
        _ => {
            // Composite over white: c' = c * a + 255 * (1 - a)
            let a = px[3] as u32;
            let over = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
            weighted(over(px[0]), over(px[1]), over(px[2]))
        }
    }
}

#[inline]
fn weighted(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
}

/// Pack a row of pixels into bytes, MSB first.
///
/// `true` means ink and becomes a 0 bit. The last byte is padded with
/// 1 bits (no ink) on the right.
///
/// ## Example
///
/// ```
/// use mise::render::mono::pack_row;
///
/// // 8 pixels pack into 1 byte
/// let row = vec![true, true, true, true, false, false, false, false];
/// assert_eq!(pack_row(&row), vec![0x0F]); // 00001111
///
/// // 12 pixels pack into 2 bytes (4 bits padding)
/// let row = vec![true; 12];
/// assert_eq!(pack_row(&row), vec![0x00, 0x0F]); // 00000000 00001111
/// ```
pub fn pack_row(pixels: &[bool]) -> Vec<u8> {
    let num_bytes = pixels.len().div_ceil(8);
    let mut bytes = vec![0xFFu8; num_bytes];

    for (i, &ink) in pixels.iter().enumerate() {
        if ink {
            let byte_idx = i / 8;
            let bit_idx = 7 - (i % 8); // MSB first
            bytes[byte_idx] &= !(1 << bit_idx);
        }
    }

    bytes
}

/// Threshold a raster and pack it for the printer.
///
/// The raster must be exactly `expected` in size.
pub fn to_packed_bitmap(
    raster: &PixelRaster,
    expected: PixelDimensions,
    threshold: u8,
) -> Result<PackedBitmap, ConversionError> {
    let actual = raster.dimensions();
    if actual.is_empty() {
        return Err(ConversionError::Empty(actual));
    }
    if actual != expected {
        return Err(ConversionError::DimensionMismatch { expected, actual });
    }

    let width = raster.width() as usize;
    let channels = raster.channels() as usize;
    let stride = width * channels;
    let mut data = Vec::with_capacity(expected.packed_len());
    let mut row_pixels = Vec::with_capacity(width);

    for row in raster.data().chunks_exact(stride) {
        row_pixels.clear();
        row_pixels.extend(row.chunks_exact(channels).map(|px| luminance(px) < threshold));
        data.extend(pack_row(&row_pixels));
    }

    PackedBitmap::from_packed(raster.width(), raster.height(), data)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32, data: Vec<u8>) -> PixelRaster {
        PixelRaster::from_raw(width, height, 1, data).unwrap()
    }

    #[test]
    fn test_pack_row_8_pixels() {
        // All ink
        assert_eq!(pack_row(&[true; 8]), vec![0x00]);
        // All paper
        assert_eq!(pack_row(&[false; 8]), vec![0xFF]);
        // Alternating
        assert_eq!(
            pack_row(&[true, false, true, false, true, false, true, false]),
            vec![0x55]
        );
    }

    #[test]
    fn test_pack_row_padding() {
        // 9 ink pixels pad to 2 bytes, padding stays blank
        let packed = pack_row(&[true; 9]);
        assert_eq!(packed, vec![0x00, 0x7F]);
    }

    #[test]
    fn test_pack_row_empty() {
        assert_eq!(pack_row(&[]), Vec::<u8>::new());
    }

    #[test]
    fn test_luminance_weights() {
        assert_eq!(luminance(&[200]), 200);
        assert_eq!(luminance(&[255, 255, 255]), 255);
        assert_eq!(luminance(&[255, 0, 0]), 76);
        assert_eq!(luminance(&[0, 255, 0]), 149);
        // Fully transparent black reads as white paper.
        assert_eq!(luminance(&[0, 0, 0, 0]), 255);
        assert_eq!(luminance(&[0, 0, 0, 255]), 0);
    }

    #[test]
    fn test_eight_by_two_checker() {
        // Row 0: ink on even columns; row 1: ink on odd columns.
        let data: Vec<u8> = (0..16)
            .map(|i| if (i % 8 + i / 8) % 2 == 0 { 0 } else { 255 })
            .collect();
        let bitmap = to_packed_bitmap(&gray(8, 2, data), PixelDimensions::new(8, 2), 128).unwrap();
        assert_eq!(bitmap.data(), &[0x55, 0xAA]);
        assert_eq!(bitmap.ink_count(), 8);
    }

    #[test]
    fn test_rows_start_on_fresh_byte() {
        // 10 px wide: 2 bytes per row, 6 padding bits each.
        let bitmap = to_packed_bitmap(
            &gray(10, 2, vec![0; 20]),
            PixelDimensions::new(10, 2),
            DEFAULT_THRESHOLD,
        )
        .unwrap();
        assert_eq!(bitmap.width_bytes(), 2);
        assert_eq!(bitmap.data(), &[0x00, 0x3F, 0x00, 0x3F]);
        assert_eq!(bitmap.ink_count(), 20);
    }

    #[test]
    fn test_threshold_boundary() {
        let raster = gray(2, 1, vec![127, 128]);
        let bitmap = to_packed_bitmap(&raster, PixelDimensions::new(2, 1), 128).unwrap();
        assert!(bitmap.is_ink(0, 0));
        assert!(!bitmap.is_ink(1, 0));
    }

    #[test]
    fn test_rejects_mismatched_dimensions() {
        let err = to_packed_bitmap(&gray(8, 2, vec![0; 16]), PixelDimensions::new(8, 3), 128)
            .unwrap_err();
        assert!(matches!(err, ConversionError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_rejects_empty() {
        let err = to_packed_bitmap(&gray(0, 0, vec![]), PixelDimensions::new(0, 0), 128)
            .unwrap_err();
        assert!(matches!(err, ConversionError::Empty(_)));
        assert!(PackedBitmap::from_packed(8, 1, vec![0, 0]).is_err());
    }

    #[test]
    fn test_gray_image_round_trip() {
        let raster = gray(3, 1, vec![0, 255, 0]);
        let bitmap = to_packed_bitmap(&raster, PixelDimensions::new(3, 1), 128).unwrap();
        let img = bitmap.to_gray_image();
        assert_eq!(img.into_raw(), vec![0, 255, 0]);
    }
}
