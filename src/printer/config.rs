//! # Printer Configuration
//!
//! Physical label stock and printer resolution, and the conversion from
//! millimetres to printer dots.
//!
//! ## Common Stock
//!
//! | Stock | Size | Resolution | Pixels |
//! |-------|------|------------|--------|
//! | Compact | 60 × 40 mm | 203 DPI | 480 × 320 |
//! | Extended | 60 × 80 mm | 203 DPI | 480 × 639 |
//!
//! ## Usage
//!
//! ```
//! use mise::printer::PhysicalSpec;
//!
//! let spec = PhysicalSpec::new(60.0, 40.0, 203);
//! let dims = spec.pixel_dimensions();
//! assert_eq!((dims.width, dims.height), (480, 320));
//! assert_eq!(dims.width_bytes(), 60);
//! ```

use serde::{Deserialize, Serialize};

/// Millimetres per inch.
const MM_PER_INCH: f64 = 25.4;

/// Most common thermal label printer resolution.
pub const DEFAULT_DPI: u16 = 203;

/// Largest label edge accepted, in millimetres.
pub const MAX_LABEL_MM: f32 = 300.0;

/// Smallest label edge in printer dots: room for one line of body text.
pub const MIN_LABEL_DOTS: u32 = 16;

/// Accepted printer resolutions.
pub const DPI_RANGE: std::ops::RangeInclusive<u16> = 100..=1200;

/// Convert a length in millimetres to printer dots.
///
/// ```text
/// px = round(mm * dpi / 25.4)
///
/// 60 mm @ 203 DPI = round(479.527...) = 480
/// ```
///
/// Rounds half away from zero; truncating here would shift every label one
/// dot narrower than the stock on most sizes.
#[inline]
pub fn pixels_from_mm(mm: f32, dpi: u16) -> u32 {
    (mm as f64 * dpi as f64 / MM_PER_INCH).round() as u32
}

/// Bytes needed for one packed scanline of `width_px` pixels.
#[inline]
pub fn width_bytes(width_px: u32) -> usize {
    (width_px as usize).div_ceil(8)
}

/// # Physical Label Specification
///
/// Label size in millimetres plus printer resolution. Created per print
/// request and discarded once the label is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalSpec {
    /// Label width in millimetres
    pub width_mm: f32,
    /// Label height in millimetres
    pub height_mm: f32,
    /// Printer resolution in dots per inch
    pub dpi: u16,
}

impl PhysicalSpec {
    pub const fn new(width_mm: f32, height_mm: f32, dpi: u16) -> Self {
        Self {
            width_mm,
            height_mm,
            dpi,
        }
    }

    /// 60 × 40 mm at 203 DPI, the default prep label.
    pub const COMPACT_203: Self = Self::new(60.0, 40.0, DEFAULT_DPI);

    /// 60 × 80 mm at 203 DPI, used for PPDS and full ingredient labels.
    pub const EXTENDED_203: Self = Self::new(60.0, 80.0, DEFAULT_DPI);

    /// Label size in dots.
    pub fn pixel_dimensions(&self) -> PixelDimensions {
        PixelDimensions {
            width: pixels_from_mm(self.width_mm, self.dpi),
            height: pixels_from_mm(self.height_mm, self.dpi),
        }
    }

    /// Calculate dots per millimetre
    #[inline]
    pub fn dots_per_mm(&self) -> f32 {
        (self.dpi as f64 / MM_PER_INCH) as f32
    }

    /// Check that the spec describes printable stock.
    pub fn validate(&self) -> Result<(), String> {
        for (label, value) in [("width", self.width_mm), ("height", self.height_mm)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("Label {} must be a positive number of mm", label));
            }
            if value > MAX_LABEL_MM {
                return Err(format!(
                    "Label {} of {} mm exceeds the {} mm limit",
                    label, value, MAX_LABEL_MM
                ));
            }
        }
        if !DPI_RANGE.contains(&self.dpi) {
            return Err(format!(
                "Printer resolution {} DPI is outside {}..={}",
                self.dpi,
                DPI_RANGE.start(),
                DPI_RANGE.end()
            ));
        }
        let dims = self.pixel_dimensions();
        if dims.width < MIN_LABEL_DOTS || dims.height < MIN_LABEL_DOTS {
            return Err(format!(
                "Label of {} dots is below the {} dot minimum",
                dims, MIN_LABEL_DOTS
            ));
        }
        Ok(())
    }
}

impl Default for PhysicalSpec {
    fn default() -> Self {
        Self::COMPACT_203
    }
}

/// Label size in printer dots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelDimensions {
    pub width: u32,
    pub height: u32,
}

impl PixelDimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Bytes per packed row: `ceil(width / 8)`.
    #[inline]
    pub fn width_bytes(&self) -> usize {
        width_bytes(self.width)
    }

    /// Size of the packed bitmap for these dimensions.
    #[inline]
    pub fn packed_len(&self) -> usize {
        self.width_bytes() * self.height as usize
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for PixelDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ============================================================================
// TESTS
// ============================================================================
