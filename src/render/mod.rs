//! # Rendering Module
//!
//! Turns a label description into pixels, then pixels into printer dots.
//!
//! ## Modules
//!
//! - [`font`]: Embedded Spleen bitmap fonts
//! - [`layout`]: Line planning, word wrap and drawing
//! - [`mono`]: Threshold conversion to packed 1-bit rows
//!
//! ## Usage Example
//!
//! ```
//! use mise::label::LabelDescription;
//! use mise::printer::PixelDimensions;
//! use mise::render::{self, mono};
//!
//! let label = LabelDescription::new("Chicken Stock", "2026-10-18", "2026-10-21");
//! let dims = PixelDimensions::new(480, 320);
//!
//! let raster = render::render_blocking(&label, dims, &mut Default::default()).unwrap();
//! let packed = mono::to_packed_bitmap(&raster, dims, mono::DEFAULT_THRESHOLD).unwrap();
//!
//! assert_eq!(packed.data().len(), 60 * 320);
//! ```

pub mod font;
pub mod layout;
pub mod mono;

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{GrayImage, RgbImage, RgbaImage};
use thiserror::Error;

use crate::label::LabelDescription;
use crate::printer::PixelDimensions;
use font::GlyphSet;

/// How long a render may take before the request is failed.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Font error: {0}")]
    Font(String),

    #[error("Layout failed: {0}")]
    Layout(String),

    #[error("Render timed out after {0:?}")]
    Timeout(Duration),

    #[error("Render worker failed: {0}")]
    Worker(String),

    #[error("Renderer backend error: {0}")]
    Backend(String),

    #[error("Invalid raster: {0}")]
    InvalidRaster(String),
}

/// A rendered image: row-major, `channels` bytes per pixel.
///
/// 1 = grayscale, 3 = RGB, 4 = RGBA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelRaster {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl PixelRaster {
    pub fn from_raw(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self, RenderError> {
        if !matches!(channels, 1 | 3 | 4) {
            return Err(RenderError::InvalidRaster(format!(
                "{} channels (expected 1, 3 or 4)",
                channels
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(RenderError::InvalidRaster(format!(
                "{}x{}x{} needs {} bytes, got {}",
                width,
                height,
                channels,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn dimensions(&self) -> PixelDimensions {
        PixelDimensions::new(self.width, self.height)
    }

    /// Encode as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, RenderError> {
        let mut png_bytes = Vec::new();
        let mut cursor = Cursor::new(&mut png_bytes);
        let (w, h, data) = (self.width, self.height, self.data.clone());
        let written = match self.channels {
            1 => GrayImage::from_raw(w, h, data).map(|img| img.write_to(&mut cursor, image::ImageFormat::Png)),
            3 => RgbImage::from_raw(w, h, data).map(|img| img.write_to(&mut cursor, image::ImageFormat::Png)),
            _ => RgbaImage::from_raw(w, h, data).map(|img| img.write_to(&mut cursor, image::ImageFormat::Png)),
        };
        written
            .ok_or_else(|| RenderError::InvalidRaster("buffer does not match dimensions".into()))?
            .map_err(|e| RenderError::Backend(format!("PNG encoding failed: {}", e)))?;
        Ok(png_bytes)
    }
}

/// Produces a raster for a label at an exact pixel size.
///
/// The returned raster must be exactly `dims` in size. Implementations must
/// not depend on the wall clock or host fonts: the same input gives the
/// same pixels.
#[async_trait]
pub trait LabelRenderer: Send + Sync {
    async fn render(
        &self,
        label: &LabelDescription,
        dims: PixelDimensions,
    ) -> Result<PixelRaster, RenderError>;
}

/// Lay out and draw a label on the current thread.
pub fn render_blocking(
    label: &LabelDescription,
    dims: PixelDimensions,
    glyphs: &mut GlyphSet,
) -> Result<PixelRaster, RenderError> {
    let plan = layout::plan(label, dims)?;
    layout::draw(&plan, glyphs)
}

/// Built-in renderer: Spleen fonts on a grayscale canvas.
///
/// Drawing is CPU-bound, so it runs on the blocking pool.
#[derive(Clone, Default)]
pub struct BitmapRenderer {
    glyphs: Arc<Mutex<GlyphSet>>,
}

impl BitmapRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LabelRenderer for BitmapRenderer {
    async fn render(
        &self,
        label: &LabelDescription,
        dims: PixelDimensions,
    ) -> Result<PixelRaster, RenderError> {
        let label = label.clone();
        let glyphs = Arc::clone(&self.glyphs);

        tokio::task::spawn_blocking(move || {
            let mut glyphs = glyphs
                .lock()
                .map_err(|_| RenderError::Worker("glyph cache poisoned".into()))?;
            render_blocking(&label, dims, &mut glyphs)
        })
        .await
        .map_err(|e| RenderError::Worker(format!("Task error: {}", e)))?
    }
}

/// Run a renderer with a deadline, checking the raster size it returns.
pub async fn render_with_timeout(
    renderer: &dyn LabelRenderer,
    label: &LabelDescription,
    dims: PixelDimensions,
    timeout: Duration,
) -> Result<PixelRaster, RenderError> {
    let raster = tokio::time::timeout(timeout, renderer.render(label, dims))
        .await
        .map_err(|_| RenderError::Timeout(timeout))??;

    if raster.dimensions() != dims {
        return Err(RenderError::InvalidRaster(format!(
            "renderer returned {} for a {} label",
            raster.dimensions(),
            dims
        )));
    }
    Ok(raster)
}
