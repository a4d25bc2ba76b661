//! # Label Pipeline
//!
//! ```text
//! PrintRequest ─► validate ─► render ─► threshold + pack ─► encode ─► base64
//!                   400        500          500              500
//! ```
//!
//! Each stage's failure is tagged with the stage so callers can tell a bad
//! request from a pipeline defect.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, error};

use crate::dispatch::PrintJob;
use crate::error::MiseError;
use crate::label::request::MAX_COPIES;
use crate::label::{PrintRequest, PrintResponse, ResponseDimensions};
use crate::printer::PhysicalSpec;
use crate::protocol::{self, CommandBuffer, EncodeOptions};
use crate::render::mono::{self, PackedBitmap};
use crate::render::{self, BitmapRenderer, DEFAULT_RENDER_TIMEOUT, LabelRenderer, PixelRaster};

/// Output of the render and convert stages for one request.
#[derive(Debug, Clone)]
pub struct RenderedLabel {
    pub label_id: String,
    pub spec: PhysicalSpec,
    pub raster: PixelRaster,
    pub bitmap: Arc<PackedBitmap>,
}

pub struct LabelPipeline {
    renderer: Arc<dyn LabelRenderer>,
    render_timeout: Duration,
    default_threshold: u8,
    options: EncodeOptions,
}

impl Default for LabelPipeline {
    fn default() -> Self {
        Self::new(Arc::new(BitmapRenderer::new()))
    }
}

impl LabelPipeline {
    pub fn new(renderer: Arc<dyn LabelRenderer>) -> Self {
        Self {
            renderer,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            default_threshold: mono::DEFAULT_THRESHOLD,
            options: EncodeOptions::default(),
        }
    }

    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.default_threshold = threshold;
        self
    }

    pub fn with_options(mut self, options: EncodeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &EncodeOptions {
        &self.options
    }

    /// Reject bad requests before any rendering work.
    pub fn validate(&self, request: &PrintRequest) -> Result<PhysicalSpec, MiseError> {
        request.label.validate()?;
        let spec = request.printer.physical();
        spec.validate().map_err(MiseError::Validation)?;
        if request.copies == 0 || request.copies > MAX_COPIES {
            return Err(MiseError::Validation(format!(
                "copies must be between 1 and {} (got {})",
                MAX_COPIES, request.copies
            )));
        }
        Ok(spec)
    }

    /// Validate, render and convert.
    pub async fn render(&self, request: &PrintRequest) -> Result<RenderedLabel, MiseError> {
        let spec = self.validate(request)?;
        let label_id = request.label.label_id().to_string();
        let dims = spec.pixel_dimensions();

        let raster = render::render_with_timeout(
            self.renderer.as_ref(),
            &request.label,
            dims,
            self.render_timeout,
        )
        .await
        .map_err(|cause| {
            error!(label = %label_id, error = %cause, "render failed");
            MiseError::RenderFailed {
                label_id: label_id.clone(),
                cause,
            }
        })?;

        let threshold = request.threshold.unwrap_or(self.default_threshold);
        let bitmap = mono::to_packed_bitmap(&raster, dims, threshold).map_err(|cause| {
            error!(label = %label_id, error = %cause, "conversion failed");
            MiseError::ConversionFailed {
                label_id: label_id.clone(),
                cause,
            }
        })?;
        debug!(label = %label_id, %dims, ink = bitmap.ink_count(), "label rendered");

        Ok(RenderedLabel {
            label_id,
            spec,
            raster,
            bitmap: Arc::new(bitmap),
        })
    }

    /// Full pipeline, returning the command buffer.
    pub async fn encode(&self, request: &PrintRequest) -> Result<CommandBuffer, MiseError> {
        let rendered = self.render(request).await?;
        Ok(protocol::encode(
            &rendered.spec,
            &rendered.bitmap,
            request.copies,
            &self.options,
        )?)
    }

    /// Full pipeline, returning the response body.
    pub async fn process(&self, request: &PrintRequest) -> Result<PrintResponse, MiseError> {
        let buffer = self.encode(request).await?;
        Ok(PrintResponse {
            command_buffer_base64: STANDARD.encode(buffer.as_bytes()),
            label_variant: request.label.label_variant.as_str().to_string(),
            dimensions: ResponseDimensions {
                width: request.printer.label_size_mm.width,
                height: request.printer.label_size_mm.height,
            },
        })
    }

    /// PNG of exactly what the printer will print.
    pub async fn preview(&self, request: &PrintRequest) -> Result<Vec<u8>, MiseError> {
        let rendered = self.render(request).await?;
        PixelRaster::from_raw(
            rendered.bitmap.width(),
            rendered.bitmap.height(),
            1,
            rendered.bitmap.to_gray_image().into_raw(),
        )
        .and_then(|r| r.to_png())
        .map_err(|cause| MiseError::RenderFailed {
            label_id: rendered.label_id.clone(),
            cause,
        })
    }

    /// Render a request into a job for the dispatcher.
    pub async fn job(&self, request: &PrintRequest) -> Result<PrintJob, MiseError> {
        let rendered = self.render(request).await?;
        let job = PrintJob {
            label_id: rendered.label_id,
            spec: rendered.spec,
            bitmap: rendered.bitmap,
            copies: request.copies,
            options: self.options.clone(),
        };
        // Surface encoding problems now rather than halfway through a queue.
        job.single_copy()?;
        Ok(job)
    }
}
