//! Request and response bodies for encoding a label.

use serde::{Deserialize, Serialize};

use super::LabelDescription;
use crate::printer::PhysicalSpec;
use crate::printer::config::DEFAULT_DPI;

fn default_copies() -> u32 {
    1
}

fn default_dpi() -> u16 {
    DEFAULT_DPI
}

/// Largest printer-side repeat count accepted per request.
pub const MAX_COPIES: u32 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelSizeMm {
    pub width: f32,
    pub height: f32,
}

/// Target printer as described by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterSpec {
    #[serde(default = "default_dpi")]
    pub dpi: u16,
    pub label_size_mm: LabelSizeMm,
}

impl PrinterSpec {
    pub fn physical(&self) -> PhysicalSpec {
        PhysicalSpec::new(self.label_size_mm.width, self.label_size_mm.height, self.dpi)
    }
}

/// A label description plus everything needed to encode it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintRequest {
    #[serde(flatten)]
    pub label: LabelDescription,
    pub printer: PrinterSpec,
    /// Physical copies, repeated by the printer.
    #[serde(default = "default_copies")]
    pub copies: u32,
    /// Luminance cut-off for monochrome conversion (pixels darker than this print).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u8>,
}

impl PrintRequest {
    pub fn new(label: LabelDescription, physical: PhysicalSpec) -> Self {
        Self {
            label,
            printer: PrinterSpec {
                dpi: physical.dpi,
                label_size_mm: LabelSizeMm {
                    width: physical.width_mm,
                    height: physical.height_mm,
                },
            },
            copies: 1,
            threshold: None,
        }
    }

    pub fn with_copies(mut self, copies: u32) -> Self {
        self.copies = copies;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseDimensions {
    pub width: f32,
    pub height: f32,
}

/// Successful encode: the TSPL command buffer, base64 encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintResponse {
    pub command_buffer_base64: String,
    pub label_variant: String,
    /// Label size in millimetres.
    pub dimensions: ResponseDimensions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let json = r#"{
            "kind": "ingredient-label",
            "name": "Tomato Sauce",
            "printedOn": "2026-10-18",
            "expiryDate": "2026-10-21",
            "printer": { "labelSizeMm": { "width": 60, "height": 40 } }
        }"#;
        let req: PrintRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.copies, 1);
        assert_eq!(req.printer.dpi, 203);
        assert_eq!(req.threshold, None);
        assert_eq!(req.printer.physical(), PhysicalSpec::new(60.0, 40.0, 203));
        assert_eq!(req.label.name, "Tomato Sauce");
    }

    #[test]
    fn test_response_is_camel_case() {
        let resp = PrintResponse {
            command_buffer_base64: "U0laRQ==".into(),
            label_variant: "prep".into(),
            dimensions: ResponseDimensions {
                width: 60.0,
                height: 40.0,
            },
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["commandBufferBase64"], "U0laRQ==");
        assert_eq!(value["labelVariant"], "prep");
        assert_eq!(value["dimensions"]["width"], 60.0);
    }
}
