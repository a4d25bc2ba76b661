//! # TSPL Protocol Implementation
//!
//! This module builds the command stream understood by TSPL-compatible
//! thermal label printers.
//!
//! ## Module Structure
//!
//! - [`commands`]: Individual command builders (SIZE, GAP, BITMAP, PRINT, ...)
//! - [`tspl`]: Full label encoder and the matching parser
//!
//! ## Usage Example
//!
//! ```
//! use mise::printer::PhysicalSpec;
//! use mise::protocol::{self, CommandBuffer, EncodeOptions};
//! use mise::render::mono::PackedBitmap;
//!
//! // A 60 x 40 mm label at 203 DPI is 480 x 320 dots
//! let spec = PhysicalSpec::new(60.0, 40.0, 203);
//! let blank = PackedBitmap::from_packed(480, 320, vec![0xFF; 60 * 320]).unwrap();
//!
//! let buffer = protocol::encode(&spec, &blank, 2, &EncodeOptions::default()).unwrap();
//! assert!(buffer.as_bytes().starts_with(b"SIZE 60 mm,40 mm\r\n"));
//!
//! let parsed = CommandBuffer::parse(buffer.as_bytes()).unwrap();
//! assert_eq!(parsed.copies, 2);
//! ```

pub mod commands;
pub mod tspl;

use thiserror::Error;

pub use tspl::{BitmapMode, CommandBuffer, EncodeOptions, ParsedBitmap, ParsedLabel, encode};

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Copy count must be at least 1")]
    ZeroCopies,

    #[error("Bitmap buffer is {actual} bytes, expected {expected}")]
    BitmapLength { expected: usize, actual: usize },

    #[error("Bitmap is {bitmap} dots wide but the label is only {label}")]
    BitmapTooWide { bitmap: u32, label: u32 },

    #[error("Invalid label size: {0}")]
    InvalidSpec(String),

    #[error("Invalid printer option: {0}")]
    InvalidOption(String),

    /// The byte stream does not parse as TSPL.
    #[error("Malformed command buffer at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: String },
}
