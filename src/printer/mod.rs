//! # Printer Module
//!
//! Physical label stock and resolution.
//!
//! ## Modules
//!
//! - [`config`]: Label size, DPI and millimetre/dot conversion

pub mod config;

pub use config::{PhysicalSpec, PixelDimensions, pixels_from_mm, width_bytes};
