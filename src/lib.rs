//! # mise - Kitchen Label Printing
//!
//! mise turns a kitchen label description (prep, cooked, PPDS) into the exact
//! bytes a TSPL thermal label printer consumes, and delivers them over a
//! local print-service bridge or a wireless link. It provides:
//!
//! - **Rendering**: bitmap-font layout of the label at printer resolution
//! - **Monochrome conversion**: luminance threshold and 1-bpp row packing
//! - **Protocol**: TSPL command buffer encoding and parsing
//! - **Transport**: bridge (TCP) and wireless (RFCOMM) backends behind one trait
//! - **Sessions**: per-transport connection state machine and print queue dispatch
//!
//! ## Quick Start
//!
//! ```no_run
//! use mise::{LabelPipeline, PrintRequest, label::LabelDescription, printer::PhysicalSpec};
//!
//! # async fn demo() -> Result<(), mise::MiseError> {
//! let label = LabelDescription::new("Tomato Sauce", "2026-10-18", "2026-10-21");
//! let request = PrintRequest::new(label, PhysicalSpec::COMPACT_203).with_copies(2);
//!
//! let response = LabelPipeline::default().process(&request).await?;
//! println!("{}", response.command_buffer_base64);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`label`] | Label descriptions and request/response bodies |
//! | [`printer`] | Physical label size and dot conversion |
//! | [`render`] | Layout, raster and monochrome conversion |
//! | [`protocol`] | TSPL command builders and encoder |
//! | [`pipeline`] | Validate, render, convert and encode in one call |
//! | [`transport`] | Bridge and wireless backends |
//! | [`session`] | Connection state machine |
//! | [`dispatch`] | Print queue delivery per transport |
//! | [`server`] | HTTP service |
//! | [`config`] | TOML configuration |
//! | [`error`] | Error types |

pub mod config;
pub mod dispatch;
pub mod error;
pub mod label;
pub mod pipeline;
pub mod printer;
pub mod protocol;
pub mod render;
pub mod server;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use config::Config;
pub use dispatch::{DispatchReport, Dispatcher, PrintJob};
pub use error::MiseError;
pub use label::{PrintRequest, PrintResponse};
pub use pipeline::LabelPipeline;
pub use printer::PhysicalSpec;
pub use session::{PrinterSession, SessionState};
pub use transport::{PrinterTransport, TransportKind};
