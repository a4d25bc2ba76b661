//! # Error Types
//!
//! This module defines the crate-level error returned by the label pipeline,
//! the dispatcher and the outer surfaces (HTTP server, CLI).
//!
//! Each pipeline stage has its own error enum next to its code
//! ([`RenderError`](crate::render::RenderError),
//! [`ConversionError`](crate::render::mono::ConversionError),
//! [`EncodeError`](crate::protocol::EncodeError),
//! [`TransportError`](crate::transport::TransportError)). Stage errors are
//! converted into [`MiseError`] at the stage boundary so the caller can tell
//! "your label description was fine but we couldn't render/convert/encode it"
//! apart from "your printer isn't reachable".

use thiserror::Error;

use crate::protocol::EncodeError;
use crate::render::RenderError;
use crate::render::mono::ConversionError;
use crate::transport::{TransportError, TransportKind};

/// Main error type for mise operations
#[derive(Debug, Error)]
pub enum MiseError {
    /// Malformed or incomplete request; fixable by the caller.
    #[error("{0}")]
    Validation(String),

    /// The layout renderer failed or timed out.
    #[error("Failed to render label '{label_id}': {cause}")]
    RenderFailed {
        label_id: String,
        #[source]
        cause: RenderError,
    },

    /// The raster could not be converted to a packed bitmap.
    #[error("Failed to convert label '{label_id}' to monochrome: {cause}")]
    ConversionFailed {
        label_id: String,
        #[source]
        cause: ConversionError,
    },

    /// The TSPL command buffer could not be built.
    #[error("Failed to encode printer commands: {0}")]
    ProtocolEncode(#[from] EncodeError),

    /// No session in the required state for the requested transport.
    #[error("No {kind} printer is connected")]
    TransportUnavailable { kind: TransportKind },

    /// The transport failed in the middle of a job.
    #[error("Printing stopped at item {item_index}: {cause}")]
    TransportSendFailed {
        item_index: usize,
        #[source]
        cause: TransportError,
    },

    /// Connecting to a printer failed.
    #[error("Could not connect to the {kind} printer: {cause}")]
    ConnectFailed {
        kind: TransportKind,
        #[source]
        cause: TransportError,
    },

    /// Invalid configuration file or flag.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MiseError {
    /// Wire name of the error, used in the JSON error response.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::Config(_) => "ValidationError",
            Self::RenderFailed { .. } => "RenderFailed",
            Self::ConversionFailed { .. } => "ConversionFailed",
            Self::ProtocolEncode(_) => "ProtocolEncodeError",
            Self::TransportUnavailable { .. } | Self::ConnectFailed { .. } => {
                "TransportUnavailable"
            }
            Self::TransportSendFailed { .. } => "TransportSendFailed",
            Self::Io(_) => "InternalError",
        }
    }

    /// HTTP-style status for the error.
    ///
    /// Validation is the caller's fault (400). Printer availability problems
    /// are 503/502 so a UI can prompt the operator to reconnect. Everything
    /// else is an internal pipeline defect.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Config(_) => 400,
            Self::TransportUnavailable { .. } | Self::ConnectFailed { .. } => 503,
            Self::TransportSendFailed { .. } => 502,
            Self::RenderFailed { .. }
            | Self::ConversionFailed { .. }
            | Self::ProtocolEncode(_)
            | Self::Io(_) => 500,
        }
    }

    /// Label identifier attached to the failure, if any.
    pub fn label_id(&self) -> Option<&str> {
        match self {
            Self::RenderFailed { label_id, .. } | Self::ConversionFailed { label_id, .. } => {
                Some(label_id)
            }
            _ => None,
        }
    }

    /// Whether the failure is a pipeline defect that should be logged as an error
    /// rather than reported back as caller/operator action.
    pub fn is_internal(&self) -> bool {
        self.status_code() == 500
    }
}
