//! JSON error responses.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, warn};

use crate::error::MiseError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_id: Option<String>,
}

/// A [`MiseError`] on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub MiseError);

impl From<MiseError> for ApiError {
    fn from(e: MiseError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(MiseError::Validation(rejection.body_text()))
    }
}

impl ApiError {
    pub fn body(&self) -> ErrorBody {
        let err = &self.0;
        // Pipeline defects are logged in full and reported generically.
        let message = match err {
            MiseError::RenderFailed { .. } => "The label could not be rendered".to_string(),
            MiseError::ConversionFailed { .. } => {
                "The label could not be converted for printing".to_string()
            }
            MiseError::ProtocolEncode(_) => "The printer commands could not be built".to_string(),
            MiseError::Io(_) => "Internal error".to_string(),
            other => other.to_string(),
        };
        ErrorBody {
            error: err.kind(),
            message,
            label_id: err.label_id().map(str::to_string),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if self.0.is_internal() {
            error!(error = %self.0, kind = self.0.kind(), "request failed");
        } else {
            warn!(error = %self.0, kind = self.0.kind(), "request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}
