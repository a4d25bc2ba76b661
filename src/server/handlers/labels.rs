//! Label encode and preview handlers.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::header,
    response::IntoResponse,
};
use std::sync::Arc;

use crate::label::{PrintRequest, PrintResponse};

use super::super::error::ApiError;
use super::super::state::AppState;

/// Handle POST /api/labels/encode - build the TSPL command buffer.
pub async fn encode(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PrintRequest>, JsonRejection>,
) -> Result<Json<PrintResponse>, ApiError> {
    let Json(request) = body?;
    let response = state.pipeline.process(&request).await?;
    Ok(Json(response))
}

/// Handle POST /api/labels/preview - render what the printer would print, as PNG.
pub async fn preview(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PrintRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body?;
    let png_bytes = state.pipeline.preview(&request).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png_bytes))
}
