//! Print queue handler.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::dispatch::DispatchReport;
use crate::error::MiseError;
use crate::label::PrintRequest;
use crate::transport::TransportKind;

use super::super::error::ApiError;
use super::super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PrintQueueRequest {
    pub transport: TransportKind,
    pub jobs: Vec<PrintRequest>,
}

/// Handle POST /api/print - render every job, then dispatch the queue.
///
/// All jobs are rendered before anything is sent, so a bad label fails
/// the request without a partial print.
pub async fn print(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PrintQueueRequest>, JsonRejection>,
) -> Result<Json<DispatchReport>, ApiError> {
    let Json(request) = body?;
    if request.jobs.is_empty() {
        return Err(MiseError::Validation("jobs must not be empty".into()).into());
    }

    let mut queue = Vec::with_capacity(request.jobs.len());
    for job in &request.jobs {
        queue.push(state.pipeline.job(job).await?);
    }

    let report = state.dispatcher.dispatch(request.transport, &queue).await?;
    Ok(Json(report))
}
