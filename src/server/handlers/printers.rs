//! Printer session handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::MiseError;
use crate::session::SessionState;
use crate::transport::TransportKind;

use super::super::error::ApiError;
use super::super::state::AppState;

#[derive(Debug, Serialize)]
pub struct PrinterStatus {
    pub transport: TransportKind,
    pub state: SessionState,
}

#[derive(Debug, Serialize)]
pub struct PrinterList {
    pub printers: Vec<PrinterStatus>,
}

fn parse_kind(kind: &str) -> Result<TransportKind, ApiError> {
    kind.parse()
        .map_err(|e: String| ApiError(MiseError::Validation(e)))
}

/// Handle GET /api/printers - session state per transport.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<PrinterList> {
    let printers = state
        .dispatcher
        .states()
        .into_iter()
        .map(|(transport, state)| PrinterStatus { transport, state })
        .collect();
    Json(PrinterList { printers })
}

/// Handle POST /api/printers/:kind/connect
pub async fn connect(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Json<PrinterStatus>, ApiError> {
    let transport = parse_kind(&kind)?;
    let session_state = state.dispatcher.connect(transport).await?;
    Ok(Json(PrinterStatus {
        transport,
        state: session_state,
    }))
}

/// Handle POST /api/printers/:kind/disconnect
pub async fn disconnect(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Json<PrinterStatus>, ApiError> {
    let transport = parse_kind(&kind)?;
    let session_state = state.dispatcher.disconnect(transport).await?;
    Ok(Json(PrinterStatus {
        transport,
        state: session_state,
    }))
}
