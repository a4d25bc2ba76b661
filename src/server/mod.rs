//! # HTTP Server for Label Encoding and Printing
//!
//! Exposes the label pipeline and the printer sessions over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! mise serve --listen 0.0.0.0:8080 --config mise.toml
//! ```
//!
//! ## Routes
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | POST | `/api/labels/encode` | `{ commandBufferBase64, labelVariant, dimensions }` |
//! | POST | `/api/labels/preview` | PNG |
//! | GET | `/api/printers` | session state per transport |
//! | POST | `/api/printers/:kind/connect` | session state |
//! | POST | `/api/printers/:kind/disconnect` | session state |
//! | POST | `/api/print` | dispatch report |
//!
//! Errors are `{ error, message, labelId? }` with 400 for validation, 503
//! when no printer is connected, 502 when a send fails, 500 otherwise.

mod error;
mod handlers;
mod state;

pub use error::{ApiError, ErrorBody};
pub use state::AppState;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::MiseError;

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/labels/encode", post(handlers::labels::encode))
        .route("/api/labels/preview", post(handlers::labels::preview))
        .route("/api/printers", get(handlers::printers::list))
        .route(
            "/api/printers/:kind/connect",
            post(handlers::printers::connect),
        )
        .route(
            "/api/printers/:kind/disconnect",
            post(handlers::printers::disconnect),
        )
        .route("/api/print", post(handlers::print::print))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(state: AppState) -> Result<(), MiseError> {
    let listen_addr = state.config.listen.clone();
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .map_err(|e| MiseError::Config(format!("Failed to bind to {}: {}", listen_addr, e)))?;
    info!(listen = %listen_addr, "mise HTTP server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::dispatch::Dispatcher;
    use crate::pipeline::LabelPipeline;
    use crate::session::PrinterSession;
    use crate::transport::{BridgeConfig, BridgeTransport};

    fn app() -> Router {
        let dispatcher = Dispatcher::new().with_session(PrinterSession::new(Box::new(
            BridgeTransport::tcp(BridgeConfig::default()),
        )));
        let state = AppState::new(Config::default(), LabelPipeline::default(), dispatcher);
        router(Arc::new(state))
    }

    fn label() -> Value {
        json!({
            "kind": "ingredient-label",
            "name": "Tomato Sauce",
            "printedOn": "2026-10-18",
            "expiryDate": "2026-10-21",
            "labelVariant": "prep",
            "printer": { "dpi": 203, "labelSizeMm": { "width": 60, "height": 40 } }
        })
    }

    async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_encode_ok() {
        let (status, body) = post(app(), "/api/labels/encode", label()).await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["labelVariant"], "prep");
        assert_eq!(value["dimensions"]["width"], 60.0);
        assert!(value["commandBufferBase64"].as_str().unwrap().starts_with("U0laRSA2MCBtbSw0MCBtbQ0K"));
    }

    #[tokio::test]
    async fn test_ppds_without_storage_is_400() {
        let mut body = label();
        body["labelVariant"] = json!("ppds");
        body["businessName"] = json!("Corner Deli");
        let (status, body) = post(app(), "/api/labels/encode", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "ValidationError");
        assert!(value["message"].as_str().unwrap().contains("storageInfo"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_400() {
        let (status, body) = post(app(), "/api/labels/encode", json!({ "name": 3 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "ValidationError");
    }

    #[tokio::test]
    async fn test_preview_png() {
        let (status, body) = post(app(), "/api/labels/preview", label()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..4], b"\x89PNG");
    }

    #[tokio::test]
    async fn test_print_without_connection_is_503() {
        let mut job = label();
        job["copies"] = json!(2);
        let (status, body) = post(
            app(),
            "/api/print",
            json!({ "transport": "bridge", "jobs": [job] }),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "TransportUnavailable");
        assert_eq!(value["message"], "No bridge printer is connected");
    }

    #[tokio::test]
    async fn test_printer_list() {
        let response = app()
            .oneshot(Request::get("/api/printers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value["printers"],
            json!([{ "transport": "bridge", "state": "disconnected" }])
        );
    }

    #[tokio::test]
    async fn test_unknown_transport_is_400() {
        let (status, _) = post(app(), "/api/printers/usb/connect", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
