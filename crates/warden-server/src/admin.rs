use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use warden_core::engine::SnapshotReader;

use crate::metrics::{self, Metrics};

/// `/healthz` reports ready once the permission cache holds a snapshot;
/// before that every authorization is denied.
pub fn create_router<R: SnapshotReader + 'static>(reader: Arc<R>, metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/healthz", get(healthz::<R>).with_state(reader))
        .route(
            "/metrics",
            get(metrics::metrics_handler).with_state(metrics),
        )
}

async fn healthz<R: SnapshotReader>(State(reader): State<Arc<R>>) -> impl IntoResponse {
    match reader.current() {
        Some(snapshot) => (
            StatusCode::OK,
            format!(
                "ok generation={} version={}\n",
                snapshot.generation(),
                snapshot.version()
            ),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "permission cache not loaded\n".to_string(),
        ),
    }
}
