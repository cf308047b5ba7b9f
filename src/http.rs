//! HTTP routes: health, the status report and the WebSocket entry point.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::registry::{ActiveGame, GameRegistry};
use crate::store::SavedSummary;
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<GameRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .route("/ws/:game_type/:game_id", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct StatusReport {
    active: Vec<ActiveGame>,
    saved: Vec<SavedSummary>,
}

async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    let active = state.registry.active_overview();
    let store = state.registry.store().clone();
    let saved = match tokio::task::spawn_blocking(move || store.list_valid()).await {
        Ok(Ok(saved)) => saved,
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "failed to list saved games");
            Vec::new()
        }
        Err(err) => {
            tracing::error!(error = %err, "status task failed");
            Vec::new()
        }
    };
    Json(StatusReport { active, saved })
}
