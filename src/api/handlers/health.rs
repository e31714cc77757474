use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::JSend;
use crate::session::SessionState;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub session: SessionState,
    pub status: String,
    pub version: String,
}

pub async fn index() -> &'static str {
    "✅ File relay is running"
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<JSend<HealthResponse>> {
    let session = state.bridge.session().state();
    let status = if session == SessionState::Ready {
        "ok"
    } else {
        "degraded"
    };

    JSend::success(HealthResponse {
        session,
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
