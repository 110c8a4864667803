use axum::{Json, Router, extract::State, routing::get};

use crate::models::AppState;
use crate::routes::ApiOk;

#[derive(serde::Serialize)]
pub struct HealthData {
    pub status: String,
    pub open_sessions: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
}

pub async fn health(State(state): State<AppState>) -> Json<ApiOk<HealthData>> {
    let open_sessions = state.sessions.read().await.len();
    Json(ApiOk {
        data: HealthData {
            status: "ok".to_string(),
            open_sessions,
        },
    })
}
