use crate::models::AppState;
use axum::Router;
use serde::Serialize;

pub mod home_routes;
pub mod session_routes;
pub mod therapist_routes;

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", session_routes::router())
        .nest("/api/v1", therapist_routes::router())
        .merge(home_routes::router())
        .with_state(state)
}
