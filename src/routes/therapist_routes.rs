// src/routes/therapist_routes.rs

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::{
    engine::directory::DirectoryPage, middleware::auth_context::AuthContext, models::AppState,
    routes::ApiOk,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/therapists", get(list_therapists))
}

#[derive(Debug, Deserialize)]
pub struct TherapistQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub term: Option<String>,
}

/// Listing failures come back as an empty page with `error` set, never as an
/// HTTP error, so the picker stays usable.
pub async fn list_therapists(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<TherapistQuery>,
) -> Json<ApiOk<DirectoryPage>> {
    let backend = auth.backend(&state);
    let page = q.page.unwrap_or(1);

    let data = match q.term.as_deref() {
        Some(term) => {
            state
                .therapists
                .search(backend.as_ref(), &auth.credentials, term, page, q.page_size)
                .await
        }
        None => state
            .therapists
            .list(backend.as_ref(), &auth.credentials, page, q.page_size)
            .await,
    };
    Json(ApiOk { data })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::backend::mock::{Calls, MockBackend};
    use crate::models::{AppState, EngineSettings};

    async fn get_as(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut req = Request::builder().uri(uri);
        if let Some(t) = token {
            req = req.header("Authorization", format!("Bearer {t}"));
        }
        let resp = app.clone().oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get(backend: MockBackend, uri: &str) -> (StatusCode, Value) {
        let state = AppState::new(Arc::new(backend), EngineSettings::default());
        get_as(&crate::routes::router(state), uri, None).await
    }

    #[tokio::test]
    async fn lists_flattened_page() {
        let backend = MockBackend::new().with_therapist_listing(json!({
            "data": {"data": [{"id": 4, "name": "Ana"}], "total": 12}
        }));
        let (status, body) = get(backend, "/api/v1/therapists?page=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 12);
        assert_eq!(body["data"]["items"][0]["name"], "Ana");
        assert!(body["data"]["error"].is_null());
    }

    #[tokio::test]
    async fn malformed_listing_is_empty_page_not_error() {
        let backend = MockBackend::new().with_therapist_listing(json!("nope"));
        let (status, body) = get(backend, "/api/v1/therapists?term=an").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["items"], json!([]));
        assert_eq!(body["data"]["total"], 0);
        assert!(body["data"]["error"].is_string());
    }

    #[tokio::test]
    async fn cached_listing_goes_back_to_backend_for_other_callers() {
        let backend = MockBackend::new().with_therapist_listing(json!([{"id": 1, "name": "Ana"}]));
        let state = AppState::new(Arc::new(backend.clone()), EngineSettings::default());
        let app = crate::routes::router(state);

        get_as(&app, "/api/v1/therapists", Some("tok-a")).await;
        get_as(&app, "/api/v1/therapists", Some("tok-a")).await;
        assert_eq!(Calls::get(&backend.calls.therapists), 1);

        get_as(&app, "/api/v1/therapists", Some("tok-b")).await;
        assert_eq!(Calls::get(&backend.calls.therapists), 2);
        assert_eq!(backend.bearer().as_deref(), Some("tok-b"));

        let (status, _) = get_as(&app, "/api/v1/therapists", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(Calls::get(&backend.calls.therapists), 3);
        assert_eq!(backend.bearer(), None);
    }
}
