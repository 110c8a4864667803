// src/routes/session_routes.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    engine::{
        cascade::{CascadeField, CascadeUpdate},
        commit::CommitResult,
        form::FormValues,
        session::{PatientSession, SessionView},
        therapist::TherapistRef,
        weight::WeightField,
    },
    error::{ApiError, ErrorObject},
    middleware::auth_context::AuthContext,
    models::{lenient_f64, AppState, Id},
    routes::ApiOk,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{session_id}", get(get_session).delete(close_session))
        .route("/sessions/{session_id}/load", post(load_patient))
        .route("/sessions/{session_id}/visit", post(select_visit))
        .route("/sessions/{session_id}/cascade", patch(update_cascade))
        .route("/sessions/{session_id}/weight", patch(update_weight))
        .route(
            "/sessions/{session_id}/therapist",
            put(select_therapist).delete(clear_therapist),
        )
        .route("/sessions/{session_id}/submit", post(submit))
}

async fn session(state: &AppState, session_id: Uuid) -> Result<Arc<PatientSession>, ApiError> {
    let mut sessions = state.sessions.write().await;
    evict_idle(&mut sessions, state.settings.session_idle_ttl);
    let s = sessions
        .get(&session_id)
        .cloned()
        .ok_or_else(ApiError::session_not_found)?;
    s.touch();
    Ok(s)
}

fn evict_idle(sessions: &mut HashMap<Uuid, Arc<PatientSession>>, ttl: Duration) {
    let now = Instant::now();
    sessions.retain(|session_id, s| {
        let idle = s.is_idle(ttl, now);
        if idle {
            tracing::info!(%session_id, "idle session evicted");
        }
        !idle
    });
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct LoadPatientRequest {
    pub patient_id: Id,
}

#[derive(Debug, Serialize)]
pub struct CreatedSession {
    pub session_id: Uuid,
    pub session: SessionView,
}

#[derive(Debug, Deserialize)]
pub struct SelectVisitRequest {
    pub date: String,
}

#[derive(Debug, Serialize)]
pub struct CascadeResponse {
    pub reset: Vec<CascadeField>,
    pub session: SessionView,
}

#[derive(Debug, Deserialize)]
pub struct WeightRequest {
    pub field: WeightField,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SelectTherapistRequest {
    pub therapist_id: Id,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PartialCommitResponse {
    pub data: CommitResult,
    pub error: ErrorObject,
}

/* ============================================================
   Lifecycle
   ============================================================ */

pub async fn create_session(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<LoadPatientRequest>,
) -> Result<Json<ApiOk<CreatedSession>>, ApiError> {
    let session_id = Uuid::new_v4();
    let s = Arc::new(PatientSession::new(&state.settings));
    {
        let mut sessions = state.sessions.write().await;
        evict_idle(&mut sessions, state.settings.session_idle_ttl);
        sessions.insert(session_id, s.clone());
    }
    tracing::info!(%session_id, patient_id = req.patient_id, "session opened");

    let backend = auth.backend(&state);
    let view = s.load_for_patient(backend.as_ref(), req.patient_id).await?;

    Ok(Json(ApiOk {
        data: CreatedSession {
            session_id,
            session: view,
        },
    }))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ApiOk<SessionView>>, ApiError> {
    let s = session(&state, session_id).await?;
    Ok(Json(ApiOk { data: s.view().await }))
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .write()
        .await
        .remove(&session_id)
        .ok_or_else(ApiError::session_not_found)?;
    tracing::info!(%session_id, "session closed");
    Ok(StatusCode::NO_CONTENT)
}

/* ============================================================
   Engine operations
   ============================================================ */

pub async fn load_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(session_id): Path<Uuid>,
    Json(req): Json<LoadPatientRequest>,
) -> Result<Json<ApiOk<SessionView>>, ApiError> {
    let s = session(&state, session_id).await?;
    let backend = auth.backend(&state);
    let view = s.load_for_patient(backend.as_ref(), req.patient_id).await?;
    Ok(Json(ApiOk { data: view }))
}

pub async fn select_visit(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SelectVisitRequest>,
) -> Result<Json<ApiOk<SessionView>>, ApiError> {
    let s = session(&state, session_id).await?;
    Ok(Json(ApiOk {
        data: s.select_visit(&req.date).await?,
    }))
}

pub async fn update_cascade(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(update): Json<CascadeUpdate>,
) -> Result<Json<ApiOk<CascadeResponse>>, ApiError> {
    let s = session(&state, session_id).await?;
    let (reset, session) = s.update_cascade_field(update).await?;
    Ok(Json(ApiOk {
        data: CascadeResponse { reset, session },
    }))
}

pub async fn update_weight(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<WeightRequest>,
) -> Result<Json<ApiOk<SessionView>>, ApiError> {
    let s = session(&state, session_id).await?;
    Ok(Json(ApiOk {
        data: s.update_weight_field(req.field, req.value).await?,
    }))
}

pub async fn select_therapist(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SelectTherapistRequest>,
) -> Result<Json<ApiOk<SessionView>>, ApiError> {
    let s = session(&state, session_id).await?;

    let display_name = match req.display_name.filter(|n| !n.trim().is_empty()) {
        Some(name) => Some(name),
        None => {
            let backend = auth.backend(&state);
            state
                .therapists
                .lookup(backend.as_ref(), &auth.credentials, req.therapist_id)
                .await
                .map(|t| t.display_name())
        }
    };

    let view = s
        .select_therapist(TherapistRef {
            id: req.therapist_id,
            display_name,
        })
        .await?;
    Ok(Json(ApiOk { data: view }))
}

pub async fn clear_therapist(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ApiOk<SessionView>>, ApiError> {
    let s = session(&state, session_id).await?;
    Ok(Json(ApiOk {
        data: s.clear_therapist().await?,
    }))
}

pub async fn submit(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(session_id): Path<Uuid>,
    Json(values): Json<FormValues>,
) -> Result<Response, ApiError> {
    let s = session(&state, session_id).await?;
    let backend = auth.backend(&state);
    let result = s.submit(backend.as_ref(), values).await?;

    // both sides are reported even when only one failed
    let Some(err) = result.error() else {
        return Ok(Json(ApiOk { data: result }).into_response());
    };
    Ok((
        StatusCode::BAD_GATEWAY,
        Json(PartialCommitResponse {
            data: result,
            error: ErrorObject {
                code: "PARTIAL_COMMIT".to_string(),
                message: err.to_string(),
            },
        }),
    )
        .into_response())
}
