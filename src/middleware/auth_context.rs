use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};

use crate::backend::{ClinicBackend, Credentials};
use crate::models::AppState;

/// Caller identity as far as the backend is concerned. Tokens are not
/// validated here; the backend does that.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub credentials: Credentials,
}

impl AuthContext {
    /// Backend client that forwards this caller's token.
    pub fn backend(&self, state: &AppState) -> Arc<dyn ClinicBackend> {
        state.backend.with_credentials(&self.credentials)
    }
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            // Authorization: Bearer <token>, optional
            let bearer = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .ok()
                .map(|TypedHeader(authz)| authz.token().to_string());

            Ok(AuthContext {
                credentials: Credentials { bearer },
            })
        }
    }
}
