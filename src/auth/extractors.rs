use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use tracing::warn;
use uuid::Uuid;

use super::jwt::JwtKeys;
use crate::{
    session::{Role, View},
    state::AppState,
};

/// Extracts and validates the session token, returning a live session.
pub struct CurrentSession {
    pub id: Uuid,
    pub role: Role,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Read Authorization header
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "missing Authorization header".to_string()))?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or((StatusCode::UNAUTHORIZED, "invalid auth scheme".to_string()))?;

        let claims = JwtKeys::from_ref(state).verify(token).map_err(|_| {
            warn!("invalid or expired token");
            (StatusCode::UNAUTHORIZED, "invalid or expired token".to_string())
        })?;

        // A valid token outlives its session after logout.
        let role = state
            .sessions
            .read(claims.sub, |s| s.role)
            .ok_or((StatusCode::UNAUTHORIZED, "session expired".to_string()))?;

        Ok(CurrentSession {
            id: claims.sub,
            role,
        })
    }
}

async fn on_screen(
    parts: &mut Parts,
    state: &AppState,
    wanted: fn(&View) -> bool,
    label: &str,
) -> Result<CurrentSession, (StatusCode, String)> {
    let session = CurrentSession::from_request_parts(parts, state).await?;
    let view = state
        .sessions
        .read(session.id, |s| s.view)
        .ok_or((StatusCode::UNAUTHORIZED, "session expired".to_string()))?;
    if !wanted(&view) {
        warn!(session_id = %session.id, screen = view.name(), "wrong screen for request");
        return Err((StatusCode::FORBIDDEN, format!("{label} required")));
    }
    Ok(session)
}

/// A session currently on the user dashboard.
pub struct RequireUser(pub CurrentSession);

#[async_trait]
impl FromRequestParts<AppState> for RequireUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        on_screen(
            parts,
            state,
            |v| matches!(v, View::UserDashboard { .. }),
            "user dashboard",
        )
        .await
        .map(RequireUser)
    }
}

/// A session currently on the admin dashboard.
pub struct RequireAdmin(pub CurrentSession);

#[async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        on_screen(
            parts,
            state,
            |v| matches!(v, View::AdminDashboard),
            "admin dashboard",
        )
        .await
        .map(RequireAdmin)
    }
}
