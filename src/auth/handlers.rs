use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, LogoutResponse, MeResponse},
        extractors::CurrentSession,
        jwt::JwtKeys,
    },
    chat::{create_nutrition_chat, ChatState},
    recipes::RecipesState,
    scan::ScanState,
    session::{session_gone, Role, Session, UserDashboard, View},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// POST /auth/login { email, password, role }
/// No credential check: the form is validated and the chosen role opens its dashboard.
#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }
    if payload.password.is_empty() {
        warn!("empty password");
        return Err((StatusCode::BAD_REQUEST, "Password required".into()));
    }

    let view = View::Login.login(payload.role).map_err(|e| {
        error!(error = %e, "login transition failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let dashboard = match payload.role {
        Role::User => Some(UserDashboard {
            scan: ScanState::default(),
            chat: ChatState::new(create_nutrition_chat(state.genai.clone())),
            recipes: RecipesState::default(),
        }),
        Role::Admin => None,
    };

    let session_id = Uuid::new_v4();
    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign(session_id, payload.role).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let now = OffsetDateTime::now_utc();
    state.sessions.insert(Session {
        id: session_id,
        email: payload.email.clone(),
        role: payload.role,
        view,
        created_at: now,
        expires_at: now + keys.ttl,
        dashboard,
    });

    info!(
        session_id = %session_id,
        role = ?payload.role,
        email = %payload.email,
        active = state.sessions.len(),
        "logged in"
    );
    Ok(Json(LoginResponse {
        access_token,
        session_id,
        role: payload.role,
        view,
    }))
}

/// POST /auth/logout
/// Back to the login screen; every piece of session state is dropped.
#[instrument(skip(state, session), fields(session_id = %session.id))]
pub async fn logout(
    State(state): State<AppState>,
    session: CurrentSession,
) -> Result<Json<LogoutResponse>, (StatusCode, String)> {
    let transition = state
        .sessions
        .read(session.id, |s| s.view.logout())
        .ok_or_else(session_gone)?;
    let view = transition.map_err(|e| {
        warn!(error = %e, "logout rejected");
        (StatusCode::CONFLICT, e.to_string())
    })?;

    if let Some(ended) = state.sessions.remove(session.id) {
        let lasted = OffsetDateTime::now_utc() - ended.created_at;
        info!(role = ?ended.role, minutes = lasted.whole_minutes(), "logged out");
    }
    Ok(Json(LogoutResponse { view }))
}

#[instrument(skip(state, session), fields(session_id = %session.id))]
pub async fn get_me(
    State(state): State<AppState>,
    session: CurrentSession,
) -> Result<Json<MeResponse>, (StatusCode, String)> {
    state
        .sessions
        .read(session.id, |s| MeResponse {
            session_id: s.id,
            email: s.email.clone(),
            role: session.role,
            view: s.view,
        })
        .map(Json)
        .ok_or_else(session_gone)
}
