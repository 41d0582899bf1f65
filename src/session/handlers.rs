use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::{session_gone, DashboardTab, View, ViewError};
use crate::{auth::extractors::RequireUser, scan::DaySummary, state::AppState};

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(get_dashboard))
        .route("/dashboard/tab", put(select_tab))
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub view: View,
    pub today: DaySummary,
    pub history_len: usize,
}

#[derive(Debug, Deserialize)]
pub struct SelectTabRequest {
    pub tab: DashboardTab,
}

#[instrument(skip(state, session), fields(session_id = %session.id))]
pub async fn get_dashboard(
    State(state): State<AppState>,
    RequireUser(session): RequireUser,
) -> Result<Json<DashboardResponse>, (StatusCode, String)> {
    let now = OffsetDateTime::now_utc();
    state
        .sessions
        .read(session.id, |s| {
            s.dashboard.as_ref().map(|d| DashboardResponse {
                view: s.view,
                today: d.scan.summary_for(now),
                history_len: d.scan.history.len(),
            })
        })
        .flatten()
        .map(Json)
        .ok_or_else(session_gone)
}

#[instrument(skip(state, session), fields(session_id = %session.id))]
pub async fn select_tab(
    State(state): State<AppState>,
    RequireUser(session): RequireUser,
    Json(body): Json<SelectTabRequest>,
) -> Result<Json<View>, (StatusCode, String)> {
    let result = state
        .sessions
        .update(session.id, |s| -> Result<View, ViewError> {
            let next = s.view.select_tab(body.tab)?;
            s.view = next;
            Ok(next)
        })
        .ok_or_else(session_gone)?;

    match result {
        Ok(view) => {
            info!(tab = ?body.tab, "tab selected");
            Ok(Json(view))
        }
        Err(e) => {
            warn!(error = %e, "tab change rejected");
            Err((StatusCode::CONFLICT, e.to_string()))
        }
    }
}
