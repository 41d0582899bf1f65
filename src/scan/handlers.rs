use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{debug, error, instrument, warn};

use super::dto::{AnalyzeImageRequest, HistoryItem, ScanResponse};
use super::services::{analyze_food_image, parse_data_url};
use crate::{auth::extractors::RequireUser, session::session_gone, state::AppState};

pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/scan",
            get(get_scan).post(analyze_image).delete(reset_scan),
        )
        .route("/scan/history", get(get_history))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

#[instrument(skip(state, session), fields(session_id = %session.id))]
pub async fn get_scan(
    State(state): State<AppState>,
    RequireUser(session): RequireUser,
) -> Result<Json<ScanResponse>, (StatusCode, String)> {
    state
        .sessions
        .read_dashboard(session.id, |d| ScanResponse {
            analysis: d.scan.analysis.clone(),
            macros: d.scan.macros(),
        })
        .map(Json)
        .ok_or_else(session_gone)
}

/// POST /scan { image: "data:image/...;base64,..." }
/// 200 with the nutrition data, or 502 with the error banner and the preview kept.
#[instrument(skip(state, session, body), fields(session_id = %session.id))]
pub async fn analyze_image(
    State(state): State<AppState>,
    RequireUser(session): RequireUser,
    Json(body): Json<AnalyzeImageRequest>,
) -> Result<(StatusCode, Json<ScanResponse>), (StatusCode, String)> {
    let image = parse_data_url(&body.image).map_err(|e| {
        warn!(error = %e, "rejected upload");
        (StatusCode::BAD_REQUEST, e.to_string())
    })?;

    let preview = body.image;
    let generation = state
        .sessions
        .update_dashboard(session.id, move |d| d.scan.begin(preview))
        .ok_or_else(session_gone)?;

    let outcome = match analyze_food_image(state.genai.as_ref(), &image).await {
        Ok(data) => Some(data),
        Err(e) => {
            error!(error = %e, timeout = e.is_timeout(), "food image analysis failed");
            None
        }
    };
    let failed = outcome.is_none();

    let (applied, response) = state
        .sessions
        .update_dashboard(session.id, |d| {
            let applied = d.scan.finish(generation, outcome);
            let response = ScanResponse {
                analysis: d.scan.analysis.clone(),
                macros: d.scan.macros(),
            };
            (applied, response)
        })
        .ok_or_else(session_gone)?;

    if !applied {
        debug!(generation, "analysis superseded by a newer upload");
        return Ok((StatusCode::OK, Json(response)));
    }
    let status = if failed {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    Ok((status, Json(response)))
}

#[instrument(skip(state, session), fields(session_id = %session.id))]
pub async fn reset_scan(
    State(state): State<AppState>,
    RequireUser(session): RequireUser,
) -> Result<Json<ScanResponse>, (StatusCode, String)> {
    state
        .sessions
        .update_dashboard(session.id, |d| {
            d.scan.reset();
            ScanResponse {
                analysis: d.scan.analysis.clone(),
                macros: Vec::new(),
            }
        })
        .map(Json)
        .ok_or_else(session_gone)
}

#[instrument(skip(state, session), fields(session_id = %session.id))]
pub async fn get_history(
    State(state): State<AppState>,
    RequireUser(session): RequireUser,
) -> Result<Json<Vec<HistoryItem>>, (StatusCode, String)> {
    let now = OffsetDateTime::now_utc();
    state
        .sessions
        .read_dashboard(session.id, |d| d.scan.history_items(now))
        .map(Json)
        .ok_or_else(session_gone)
}
