use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::{instrument, warn};
use uuid::Uuid;

use super::dto::{GenerateRecipesRequest, RecipesResponse};
use super::services::{generate_recipes, preferences_with_profile};
use crate::{
    auth::extractors::RequireUser,
    session::{session_gone, SessionStore},
    state::AppState,
};

pub fn recipes_routes() -> Router<AppState> {
    Router::new().route("/recipes", get(get_recipes).post(create_recipes))
}

/// Clears the in-flight flag when dropped, including on cancelled requests.
struct GeneratingFlag {
    sessions: SessionStore,
    session_id: Uuid,
}

impl Drop for GeneratingFlag {
    fn drop(&mut self) {
        self.sessions
            .update_dashboard(self.session_id, |d| d.recipes.is_generating = false);
    }
}

#[instrument(skip(state, session), fields(session_id = %session.id))]
pub async fn get_recipes(
    State(state): State<AppState>,
    RequireUser(session): RequireUser,
) -> Result<Json<RecipesResponse>, (StatusCode, String)> {
    state
        .sessions
        .read_dashboard(session.id, |d| RecipesResponse {
            recipes: d.recipes.recipes.clone(),
            is_generating: d.recipes.is_generating,
        })
        .map(Json)
        .ok_or_else(session_gone)
}

/// POST /recipes { preferences, use_profile? }
/// Always 200; a failed generation simply returns no recipes.
#[instrument(skip(state, session, body), fields(session_id = %session.id))]
pub async fn create_recipes(
    State(state): State<AppState>,
    RequireUser(session): RequireUser,
    Json(body): Json<GenerateRecipesRequest>,
) -> Result<Json<RecipesResponse>, (StatusCode, String)> {
    let started = state
        .sessions
        .update_dashboard(session.id, |d| {
            if d.recipes.is_generating {
                return None;
            }
            d.recipes.is_generating = true;
            Some(d.chat.profile.clone())
        })
        .ok_or_else(session_gone)?;
    let Some(profile) = started else {
        warn!("recipe generation already in progress");
        return Err((
            StatusCode::CONFLICT,
            "recipe generation already in progress".into(),
        ));
    };
    let _flag = GeneratingFlag {
        sessions: state.sessions.clone(),
        session_id: session.id,
    };

    let preferences =
        preferences_with_profile(&body.preferences, body.use_profile.then_some(&profile));
    let recipes = generate_recipes(state.genai.as_ref(), &preferences).await;

    state
        .sessions
        .update_dashboard(session.id, |d| {
            d.recipes.recipes = recipes.clone();
        })
        .ok_or_else(session_gone)?;

    Ok(Json(RecipesResponse {
        recipes,
        is_generating: false,
    }))
}
