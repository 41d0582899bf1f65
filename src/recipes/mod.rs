mod dto;
pub mod handlers;
mod services;

use crate::state::AppState;
use axum::Router;

pub use services::RecipesState;

pub fn router() -> Router<AppState> {
    handlers::recipes_routes()
}
