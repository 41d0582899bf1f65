mod dto;
mod extract;
pub mod handlers;
pub mod profile;
mod services;

use crate::state::AppState;
use axum::Router;

pub use services::{create_nutrition_chat, ChatState};

pub fn router() -> Router<AppState> {
    handlers::chat_routes()
}
