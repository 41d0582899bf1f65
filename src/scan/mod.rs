mod dto;
pub mod handlers;
mod services;

use crate::state::AppState;
use axum::Router;

pub use dto::DaySummary;
pub use services::ScanState;

pub fn router() -> Router<AppState> {
    handlers::scan_routes()
}
