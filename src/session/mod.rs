//! Per-visitor state: which screen is shown and what each dashboard tab holds.

pub mod handlers;
mod store;
mod view;

use crate::state::AppState;
use axum::{http::StatusCode, Router};

pub use store::{Session, SessionStore, UserDashboard};
pub use view::{DashboardTab, Role, View, ViewError};

pub fn router() -> Router<AppState> {
    handlers::dashboard_routes()
}

/// The session was logged out (or never had a dashboard) while the request ran.
pub(crate) fn session_gone() -> (StatusCode, String) {
    (StatusCode::UNAUTHORIZED, "session expired".to_string())
}
