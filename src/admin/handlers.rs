use axum::{routing::get, Json, Router};
use tracing::{info, instrument};

use super::dto::{AdminMetric, AdminOverview, ManagedUser};
use crate::{auth::extractors::RequireAdmin, session::Role, state::AppState};

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/overview", get(get_overview))
}

/// Fixed figures; there is no data source behind the admin screen.
pub fn overview() -> AdminOverview {
    let metric = |title, value, subtitle, is_alert| AdminMetric {
        title,
        value,
        subtitle,
        is_alert,
    };
    let user = |id, name, email, role, plan, status| ManagedUser {
        id,
        name,
        email,
        role,
        plan,
        status,
    };

    AdminOverview {
        sections: vec![
            "Dashboard General",
            "Gestión de Usuarios",
            "Base de Datos RAG",
            "Infraestructura",
            "Auditoría IA",
        ],
        metrics: vec![
            metric("Usuarios Totales", "1,240", None, false),
            metric("IA Requests (24h)", "15.4k", None, false),
            metric("DB Vectorial", "98.2%", Some("Índice Optimizado"), false),
            metric("Alertas de Riesgo", "3", None, true),
        ],
        users: vec![
            user("1", "Ana García", "ana@example.com", Role::User, "Pro", "Active"),
            user("2", "Carlos Ruiz", "carlos@example.com", Role::User, "Free", "Active"),
            user("3", "Admin System", "root@nutrilens.ai", Role::Admin, "Pro", "Active"),
            user("4", "Luis Test", "luis@test.com", Role::User, "Free", "Suspended"),
        ],
    }
}

#[instrument(skip(session), fields(session_id = %session.id))]
pub async fn get_overview(RequireAdmin(session): RequireAdmin) -> Json<AdminOverview> {
    info!("admin overview served");
    Json(overview())
}
