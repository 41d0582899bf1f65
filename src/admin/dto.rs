use serde::Serialize;

use crate::session::Role;

#[derive(Debug, Clone, Serialize)]
pub struct AdminMetric {
    pub title: &'static str,
    pub value: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<&'static str>,
    pub is_alert: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagedUser {
    pub id: &'static str,
    pub name: &'static str,
    pub email: &'static str,
    pub role: Role,
    pub plan: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminOverview {
    pub sections: Vec<&'static str>,
    pub metrics: Vec<AdminMetric>,
    pub users: Vec<ManagedUser>,
}
