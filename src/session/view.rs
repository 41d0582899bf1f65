use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardTab {
    #[default]
    Scan,
    Chat,
    Recipes,
}

/// Screen currently shown to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum View {
    #[default]
    Login,
    UserDashboard {
        tab: DashboardTab,
    },
    AdminDashboard,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewError {
    #[error("cannot {action} from the {from} screen")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },
}

impl View {
    pub fn name(&self) -> &'static str {
        match self {
            View::Login => "login",
            View::UserDashboard { .. } => "user dashboard",
            View::AdminDashboard => "admin dashboard",
        }
    }

    fn reject(self, action: &'static str) -> ViewError {
        ViewError::InvalidTransition {
            from: self.name(),
            action,
        }
    }

    pub fn login(self, role: Role) -> Result<View, ViewError> {
        match (self, role) {
            (View::Login, Role::User) => Ok(View::UserDashboard {
                tab: DashboardTab::default(),
            }),
            (View::Login, Role::Admin) => Ok(View::AdminDashboard),
            _ => Err(self.reject("log in")),
        }
    }

    pub fn logout(self) -> Result<View, ViewError> {
        match self {
            View::UserDashboard { .. } | View::AdminDashboard => Ok(View::Login),
            View::Login => Err(self.reject("log out")),
        }
    }

    pub fn select_tab(self, tab: DashboardTab) -> Result<View, ViewError> {
        match self {
            View::UserDashboard { .. } => Ok(View::UserDashboard { tab }),
            _ => Err(self.reject("switch tabs")),
        }
    }
}
