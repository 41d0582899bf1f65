use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::{Role, View};

/// Request body for login. Credentials are only checked for shape.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Response returned after login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub session_id: Uuid,
    pub role: Role,
    pub view: View,
}

/// Public part of the session returned to the client.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub session_id: Uuid,
    pub email: String,
    pub role: Role,
    pub view: View,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub view: View,
}
