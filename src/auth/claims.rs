use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::Role;

/// JWT payload identifying a dashboard session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // session ID
    pub role: Role,  // role picked at login
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
}
