use axum::extract::FromRef;
use serde::{Deserialize, Serialize};

use crate::auth::JwtKeys;
use crate::error::AppError;
use crate::state::AppState;
use crate::users::dto::PublicUser;
use crate::users::User;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Deserialize)]
pub struct RememberRequest {
    pub user_id: i64,
    pub remember_token: String,
}

/// Response of every operation that logs a user in.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember_token: Option<String>,
    pub user: PublicUser,
}

impl SessionResponse {
    /// Signs a session token for `user`, passing on a freshly issued
    /// remember token if there is one.
    pub fn log_in(state: &AppState, user: &User) -> Result<Self, AppError> {
        let id = user.id().ok_or(AppError::NotFound("User not found"))?;
        let token = JwtKeys::from_ref(state).sign(id)?;
        Ok(Self {
            token,
            remember_token: user.remember_token.clone(),
            user: PublicUser::from(user),
        })
    }
}
