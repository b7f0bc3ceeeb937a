use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::dto::{LoginRequest, RememberRequest, SessionResponse};
use crate::auth::{current_user, AuthUser};
use crate::error::AppError;
use crate::state::AppState;
use crate::users::{TokenKind, User};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create).delete(destroy))
        .route("/sessions/remember", post(remember))
}

#[instrument(skip(state, payload))]
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let db = &state.db;
    let email = payload.email.trim().to_lowercase();

    let mut user = match User::find_by_email(db, &email).await? {
        Some(u) if u.authenticate(db, &payload.password).is_some() => u,
        _ => {
            warn!(email = %email, "login failed");
            return Err(AppError::Unauthorized("Invalid email/password combination"));
        }
    };

    if !user.activated {
        warn!(user_id = ?user.id(), "login before activation");
        return Err(AppError::Forbidden(
            "Account not activated. Check your email for the activation link.",
        ));
    }

    if payload.remember_me {
        user.remember(db).await?;
    } else {
        user.forget(db).await?;
    }
    info!(user_id = ?user.id(), remember = payload.remember_me, "user logged in");
    Ok(Json(SessionResponse::log_in(&state, &user)?))
}

/// Exchanges a remember token for a new session token.
#[instrument(skip(state, payload))]
pub async fn remember(
    State(state): State<AppState>,
    Json(payload): Json<RememberRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let db = &state.db;
    let user = User::find(db, payload.user_id).await?;
    match user {
        Some(user)
            if user.activated
                && user.authenticated(db, TokenKind::Remember, &payload.remember_token) =>
        {
            info!(user_id = payload.user_id, "user logged in from remember token");
            Ok(Json(SessionResponse::log_in(&state, &user)?))
        }
        _ => {
            warn!(user_id = payload.user_id, "remember token rejected");
            Err(AppError::Unauthorized("Invalid remember token"))
        }
    }
}

/// Logging out forgets the persistent login; session tokens simply expire.
#[instrument(skip(state))]
pub async fn destroy(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    let mut user = current_user(&state.db, auth).await?;
    user.forget(&state.db).await?;
    info!(user_id = auth.0, "user logged out");
    Ok(StatusCode::NO_CONTENT)
}
