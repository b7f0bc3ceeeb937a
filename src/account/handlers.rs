use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::dto::{EmailQuery, NewPasswordRequest, Notice, ResetRequest};
use crate::error::AppError;
use crate::sessions::SessionResponse;
use crate::state::AppState;
use crate::users::{Attribute, TokenKind, User};
use crate::validation::Errors;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/account_activations/:token", get(activate))
        .route("/password_resets", post(request_reset))
        .route("/password_resets/:token", patch(reset_password))
}

#[instrument(skip(state, token))]
pub async fn activate(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(q): Query<EmailQuery>,
) -> Result<Json<SessionResponse>, AppError> {
    let db = &state.db;
    let user = User::find_by_email(db, &q.email).await?;
    let mut user = match user {
        Some(u) if !u.activated && u.authenticated(db, TokenKind::Activation, &token) => u,
        _ => {
            warn!(email = %q.email, "invalid activation link");
            return Err(AppError::BadRequest("Invalid activation link"));
        }
    };
    user.activate(db).await?;
    Ok(Json(SessionResponse::log_in(&state, &user)?))
}

#[instrument(skip(state, payload))]
pub async fn request_reset(
    State(state): State<AppState>,
    Json(payload): Json<ResetRequest>,
) -> Result<(StatusCode, Json<Notice>), AppError> {
    let db = &state.db;
    let mut user = User::find_by_email(db, payload.email.trim())
        .await?
        .ok_or(AppError::NotFound("Email address not found"))?;
    user.create_reset_digest(db).await?;
    state.mailer.send_password_reset(&user).await?;
    info!(user_id = ?user.id(), "password reset mail sent");
    Ok((
        StatusCode::ACCEPTED,
        Json(Notice {
            message: "Email sent with password reset instructions",
        }),
    ))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<NewPasswordRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let db = &state.db;
    let user = User::find_by_email(db, &payload.email).await?;
    let mut user = match user {
        Some(u) if u.activated && u.authenticated(db, TokenKind::Reset, &token) => u,
        _ => {
            warn!(email = %payload.email, "invalid password reset link");
            return Err(AppError::NotFound("Invalid password reset link"));
        }
    };
    if user.password_reset_expired(db) {
        return Err(AppError::Gone("Password reset has expired."));
    }
    if payload.password.is_empty() {
        let mut errors = Errors::new();
        errors.add("password", "password can't be empty");
        return Err(AppError::Invalid(errors));
    }

    let attributes = [
        Attribute::Password(payload.password),
        Attribute::PasswordConfirmation(payload.password_confirmation),
    ];
    if !user.update(db, attributes).await? {
        return Err(AppError::Invalid(user.errors));
    }
    user.clear_reset_digest(db).await?;
    info!(user_id = ?user.id(), "password has been reset");
    Ok(Json(SessionResponse::log_in(&state, &user)?))
}
