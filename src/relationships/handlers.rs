use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::auth::{current_user, AuthUser};
use crate::error::AppError;
use crate::state::AppState;
use crate::users::dto::PublicUser;
use crate::users::User;

#[derive(Debug, Deserialize)]
pub struct FollowRequest {
    pub followed_id: i64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/relationships", post(follow))
        .route("/relationships/:followed_id", delete(unfollow))
}

async fn find_followed(state: &AppState, id: i64) -> Result<User, AppError> {
    User::find(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("User not found"))
}

#[instrument(skip(state))]
pub async fn follow(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<FollowRequest>,
) -> Result<(StatusCode, Json<PublicUser>), AppError> {
    let user = current_user(&state.db, auth).await?;
    let other = find_followed(&state, payload.followed_id).await?;
    user.follow(&state.db, &other).await?;
    info!(follower_id = auth.0, followed_id = payload.followed_id, "followed");
    Ok((StatusCode::CREATED, Json(PublicUser::from(&other))))
}

#[instrument(skip(state))]
pub async fn unfollow(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(followed_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let user = current_user(&state.db, auth).await?;
    let other = find_followed(&state, followed_id).await?;
    user.unfollow(&state.db, &other).await?;
    info!(follower_id = auth.0, followed_id, "unfollowed");
    Ok(StatusCode::NO_CONTENT)
}
