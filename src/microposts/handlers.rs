use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::dto::{CreateMicropostRequest, MicropostView};
use super::Micropost;
use crate::auth::{current_user, AuthUser};
use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/microposts", post(create))
        .route("/microposts/:id", delete(destroy))
        .route("/feed", get(feed))
}

#[instrument(skip(state, payload))]
pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateMicropostRequest>,
) -> Result<(StatusCode, Json<MicropostView>), AppError> {
    let mut user = current_user(&state.db, auth).await?;
    let post = user.create_micropost(&state.db, payload.content).await?;
    if post.id().is_none() {
        return Err(AppError::Invalid(post.errors));
    }
    info!(user_id = auth.0, micropost_id = ?post.id(), "micropost created");
    Ok((StatusCode::CREATED, Json(MicropostView::from(&post))))
}

#[instrument(skip(state))]
pub async fn destroy(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let post = Micropost::find(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("Micropost not found"))?;
    if post.user_id != Some(user_id) {
        warn!(user_id, micropost_id = id, "delete of another user's micropost");
        return Err(AppError::Forbidden("Not your micropost"));
    }
    post.destroy(&state.db).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn feed(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<MicropostView>>, AppError> {
    let user = current_user(&state.db, auth).await?;
    let posts = user.feed(&state.db).await?;
    Ok(Json(posts.iter().map(MicropostView::from).collect()))
}
