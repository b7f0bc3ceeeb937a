use std::num::NonZeroU32;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::dto::{PageQuery, PublicUser, SignupRequest, UpdateUserRequest};
use super::User;
use crate::auth::{current_user, AuthUser};
use crate::error::AppError;
use crate::microposts::dto::MicropostView;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(index).post(create))
        .route("/users/:id", get(show).patch(update).delete(destroy))
        .route("/users/:id/following", get(following))
        .route("/users/:id/followers", get(followers))
        .route("/users/:id/microposts", get(microposts))
}

async fn find_user(state: &AppState, id: i64) -> Result<User, AppError> {
    User::find(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("User not found"))
}

#[instrument(skip(state, payload))]
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<PublicUser>), AppError> {
    let user = User::create(
        &state.db,
        &payload.name,
        &payload.email,
        &payload.password,
        &payload.password_confirmation,
    )
    .await?;
    if user.is_new() {
        warn!(count = user.errors.len(), errors = ?user.errors.full_messages(), "signup rejected");
        return Err(AppError::Invalid(user.errors));
    }

    state.mailer.send_account_activation(&user).await?;
    info!(user_id = ?user.id(), "activation mail sent");
    Ok((StatusCode::CREATED, Json(PublicUser::from(&user))))
}

#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(p): Query<PageQuery>,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let page = p.page.unwrap_or(NonZeroU32::MIN);
    let users = User::paginate(&state.db, page).await?;
    Ok(Json(users.iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PublicUser>, AppError> {
    let user = find_user(&state, id).await?;
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip(state, payload))]
pub async fn update(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<PublicUser>, AppError> {
    if user_id != id {
        warn!(user_id, target = id, "profile edit of another user");
        return Err(AppError::Forbidden("Cannot edit another user"));
    }
    let mut user = find_user(&state, id).await?;
    if !user.update(&state.db, payload.into_attributes()).await? {
        return Err(AppError::Invalid(user.errors));
    }
    info!(user_id, "profile updated");
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip(state))]
pub async fn destroy(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let admin = current_user(&state.db, auth).await?;
    if !admin.admin {
        return Err(AppError::Forbidden("Admin only"));
    }
    if admin.id() == Some(id) {
        return Err(AppError::Forbidden("Cannot delete yourself"));
    }
    let user = find_user(&state, id).await?;
    user.destroy(&state.db).await?;
    info!(admin_id = ?admin.id(), user_id = id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn following(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let user = find_user(&state, id).await?;
    let users = user.following(&state.db).await?;
    Ok(Json(users.iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
pub async fn followers(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let user = find_user(&state, id).await?;
    let users = user.followers(&state.db).await?;
    Ok(Json(users.iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
pub async fn microposts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<MicropostView>>, AppError> {
    let mut user = find_user(&state, id).await?;
    let posts = user.microposts(&state.db).await?;
    Ok(Json(posts.iter().map(MicropostView::from).collect()))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    use crate::app::testing::{activated_user, bearer, server, AUTH};
    use crate::datastore::Kind;
    use crate::state::testing::fake;
    use crate::users::{Column, User};

    #[tokio::test]
    async fn signup_creates_an_inactive_user_and_sends_activation_mail() {
        let fake = fake();
        let response = server(&fake)
            .post("/api/v1/users")
            .json(&json!({
                "name": "Example User",
                "email": "User@Example.com",
                "password": "password",
                "password_confirmation": "password"
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["email"], "user@example.com");
        assert_eq!(body["activated"], false);
        assert_eq!(fake.store.count(Kind::Users), 1);

        let mail = fake.outbox.last().expect("activation mail");
        assert_eq!(mail.subject, "Account activation");
        assert_eq!(mail.to, vec!["user@example.com".to_string()]);
    }

    #[tokio::test]
    async fn invalid_signup_returns_field_errors() {
        let fake = fake();
        let response = server(&fake)
            .post("/api/v1/users")
            .json(&json!({
                "name": "",
                "email": "user@invalid",
                "password": "foo",
                "password_confirmation": "bar"
            }))
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = response.json();
        assert_eq!(body["errors"]["name"][0], "name can't be blank");
        assert_eq!(body["errors"]["email"][0], "email is invalid");
        assert_eq!(fake.store.count(Kind::Users), 0);
        assert!(fake.outbox.messages().is_empty());
    }

    #[tokio::test]
    async fn index_requires_login_and_pages() {
        let fake = fake();
        let (_, token) = activated_user(&fake, "Michael", "michael@example.com").await;
        let server = server(&fake);

        server
            .get("/api/v1/users")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let response = server
            .get("/api/v1/users")
            .add_query_param("page", 1)
            .add_header(AUTH, bearer(&token))
            .await;
        response.assert_status_ok();
        let users: Vec<Value> = response.json();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0]["name"], "Michael");
    }

    #[tokio::test]
    async fn show_returns_404_for_unknown_users() {
        let fake = fake();
        server(&fake)
            .get("/api/v1/users/999")
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn update_only_by_the_user_themself() {
        let fake = fake();
        let (michael, token) = activated_user(&fake, "Michael", "michael@example.com").await;
        let (archer, _) = activated_user(&fake, "Archer", "archer@example.com").await;
        let server = server(&fake);

        server
            .patch(&format!("/api/v1/users/{}", archer.id().unwrap()))
            .add_header(AUTH, bearer(&token))
            .json(&json!({ "name": "Hacked" }))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let response = server
            .patch(&format!("/api/v1/users/{}", michael.id().unwrap()))
            .add_header(AUTH, bearer(&token))
            .json(&json!({ "name": "Foo Bar", "password": "", "password_confirmation": "" }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["name"], "Foo Bar");
    }

    #[tokio::test]
    async fn invalid_update_is_rejected() {
        let fake = fake();
        let (michael, token) = activated_user(&fake, "Michael", "michael@example.com").await;

        let response = server(&fake)
            .patch(&format!("/api/v1/users/{}", michael.id().unwrap()))
            .add_header(AUTH, bearer(&token))
            .json(&json!({ "email": "foo@invalid", "password": "foo", "password_confirmation": "bar" }))
            .await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        let stored = User::find(&fake.state.db, michael.id().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.email, "michael@example.com");
    }

    #[tokio::test]
    async fn only_admins_delete_other_users() {
        let fake = fake();
        let db = &fake.state.db;
        let (mut admin, admin_token) = activated_user(&fake, "Admin", "admin@example.com").await;
        admin.update_attribute(db, Column::Admin(true)).await.unwrap();
        let (archer, archer_token) = activated_user(&fake, "Archer", "archer@example.com").await;
        let server = server(&fake);

        server
            .delete(&format!("/api/v1/users/{}", admin.id().unwrap()))
            .add_header(AUTH, bearer(&archer_token))
            .await
            .assert_status(StatusCode::FORBIDDEN);
        server
            .delete(&format!("/api/v1/users/{}", admin.id().unwrap()))
            .add_header(AUTH, bearer(&admin_token))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        server
            .delete(&format!("/api/v1/users/{}", archer.id().unwrap()))
            .add_header(AUTH, bearer(&admin_token))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        assert_eq!(fake.store.count(Kind::Users), 1);
        assert_eq!(fake.store.count(Kind::Emails), 1);
    }

    #[tokio::test]
    async fn following_followers_and_microposts_lists() {
        let fake = fake();
        let db = &fake.state.db;
        let (mut michael, _) = activated_user(&fake, "Michael", "michael@example.com").await;
        let (archer, _) = activated_user(&fake, "Archer", "archer@example.com").await;
        michael.follow(db, &archer).await.unwrap();
        michael.create_micropost(db, "hello").await.unwrap();
        let server = server(&fake);

        let following: Vec<Value> = server
            .get(&format!("/api/v1/users/{}/following", michael.id().unwrap()))
            .await
            .json();
        assert_eq!(following.len(), 1);
        assert_eq!(following[0]["name"], "Archer");

        let followers: Vec<Value> = server
            .get(&format!("/api/v1/users/{}/followers", archer.id().unwrap()))
            .await
            .json();
        assert_eq!(followers[0]["name"], "Michael");

        let posts: Vec<Value> = server
            .get(&format!("/api/v1/users/{}/microposts", michael.id().unwrap()))
            .await
            .json();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0]["content"], "hello");
    }
}
