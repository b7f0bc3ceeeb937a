pub mod jwt;

pub use jwt::{AuthUser, JwtKeys};

use crate::db::Db;
use crate::error::AppError;
use crate::users::User;

/// Loads the user behind a session token. A token for a deleted user no
/// longer authenticates anyone.
pub async fn current_user(db: &Db, AuthUser(id): AuthUser) -> Result<User, AppError> {
    User::find(db, id)
        .await?
        .ok_or(AppError::Unauthorized("User not found"))
}
