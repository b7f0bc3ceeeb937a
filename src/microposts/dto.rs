use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::Micropost;

#[derive(Debug, Serialize)]
pub struct MicropostView {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub content: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl From<&Micropost> for MicropostView {
    fn from(post: &Micropost) -> Self {
        Self {
            id: post.id(),
            user_id: post.user_id,
            content: post.content.clone(),
            created_at: post.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMicropostRequest {
    pub content: String,
}
