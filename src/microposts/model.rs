use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::clock;
use crate::datastore::{Direction, Entity, Key, Kind, Query};
use crate::db::Db;
use crate::error::ModelError;
use crate::validation::{is_blank, Errors};

pub const MAX_CONTENT_CHARS: usize = 140;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MicropostRecord {
    user_id: i64,
    content: String,
    #[serde(with = "clock::micros")]
    created_at: OffsetDateTime,
    #[serde(with = "clock::micros")]
    updated_at: OffsetDateTime,
}

/// A short status message owned by one user.
#[derive(Debug, Clone, PartialEq)]
pub struct Micropost {
    id: Option<i64>,
    pub user_id: Option<i64>,
    pub content: String,
    pub created_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
    pub errors: Errors,
}

impl Micropost {
    pub fn new(user_id: i64, content: impl Into<String>) -> Self {
        Self {
            id: None,
            user_id: Some(user_id),
            content: content.into(),
            created_at: None,
            updated_at: None,
            errors: Errors::new(),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    fn from_entity(entity: &Entity) -> Result<Self, ModelError> {
        let record: MicropostRecord = entity.to_record()?;
        Ok(Self {
            id: entity.key.numeric_id(),
            user_id: Some(record.user_id),
            content: record.content,
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
            errors: Errors::new(),
        })
    }

    pub fn valid(&mut self) -> bool {
        self.errors = Errors::new();
        if self.user_id.is_none() {
            self.errors.add("user_id", "user can't be blank");
        }
        if is_blank(&self.content) {
            self.errors.add("content", "content can't be blank");
        }
        if self.content.chars().count() > MAX_CONTENT_CHARS {
            self.errors.add("content", "content is too long");
        }
        self.errors.is_empty()
    }

    /// Validates and writes the post. Returns `false` with `errors` filled in
    /// when the post is invalid.
    pub async fn save(&mut self, db: &Db) -> Result<bool, ModelError> {
        if !self.valid() {
            return Ok(false);
        }
        let Some(user_id) = self.user_id else {
            return Ok(false);
        };
        let now = db.clock.now();
        let record = MicropostRecord {
            user_id,
            content: self.content.clone(),
            created_at: self.created_at.unwrap_or(now),
            updated_at: now,
        };
        let key = match self.id {
            Some(id) => Key::with_id(Kind::Microposts, id),
            None => Key::incomplete(Kind::Microposts),
        };
        let key = db.store.put(Entity::from_record(key, &record)?).await?;
        self.id = key.numeric_id();
        self.created_at = Some(record.created_at);
        self.updated_at = Some(record.updated_at);
        debug!(micropost_id = ?self.id, user_id, "micropost saved");
        Ok(true)
    }

    pub async fn find(db: &Db, id: i64) -> Result<Option<Micropost>, ModelError> {
        match db.store.get(&Key::with_id(Kind::Microposts, id)).await? {
            Some(entity) => Ok(Some(Self::from_entity(&entity)?)),
            None => Ok(None),
        }
    }

    /// Posts of one user, newest first.
    pub async fn find_by_user(db: &Db, user_id: i64) -> Result<Vec<Micropost>, ModelError> {
        let query = Query::new(Kind::Microposts)
            .filter("user_id", user_id)
            .order_by("created_at", Direction::Descending);
        db.store
            .query(&query)
            .await?
            .iter()
            .map(Self::from_entity)
            .collect()
    }

    pub async fn destroy(&self, db: &Db) -> Result<(), ModelError> {
        let id = self.id.ok_or(ModelError::Unsaved { kind: "micropost" })?;
        db.store.delete(&Key::with_id(Kind::Microposts, id)).await?;
        debug!(micropost_id = id, "micropost destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;

    #[test]
    fn content_is_required_and_bounded() {
        let mut post = Micropost::new(1, "   ");
        assert!(!post.valid());
        assert!(post.errors.contains("content", "content can't be blank"));

        let mut post = Micropost::new(1, "a".repeat(MAX_CONTENT_CHARS + 1));
        assert!(!post.valid());
        assert!(post.errors.contains("content", "content is too long"));

        let mut post = Micropost::new(1, "a".repeat(MAX_CONTENT_CHARS));
        assert!(post.valid());
    }

    #[test]
    fn user_is_required() {
        let mut post = Micropost::new(1, "hello");
        post.user_id = None;
        assert!(!post.valid());
        assert!(post.errors.contains("user_id", "user can't be blank"));
    }

    #[tokio::test]
    async fn save_find_and_destroy() {
        let (db, _, _) = testing::db();
        let mut post = Micropost::new(5, "Lorem ipsum");
        assert!(post.save(&db).await.unwrap());
        let id = post.id().expect("id assigned");

        let found = Micropost::find(&db, id).await.unwrap().expect("stored");
        assert_eq!(found, post);

        found.destroy(&db).await.unwrap();
        assert!(Micropost::find(&db, id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_post_is_not_written() {
        let (db, store, _) = testing::db();
        let mut post = Micropost::new(5, "");
        assert!(!post.save(&db).await.unwrap());
        assert!(post.id().is_none());
        assert_eq!(store.count(Kind::Microposts), 0);
    }

    #[tokio::test]
    async fn find_by_user_is_newest_first() {
        let (db, _, _) = testing::db();
        for content in ["first", "second", "third"] {
            Micropost::new(1, content).save(&db).await.unwrap();
        }
        Micropost::new(2, "other").save(&db).await.unwrap();

        let posts = Micropost::find_by_user(&db, 1).await.unwrap();
        let contents: Vec<_> = posts.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, ["third", "second", "first"]);
    }
}
