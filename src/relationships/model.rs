use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::clock;
use crate::datastore::{Entity, Key, Kind, Query};
use crate::db::Db;
use crate::error::ModelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RelationshipRecord {
    follower_id: i64,
    followed_id: i64,
    #[serde(with = "clock::micros")]
    created_at: OffsetDateTime,
}

/// A follower → followed edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    key: Key,
    pub follower_id: i64,
    pub followed_id: i64,
    pub created_at: OffsetDateTime,
}

/// Equality filter over relationship edges; unset fields match anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationshipFilter {
    pub follower_id: Option<i64>,
    pub followed_id: Option<i64>,
}

impl RelationshipFilter {
    pub fn follower(id: i64) -> Self {
        Self {
            follower_id: Some(id),
            followed_id: None,
        }
    }

    pub fn followed(id: i64) -> Self {
        Self {
            follower_id: None,
            followed_id: Some(id),
        }
    }

    pub fn pair(follower_id: i64, followed_id: i64) -> Self {
        Self {
            follower_id: Some(follower_id),
            followed_id: Some(followed_id),
        }
    }
}

/// One key per pair, so following twice rewrites the same edge.
fn pair_key(follower_id: i64, followed_id: i64) -> Key {
    Key::with_name(Kind::Relationships, format!("{follower_id}:{followed_id}"))
}

impl Relationship {
    fn from_entity(entity: &Entity) -> Result<Self, ModelError> {
        let record: RelationshipRecord = entity.to_record()?;
        Ok(Self {
            key: entity.key.clone(),
            follower_id: record.follower_id,
            followed_id: record.followed_id,
            created_at: record.created_at,
        })
    }

    pub async fn create(
        db: &Db,
        follower_id: i64,
        followed_id: i64,
    ) -> Result<Relationship, ModelError> {
        let record = RelationshipRecord {
            follower_id,
            followed_id,
            created_at: db.clock.now(),
        };
        let key = db
            .store
            .put(Entity::from_record(pair_key(follower_id, followed_id), &record)?)
            .await?;
        debug!(follower_id, followed_id, "relationship created");
        Ok(Self {
            key,
            follower_id,
            followed_id,
            created_at: record.created_at,
        })
    }

    /// With an empty filter nothing is matched rather than everything.
    pub async fn find_by(
        db: &Db,
        filter: RelationshipFilter,
    ) -> Result<Vec<Relationship>, ModelError> {
        if filter.follower_id.is_none() && filter.followed_id.is_none() {
            return Ok(Vec::new());
        }
        let mut query = Query::new(Kind::Relationships);
        if let Some(id) = filter.follower_id {
            query = query.filter("follower_id", id);
        }
        if let Some(id) = filter.followed_id {
            query = query.filter("followed_id", id);
        }
        db.store
            .query(&query)
            .await?
            .iter()
            .map(Self::from_entity)
            .collect()
    }

    pub async fn destroy(&self, db: &Db) -> Result<(), ModelError> {
        db.store.delete(&self.key).await?;
        debug!(
            follower_id = self.follower_id,
            followed_id = self.followed_id,
            "relationship destroyed"
        );
        Ok(())
    }
}
