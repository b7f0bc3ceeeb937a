use tracing::{debug, warn};

use super::User;
use crate::db::Db;
use crate::error::ModelError;
use crate::microposts::Micropost;
use crate::relationships::{Relationship, RelationshipFilter};

impl User {
    /// Follows `other`. Following yourself is ignored, following twice is a
    /// no-op.
    pub async fn follow(&self, db: &Db, other: &User) -> Result<(), ModelError> {
        let id = self.require_id()?;
        let other_id = other.require_id()?;
        if id == other_id {
            debug!(user_id = id, "ignoring self-follow");
            return Ok(());
        }
        Relationship::create(db, id, other_id).await?;
        Ok(())
    }

    /// Removes every relationship from this user to `other`.
    pub async fn unfollow(&self, db: &Db, other: &User) -> Result<(), ModelError> {
        let filter = RelationshipFilter::pair(self.require_id()?, other.require_id()?);
        for rel in Relationship::find_by(db, filter).await? {
            rel.destroy(db).await?;
        }
        Ok(())
    }

    pub async fn is_following(&self, db: &Db, other: &User) -> Result<bool, ModelError> {
        let filter = RelationshipFilter::pair(self.require_id()?, other.require_id()?);
        Ok(!Relationship::find_by(db, filter).await?.is_empty())
    }

    /// Users this user follows. Edges pointing at users that no longer exist
    /// are skipped.
    pub async fn following(&self, db: &Db) -> Result<Vec<User>, ModelError> {
        let rels = Relationship::find_by(db, RelationshipFilter::follower(self.require_id()?)).await?;
        load_users(db, rels.iter().map(|r| r.followed_id)).await
    }

    pub async fn followers(&self, db: &Db) -> Result<Vec<User>, ModelError> {
        let rels = Relationship::find_by(db, RelationshipFilter::followed(self.require_id()?)).await?;
        load_users(db, rels.iter().map(|r| r.follower_id)).await
    }

    /// Own posts plus the posts of everyone followed, newest first. Ties
    /// keep the order in which the posts were collected.
    pub async fn feed(&self, db: &Db) -> Result<Vec<Micropost>, ModelError> {
        let id = self.require_id()?;
        let mut posts = Micropost::find_by_user(db, id).await?;
        for rel in Relationship::find_by(db, RelationshipFilter::follower(id)).await? {
            posts.extend(Micropost::find_by_user(db, rel.followed_id).await?);
        }
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    /// Creates a micropost owned by this user. The returned post carries
    /// `errors` and no id when it was invalid.
    pub async fn create_micropost(
        &mut self,
        db: &Db,
        content: impl Into<String>,
    ) -> Result<Micropost, ModelError> {
        let mut post = Micropost::new(self.require_id()?, content);
        if post.save(db).await? {
            self.microposts.record_created(post.clone());
        }
        Ok(post)
    }

    /// This user's microposts, loading the cache when it is cold.
    pub async fn microposts(&mut self, db: &Db) -> Result<&[Micropost], ModelError> {
        let id = self.require_id()?;
        if self.microposts.is_loaded() {
            return Ok(self.microposts.get().unwrap_or_default());
        }
        self.microposts.refresh(db, id).await
    }
}

async fn load_users(db: &Db, ids: impl Iterator<Item = i64>) -> Result<Vec<User>, ModelError> {
    let mut users = Vec::new();
    for id in ids {
        match User::find(db, id).await? {
            Some(user) => users.push(user),
            None => warn!(user_id = id, "relationship points at a missing user"),
        }
    }
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;

    async fn user(db: &Db, name: &str) -> User {
        let email = format!("{}@example.com", name.to_lowercase());
        let mut user = User::new(name, email, "password", "password");
        assert!(user.save(db).await.unwrap(), "{:?}", user.errors);
        user
    }

    #[tokio::test]
    async fn follow_and_unfollow() {
        let (db, _, _) = testing::db();
        let michael = user(&db, "Michael").await;
        let archer = user(&db, "Archer").await;

        assert!(!michael.is_following(&db, &archer).await.unwrap());
        michael.follow(&db, &archer).await.unwrap();
        michael.follow(&db, &archer).await.unwrap();
        assert!(michael.is_following(&db, &archer).await.unwrap());
        assert_eq!(archer.followers(&db).await.unwrap(), vec![michael.clone()]);
        assert_eq!(michael.following(&db).await.unwrap(), vec![archer.clone()]);

        michael.unfollow(&db, &archer).await.unwrap();
        assert!(!michael.is_following(&db, &archer).await.unwrap());
        assert!(archer.followers(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn self_follow_is_ignored() {
        let (db, _, _) = testing::db();
        let michael = user(&db, "Michael").await;
        michael.follow(&db, &michael).await.unwrap();
        assert!(!michael.is_following(&db, &michael).await.unwrap());
    }

    #[tokio::test]
    async fn following_skips_deleted_users() {
        let (db, _, _) = testing::db();
        let michael = user(&db, "Michael").await;
        let archer = user(&db, "Archer").await;
        michael.follow(&db, &archer).await.unwrap();
        db.store
            .delete(&crate::users::model::user_key(archer.id().unwrap()))
            .await
            .unwrap();
        assert!(michael.following(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn feed_has_own_and_followed_posts_newest_first() {
        let (db, _, _) = testing::db();
        let mut michael = user(&db, "Michael").await;
        let mut archer = user(&db, "Archer").await;
        let mut lana = user(&db, "Lana").await;
        michael.follow(&db, &lana).await.unwrap();

        michael.create_micropost(&db, "m1").await.unwrap();
        lana.create_micropost(&db, "l1").await.unwrap();
        archer.create_micropost(&db, "a1").await.unwrap();
        michael.create_micropost(&db, "m2").await.unwrap();
        lana.create_micropost(&db, "l2").await.unwrap();

        let feed = michael.feed(&db).await.unwrap();
        let contents: Vec<_> = feed.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, ["l2", "m2", "l1", "m1"]);
        assert!(feed.windows(2).all(|w| w[0].created_at > w[1].created_at));
    }

    #[tokio::test]
    async fn invalid_micropost_is_not_saved_or_cached() {
        let (db, store, _) = testing::db();
        let mut michael = user(&db, "Michael").await;
        assert!(michael.microposts(&db).await.unwrap().is_empty());

        let post = michael.create_micropost(&db, "  ").await.unwrap();
        assert!(post.id().is_none());
        assert!(post.errors.contains("content", "content can't be blank"));
        assert_eq!(store.count(crate::datastore::Kind::Microposts), 0);

        michael.create_micropost(&db, "hello").await.unwrap();
        assert_eq!(michael.microposts.count(), Some(1));
    }
}
