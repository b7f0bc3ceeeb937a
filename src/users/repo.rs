use std::num::NonZeroU32;

use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use super::model::{email_key, user_key, Attribute, Column, EmailRecord, UserRecord};
use super::validation::EMAIL_TAKEN;
use super::User;
use crate::credentials::new_token;
use crate::datastore::{Datastore, Direction, Entity, Key, Kind, Query, StoreError};
use crate::db::Db;
use crate::error::ModelError;
use crate::microposts::Micropost;
use crate::relationships::{Relationship, RelationshipFilter};

pub const PER_PAGE: u32 = 30;

enum Commit {
    Done(Vec<Key>),
    EmailTaken,
}

fn email_entity(email: &str, at: OffsetDateTime) -> Result<Entity, StoreError> {
    Entity::from_record(email_key(email), &EmailRecord { created_at: at })
}

/// Claims the email index entry and writes the new user in one transaction.
async fn insert_tx(store: &dyn Datastore, email: Entity, user: Entity) -> Result<Commit, StoreError> {
    let mut tx = store.transaction().await?;
    if tx.get(&email.key).await?.is_some() {
        tx.rollback().await?;
        return Ok(Commit::EmailTaken);
    }
    tx.put(email).await?;
    tx.put(user).await?;
    Ok(Commit::Done(tx.commit().await?))
}

/// Moves the email index entry from `old_email` to the new one and writes
/// the user, all or nothing.
async fn change_email_tx(
    store: &dyn Datastore,
    old_email: &str,
    email: Entity,
    user: Entity,
) -> Result<Commit, StoreError> {
    let mut tx = store.transaction().await?;
    tx.delete(&email_key(old_email)).await?;
    if tx.get(&email.key).await?.is_some() {
        tx.rollback().await?;
        return Ok(Commit::EmailTaken);
    }
    tx.put(email).await?;
    tx.put(user).await?;
    Ok(Commit::Done(tx.commit().await?))
}

impl User {
    /// Validates, hashes the password and inserts or updates the user.
    pub async fn save(&mut self, db: &Db) -> Result<bool, ModelError> {
        self.email = self.email.to_lowercase();
        if !self.valid(db).await? {
            debug!(email = %self.email, errors = ?self.errors, "user is invalid");
            return Ok(false);
        }
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            self.password_digest = Some(db.codec.hash(password)?);
        }
        if self.is_new() {
            self.insert(db).await
        } else {
            self.write(db).await
        }
    }

    /// Builds a user from signup input and saves it; the returned user
    /// carries `errors` when the save failed.
    pub async fn create(
        db: &Db,
        name: &str,
        email: &str,
        password: &str,
        password_confirmation: &str,
    ) -> Result<User, ModelError> {
        let mut user = User::new(name, email, password, password_confirmation);
        user.save(db).await?;
        Ok(user)
    }

    /// First write of a new user. Also creates the activation token, which
    /// stays in memory for the activation email.
    pub(crate) async fn insert(&mut self, db: &Db) -> Result<bool, ModelError> {
        let token = new_token();
        self.activation_digest = Some(db.codec.hash(&token)?);
        self.activation_token = Some(token);

        let now = db.clock.now();
        let record = self.to_record(now, now);
        let user = Entity::from_record(Key::incomplete(Kind::Users), &record)?;
        let email = email_entity(&self.email, now)?;

        match insert_tx(db.store.as_ref(), email, user).await {
            Ok(Commit::Done(keys)) => {
                let id = keys
                    .iter()
                    .find(|k| k.kind == Kind::Users)
                    .and_then(Key::numeric_id)
                    .ok_or_else(|| StoreError::MalformedKey {
                        raw: format!("{keys:?}"),
                    })?;
                self.id = Some(id);
                self.created_at = Some(record.created_at);
                self.updated_at = Some(record.updated_at);
                info!(user_id = id, email = %self.email, "user registered");
                Ok(true)
            }
            Ok(Commit::EmailTaken) => {
                warn!(email = %self.email, "email claimed before insert");
                self.errors.add("email", EMAIL_TAKEN);
                Ok(false)
            }
            Err(StoreError::Aborted) => self.lost_race(db).await,
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the current state over the stored record, moving the email
    /// index entry when the email changed. Sets `updated_at` on success.
    async fn write(&mut self, db: &Db) -> Result<bool, ModelError> {
        let id = self.require_id()?;
        let stored = db
            .store
            .get(&user_key(id))
            .await?
            .ok_or(ModelError::Missing { kind: "user", id })?;
        let stored: UserRecord = stored.to_record()?;

        let now = db.clock.now();
        let record = self.to_record(stored.created_at, now);
        let user = Entity::from_record(user_key(id), &record)?;

        if stored.email == self.email {
            db.store.put(user).await?;
        } else {
            let email = email_entity(&self.email, now)?;
            match change_email_tx(db.store.as_ref(), &stored.email, email, user).await {
                Ok(Commit::Done(_)) => {
                    info!(user_id = id, from = %stored.email, to = %self.email, "email changed");
                }
                Ok(Commit::EmailTaken) => {
                    self.errors.add("email", EMAIL_TAKEN);
                    return Ok(false);
                }
                Err(StoreError::Aborted) => return self.lost_race(db).await,
                Err(e) => return Err(e.into()),
            }
        }

        self.created_at = Some(record.created_at);
        self.updated_at = Some(record.updated_at);
        debug!(user_id = id, "user updated");
        Ok(true)
    }

    /// A concurrent writer won; report the email as taken when that is what
    /// the winner did.
    async fn lost_race(&mut self, db: &Db) -> Result<bool, ModelError> {
        warn!(email = %self.email, "user write aborted by a concurrent transaction");
        if db.store.get(&email_key(&self.email)).await?.is_some() {
            self.errors.add("email", EMAIL_TAKEN);
        }
        Ok(false)
    }

    /// Validated partial update. The attributes are applied to a scratch
    /// copy; `self` only changes once that copy has been written.
    pub async fn update(
        &mut self,
        db: &Db,
        attributes: impl IntoIterator<Item = Attribute>,
    ) -> Result<bool, ModelError> {
        let mut scratch = self.clone();
        let mut dirty = false;
        for attribute in attributes {
            dirty |= scratch.apply(attribute);
        }

        if !scratch.valid(db).await? {
            self.errors = scratch.errors;
            return Ok(false);
        }
        if !dirty {
            self.errors = scratch.errors;
            return Ok(true);
        }

        if let Some(password) = scratch.password.as_deref().filter(|p| !p.is_empty()) {
            scratch.password_digest = Some(db.codec.hash(password)?);
        }
        if scratch.write(db).await? {
            *self = scratch;
            Ok(true)
        } else {
            self.errors = scratch.errors;
            Ok(false)
        }
    }

    /// Unvalidated update of system-managed columns, with the same dirty
    /// check and scratch-copy discipline as [`User::update`].
    pub async fn update_columns(
        &mut self,
        db: &Db,
        columns: impl IntoIterator<Item = Column>,
    ) -> Result<bool, ModelError> {
        let mut scratch = self.clone();
        let mut dirty = false;
        for column in columns {
            dirty |= scratch.apply_column(column);
        }
        if !dirty {
            return Ok(true);
        }

        scratch.errors = Default::default();
        if scratch.write(db).await? {
            *self = scratch;
            Ok(true)
        } else {
            self.errors = scratch.errors;
            Ok(false)
        }
    }

    pub async fn update_attribute(&mut self, db: &Db, column: Column) -> Result<bool, ModelError> {
        self.update_columns(db, [column]).await
    }

    pub async fn find(db: &Db, id: i64) -> Result<Option<User>, ModelError> {
        match db.store.get(&user_key(id)).await? {
            Some(entity) => Ok(Some(User::from_entity(&entity)?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_email(db: &Db, email: &str) -> Result<Option<User>, ModelError> {
        Ok(User::where_email(db, email).await?.into_iter().next())
    }

    pub(crate) async fn where_email(db: &Db, email: &str) -> Result<Vec<User>, ModelError> {
        let query = Query::new(Kind::Users).filter("email", email.to_lowercase());
        db.store
            .query(&query)
            .await?
            .iter()
            .map(User::from_entity)
            .collect()
    }

    /// Every user, oldest first.
    pub async fn all(db: &Db) -> Result<Vec<User>, ModelError> {
        let query = Query::new(Kind::Users).order_by("created_at", Direction::Ascending);
        db.store
            .query(&query)
            .await?
            .iter()
            .map(User::from_entity)
            .collect()
    }

    /// One page of [`PER_PAGE`] users, oldest first; pages start at 1.
    pub async fn paginate(db: &Db, page: NonZeroU32) -> Result<Vec<User>, ModelError> {
        let offset = i64::from(page.get() - 1) * i64::from(PER_PAGE);
        let query = Query::new(Kind::Users)
            .order_by("created_at", Direction::Ascending)
            .limit(i64::from(PER_PAGE))
            .offset(offset);
        db.store
            .query(&query)
            .await?
            .iter()
            .map(User::from_entity)
            .collect()
    }

    pub async fn count(db: &Db) -> Result<usize, ModelError> {
        Ok(User::all(db).await?.len())
    }

    /// Replaces this instance with the stored state, dropping in-memory
    /// secrets and cached microposts.
    pub async fn reload(&mut self, db: &Db) -> Result<(), ModelError> {
        let id = self.require_id()?;
        *self = User::find(db, id)
            .await?
            .ok_or(ModelError::Missing { kind: "user", id })?;
        Ok(())
    }

    /// Deletes the user and its email index entry atomically, then removes
    /// its microposts and relationships.
    ///
    /// The second phase runs outside the transaction. If it fails part-way
    /// the user is already gone and the remaining dependents are orphaned;
    /// the error is returned and nothing is rolled back.
    pub async fn destroy(&self, db: &Db) -> Result<(), ModelError> {
        let id = self.require_id()?;
        let mut tx = db.store.transaction().await?;
        tx.delete(&email_key(&self.email)).await?;
        tx.delete(&user_key(id)).await?;
        tx.commit().await?;
        info!(user_id = id, "user destroyed");

        if let Err(e) = self.destroy_dependents(db, id).await {
            error!(user_id = id, error = %e, "cascade delete failed; dependents may be orphaned");
            return Err(e);
        }
        Ok(())
    }

    async fn destroy_dependents(&self, db: &Db, id: i64) -> Result<(), ModelError> {
        for post in Micropost::find_by_user(db, id).await? {
            post.destroy(db).await?;
        }
        for filter in [RelationshipFilter::follower(id), RelationshipFilter::followed(id)] {
            for rel in Relationship::find_by(db, filter).await? {
                rel.destroy(db).await?;
            }
        }
        Ok(())
    }
}
