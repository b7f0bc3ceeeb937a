use time::Duration;
use tracing::{debug, info};

use super::{Column, User};
use crate::credentials::new_token;
use crate::db::Db;
use crate::error::ModelError;

/// Password reset links stop working after this long.
pub const RESET_TTL: Duration = Duration::hours(2);

/// The digests a plain token can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Remember,
    Activation,
    Reset,
}

impl User {
    /// Returns the user when `candidate` matches the stored password digest.
    pub fn authenticate(&self, db: &Db, candidate: &str) -> Option<&User> {
        let digest = self.password_digest.as_deref()?;
        db.codec.verify(digest, candidate).then_some(self)
    }

    /// Checks `token` against the stored digest of `kind`; `false` when no
    /// digest is stored.
    pub fn authenticated(&self, db: &Db, kind: TokenKind, token: &str) -> bool {
        let digest = match kind {
            TokenKind::Remember => self.remember_digest.as_deref(),
            TokenKind::Activation => self.activation_digest.as_deref(),
            TokenKind::Reset => self.reset_digest.as_deref(),
        };
        digest.is_some_and(|d| db.codec.verify(d, token))
    }

    /// Stores a fresh remember digest and returns the plain token.
    pub async fn remember(&mut self, db: &Db) -> Result<String, ModelError> {
        let token = new_token();
        let digest = db.codec.hash(&token)?;
        let ok = self.update_attribute(db, Column::RememberDigest(Some(digest))).await?;
        self.applied(ok)?;
        self.remember_token = Some(token.clone());
        debug!(user_id = ?self.id, "remember token issued");
        Ok(token)
    }

    pub async fn forget(&mut self, db: &Db) -> Result<(), ModelError> {
        let ok = self.update_attribute(db, Column::RememberDigest(None)).await?;
        self.applied(ok)?;
        self.remember_token = None;
        Ok(())
    }

    pub async fn activate(&mut self, db: &Db) -> Result<(), ModelError> {
        let now = db.clock.now();
        let columns = [Column::Activated(true), Column::ActivatedAt(Some(now))];
        let ok = self.update_columns(db, columns).await?;
        self.applied(ok)?;
        info!(user_id = ?self.id, "account activated");
        Ok(())
    }

    /// Stores a reset digest with the current time and returns the plain
    /// token for the reset email.
    pub async fn create_reset_digest(&mut self, db: &Db) -> Result<String, ModelError> {
        let token = new_token();
        let digest = db.codec.hash(&token)?;
        let columns = [
            Column::ResetDigest(Some(digest)),
            Column::ResetSentAt(Some(db.clock.now())),
        ];
        let ok = self.update_columns(db, columns).await?;
        self.applied(ok)?;
        self.reset_token = Some(token.clone());
        debug!(user_id = ?self.id, "password reset requested");
        Ok(token)
    }

    /// Invalidates a used reset token.
    pub async fn clear_reset_digest(&mut self, db: &Db) -> Result<(), ModelError> {
        let columns = [Column::ResetDigest(None), Column::ResetSentAt(None)];
        let ok = self.update_columns(db, columns).await?;
        self.applied(ok)?;
        self.reset_token = None;
        Ok(())
    }

    /// True when no reset was requested or the request is older than
    /// [`RESET_TTL`].
    pub fn password_reset_expired(&self, db: &Db) -> bool {
        match self.reset_sent_at {
            Some(sent) => db.clock.now() - sent > RESET_TTL,
            None => true,
        }
    }

    /// Column writes only fail through the email index, which token columns
    /// never touch; a refusal here means the store did something unexpected.
    fn applied(&self, ok: bool) -> Result<(), ModelError> {
        if ok {
            Ok(())
        } else {
            Err(ModelError::NotApplied {
                kind: "user",
                id: self.require_id()?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;

    async fn saved(db: &Db) -> User {
        let mut user = User::new("Michael Example", "michael@example.com", "password", "password");
        assert!(user.save(db).await.unwrap());
        user
    }

    #[tokio::test]
    async fn authenticate_checks_the_password() {
        let (db, _, _) = testing::db();
        let user = saved(&db).await;
        assert!(user.authenticate(&db, "password").is_some());
        assert!(user.authenticate(&db, "not-the-password").is_none());
    }

    #[tokio::test]
    async fn authenticated_is_false_without_a_digest() {
        let (db, _, _) = testing::db();
        let user = saved(&db).await;
        assert!(!user.authenticated(&db, TokenKind::Remember, ""));
        assert!(!user.authenticated(&db, TokenKind::Reset, "anything"));
    }

    #[tokio::test]
    async fn activation_token_matches_the_stored_digest() {
        let (db, _, _) = testing::db();
        let user = saved(&db).await;
        let token = user.activation_token.clone().unwrap();

        let stored = User::find(&db, user.id().unwrap()).await.unwrap().unwrap();
        assert!(stored.authenticated(&db, TokenKind::Activation, &token));
        assert!(!stored.authenticated(&db, TokenKind::Activation, "wrong"));
    }

    #[tokio::test]
    async fn remember_then_forget() {
        let (db, _, _) = testing::db();
        let mut user = saved(&db).await;
        let token = user.remember(&db).await.unwrap();
        assert_eq!(user.remember_token.as_deref(), Some(token.as_str()));

        let stored = User::find(&db, user.id().unwrap()).await.unwrap().unwrap();
        assert!(stored.authenticated(&db, TokenKind::Remember, &token));

        user.forget(&db).await.unwrap();
        let stored = User::find(&db, user.id().unwrap()).await.unwrap().unwrap();
        assert!(stored.remember_digest.is_none());
        assert!(!stored.authenticated(&db, TokenKind::Remember, &token));
    }

    #[tokio::test]
    async fn activate_sets_flag_and_timestamp() {
        let (db, _, _) = testing::db();
        let mut user = saved(&db).await;
        user.activate(&db).await.unwrap();

        let stored = User::find(&db, user.id().unwrap()).await.unwrap().unwrap();
        assert!(stored.activated);
        assert!(stored.activated_at.is_some());
        assert_eq!(stored, user);
    }

    #[tokio::test]
    async fn unsaved_users_cannot_hold_tokens() {
        let (db, _, _) = testing::db();
        let mut user = User::new("New", "new@example.com", "password", "password");
        let err = user.remember(&db).await.unwrap_err();
        assert!(matches!(err, ModelError::Unsaved { kind: "user" }));
    }

    #[tokio::test]
    async fn reset_digest_expires_after_two_hours() {
        let (db, _, clock) = testing::db();
        let mut user = saved(&db).await;
        assert!(user.password_reset_expired(&db));

        let token = user.create_reset_digest(&db).await.unwrap();
        assert!(user.authenticated(&db, TokenKind::Reset, &token));
        assert!(!user.password_reset_expired(&db));

        clock.advance(Duration::hours(3));
        assert!(user.password_reset_expired(&db));

        user.clear_reset_digest(&db).await.unwrap();
        assert!(!user.authenticated(&db, TokenKind::Reset, &token));
    }
}
