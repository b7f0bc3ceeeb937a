use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::clock;
use crate::datastore::{Entity, Key, Kind};
use crate::error::ModelError;
use crate::microposts::MicropostCache;
use crate::validation::Errors;

/// Persisted form of a user. Plain passwords and tokens never reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct UserRecord {
    pub name: String,
    pub email: String,
    #[serde(with = "clock::micros")]
    pub created_at: OffsetDateTime,
    #[serde(with = "clock::micros")]
    pub updated_at: OffsetDateTime,
    #[serde(default)]
    pub password_digest: Option<String>,
    #[serde(default)]
    pub remember_digest: Option<String>,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub activation_digest: Option<String>,
    #[serde(default)]
    pub activated: bool,
    #[serde(default, with = "clock::micros::option")]
    pub activated_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub reset_digest: Option<String>,
    #[serde(default, with = "clock::micros::option")]
    pub reset_sent_at: Option<OffsetDateTime>,
}

/// Index entry for the email uniqueness constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EmailRecord {
    #[serde(with = "clock::micros")]
    pub created_at: OffsetDateTime,
}

pub(crate) fn user_key(id: i64) -> Key {
    Key::with_id(Kind::Users, id)
}

pub(crate) fn email_key(email: &str) -> Key {
    Key::with_name(Kind::Emails, email.to_lowercase())
}

/// A user account.
///
/// `id` is `None` until the first successful save and never changes after
/// that. `password`, `password_confirmation` and the three plain tokens live
/// only in memory.
#[derive(Clone, Default)]
pub struct User {
    pub(crate) id: Option<i64>,
    pub name: String,
    pub email: String,
    pub created_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
    pub password_digest: Option<String>,
    pub remember_token: Option<String>,
    pub remember_digest: Option<String>,
    pub admin: bool,
    pub activation_token: Option<String>,
    pub activation_digest: Option<String>,
    pub activated: bool,
    pub activated_at: Option<OffsetDateTime>,
    pub reset_token: Option<String>,
    pub reset_digest: Option<String>,
    pub reset_sent_at: Option<OffsetDateTime>,
    pub errors: Errors,
    pub microposts: MicropostCache,
}

/// User-editable attributes accepted by [`User::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Name(String),
    Email(String),
    Password(String),
    PasswordConfirmation(String),
    Admin(bool),
}

/// System-managed columns accepted by [`User::update_columns`]; these skip
/// validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Email(String),
    RememberDigest(Option<String>),
    Admin(bool),
    Activated(bool),
    ActivatedAt(Option<OffsetDateTime>),
    ResetDigest(Option<String>),
    ResetSentAt(Option<OffsetDateTime>),
}

fn set<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

impl User {
    /// A new, unsaved user as submitted on signup.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        password_confirmation: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: Some(password.into()),
            password_confirmation: Some(password_confirmation.into()),
            ..Self::default()
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub(crate) fn require_id(&self) -> Result<i64, ModelError> {
        self.id.ok_or(ModelError::Unsaved { kind: "user" })
    }

    /// Applies an attribute; returns whether anything changed.
    pub(crate) fn apply(&mut self, attribute: Attribute) -> bool {
        match attribute {
            Attribute::Name(v) => set(&mut self.name, v),
            Attribute::Email(v) => {
                if self.email.to_lowercase() == v.to_lowercase() {
                    false
                } else {
                    self.email = v.to_lowercase();
                    true
                }
            }
            Attribute::Password(v) => set(&mut self.password, Some(v)),
            Attribute::PasswordConfirmation(v) => set(&mut self.password_confirmation, Some(v)),
            Attribute::Admin(v) => set(&mut self.admin, v),
        }
    }

    pub(crate) fn apply_column(&mut self, column: Column) -> bool {
        match column {
            Column::Email(v) => {
                if self.email.to_lowercase() == v.to_lowercase() {
                    false
                } else {
                    self.email = v.to_lowercase();
                    true
                }
            }
            Column::RememberDigest(v) => set(&mut self.remember_digest, v),
            Column::Admin(v) => set(&mut self.admin, v),
            Column::Activated(v) => set(&mut self.activated, v),
            Column::ActivatedAt(v) => set(&mut self.activated_at, v),
            Column::ResetDigest(v) => set(&mut self.reset_digest, v),
            Column::ResetSentAt(v) => set(&mut self.reset_sent_at, v),
        }
    }

    pub(crate) fn to_record(&self, created_at: OffsetDateTime, updated_at: OffsetDateTime) -> UserRecord {
        UserRecord {
            name: self.name.clone(),
            email: self.email.clone(),
            created_at,
            updated_at,
            password_digest: self.password_digest.clone(),
            remember_digest: self.remember_digest.clone(),
            admin: self.admin,
            activation_digest: self.activation_digest.clone(),
            activated: self.activated,
            activated_at: self.activated_at,
            reset_digest: self.reset_digest.clone(),
            reset_sent_at: self.reset_sent_at,
        }
    }

    pub(crate) fn from_entity(entity: &Entity) -> Result<Self, ModelError> {
        let record: UserRecord = entity.to_record()?;
        Ok(Self {
            id: entity.key.numeric_id(),
            name: record.name,
            email: record.email,
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
            password_digest: record.password_digest,
            remember_digest: record.remember_digest,
            admin: record.admin,
            activation_digest: record.activation_digest,
            activated: record.activated,
            activated_at: record.activated_at,
            reset_digest: record.reset_digest,
            reset_sent_at: record.reset_sent_at,
            ..Self::default()
        })
    }
}

/// Compares identity and every persisted field, timestamps included.
/// Plain secrets, errors and the micropost cache are not part of equality.
impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.email == other.email
            && self.created_at == other.created_at
            && self.updated_at == other.updated_at
            && self.password_digest == other.password_digest
            && self.remember_digest == other.remember_digest
            && self.admin == other.admin
            && self.activation_digest == other.activation_digest
            && self.activated == other.activated
            && self.activated_at == other.activated_at
            && self.reset_digest == other.reset_digest
            && self.reset_sent_at == other.reset_sent_at
    }
}

fn redacted<T>(value: &Option<T>) -> &'static str {
    if value.is_some() {
        "Some([redacted])"
    } else {
        "None"
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("password", &redacted(&self.password))
            .field("password_confirmation", &redacted(&self.password_confirmation))
            .field("password_digest", &self.password_digest)
            .field("remember_token", &redacted(&self.remember_token))
            .field("remember_digest", &self.remember_digest)
            .field("admin", &self.admin)
            .field("activation_token", &redacted(&self.activation_token))
            .field("activation_digest", &self.activation_digest)
            .field("activated", &self.activated)
            .field("activated_at", &self.activated_at)
            .field("reset_token", &redacted(&self.reset_token))
            .field("reset_digest", &self.reset_digest)
            .field("reset_sent_at", &self.reset_sent_at)
            .field("errors", &self.errors)
            .finish()
    }
}
