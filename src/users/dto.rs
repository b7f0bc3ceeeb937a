use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{Attribute, User};

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Option<i64>,
    pub name: String,
    pub email: String,
    pub admin: bool,
    pub activated: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id(),
            name: user.name.clone(),
            email: user.email.clone(),
            admin: user.admin,
            activated: user.activated,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

/// Profile edit; omitted fields stay as they are.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

impl UpdateUserRequest {
    pub fn into_attributes(self) -> Vec<Attribute> {
        let mut attributes = Vec::new();
        if let Some(v) = self.name {
            attributes.push(Attribute::Name(v));
        }
        if let Some(v) = self.email {
            attributes.push(Attribute::Email(v));
        }
        if let Some(v) = self.password {
            attributes.push(Attribute::Password(v));
        }
        if let Some(v) = self.password_confirmation {
            attributes.push(Attribute::PasswordConfirmation(v));
        }
        attributes
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<std::num::NonZeroU32>,
}
