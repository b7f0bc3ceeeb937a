use lazy_static::lazy_static;
use regex::Regex;

use super::User;
use crate::db::Db;
use crate::error::ModelError;
use crate::validation::{is_blank, Errors};

pub const MAX_NAME_CHARS: usize = 50;
pub const MAX_EMAIL_CHARS: usize = 255;
pub const MIN_PASSWORD_CHARS: usize = 6;

pub(crate) const EMAIL_TAKEN: &str = "email has already been taken";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"(?i)^[\w+\-.]+@[a-z\d\-]+(\.[a-z\d\-]+)*\.[a-z]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Empty strings count as "no value" for password comparisons.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl User {
    /// Every rule that does not need the datastore.
    pub(crate) fn field_errors(&self) -> Errors {
        let mut errors = Errors::new();

        if is_blank(&self.name) {
            errors.add("name", "name can't be blank");
        }
        if self.name.chars().count() > MAX_NAME_CHARS {
            errors.add("name", "name is too long");
        }

        if is_blank(&self.email) {
            errors.add("email", "email can't be blank");
        }
        if self.email.chars().count() > MAX_EMAIL_CHARS {
            errors.add("email", "email is too long");
        }
        if !self.email.is_empty() && !is_valid_email(&self.email) {
            errors.add("email", "email is invalid");
        }

        // Existing users may leave the password out entirely.
        let password = present(&self.password);
        let must_check = self.is_new() || password.is_some();
        let mut good_password = true;
        if must_check {
            match password {
                Some(p) if !is_blank(p) => {
                    if p.chars().count() < MIN_PASSWORD_CHARS {
                        good_password = false;
                        errors.add("password", "password is too short");
                    }
                }
                _ => {
                    good_password = false;
                    errors.add("password", "password can't be blank");
                }
            }
        }
        if good_password && password != present(&self.password_confirmation) {
            errors.add(
                "password_confirmation",
                "password confirmation doesn't match password",
            );
        }

        errors
    }

    /// Runs every validation rule, replacing `errors`.
    pub async fn valid(&mut self, db: &Db) -> Result<bool, ModelError> {
        let mut errors = self.field_errors();
        if !self.email.is_empty() && self.email_taken(db).await? {
            errors.add("email", EMAIL_TAKEN);
        }
        self.errors = errors;
        Ok(self.errors.is_empty())
    }

    /// Whether another user already holds this email (case-insensitive).
    async fn email_taken(&self, db: &Db) -> Result<bool, ModelError> {
        let holders = User::where_email(db, &self.email).await?;
        Ok(holders.iter().any(|u| u.id != self.id))
    }
}
