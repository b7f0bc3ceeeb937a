//! User accounts: validation, persistence with a transactional email index,
//! credential tokens and the follow graph.

pub mod dto;
pub mod handlers;
mod model;
mod repo;
mod social;
mod tokens;
mod validation;

use axum::Router;

use crate::state::AppState;

pub use model::{Attribute, Column, User};
pub use tokens::TokenKind;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
