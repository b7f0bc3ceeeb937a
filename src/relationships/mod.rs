pub mod handlers;
mod model;

use axum::Router;

use crate::state::AppState;

pub use model::{Relationship, RelationshipFilter};

pub fn router() -> Router<AppState> {
    handlers::routes()
}
