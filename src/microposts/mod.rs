mod cache;
pub mod dto;
pub mod handlers;
mod model;

use axum::Router;

use crate::state::AppState;

pub use cache::MicropostCache;
pub use model::{Micropost, MAX_CONTENT_CHARS};

pub fn router() -> Router<AppState> {
    handlers::routes()
}
