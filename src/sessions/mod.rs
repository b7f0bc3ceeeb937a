pub mod dto;
pub mod handlers;

use axum::Router;

use crate::state::AppState;

pub use dto::SessionResponse;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
