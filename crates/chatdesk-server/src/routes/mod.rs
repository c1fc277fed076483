pub mod files;
pub mod health;
pub mod sessions;

use axum::Router;

use crate::state::AppState;

/// The flat endpoint set consumed by the chat front end.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(sessions::router())
        .merge(files::router())
        .merge(health::router())
}
