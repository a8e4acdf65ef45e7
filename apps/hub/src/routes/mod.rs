pub mod health;
pub mod rooms;
pub mod sessions;

use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest("/api/v1", sessions::router().merge(rooms::router()))
}
