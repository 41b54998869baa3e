//! Route modules.

pub mod events;
pub mod health;
pub mod stream;

use axum::Router;

use crate::state::AppState;

/// Returns the full route tree: the health check at the root and the
/// changefeed endpoints under `/api`.
pub fn router() -> Router<AppState> {
    Router::new().merge(health::router()).nest(
        "/api",
        Router::new()
            .merge(stream::router())
            .merge(events::router()),
    )
}
