//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use changefeed_api::auth::ApiTokens;
use changefeed_api::routes;
use changefeed_api::state::AppState;
use changefeed_core::config::PluginConfig;
use changefeed_event_store::pg_event_store::PgEventStore;
use changefeed_plugin::plugin::EventsPlugin;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

/// Token accepted by every test app.
pub const TOKEN: &str = "test-token";

/// Build the full app state with a real `PgEventStore`.
pub fn build_test_state(pool: PgPool) -> AppState {
    let store = Arc::new(PgEventStore::new(pool));
    let plugin = Arc::new(EventsPlugin::new(PluginConfig::default(), store));
    AppState::new(plugin, ApiTokens::new([TOKEN.to_owned()]))
}

/// Build the full app router. Uses the same route structure as `main.rs`.
pub fn build_test_app(pool: PgPool) -> Router {
    routes::router().with_state(build_test_state(pool))
}

/// Send an authenticated request without a body and return the JSON response.
pub async fn send_json(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send an unauthenticated GET request and return the JSON response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
