//! Privileged endpoints over the event records collection.
//!
//! Records are immutable: only list, read and delete are routed. Access is
//! governed by the events collection's rules.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use changefeed_core::error::DomainError;
use changefeed_core::query::{EventQuery, Filter, SortOrder};
use changefeed_core::record::{EventId, EventName, EventRecord};
use changefeed_plugin::domain::collection::EVENTS_ACCESS;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::auth::MaybeUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Default page size of the list endpoint.
pub const DEFAULT_LIMIT: usize = 100;

/// Largest page size the list endpoint accepts.
pub const MAX_LIMIT: usize = 1000;

/// Query parameters of GET /payload-events.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// Only records with this event name.
    pub name: Option<String>,
    /// Maximum number of records, 1 to 1000.
    pub limit: Option<usize>,
}

/// Response body of GET /payload-events.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    /// Records, newest first.
    pub docs: Vec<EventRecord>,
    /// The page size applied.
    pub limit: usize,
}

fn parse_id(raw: &str) -> Result<EventId, ApiError> {
    Ok(raw.parse()?)
}

async fn find_one(state: &AppState, id: EventId) -> Result<EventRecord, ApiError> {
    let query = EventQuery::new(Filter::IdEquals(id), 1);
    state
        .plugin
        .store()
        .find(&query)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| DomainError::RecordNotFound(id).into())
}

/// GET /payload-events
#[instrument(skip_all)]
async fn list_events(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    user.authorize(EVENTS_ACCESS.read, "read")?;

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(DomainError::Validation(format!(
            "limit must be between 1 and {MAX_LIMIT}, got {limit}"
        ))
        .into());
    }
    let filter = match params.name.as_deref() {
        Some(name) => Filter::NameIn(vec![EventName::parse(name)?]),
        None => Filter::All,
    };

    let query = EventQuery::new(filter, limit).sorted(SortOrder::Descending);
    let docs = state.plugin.store().find(&query).await?;
    Ok(Json(ListResponse { docs, limit }))
}

/// GET /payload-events/{id}
#[instrument(skip(state, user))]
async fn get_event(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> Result<Json<EventRecord>, ApiError> {
    user.authorize(EVENTS_ACCESS.read, "read")?;
    let id = parse_id(&id)?;
    Ok(Json(find_one(&state, id).await?))
}

/// DELETE /payload-events/{id}
#[instrument(skip(state, user))]
async fn delete_event(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> Result<Json<EventRecord>, ApiError> {
    user.authorize(EVENTS_ACCESS.delete, "delete")?;
    let id = parse_id(&id)?;

    let record = find_one(&state, id).await?;
    state.plugin.store().delete(&Filter::IdEquals(id)).await?;
    info!(event_id = %id, name = %record.name, "event record deleted");
    Ok(Json(record))
}

/// Returns the router for the event records collection.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payload-events", get(list_events))
        .route("/payload-events/{id}", get(get_event).delete(delete_event))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use changefeed_core::config::PluginConfig;
    use changefeed_plugin::plugin::EventsPlugin;
    use changefeed_test_support::{FailingEventStore, FixedClock, InMemoryEventStore};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::auth::ApiTokens;

    fn app_state_with(store: Arc<dyn changefeed_core::store::EventStore>) -> AppState {
        let plugin = Arc::new(EventsPlugin::new(PluginConfig::default(), store));
        AppState::new(plugin, ApiTokens::new(["secret".to_owned()]))
    }

    fn seeded_store() -> Arc<InMemoryEventStore> {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let store = Arc::new(InMemoryEventStore::new(Arc::new(FixedClock(now))));
        store.seed("posts.create", json!({ "documentId": "1" }), now - chrono::Duration::minutes(2));
        store.seed("posts.update", json!({ "documentId": "1" }), now - chrono::Duration::minutes(1));
        store.seed("posts.create", json!({ "documentId": "2" }), now);
        store
    }

    async fn send(
        state: AppState,
        method: &str,
        uri: &str,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {token}"));
        }
        let response = router()
            .with_state(state)
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body_bytes).unwrap())
    }

    #[tokio::test]
    async fn test_list_returns_newest_first() {
        // Arrange
        let state = app_state_with(seeded_store());

        // Act
        let (status, json) = send(state, "GET", "/payload-events", Some("secret")).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<i64> = json["docs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|doc| doc["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(json["limit"], 100);
    }

    #[tokio::test]
    async fn test_list_filters_by_name_and_limit() {
        // Arrange
        let state = app_state_with(seeded_store());

        // Act
        let (status, json) = send(
            state,
            "GET",
            "/payload-events?name=posts.create&limit=1",
            Some("secret"),
        )
        .await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        let docs = json["docs"].as_array().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["id"], 3);
        assert_eq!(docs[0]["name"], "posts.create");
        assert!(docs[0]["createdAt"].is_string());
    }

    #[tokio::test]
    async fn test_list_rejects_out_of_range_limit() {
        // Arrange
        let state = app_state_with(seeded_store());

        // Act
        let (status, json) =
            send(state, "GET", "/payload-events?limit=1001", Some("secret")).await;

        // Assert
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_anonymous_read_is_forbidden() {
        // Arrange
        let state = app_state_with(seeded_store());

        // Act
        let (status, json) = send(state, "GET", "/payload-events", None).await;

        // Assert
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"], "forbidden");
    }

    #[tokio::test]
    async fn test_get_returns_record_or_404() {
        // Arrange
        let state = app_state_with(seeded_store());

        // Act
        let (found_status, found) =
            send(state.clone(), "GET", "/payload-events/2", Some("secret")).await;
        let (missing_status, missing) =
            send(state, "GET", "/payload-events/99", Some("secret")).await;

        // Assert
        assert_eq!(found_status, StatusCode::OK);
        assert_eq!(found["name"], "posts.update");
        assert_eq!(missing_status, StatusCode::NOT_FOUND);
        assert_eq!(missing["error"], "record_not_found");
    }

    #[tokio::test]
    async fn test_get_with_non_numeric_id_returns_400() {
        // Arrange
        let state = app_state_with(seeded_store());

        // Act
        let (status, _) = send(state, "GET", "/payload-events/abc", Some("secret")).await;

        // Assert
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        // Arrange
        let store = seeded_store();
        let state = app_state_with(store.clone());

        // Act
        let (status, json) = send(state, "DELETE", "/payload-events/1", Some("secret")).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], 1);
        let remaining: Vec<i64> = store.records().iter().map(|r| r.id.0).collect();
        assert_eq!(remaining, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_anonymous_delete_is_forbidden() {
        // Arrange
        let store = seeded_store();
        let state = app_state_with(store.clone());

        // Act
        let (status, _) = send(state, "DELETE", "/payload-events/1", None).await;

        // Assert
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(store.records().len(), 3);
    }

    #[tokio::test]
    async fn test_store_failure_returns_500() {
        // Arrange
        let state = app_state_with(Arc::new(FailingEventStore));

        // Act
        let (status, json) = send(state, "GET", "/payload-events", Some("secret")).await;

        // Assert
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "infrastructure_error");
    }

    #[tokio::test]
    async fn test_records_cannot_be_created_or_updated() {
        // Arrange
        let state = app_state_with(seeded_store());
        let app = router().with_state(state);

        // Act
        let post = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/payload-events")
                    .header("authorization", "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let patch = app
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/payload-events/1")
                    .header("authorization", "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // Assert
        assert_eq!(post.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(patch.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
