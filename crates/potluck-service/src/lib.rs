#![deny(unsafe_code)]

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use potluck_adapters::fixtures;
use potluck_core::{
    BoardView, CategoryOrder, CommitmentReceipt, Item, MemoryStore, MyCommitmentsView, NewItem,
    PlannerEngine, PlannerError, RepairReport, ShiftView, StoreConfig,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Header carrying the opaque authenticated user id. The identity provider
/// in front of this service is responsible for validating it.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub store: StoreConfig,
    pub category_order: CategoryOrder,
    /// Seed the demo dataset when running on the memory backend.
    pub seed_demo: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::Memory,
            category_order: CategoryOrder::Position,
            seed_demo: true,
        }
    }
}

#[derive(Clone)]
pub struct ServiceState {
    pub engine: Arc<PlannerEngine>,
}

impl ServiceState {
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self, PlannerError> {
        let engine = match config.store {
            StoreConfig::Memory => {
                let store = Arc::new(MemoryStore::new());
                if config.seed_demo {
                    fixtures::seed_demo(&store).await;
                }
                PlannerEngine::with_store(store, "memory", config.category_order)
            }
            postgres @ StoreConfig::Postgres { .. } => {
                PlannerEngine::bootstrap(postgres, config.category_order).await?
            }
        };

        Ok(Self {
            engine: Arc::new(engine),
        })
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/board", get(board))
        .route("/v1/commitments/mine", get(my_commitments))
        .route("/v1/items", post(create_item))
        .route("/v1/items/:item_id/commitment", put(set_commitment))
        .route("/v1/items/:item_id/repair", post(repair_item))
        .route("/v1/shifts", get(list_shifts))
        .route(
            "/v1/shifts/:shift_id/signup",
            post(signup).delete(cancel_signup),
        )
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] PlannerError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        let Self::Core(err) = self;
        match err {
            PlannerError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            PlannerError::Validation(_) => StatusCode::BAD_REQUEST,
            PlannerError::CapacityExceeded { .. } => StatusCode::CONFLICT,
            PlannerError::UnknownItem(_)
            | PlannerError::UnknownCategory(_)
            | PlannerError::UnknownShift(_) => StatusCode::NOT_FOUND,
            PlannerError::AggregateUpdateFailed { .. } | PlannerError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn kind(&self) -> &'static str {
        let Self::Core(err) = self;
        match err {
            PlannerError::NotAuthenticated => "not_authenticated",
            PlannerError::Validation(_) => "validation",
            PlannerError::CapacityExceeded { .. } => "capacity_exceeded",
            PlannerError::AggregateUpdateFailed { .. } => "aggregate_update_failed",
            PlannerError::UnknownItem(_) => "unknown_item",
            PlannerError::UnknownCategory(_) => "unknown_category",
            PlannerError::UnknownShift(_) => "unknown_shift",
            PlannerError::Store(_) => "store",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Clients key repair flows off `kind`: `aggregate_update_failed`
        // means the store is in a known-bad state, not a clean failure.
        let body = serde_json::json!({
            "kind": self.kind(),
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

fn identity(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::Core(PlannerError::NotAuthenticated))
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    store_backend: &'static str,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "potluck-service",
        store_backend: state.engine.backend_label(),
    })
}

async fn board(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<BoardView>, ApiError> {
    let viewer = identity(&headers)?;
    Ok(Json(state.engine.board(&viewer).await?))
}

async fn my_commitments(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<MyCommitmentsView>, ApiError> {
    let viewer = identity(&headers)?;
    Ok(Json(state.engine.my_commitments(&viewer).await?))
}

async fn create_item(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(draft): Json<NewItem>,
) -> Result<(StatusCode, Json<Item>), ApiError> {
    let user_id = identity(&headers)?;
    let item = state.engine.create_item(&user_id, draft).await?;
    info!(
        item_id = item.id,
        category_id = item.category_id,
        "item created"
    );
    Ok((StatusCode::CREATED, Json(item)))
}

#[derive(Debug, Clone, Deserialize)]
struct SetCommitmentRequest {
    count: i64,
}

async fn set_commitment(
    Path(item_id): Path<i64>,
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<SetCommitmentRequest>,
) -> Result<Json<CommitmentReceipt>, ApiError> {
    let user_id = identity(&headers)?;
    let result = state
        .engine
        .set_commitment(&user_id, item_id, request.count)
        .await;

    match &result {
        Ok(receipt) => info!(
            trace_id = %receipt.trace_id,
            item_id,
            delta = receipt.delta,
            "commitment reconciled"
        ),
        Err(err) if err.needs_repair() => {
            warn!(item_id, %err, "aggregate update failed; item needs repair")
        }
        Err(_) => {}
    }

    Ok(Json(result?))
}

async fn repair_item(
    Path(item_id): Path<i64>,
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<RepairReport>, ApiError> {
    identity(&headers)?;
    let report = state.engine.repair_item_total(item_id).await?;
    info!(
        trace_id = %report.trace_id,
        item_id,
        committed_total = report.committed_total,
        "item total repaired"
    );
    Ok(Json(report))
}

async fn list_shifts(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ShiftView>>, ApiError> {
    let viewer = identity(&headers)?;
    Ok(Json(state.engine.shifts(&viewer).await?))
}

async fn signup(
    Path(shift_id): Path<i64>,
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<ShiftView>, ApiError> {
    let user_id = identity(&headers)?;
    let view = state.engine.signup(&user_id, shift_id).await?;
    info!(shift_id, filled = view.filled, "shift signup");
    Ok(Json(view))
}

async fn cancel_signup(
    Path(shift_id): Path<i64>,
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<ShiftView>, ApiError> {
    let user_id = identity(&headers)?;
    let view = state.engine.cancel_signup(&user_id, shift_id).await?;
    info!(shift_id, filled = view.filled, "shift signup cancelled");
    Ok(Json(view))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn demo_app() -> Router {
        let state = ServiceState::bootstrap(ServiceConfig::default())
            .await
            .unwrap();
        build_router(state)
    }

    fn request(method: &str, uri: &str, user: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_store_backend() {
        let app = demo_app().await;
        let response = app
            .oneshot(request("GET", "/v1/health", None, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body.get("status").and_then(|v| v.as_str()), Some("ok"));
        assert_eq!(
            body.get("store_backend").and_then(|v| v.as_str()),
            Some("memory")
        );
    }

    #[tokio::test]
    async fn board_requires_identity() {
        let app = demo_app().await;
        let response = app
            .oneshot(request("GET", "/v1/board", None, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(
            body.get("kind").and_then(|v| v.as_str()),
            Some("not_authenticated")
        );
    }

    #[tokio::test]
    async fn commitment_round_trip_shows_up_on_the_board() {
        let app = demo_app().await;
        let uri = format!("/v1/items/{}/commitment", fixtures::LIMES_ITEM_ID);

        let response = app
            .clone()
            .oneshot(request(
                "PUT",
                &uri,
                Some("alice"),
                Some(serde_json::json!({ "count": 3 })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let receipt = json_body(response).await;
        assert_eq!(receipt.get("delta").and_then(|v| v.as_i64()), Some(3));

        let response = app
            .oneshot(request("GET", "/v1/board", Some("bob"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let board: BoardView = serde_json::from_value(json_body(response).await).unwrap();

        let limes = board
            .categories
            .iter()
            .flat_map(|category| &category.items)
            .find(|item| item.id == fixtures::LIMES_ITEM_ID)
            .unwrap();
        assert_eq!(limes.committed_total, 3);
        assert_eq!(limes.mine, 0);
        assert_eq!(limes.commitments[0].user_name, "Alice");
    }

    #[tokio::test]
    async fn created_item_appears_on_board_and_creator_dashboard() {
        let app = demo_app().await;

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/v1/items",
                Some("alice"),
                Some(serde_json::json!({
                    "category_id": 2,
                    "name": "Salsa",
                    "description": "mild",
                    "max_needed": 4
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let item = json_body(response).await;
        assert_eq!(item.get("committed_total").and_then(|v| v.as_i64()), Some(0));
        let item_id = item.get("id").and_then(|v| v.as_i64()).unwrap();

        let response = app
            .clone()
            .oneshot(request("GET", "/v1/board", Some("bob"), None))
            .await
            .unwrap();
        let board: BoardView = serde_json::from_value(json_body(response).await).unwrap();
        let salsa = board
            .categories
            .iter()
            .flat_map(|category| &category.items)
            .find(|item| item.id == item_id)
            .unwrap();
        assert_eq!(salsa.name, "Salsa");
        assert_eq!(salsa.committed_total, 0);

        // The store-assigned id is immediately usable for commitments.
        let uri = format!("/v1/items/{item_id}/commitment");
        let response = app
            .clone()
            .oneshot(request(
                "PUT",
                &uri,
                Some("alice"),
                Some(serde_json::json!({ "count": 2 })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(request("GET", "/v1/commitments/mine", Some("alice"), None))
            .await
            .unwrap();
        let mine: MyCommitmentsView = serde_json::from_value(json_body(response).await).unwrap();
        assert_eq!(mine.categories[0].commitments[0].item_name, "Salsa");
        assert_eq!(mine.categories[0].commitments[0].count, 2);
    }

    #[tokio::test]
    async fn item_in_unknown_category_is_not_found() {
        let app = demo_app().await;

        let response = app
            .oneshot(request(
                "POST",
                "/v1/items",
                Some("alice"),
                Some(serde_json::json!({ "category_id": 999, "name": "Forks" })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(
            body.get("kind").and_then(|v| v.as_str()),
            Some("unknown_category")
        );
    }

    #[tokio::test]
    async fn negative_count_is_a_bad_request() {
        let app = demo_app().await;
        let uri = format!("/v1/items/{}/commitment", fixtures::LIMES_ITEM_ID);

        let response = app
            .oneshot(request(
                "PUT",
                &uri,
                Some("alice"),
                Some(serde_json::json!({ "count": -2 })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body.get("kind").and_then(|v| v.as_str()), Some("validation"));
    }

    #[tokio::test]
    async fn unknown_item_is_not_found() {
        let app = demo_app().await;

        let response = app
            .oneshot(request(
                "PUT",
                "/v1/items/9999/commitment",
                Some("alice"),
                Some(serde_json::json!({ "count": 1 })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn full_shift_signup_conflicts() {
        let app = demo_app().await;
        let uri = format!("/v1/shifts/{}/signup", fixtures::CLOSING_SHIFT_ID);

        let response = app
            .clone()
            .oneshot(request("POST", &uri, Some("alice"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let view = json_body(response).await;
        assert_eq!(view.get("filled").and_then(|v| v.as_i64()), Some(1));
        assert_eq!(view.get("is_full").and_then(|v| v.as_bool()), Some(true));

        let response = app
            .oneshot(request("POST", &uri, Some("bob"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = json_body(response).await;
        assert_eq!(
            body.get("kind").and_then(|v| v.as_str()),
            Some("capacity_exceeded")
        );
    }

    #[tokio::test]
    async fn cancel_signup_frees_the_slot() {
        let app = demo_app().await;
        let uri = format!("/v1/shifts/{}/signup", fixtures::CLOSING_SHIFT_ID);

        let response = app
            .clone()
            .oneshot(request("POST", &uri, Some("alice"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(request("DELETE", &uri, Some("alice"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let view = json_body(response).await;
        assert_eq!(view.get("filled").and_then(|v| v.as_i64()), Some(0));

        let response = app
            .oneshot(request("POST", &uri, Some("bob"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn repair_endpoint_recomputes_total() {
        let app = demo_app().await;
        let commit_uri = format!("/v1/items/{}/commitment", fixtures::ICE_ITEM_ID);
        let repair_uri = format!("/v1/items/{}/repair", fixtures::ICE_ITEM_ID);

        let response = app
            .clone()
            .oneshot(request(
                "PUT",
                &commit_uri,
                Some("carol"),
                Some(serde_json::json!({ "count": 2 })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(request("POST", &repair_uri, Some("carol"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = json_body(response).await;
        assert_eq!(
            report.get("committed_total").and_then(|v| v.as_i64()),
            Some(2)
        );
    }

    #[tokio::test]
    async fn dashboard_lists_only_viewer_pledges() {
        let app = demo_app().await;

        for (user, item, count) in [
            ("alice", fixtures::LIMES_ITEM_ID, 2),
            ("bob", fixtures::CHIPS_ITEM_ID, 4),
        ] {
            let uri = format!("/v1/items/{item}/commitment");
            let response = app
                .clone()
                .oneshot(request(
                    "PUT",
                    &uri,
                    Some(user),
                    Some(serde_json::json!({ "count": count })),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(request("GET", "/v1/commitments/mine", Some("alice"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let mine: MyCommitmentsView = serde_json::from_value(json_body(response).await).unwrap();

        assert_eq!(mine.categories.len(), 1);
        assert_eq!(mine.categories[0].name, "Drinks");
        assert_eq!(mine.categories[0].commitments[0].item_name, "Limes");
        assert_eq!(mine.categories[0].commitments[0].count, 2);
    }
}
