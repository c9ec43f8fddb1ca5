//! REST API endpoints for lochist-service.
//!
//! The map renderer reads day histories and the latest fix; the settings UI
//! drives the subscription. Fixes can also be pushed directly through
//! `POST /api/updates`.
//!
//! # Lock Acquisition
//!
//! - **`state.config`** (RwLock): read lock to build the location request.
//! - **`state.subscription`** (Mutex): held for the whole start/stop call so
//!   lifecycle changes never interleave.
//!
//! Take `config` before `subscription`. The store synchronizes itself.
//!
//! ## Error Handling
//!
//! All endpoints return structured JSON errors (`{"error": "..."}`) via
//! [`AppError`]. Invalid dates and request bodies are 400, a provider that
//! cannot serve the request is 409, provider failures are 503 and storage
//! failures are 500.
//!
//! # Example
//!
//! ```ignore
//! use lochist_service::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};

use lochist_store::{StoreStats, day_bounds};
use lochist_types::{
    Availability, LocationRecord, LocationRequest, Priority, RawUpdate, SubscriptionState,
};

use crate::ingest::{IngestError, IngestOutcome, ingest};
use crate::state::{AppState, IngestSnapshot};

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Health and status
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        // History
        .route("/api/days/{year}/{month}/{day}", get(get_day))
        .route("/api/locations/latest", get(get_latest))
        // Subscription control
        .route("/api/subscription", get(get_subscription))
        .route("/api/subscription/start", post(subscription_start))
        .route("/api/subscription/stop", post(subscription_stop))
        // Direct delivery
        .route("/api/updates", post(post_updates))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Persisted subscription intent.
    pub subscription: SubscriptionState,
    /// Whether a provider subscription is currently held.
    pub subscribed: bool,
    /// Stored history summary.
    pub store: StoreStats,
    /// Ingestion counters since startup.
    pub ingest: IngestSnapshot,
}

/// Service status: subscription state, record count and ingest stats.
async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, AppError> {
    let (subscription, subscribed) = {
        let controller = state.subscription.lock().await;
        (controller.state()?, controller.is_subscribed())
    };
    let store = state.store.stats()?;

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        subscription,
        subscribed,
        store,
        ingest: state.ingest.snapshot(),
    }))
}

// ==========================================================================
// History Endpoints
// ==========================================================================

/// One local calendar day of history.
#[derive(Debug, Serialize)]
pub struct DayResponse {
    /// The day as `YYYY-MM-DD`.
    pub date: String,
    /// Start of the day (inclusive), epoch ms.
    pub from_millis: i64,
    /// Start of the next day (exclusive), epoch ms.
    pub to_millis: i64,
    pub count: usize,
    /// Records, newest first.
    pub records: Vec<LocationRecord>,
}

/// Records for one local calendar day.
async fn get_day(
    State(state): State<Arc<AppState>>,
    Path((year, month, day)): Path<(i32, u32, u32)>,
) -> Result<Json<DayResponse>, AppError> {
    let (from_millis, to_millis) = day_bounds(&Local, year, month, day)?;
    let records = state.store.select_day(year, month, day)?;

    Ok(Json(DayResponse {
        date: format!("{:04}-{:02}-{:02}", year, month, day),
        from_millis,
        to_millis,
        count: records.len(),
        records,
    }))
}

/// The most recently captured record.
async fn get_latest(State(state): State<Arc<AppState>>) -> Result<Json<LocationRecord>, AppError> {
    state
        .store
        .latest()?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No locations recorded".to_string()))
}

// ==========================================================================
// Subscription Endpoints
// ==========================================================================

/// Subscription state and what the provider reports for the configured request.
#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub is_active: bool,
    pub subscribed: bool,
    pub availability: Availability,
}

/// Optional overrides for `POST /api/subscription/start`.
///
/// Missing fields fall back to the `[subscription]` config section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartRequest {
    pub interval_secs: Option<u64>,
    pub fastest_interval_secs: Option<u64>,
    pub priority: Option<Priority>,
}

impl StartRequest {
    fn apply(&self, base: LocationRequest) -> LocationRequest {
        LocationRequest {
            interval: self.interval_secs.map_or(base.interval, Duration::from_secs),
            fastest_interval: self
                .fastest_interval_secs
                .map_or(base.fastest_interval, Duration::from_secs),
            priority: self.priority.unwrap_or(base.priority),
        }
    }
}

async fn configured_request(state: &AppState) -> LocationRequest {
    state.config.read().await.subscription.request()
}

/// Current subscription state.
async fn get_subscription(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SubscriptionResponse>, AppError> {
    let request = configured_request(&state).await;
    let controller = state.subscription.lock().await;

    Ok(Json(SubscriptionResponse {
        is_active: controller.state()?.is_active,
        subscribed: controller.is_subscribed(),
        availability: controller.check_availability(&request).await,
    }))
}

/// Start location updates.
///
/// Fails with 409 and the provider's availability when it cannot serve the
/// request; the persisted state is unchanged in that case.
async fn subscription_start(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SubscriptionResponse>, AppError> {
    let overrides: StartRequest = if body.is_empty() {
        StartRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid start request: {}", e)))?
    };
    let request = overrides.apply(configured_request(&state).await);

    let mut controller = state.subscription.lock().await;
    let availability = controller.check_availability(&request).await;
    if !availability.is_available() {
        warn!("Start refused, provider reports {:?}", availability);
        return Err(AppError::Unavailable(availability));
    }

    let subscription = controller.start(&request).await?;
    info!("Subscription started via API");

    Ok(Json(SubscriptionResponse {
        is_active: subscription.is_active,
        subscribed: controller.is_subscribed(),
        availability,
    }))
}

/// Stop location updates.
async fn subscription_stop(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SubscriptionResponse>, AppError> {
    let request = configured_request(&state).await;
    let mut controller = state.subscription.lock().await;

    let subscription = controller.stop().await?;
    info!("Subscription stopped via API");

    Ok(Json(SubscriptionResponse {
        is_active: subscription.is_active,
        subscribed: controller.is_subscribed(),
        availability: controller.check_availability(&request).await,
    }))
}

// ==========================================================================
// Delivery Endpoint
// ==========================================================================

/// Ingest a batch of fixes directly, bypassing the provider channel.
async fn post_updates(
    State(state): State<Arc<AppState>>,
    Json(updates): Json<Vec<RawUpdate>>,
) -> Result<Json<IngestOutcome>, AppError> {
    let worker = Arc::clone(&state);
    let result = tokio::task::spawn_blocking(move || ingest(&worker.store, &updates))
        .await
        .map_err(|e| AppError::Internal(format!("Ingest task failed: {}", e)))?;

    state.ingest.record(&result);
    Ok(Json(result?))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    /// The provider cannot serve the request right now.
    Unavailable(Availability),
    Store(lochist_store::Error),
    Subscription(lochist_core::Error),
    Ingest(IngestError),
    Internal(String),
}

impl From<lochist_store::Error> for AppError {
    fn from(e: lochist_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl From<lochist_core::Error> for AppError {
    fn from(e: lochist_core::Error) -> Self {
        AppError::Subscription(e)
    }
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        AppError::Ingest(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, error_body(msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, error_body(msg)),
            AppError::Unavailable(availability) => (
                StatusCode::CONFLICT,
                serde_json::json!({
                    "error": "Location updates are not available",
                    "availability": availability,
                }),
            ),
            AppError::Store(e @ lochist_store::Error::InvalidDate { .. }) => {
                (StatusCode::BAD_REQUEST, error_body(e.to_string()))
            }
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())),
            AppError::Subscription(e @ lochist_core::Error::InvalidRequest(_)) => {
                (StatusCode::BAD_REQUEST, error_body(e.to_string()))
            }
            AppError::Subscription(e @ lochist_core::Error::Provider(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, error_body(e.to_string()))
            }
            AppError::Subscription(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string()))
            }
            AppError::Ingest(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(msg)),
        };

        (status, Json(body)).into_response()
    }
}

fn error_body(message: String) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use lochist_core::{MemoryFlagStore, MockProvider, SubscriptionController, update_channel};
    use lochist_store::Store;
    use lochist_types::{CandidateRecord, ResolutionAction};

    use crate::config::Config;

    fn create_test_state() -> (Arc<AppState>, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider::default().without_emitter());
        let (sink, _rx) = update_channel(16);
        let controller = SubscriptionController::new(
            provider.clone(),
            Arc::new(MemoryFlagStore::new()),
            sink.clone(),
        );
        let store = Arc::new(Store::open_in_memory().unwrap());
        (AppState::new(store, Config::default(), controller, sink), provider)
    }

    async fn response_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_empty(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (state, _) = create_test_state();
        let response = router().with_state(state).oneshot(get("/api/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let (state, _) = create_test_state();
        let response = router().with_state(state).oneshot(get("/api/status")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["subscription"]["is_active"], false);
        assert_eq!(json["subscribed"], false);
        assert_eq!(json["store"]["count"], 0);
        assert_eq!(json["ingest"]["batches"], 0);
    }

    #[tokio::test]
    async fn test_day_endpoint_empty() {
        let (state, _) = create_test_state();
        let response = router()
            .with_state(state)
            .oneshot(get("/api/days/2024/5/1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["date"], "2024-05-01");
        assert_eq!(json["count"], 0);
        assert!(json["records"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_day_endpoint_with_records() {
        let (state, _) = create_test_state();
        let (from, to) = day_bounds(&Local, 2024, 5, 1).unwrap();
        state
            .store
            .insert_batch(&[
                CandidateRecord::new(35.0, 135.0, from + 1_000).unwrap(),
                CandidateRecord::new(36.0, 136.0, to - 1_000).unwrap(),
                CandidateRecord::new(37.0, 137.0, to).unwrap(),
            ])
            .unwrap();

        let response = router()
            .with_state(state)
            .oneshot(get("/api/days/2024/5/1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["count"], 2);
        assert_eq!(json["from_millis"], from);
        assert_eq!(json["to_millis"], to);
        assert_eq!(json["records"][0]["latitude"], 36.0);
        assert_eq!(json["records"][1]["latitude"], 35.0);
    }

    #[tokio::test]
    async fn test_day_endpoint_invalid_date() {
        let (state, _) = create_test_state();
        let app = router().with_state(state);

        let response = app.clone().oneshot(get("/api/days/2024/2/30")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert_eq!(json["error"], "Invalid date: 2024-02-30");

        let response = app.oneshot(get("/api/days/2024/may/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_latest_endpoint() {
        let (state, _) = create_test_state();
        let app = router().with_state(Arc::clone(&state));

        let response = app.clone().oneshot(get("/api/locations/latest")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = response_json(response).await;
        assert!(json["error"].is_string());

        state
            .store
            .insert_batch(&[
                CandidateRecord::new(1.0, 2.0, 500).unwrap(),
                CandidateRecord::new(3.0, 4.0, 100).unwrap(),
            ])
            .unwrap();

        let response = app.oneshot(get("/api/locations/latest")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["captured_at_millis"], 500);
        assert_eq!(json["latitude"], 1.0);
    }

    #[tokio::test]
    async fn test_subscription_start_stop() {
        let (state, provider) = create_test_state();
        let app = router().with_state(Arc::clone(&state));

        let response = app.clone().oneshot(get("/api/subscription")).await.unwrap();
        let json = response_json(response).await;
        assert_eq!(json["is_active"], false);
        assert_eq!(json["availability"]["status"], "available");

        let response = app.clone().oneshot(post_empty("/api/subscription/start")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["is_active"], true);
        assert_eq!(json["subscribed"], true);
        assert_eq!(provider.active_subscriptions().await, 1);

        // Starting again re-issues without error
        let response = app.clone().oneshot(post_empty("/api/subscription/start")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(provider.subscribe_count(), 2);
        assert_eq!(provider.active_subscriptions().await, 1);

        let response = app.clone().oneshot(post_empty("/api/subscription/stop")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["is_active"], false);
        assert_eq!(provider.active_subscriptions().await, 0);
    }

    #[tokio::test]
    async fn test_subscription_start_with_overrides() {
        let (state, _) = create_test_state();
        let app = router().with_state(state);

        let body = serde_json::json!({ "interval_secs": 30, "fastest_interval_secs": 10, "priority": "high_accuracy" });
        let response = app.clone().oneshot(post_json("/api/subscription/start", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // fastest (60 from config) > interval (30)
        let body = serde_json::json!({ "interval_secs": 30 });
        let response = app.clone().oneshot(post_json("/api/subscription/start", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/subscription/start")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_subscription_start_unavailable() {
        let (state, provider) = create_test_state();
        provider
            .set_availability(Availability::ResolvableFailure(
                ResolutionAction::ChangeLocationSettings,
            ))
            .await;
        let app = router().with_state(Arc::clone(&state));

        let response = app.oneshot(post_empty("/api/subscription/start")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = response_json(response).await;
        assert_eq!(json["availability"]["status"], "resolvable_failure");
        assert_eq!(json["availability"]["detail"], "change_location_settings");

        assert!(!state.subscription.lock().await.state().unwrap().is_active);
        assert_eq!(provider.subscribe_count(), 0);
    }

    #[tokio::test]
    async fn test_subscription_start_provider_failure() {
        let (state, provider) = create_test_state();
        provider.set_should_fail(true, Some("service crashed")).await;
        let app = router().with_state(Arc::clone(&state));

        let response = app.oneshot(post_empty("/api/subscription/start")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = response_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("service crashed"));
        assert!(!state.subscription.lock().await.state().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_post_updates() {
        let (state, _) = create_test_state();
        let app = router().with_state(Arc::clone(&state));

        let body = serde_json::json!([
            { "latitude": 35.0, "longitude": 135.0, "timestamp_millis": 1000, "is_synthetic": false },
            { "latitude": 36.0, "longitude": 136.0, "timestamp_millis": 2000, "is_synthetic": true },
            { "latitude": 99.0, "longitude": 136.0, "timestamp_millis": 3000, "is_synthetic": true }
        ]);
        let response = app.clone().oneshot(post_json("/api/updates", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["received"], 3);
        assert_eq!(json["accepted"], 1);
        assert_eq!(json["dropped_real"], 1);
        assert_eq!(json["invalid"], 1);

        assert_eq!(state.store.count().unwrap(), 1);
        assert_eq!(state.ingest.snapshot().accepted, 1);

        let response = app.oneshot(get("/api/status")).await.unwrap();
        let json = response_json(response).await;
        assert_eq!(json["store"]["count"], 1);
        assert_eq!(json["ingest"]["dropped_real"], 1);
    }

    #[tokio::test]
    async fn test_post_updates_defaults_to_real_fix() {
        let (state, _) = create_test_state();
        let body = serde_json::json!([{ "latitude": 1.0, "longitude": 1.0, "timestamp_millis": 1 }]);
        let response = router()
            .with_state(Arc::clone(&state))
            .oneshot(post_json("/api/updates", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await["dropped_real"], 1);
        assert_eq!(state.store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_post_updates_invalid_json() {
        let (state, _) = create_test_state();
        let response = router()
            .with_state(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/updates")
                    .header("content-type", "application/json")
                    .body(Body::from("[{\"latitude\": 1.0}]"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[test]
    fn test_app_error_status_codes() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (
                AppError::Unavailable(Availability::TerminalFailure("no GPS".into())),
                StatusCode::CONFLICT,
            ),
            (
                AppError::Store(lochist_store::Error::InvalidDate {
                    year: 2024,
                    month: 13,
                    day: 1,
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Store(lochist_store::Error::SchemaMismatch("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::Subscription(lochist_core::Error::provider("x")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_start_request_apply() {
        let base = LocationRequest::default();
        assert_eq!(StartRequest::default().apply(base), base);

        let overrides = StartRequest {
            interval_secs: Some(120),
            fastest_interval_secs: None,
            priority: Some(Priority::LowPower),
        };
        let request = overrides.apply(base);
        assert_eq!(request.interval, Duration::from_secs(120));
        assert_eq!(request.fastest_interval, base.fastest_interval);
        assert_eq!(request.priority, Priority::LowPower);
    }
}
