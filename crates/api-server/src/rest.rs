//! Shared handler state, error mapping and operational endpoints.

use crate::auth::SessionManager;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use crm_channels::{DeliveryTransport, MessageDispatcher};
use crm_core::event_bus::EventSink;
use crm_core::{AppConfig, CrmError, CustomerSource, ReceiptStore};
use crm_reporting::AggregationEngine;
use crm_segmentation::{SegmentStore, SegmentationEngine};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};
use utoipa::ToSchema;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub segments: Arc<SegmentationEngine>,
    pub aggregation: Arc<AggregationEngine>,
    pub dispatcher: Arc<MessageDispatcher>,
    pub receipts: Arc<dyn ReceiptStore>,
    pub sessions: Arc<SessionManager>,
    pub node_id: String,
    pub start_time: Instant,
}

impl AppState {
    /// Wire every engine over one backing store.
    pub fn new<S>(
        config: &AppConfig,
        store: Arc<S>,
        transport: Arc<dyn DeliveryTransport>,
        events: Arc<dyn EventSink>,
    ) -> Self
    where
        S: CustomerSource + ReceiptStore + SegmentStore + 'static,
    {
        let segments = Arc::new(
            SegmentationEngine::new(store.clone(), store.clone(), &config.segmentation)
                .with_event_sink(events.clone()),
        );
        let aggregation = Arc::new(AggregationEngine::new(store.clone(), store.clone()));
        let dispatcher = Arc::new(
            MessageDispatcher::new(segments.clone(), store.clone(), transport, &config.dispatch)
                .with_event_sink(events),
        );

        Self {
            segments,
            aggregation,
            dispatcher,
            receipts: store,
            sessions: Arc::new(SessionManager::new(&config.auth)),
            node_id: config.node_id.clone(),
            start_time: Instant::now(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    /// Suggested operator response for this kind of failure.
    pub action: String,
    /// Whether resending the same request unchanged may succeed.
    pub retryable: bool,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

/// Error returned by every `/v1` handler.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorResponse {
                error: "not_found".to_string(),
                message: message.into(),
                action: "Check the identifier and try again.".to_string(),
                retryable: false,
            },
        }
    }
}

/// HTTP status for each error kind.
pub fn status_for(err: &CrmError) -> StatusCode {
    match err {
        CrmError::DataUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CrmError::UnknownSegment(_) => StatusCode::NOT_FOUND,
        CrmError::InvalidMessage(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CrmError::InvalidSegment(_) => StatusCode::BAD_REQUEST,
        CrmError::TransportError(_) => StatusCode::BAD_GATEWAY,
        CrmError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        CrmError::Config(_) | CrmError::Serialization(_) | CrmError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<CrmError> for ApiError {
    fn from(err: CrmError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!(error = %err, code = err.code(), "Request failed");
        } else {
            warn!(error = %err, code = err.code(), "Request rejected");
        }
        // Internal details stay in the logs.
        let message = match err {
            CrmError::Config(_) | CrmError::Serialization(_) | CrmError::Internal(_) => {
                "Internal processing error".to_string()
            }
            ref other => other.to_string(),
        };
        Self {
            status,
            body: ErrorResponse {
                error: err.code().to_string(),
                message,
                action: err.operator_action().to_string(),
                retryable: err.is_retryable(),
            },
        }
    }
}

/// Report an unreadable request body as the error kind of the route it was
/// sent to, in the usual JSON error shape.
pub fn rejected_body(rejection: JsonRejection, kind: fn(String) -> CrmError) -> ApiError {
    ApiError::from(kind(rejection.body_text()))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        metrics::counter!("api.errors", "code" => self.body.error.clone()).increment(1);
        (self.status, Json(self.body)).into_response()
    }
}

/// GET /health: Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Operations",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready: Readiness probe.
/// Returns 200 only when the customer store answers.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Operations",
    responses(
        (status = 200, description = "Ready for traffic"),
        (status = 503, description = "Backing store unavailable"),
    )
)]
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.segments.customer_source().fetch_customers().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// GET /live: Liveness probe.
#[utoipa::path(
    get,
    path = "/live",
    tag = "Operations",
    responses((status = 200, description = "Process is alive"))
)]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
