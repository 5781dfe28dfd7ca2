//! Customer, segment, messaging and dashboard REST endpoints.

use crate::auth::OperatorSession;
use crate::rest::{rejected_body, ApiError, AppState, ErrorResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use crm_channels::{DispatchOutcome, DispatchRequest};
use crm_core::types::{CommunicationLog, Customer, CustomerId, Order};
use crm_core::CrmError;
use crm_reporting::{format_currency, DashboardOverview};
use crm_segmentation::engine::{BUILTIN_ALL, BUILTIN_SEGMENTS};
use crm_segmentation::{NewSegment, Segment};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, IntoParams)]
pub struct CustomerQuery {
    /// Segment filter: built-in name, stored name or id. Defaults to `all`.
    pub segment: Option<String>,
    /// Case-insensitive search on full name or email within the segment.
    pub q: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct CustomerOrdersResponse {
    pub customer: Customer,
    pub orders: Vec<Order>,
    pub total_spend: Decimal,
    pub total_spend_display: String,
}

#[derive(Serialize, ToSchema)]
pub struct SegmentListResponse {
    /// Names of the built-in segments, always available.
    pub builtin: Vec<String>,
    /// Stored segments with freshly computed membership.
    pub segments: Vec<Segment>,
}

#[derive(Serialize, ToSchema)]
pub struct SegmentMembersResponse {
    pub segment: String,
    pub count: usize,
    pub members: Vec<Customer>,
}

#[derive(Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub message: String,
}

/// GET /v1/customers: Customers in a segment.
#[utoipa::path(
    get,
    path = "/v1/customers",
    tag = "Customers",
    params(CustomerQuery),
    responses(
        (status = 200, description = "Matching customers in membership order", body = Vec<Customer>),
        (status = 404, description = "Unknown segment", body = ErrorResponse),
        (status = 503, description = "Customer data unavailable", body = ErrorResponse),
    )
)]
pub async fn handle_list_customers(
    State(state): State<AppState>,
    Query(query): Query<CustomerQuery>,
) -> Result<Json<Vec<Customer>>, ApiError> {
    let segment = query.segment.as_deref().unwrap_or(BUILTIN_ALL);
    let mut customers = state.segments.members(segment).await?;
    if let Some(q) = query.q.as_deref() {
        customers.retain(|c| c.matches_search(q));
    }
    Ok(Json(customers))
}

/// GET /v1/customers/{id}/orders: Orders of one customer.
#[utoipa::path(
    get,
    path = "/v1/customers/{id}/orders",
    tag = "Customers",
    params(("id" = u64, Path, description = "Customer identifier")),
    responses(
        (status = 200, description = "Customer with orders", body = CustomerOrdersResponse),
        (status = 404, description = "Customer not found", body = ErrorResponse),
        (status = 503, description = "Customer data unavailable", body = ErrorResponse),
    )
)]
pub async fn handle_customer_orders(
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
) -> Result<Json<CustomerOrdersResponse>, ApiError> {
    let source = state.segments.customer_source();
    let customer = source
        .fetch_customer(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("customer {id} not found")))?;
    let orders = source.fetch_orders(id).await?;
    let total_spend: Decimal = orders.iter().map(|o| o.price).sum();

    Ok(Json(CustomerOrdersResponse {
        customer,
        orders,
        total_spend,
        total_spend_display: format_currency(total_spend),
    }))
}

/// GET /v1/segments: Built-in names and stored segments.
#[utoipa::path(
    get,
    path = "/v1/segments",
    tag = "Segments",
    responses(
        (status = 200, description = "All segments", body = SegmentListResponse),
        (status = 503, description = "Customer data unavailable", body = ErrorResponse),
    )
)]
pub async fn handle_list_segments(
    State(state): State<AppState>,
) -> Result<Json<SegmentListResponse>, ApiError> {
    let segments = state.segments.list_segments().await?;
    Ok(Json(SegmentListResponse {
        builtin: BUILTIN_SEGMENTS.iter().map(|s| s.to_string()).collect(),
        segments,
    }))
}

/// POST /v1/segments: Create a rule segment.
#[utoipa::path(
    post,
    path = "/v1/segments",
    tag = "Segments",
    request_body = NewSegment,
    responses(
        (status = 201, description = "Segment created", body = Segment),
        (status = 400, description = "Invalid segment definition", body = ErrorResponse),
    )
)]
pub async fn handle_create_segment(
    State(state): State<AppState>,
    body: Result<Json<NewSegment>, JsonRejection>,
) -> Result<(StatusCode, Json<Segment>), ApiError> {
    let Json(new_segment) = body.map_err(|r| rejected_body(r, CrmError::InvalidSegment))?;
    let segment = state.segments.create_segment(new_segment).await?;
    metrics::counter!("api.segments.created").increment(1);
    Ok((StatusCode::CREATED, Json(segment)))
}

/// GET /v1/segments/{segment}/members: Current segment membership.
#[utoipa::path(
    get,
    path = "/v1/segments/{segment}/members",
    tag = "Segments",
    params(("segment" = String, Path, description = "Built-in name, stored name or id")),
    responses(
        (status = 200, description = "Current members", body = SegmentMembersResponse),
        (status = 404, description = "Unknown segment", body = ErrorResponse),
        (status = 503, description = "Customer data unavailable", body = ErrorResponse),
    )
)]
pub async fn handle_segment_members(
    State(state): State<AppState>,
    Path(segment): Path<String>,
) -> Result<Json<SegmentMembersResponse>, ApiError> {
    let members = state.segments.members(&segment).await?;
    Ok(Json(SegmentMembersResponse {
        segment,
        count: members.len(),
        members,
    }))
}

/// POST /v1/segments/{segment}/messages: Send a message to every member.
#[utoipa::path(
    post,
    path = "/v1/segments/{segment}/messages",
    tag = "Messaging",
    params(("segment" = String, Path, description = "Built-in name, stored name or id")),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Dispatched; per-member statuses in order", body = DispatchOutcome),
        (status = 404, description = "Unknown segment", body = ErrorResponse),
        (status = 422, description = "Empty or unreadable message", body = ErrorResponse),
        (status = 502, description = "Transport failed; log written with partial statuses", body = DispatchOutcome),
        (status = 503, description = "Sent, but some receipts were not stored", body = DispatchOutcome),
    )
)]
pub async fn handle_send_message(
    State(state): State<AppState>,
    Extension(session): Extension<OperatorSession>,
    Path(segment): Path<String>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DispatchOutcome>), ApiError> {
    let Json(request) = body.map_err(|r| rejected_body(r, CrmError::InvalidMessage))?;
    let outcome = state
        .dispatcher
        .dispatch(&DispatchRequest {
            segment,
            message: request.message,
            sent_by: Some(session.username),
        })
        .await?;

    metrics::counter!("api.messages.dispatched").increment(1);
    Ok((dispatch_status(&outcome), Json(outcome)))
}

/// 503 when receipts went unrecorded, 502 when the transport failed,
/// otherwise 200. The body always carries the full outcome.
pub fn dispatch_status(outcome: &DispatchOutcome) -> StatusCode {
    if outcome.receipt_error.is_some() {
        StatusCode::SERVICE_UNAVAILABLE
    } else if outcome.transport_error.is_some() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    }
}

/// GET /v1/communications: Communication log, newest first.
#[utoipa::path(
    get,
    path = "/v1/communications",
    tag = "Messaging",
    responses(
        (status = 200, description = "Communication log", body = Vec<CommunicationLog>),
        (status = 503, description = "Log unavailable", body = ErrorResponse),
    )
)]
pub async fn handle_communications(
    State(state): State<AppState>,
) -> Result<Json<Vec<CommunicationLog>>, ApiError> {
    let mut logs = state.receipts.fetch_communication_logs().await?;
    logs.reverse();
    Ok(Json(logs))
}

/// GET /v1/dashboard: Customer, order, revenue and messaging totals.
#[utoipa::path(
    get,
    path = "/v1/dashboard",
    tag = "Dashboard",
    responses(
        (status = 200, description = "Dashboard overview", body = DashboardOverview),
        (status = 503, description = "Customer data unavailable", body = ErrorResponse),
    )
)]
pub async fn handle_dashboard(
    State(state): State<AppState>,
) -> Result<Json<DashboardOverview>, ApiError> {
    Ok(Json(state.aggregation.overview().await?))
}
