//! OpenAPI specification and Swagger UI configuration.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CRM Console API",
        version = "0.1.0",
        description = "Customer segmentation, segment messaging and dashboard aggregates for the operator console.\n\nAll `/v1` routes except login expect `Authorization: Bearer <token>`.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Operations", description = "Health, readiness, and liveness probes"),
        (name = "Auth", description = "Operator sessions"),
        (name = "Customers", description = "Customers and their orders"),
        (name = "Segments", description = "Built-in and rule-defined segments"),
        (name = "Messaging", description = "Segment messaging and the communication log"),
        (name = "Dashboard", description = "Customer, order and revenue aggregates"),
    ),
    paths(
        // Operations
        crate::rest::health_check,
        crate::rest::readiness,
        crate::rest::liveness,
        // Auth
        crate::auth::handle_login,
        crate::auth::handle_logout,
        // Customers
        crate::crm_rest::handle_list_customers,
        crate::crm_rest::handle_customer_orders,
        // Segments
        crate::crm_rest::handle_list_segments,
        crate::crm_rest::handle_create_segment,
        crate::crm_rest::handle_segment_members,
        // Messaging
        crate::crm_rest::handle_send_message,
        crate::crm_rest::handle_communications,
        // Dashboard
        crate::crm_rest::handle_dashboard,
    ),
    components(schemas(
        // Domain types
        crm_core::types::Customer,
        crm_core::types::Order,
        crm_core::types::CommunicationLog,
        crm_core::channels::DeliveryStatus,
        // Segment types
        crm_segmentation::Segment,
        crm_segmentation::NewSegment,
        crm_segmentation::SegmentRules,
        crm_segmentation::RuleClause,
        crm_segmentation::Clause,
        crm_segmentation::ComparisonOperator,
        // Messaging and reporting
        crm_channels::DispatchOutcome,
        crm_channels::MemberDelivery,
        crm_reporting::DashboardOverview,
        // REST types
        crate::rest::ErrorResponse,
        crate::rest::HealthResponse,
        crate::auth::LoginRequest,
        crate::auth::LoginResponse,
        crate::auth::OperatorSession,
        crate::crm_rest::CustomerOrdersResponse,
        crate::crm_rest::SegmentListResponse,
        crate::crm_rest::SegmentMembersResponse,
        crate::crm_rest::SendMessageRequest,
    ))
)]
pub struct ApiDoc;
