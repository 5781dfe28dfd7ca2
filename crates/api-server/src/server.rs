//! HTTP router and Prometheus exporter.

use crate::auth;
use crate::crm_rest;
use crate::rest::{self, AppState};
use crate::swagger::ApiDoc;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use crm_core::config::AppConfig;
use std::net::SocketAddr;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Main API server for the operator console.
pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: AppConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Full application router. Every `/v1` route except login requires an
    /// operator session.
    pub fn router(&self) -> Router {
        let state = self.state.clone();

        let protected = Router::new()
            .route("/v1/auth/logout", post(auth::handle_logout))
            // Customers
            .route("/v1/customers", get(crm_rest::handle_list_customers))
            .route(
                "/v1/customers/:id/orders",
                get(crm_rest::handle_customer_orders),
            )
            // Segments
            .route(
                "/v1/segments",
                get(crm_rest::handle_list_segments).post(crm_rest::handle_create_segment),
            )
            .route(
                "/v1/segments/:segment/members",
                get(crm_rest::handle_segment_members),
            )
            // Messaging
            .route(
                "/v1/segments/:segment/messages",
                post(crm_rest::handle_send_message),
            )
            .route("/v1/communications", get(crm_rest::handle_communications))
            .route("/v1/dashboard", get(crm_rest::handle_dashboard))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_session,
            ));

        Router::new()
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
            .route("/v1/auth/login", post(auth::handle_login))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            .merge(protected)
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = self.router();

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
