//! Operator sessions: login, logout and bearer-token checks for `/v1` routes.

use crate::rest::{rejected_body, ApiError, AppState, ErrorResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use axum::{Extension, Json};
use chrono::{DateTime, Duration, Utc};
use crm_core::config::AuthConfig;
use crm_core::{CrmError, CrmResult};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// An authenticated operator, attached to each protected request.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OperatorSession {
    pub token: Uuid,
    pub username: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionManager {
    sessions: DashMap<Uuid, OperatorSession>,
    username: String,
    password_sha256: String,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            username: config.operator_username.clone(),
            password_sha256: config.operator_password_sha256.to_lowercase(),
            ttl: Duration::seconds(config.session_ttl_secs as i64),
        }
    }

    /// Check operator credentials and open a session. Expired sessions are
    /// pruned on every login.
    pub fn login(&self, username: &str, password: &str) -> CrmResult<OperatorSession> {
        let now = Utc::now();
        self.sessions.retain(|_, s| s.expires_at > now);

        let digest = hex::encode(Sha256::digest(password.as_bytes()));
        if username != self.username || digest != self.password_sha256 {
            warn!(username = %username, "Operator login rejected");
            return Err(CrmError::Unauthorized("invalid username or password".into()));
        }

        let session = OperatorSession {
            token: Uuid::new_v4(),
            username: username.to_string(),
            issued_at: now,
            expires_at: now + self.ttl,
        };
        info!(username = %username, "Operator session created");
        self.sessions.insert(session.token, session.clone());
        Ok(session)
    }

    /// The live session for `token`; expired sessions are dropped.
    pub fn validate(&self, token: &str) -> Option<OperatorSession> {
        let token = Uuid::parse_str(token).ok()?;
        let session = self.sessions.get(&token).map(|s| s.clone())?;
        if Utc::now() >= session.expires_at {
            self.sessions.remove(&token);
            return None;
        }
        Some(session)
    }

    pub fn logout(&self, token: Uuid) -> bool {
        self.sessions.remove(&token).is_some()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

/// Rejects requests without a valid `Authorization: Bearer <token>` header
/// and attaches the [`OperatorSession`] to the rest.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let session = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| state.sessions.validate(token.trim()))
        .ok_or_else(|| CrmError::Unauthorized("missing or expired session".into()))?;

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: Uuid,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

/// POST /v1/auth/login: Open an operator session.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session opened", body = LoginResponse),
        (status = 401, description = "Bad or unreadable credentials", body = ErrorResponse),
    )
)]
pub async fn handle_login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(request) = body.map_err(|r| rejected_body(r, CrmError::Unauthorized))?;
    let session = state.sessions.login(&request.username, &request.password)?;
    metrics::counter!("api.auth.logins").increment(1);
    Ok(Json(LoginResponse {
        token: session.token,
        username: session.username,
        expires_at: session.expires_at,
    }))
}

/// POST /v1/auth/logout: Revoke the caller's session.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "Auth",
    responses((status = 204, description = "Session revoked"))
)]
pub async fn handle_logout(
    State(state): State<AppState>,
    Extension(session): Extension<OperatorSession>,
) -> StatusCode {
    state.sessions.logout(session.token);
    info!(username = %session.username, "Operator signed out");
    StatusCode::NO_CONTENT
}
