use crate::error::{CrmError, CrmResult};
use serde::Deserialize;

/// Root application configuration. Loaded from an optional
/// `config/crm-console.toml` file and environment variables with the
/// prefix `CRM_CONSOLE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentationConfig {
    /// Email suffix matched by the built-in `email` segment.
    #[serde(default = "default_allowed_email_domain")]
    pub allowed_email_domain: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_operator_username")]
    pub operator_username: String,
    /// Hex-encoded SHA-256 of the operator password.
    #[serde(default = "default_operator_password_sha256")]
    pub operator_password_sha256: String,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_seed_demo_data")]
    pub seed_demo_data: bool,
}

// Default functions
fn default_node_id() -> String {
    "console-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_allowed_email_domain() -> String {
    "@example.com".to_string()
}
fn default_send_timeout_ms() -> u64 {
    5000
}
fn default_max_concurrent_sends() -> usize {
    16
}
fn default_from_email() -> String {
    "noreply@example.com".to_string()
}
fn default_from_name() -> String {
    "CRM Console".to_string()
}
fn default_operator_username() -> String {
    "admin".to_string()
}
// sha256("changeme")
fn default_operator_password_sha256() -> String {
    "057ba03d6c44104863dc7361fe4578965d1887360f90a0895882e58a6248fc86".to_string()
}
fn default_session_ttl_secs() -> u64 {
    8 * 3600
}
fn default_seed_demo_data() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            allowed_email_domain: default_allowed_email_domain(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout_ms(),
            max_concurrent_sends: default_max_concurrent_sends(),
            from_email: default_from_email(),
            from_name: default_from_name(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            operator_username: default_operator_username(),
            operator_password_sha256: default_operator_password_sha256(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            seed_demo_data: default_seed_demo_data(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            segmentation: SegmentationConfig::default(),
            dispatch: DispatchConfig::default(),
            auth: AuthConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the optional config file and environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/crm-console").required(false))
            .add_source(
                config::Environment::with_prefix("CRM_CONSOLE")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Reject settings the services cannot run with.
    pub fn validate(&self) -> CrmResult<()> {
        if self.dispatch.send_timeout_ms == 0 {
            return Err(CrmError::Config("dispatch.send_timeout_ms must be positive".into()));
        }
        if self.dispatch.max_concurrent_sends == 0 {
            return Err(CrmError::Config(
                "dispatch.max_concurrent_sends must be positive".into(),
            ));
        }
        if self.segmentation.allowed_email_domain.trim().trim_start_matches('@').is_empty() {
            return Err(CrmError::Config(
                "segmentation.allowed_email_domain must name a domain".into(),
            ));
        }
        let digest = &self.auth.operator_password_sha256;
        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CrmError::Config(
                "auth.operator_password_sha256 must be a 64-character hex digest".into(),
            ));
        }
        if self.auth.session_ttl_secs == 0 {
            return Err(CrmError::Config("auth.session_ttl_secs must be positive".into()));
        }
        if self.api.http_port == self.metrics.port {
            return Err(CrmError::Config(format!(
                "api.http_port and metrics.port both set to {}",
                self.api.http_port
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_source_matches_defaults() {
        let loaded: AppConfig = config::Config::builder()
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap();
        let defaults = AppConfig::default();
        assert_eq!(loaded.node_id, defaults.node_id);
        assert_eq!(loaded.api.http_port, defaults.api.http_port);
        assert_eq!(loaded.dispatch.max_concurrent_sends, 16);
        assert_eq!(loaded.segmentation.allowed_email_domain, "@example.com");
        assert!(loaded.store.seed_demo_data);
    }

    #[test]
    fn test_defaults_validate() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_settings_are_config_errors() {
        let mut config = AppConfig::default();
        config.dispatch.max_concurrent_sends = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, CrmError::Config(_)));
        assert_eq!(err.code(), "config_error");

        let mut config = AppConfig::default();
        config.metrics.port = config.api.http_port;
        assert!(matches!(config.validate(), Err(CrmError::Config(_))));

        let mut config = AppConfig::default();
        config.auth.operator_password_sha256 = "plaintext".into();
        assert!(matches!(config.validate(), Err(CrmError::Config(_))));
    }

    #[test]
    fn test_nested_override() {
        let loaded: AppConfig = config::Config::builder()
            .set_override("dispatch.send_timeout_ms", 250)
            .unwrap()
            .set_override("auth.operator_username", "ops")
            .unwrap()
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap();
        assert_eq!(loaded.dispatch.send_timeout_ms, 250);
        assert_eq!(loaded.auth.operator_username, "ops");
        assert_eq!(loaded.auth.session_ttl_secs, 8 * 3600);
    }
}
