use thiserror::Error;

pub type CrmResult<T> = Result<T, CrmError>;

#[derive(Error, Debug)]
pub enum CrmError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Unknown segment: {0}")]
    UnknownSegment(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Invalid segment definition: {0}")]
    InvalidSegment(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CrmError {
    /// Stable machine-readable code, one per error kind.
    pub fn code(&self) -> &'static str {
        match self {
            CrmError::DataUnavailable(_) => "data_unavailable",
            CrmError::UnknownSegment(_) => "unknown_segment",
            CrmError::InvalidMessage(_) => "invalid_message",
            CrmError::TransportError(_) => "transport_error",
            CrmError::InvalidSegment(_) => "invalid_segment",
            CrmError::Unauthorized(_) => "unauthorized",
            CrmError::Config(_) => "config_error",
            CrmError::Serialization(_) => "serialization_error",
            CrmError::Internal(_) => "internal_error",
        }
    }

    /// What the operator should do about it.
    pub fn operator_action(&self) -> &'static str {
        match self {
            CrmError::DataUnavailable(_) => "The customer data store is unreachable. Retry shortly.",
            CrmError::UnknownSegment(_) => "Pick an existing segment or create it first.",
            CrmError::InvalidMessage(_) => "Enter a non-empty message and send again.",
            CrmError::TransportError(_) => {
                "The delivery provider failed. Check the per-customer statuses and contact support."
            }
            CrmError::InvalidSegment(_) => "Correct the segment rules and save again.",
            CrmError::Unauthorized(_) => "Sign in again.",
            CrmError::Config(_) | CrmError::Serialization(_) | CrmError::Internal(_) => {
                "Unexpected failure. Contact support."
            }
        }
    }

    /// Whether retrying the same request unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CrmError::DataUnavailable(_) | CrmError::TransportError(_)
        )
    }
}
