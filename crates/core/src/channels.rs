//! Message delivery types shared by the dispatcher and its transports.
//!
//! A delivery status is both the typed outcome of one send and, through its
//! `Display` form, the receipt string stored on the customer record.

use crate::types::Customer;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

// ─── Delivery Status ───────────────────────────────────────────────────────

/// Outcome of delivering one message to one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    Sent,
    Delivered,
    Failed { reason: String },
}

impl DeliveryStatus {
    pub fn failed(reason: impl Into<String>) -> Self {
        DeliveryStatus::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, DeliveryStatus::Failed { .. })
    }

    /// Receipt strings that start with `failed` denote a failed delivery.
    pub fn receipt_is_failure(receipt: &str) -> bool {
        receipt.starts_with("failed")
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Queued => f.write_str("queued"),
            DeliveryStatus::Sent => f.write_str("sent"),
            DeliveryStatus::Delivered => f.write_str("delivered"),
            DeliveryStatus::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

// ─── Envelope ──────────────────────────────────────────────────────────────

/// A single message addressed to one segment member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Communication log this send belongs to.
    pub log_id: Uuid,
    pub segment_name: String,
    pub customer: Customer,
    pub message: String,
}
