//! Delivery transport contract.

use async_trait::async_trait;
use crm_core::channels::{DeliveryStatus, MessageEnvelope};
use crm_core::CrmResult;

/// Sends one message to one customer.
///
/// `Ok(DeliveryStatus::Failed { .. })` is a per-customer failure (bad
/// address, rejected by provider). `Err(CrmError::TransportError)` means the
/// transport itself could not be used for this call.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, envelope: &MessageEnvelope) -> CrmResult<DeliveryStatus>;
}
