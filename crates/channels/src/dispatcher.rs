//! Message dispatcher: sends a message to every current member of a segment.
//! Emits `MessageSent` / `MessageFailed` per member and one
//! `DispatchCompleted` per dispatch.

use crate::transport::DeliveryTransport;
use chrono::Utc;
use crm_core::channels::{DeliveryStatus, MessageEnvelope};
use crm_core::config::DispatchConfig;
use crm_core::event_bus::{make_event, noop_sink, EventSink, EventType};
use crm_core::types::{CommunicationLog, Customer, CustomerId};
use crm_core::{CrmError, CrmResult, ReceiptStore};
use crm_segmentation::SegmentationEngine;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchRequest {
    /// Built-in name, stored segment name, or stored segment id.
    pub segment: String,
    pub message: String,
    pub sent_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MemberDelivery {
    pub customer_id: CustomerId,
    /// Delivery-status string, identical to the stored receipt when
    /// `receipt_recorded` is true.
    pub status: String,
    pub receipt_recorded: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DispatchOutcome {
    pub log: CommunicationLog,
    /// One entry per member, in membership order.
    pub deliveries: Vec<MemberDelivery>,
    /// Set when the transport itself failed for at least one member.
    pub transport_error: Option<String>,
    /// Set when at least one delivery receipt could not be stored.
    pub receipt_error: Option<String>,
}

impl DispatchOutcome {
    pub fn statuses(&self) -> Vec<String> {
        self.deliveries.iter().map(|d| d.status.clone()).collect()
    }

    /// True when every member's receipt matches its returned status.
    pub fn receipts_complete(&self) -> bool {
        self.deliveries.iter().all(|d| d.receipt_recorded)
    }
}

/// Result of one send attempt.
struct SendResult {
    status: DeliveryStatus,
    transport_error: Option<String>,
}

pub struct MessageDispatcher {
    segments: Arc<SegmentationEngine>,
    receipts: Arc<dyn ReceiptStore>,
    transport: Arc<dyn DeliveryTransport>,
    send_timeout: Duration,
    max_concurrent_sends: usize,
    event_sink: Arc<dyn EventSink>,
}

impl MessageDispatcher {
    pub fn new(
        segments: Arc<SegmentationEngine>,
        receipts: Arc<dyn ReceiptStore>,
        transport: Arc<dyn DeliveryTransport>,
        config: &DispatchConfig,
    ) -> Self {
        info!(
            transport = transport.name(),
            send_timeout_ms = config.send_timeout_ms,
            max_concurrent_sends = config.max_concurrent_sends,
            "Message dispatcher initialized"
        );
        Self {
            segments,
            receipts,
            transport,
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            max_concurrent_sends: config.max_concurrent_sends.max(1),
            event_sink: noop_sink(),
        }
    }

    /// Attach an event sink for emitting delivery events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Resolve current membership, send to each member, record receipts and
    /// append one communication log entry.
    ///
    /// Input errors (`InvalidMessage`, `UnknownSegment`) and data errors are
    /// returned before anything is sent or written. Once sending starts the
    /// log entry is always appended; per-member failures live in the
    /// returned statuses, and receipt write failures in `receipt_error`.
    pub async fn dispatch(&self, request: &DispatchRequest) -> CrmResult<DispatchOutcome> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(CrmError::InvalidMessage(
                "message text must not be empty".into(),
            ));
        }

        let predicate = self.segments.predicate_for(&request.segment).await?;
        let members = self.segments.resolve(&predicate).await?;

        let log_id = Uuid::new_v4();
        let segment_name = predicate.name().to_string();
        let start = Instant::now();

        let sends: Vec<_> = members
            .iter()
            .map(|customer| {
                let envelope = MessageEnvelope {
                    log_id,
                    segment_name: segment_name.clone(),
                    customer: customer.clone(),
                    message: message.to_string(),
                };
                async move { self.send(envelope).await }
            })
            .collect();
        let results: Vec<SendResult> = stream::iter(sends)
        .buffered(self.max_concurrent_sends)
        .collect()
        .await;

        let mut deliveries = Vec::with_capacity(results.len());
        let mut transport_error = None;
        let mut receipt_error = None;
        let mut failed = 0u64;
        for (customer, result) in members.iter().zip(results) {
            let status = result.status.to_string();
            let receipt_recorded = match self.record_receipt(customer, &status).await {
                Ok(()) => true,
                Err(e) => {
                    if receipt_error.is_none() {
                        receipt_error = Some(e.to_string());
                    }
                    false
                }
            };

            if result.status.is_failure() {
                failed += 1;
            }
            if transport_error.is_none() {
                transport_error = result.transport_error;
            }
            self.event_sink.emit(make_event(
                if result.status.is_failure() {
                    EventType::MessageFailed
                } else {
                    EventType::MessageSent
                },
                &segment_name,
                Some(customer.id),
                Some(status.clone()),
            ));
            deliveries.push(MemberDelivery {
                customer_id: customer.id,
                status,
                receipt_recorded,
            });
        }

        let recipients = deliveries.len() as u64;
        let log = CommunicationLog {
            id: log_id,
            segment_id: predicate.segment_id(),
            segment_name: segment_name.clone(),
            message: message.to_string(),
            recipients,
            delivered: recipients - failed,
            failed,
            sent_by: request.sent_by.clone(),
            created_at: Utc::now(),
        };
        self.receipts.append_communication_log(log.clone()).await?;

        let latency_ms = start.elapsed().as_millis() as u64;
        metrics::counter!("dispatch.messages_sent", "transport" => self.transport.name())
            .increment(recipients - failed);
        metrics::counter!("dispatch.failures", "transport" => self.transport.name())
            .increment(failed);
        metrics::histogram!("dispatch.latency_ms").record(latency_ms as f64);

        self.event_sink.emit(make_event(
            EventType::DispatchCompleted,
            &segment_name,
            None,
            Some(format!("{recipients} recipients, {failed} failed")),
        ));

        if let Some(error) = &receipt_error {
            metrics::counter!("dispatch.receipt_failures").increment(1);
            warn!(
                log_id = %log_id,
                segment = %segment_name,
                error = %error,
                "Dispatch completed with unrecorded receipts"
            );
        }
        if let Some(error) = &transport_error {
            warn!(
                log_id = %log_id,
                segment = %segment_name,
                error = %error,
                "Dispatch completed with transport errors"
            );
        }
        info!(
            log_id = %log_id,
            segment = %segment_name,
            recipients,
            failed,
            latency_ms,
            "Dispatch completed"
        );

        Ok(DispatchOutcome {
            log,
            deliveries,
            transport_error,
            receipt_error,
        })
    }

    async fn send(&self, envelope: MessageEnvelope) -> SendResult {
        let customer_id = envelope.customer.id;
        match tokio::time::timeout(self.send_timeout, self.transport.deliver(&envelope)).await {
            Ok(Ok(status)) => {
                debug!(customer_id, status = %status, "Message handed to transport");
                SendResult {
                    status,
                    transport_error: None,
                }
            }
            Ok(Err(e)) => {
                let reason = match e {
                    CrmError::TransportError(reason) => reason,
                    other => other.to_string(),
                };
                SendResult {
                    status: DeliveryStatus::failed(format!("transport error: {reason}")),
                    transport_error: Some(reason),
                }
            }
            Err(_) => {
                warn!(
                    customer_id,
                    timeout_ms = self.send_timeout.as_millis() as u64,
                    "Delivery timed out"
                );
                SendResult {
                    status: DeliveryStatus::failed("timed out"),
                    transport_error: None,
                }
            }
        }
    }

    async fn record_receipt(&self, customer: &Customer, status: &str) -> CrmResult<()> {
        self.receipts
            .record_delivery_receipt(customer.id, status)
            .await
            .map_err(|e| {
                warn!(customer_id = customer.id, error = %e, "Failed to record delivery receipt");
                e
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crm_core::config::SegmentationConfig;
    use crm_core::event_bus::capture_sink;
    use crm_store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Delivers after a delay that shrinks with the customer id, so later
    /// members finish first.
    struct SlowFirstTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DeliveryTransport for SlowFirstTransport {
        fn name(&self) -> &'static str {
            "slow-first"
        }

        async fn deliver(&self, envelope: &MessageEnvelope) -> CrmResult<DeliveryStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = 40u64.saturating_sub(envelope.customer.id * 10);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if envelope.customer.id == 2 {
                return Ok(DeliveryStatus::failed("mailbox full"));
            }
            Ok(DeliveryStatus::Sent)
        }
    }

    fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for (id, first) in [(1, "Ada"), (2, "Alan"), (3, "Edsger")] {
            store.insert_customer(Customer::new(
                id,
                first,
                "Tester",
                &format!("{}@example.com", first.to_lowercase()),
            ));
        }
        store
    }

    fn dispatcher(
        store: Arc<MemoryStore>,
        transport: Arc<dyn DeliveryTransport>,
    ) -> MessageDispatcher {
        let engine = Arc::new(SegmentationEngine::new(
            store.clone(),
            store.clone(),
            &SegmentationConfig::default(),
        ));
        MessageDispatcher::new(engine, store, transport, &DispatchConfig::default())
    }

    fn request(segment: &str, message: &str) -> DispatchRequest {
        DispatchRequest {
            segment: segment.into(),
            message: message.into(),
            sent_by: Some("admin".into()),
        }
    }

    #[tokio::test]
    async fn test_blank_message_fails_before_any_send() {
        let transport = Arc::new(SlowFirstTransport {
            calls: AtomicUsize::new(0),
        });
        let store = store();
        let dispatcher = dispatcher(store.clone(), transport.clone());

        let err = dispatcher.dispatch(&request("all", "  \n ")).await.unwrap_err();
        assert!(matches!(err, CrmError::InvalidMessage(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert!(store.fetch_communication_logs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_statuses_follow_membership_order() {
        let transport = Arc::new(SlowFirstTransport {
            calls: AtomicUsize::new(0),
        });
        let sink = capture_sink();
        let dispatcher = dispatcher(store(), transport).with_event_sink(sink.clone());

        let outcome = dispatcher.dispatch(&request("all", " Hello ")).await.unwrap();
        let ids: Vec<_> = outcome.deliveries.iter().map(|d| d.customer_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(
            outcome.statuses(),
            vec!["sent", "failed: mailbox full", "sent"]
        );
        assert_eq!(outcome.log.message, "Hello");
        assert_eq!(outcome.log.recipients, 3);
        assert_eq!(outcome.log.delivered, 2);
        assert_eq!(outcome.log.failed, 1);
        assert_eq!(outcome.log.segment_id, None);
        assert_eq!(outcome.log.sent_by.as_deref(), Some("admin"));
        assert!(outcome.transport_error.is_none());

        assert_eq!(sink.count_type(EventType::MessageSent), 2);
        assert_eq!(sink.count_type(EventType::MessageFailed), 1);
        assert_eq!(sink.count_type(EventType::DispatchCompleted), 1);
    }

    #[tokio::test]
    async fn test_unknown_segment_is_rejected() {
        let transport = Arc::new(SlowFirstTransport {
            calls: AtomicUsize::new(0),
        });
        let dispatcher = dispatcher(store(), transport.clone());
        let err = dispatcher.dispatch(&request("lapsed", "Hi")).await.unwrap_err();
        assert!(matches!(err, CrmError::UnknownSegment(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_segment_still_logs() {
        let transport = Arc::new(SlowFirstTransport {
            calls: AtomicUsize::new(0),
        });
        let store = store();
        let dispatcher = dispatcher(store.clone(), transport);

        let outcome = dispatcher.dispatch(&request("orders", "Hi")).await.unwrap();
        assert!(outcome.deliveries.is_empty());
        assert_eq!(outcome.log.recipients, 0);
        assert_eq!(store.fetch_communication_logs().await.unwrap().len(), 1);
    }
}
