//! End-to-end dispatch scenarios against the in-memory store.

use async_trait::async_trait;
use crm_channels::{DeliveryTransport, DispatchRequest, EmailTransport, MessageDispatcher};
use crm_core::channels::{DeliveryStatus, MessageEnvelope};
use crm_core::config::{DispatchConfig, SegmentationConfig};
use crm_core::types::{CommunicationLog, Customer};
use crm_core::{CrmError, CrmResult, CustomerSource, ReceiptStore};
use crm_segmentation::{ComparisonOperator, SegmentBuilder, SegmentationEngine};
use crm_store::MemoryStore;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    store: Arc<MemoryStore>,
    engine: Arc<SegmentationEngine>,
    dispatcher: MessageDispatcher,
}

fn harness(
    store: MemoryStore,
    transport: Arc<dyn DeliveryTransport>,
    config: DispatchConfig,
) -> Harness {
    let store = Arc::new(store);
    let engine = Arc::new(SegmentationEngine::new(
        store.clone(),
        store.clone(),
        &SegmentationConfig::default(),
    ));
    let dispatcher = MessageDispatcher::new(engine.clone(), store.clone(), transport, &config);
    Harness {
        store,
        engine,
        dispatcher,
    }
}

fn email_harness(store: MemoryStore) -> Harness {
    let config = DispatchConfig::default();
    harness(store, Arc::new(EmailTransport::new(&config)), config)
}

fn send(segment: &str, message: &str) -> DispatchRequest {
    DispatchRequest {
        segment: segment.into(),
        message: message.into(),
        sent_by: None,
    }
}

fn two_customers() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_customer(Customer::new(1, "A", "One", "a@x.com").with_visits(5));
    store.insert_customer(Customer::new(2, "B", "Two", "b@gmail.com"));
    store
}

#[tokio::test]
async fn receipts_match_returned_statuses() {
    let h = email_harness(MemoryStore::seeded());
    let outcome = h.dispatcher.dispatch(&send("all", "Weekend offer")).await.unwrap();

    assert_eq!(outcome.deliveries.len(), 5);
    for delivery in &outcome.deliveries {
        let customer = h.store.customer(delivery.customer_id).unwrap();
        assert_eq!(customer.delivery_receipt.as_deref(), Some(delivery.status.as_str()));
    }
    assert!(outcome.receipts_complete());
    assert!(outcome.receipt_error.is_none());
}

#[tokio::test]
async fn whitespace_message_writes_nothing() {
    let h = email_harness(two_customers());
    let err = h.dispatcher.dispatch(&send("all", "   ")).await.unwrap_err();

    assert!(matches!(err, CrmError::InvalidMessage(_)));
    assert!(h.store.fetch_communication_logs().await.unwrap().is_empty());
    for customer in h.store.fetch_customers().await.unwrap() {
        assert!(customer.delivery_receipt.is_none());
    }
}

#[tokio::test]
async fn unknown_segment_writes_nothing() {
    let h = email_harness(two_customers());
    let err = h.dispatcher.dispatch(&send("ghosts", "Hi")).await.unwrap_err();

    assert!(matches!(err, CrmError::UnknownSegment(ref s) if s == "ghosts"));
    assert!(h.store.fetch_communication_logs().await.unwrap().is_empty());
}

#[tokio::test]
async fn all_reaches_customer_added_after_listing() {
    let h = email_harness(two_customers());
    let listed = h.engine.members("all").await.unwrap();
    assert_eq!(listed.len(), 2);

    h.store
        .insert_customer(Customer::new(3, "C", "Three", "c@example.com"));
    let outcome = h.dispatcher.dispatch(&send("all", "Hello")).await.unwrap();

    let ids: Vec<_> = outcome.deliveries.iter().map(|d| d.customer_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn orders_segment_fills_after_dispatch_to_all() {
    let h = email_harness(two_customers());
    assert!(h.engine.members("orders").await.unwrap().is_empty());

    let outcome = h.dispatcher.dispatch(&send("all", "Hi")).await.unwrap();
    assert_eq!(outcome.statuses(), vec!["queued", "queued"]);
    assert_eq!(outcome.log.message, "Hi");
    assert_eq!(outcome.log.segment_name, "all");

    let messaged: Vec<_> = h
        .engine
        .members("orders")
        .await
        .unwrap()
        .iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(messaged, vec![1, 2]);
}

#[tokio::test]
async fn stored_segment_dispatch_uses_live_membership() {
    let h = email_harness(two_customers());
    let frequent = SegmentBuilder::new("frequent")
        .visits(ComparisonOperator::GreaterThanOrEqual, 5)
        .build()
        .unwrap();
    let segment = h.engine.create_segment(frequent).await.unwrap();
    assert_eq!(segment.customer_ids, vec![1]);

    h.store
        .insert_customer(Customer::new(3, "C", "Three", "c@example.com").with_visits(9));
    let outcome = h
        .dispatcher
        .dispatch(&send(&segment.id.to_string(), "Thanks for visiting"))
        .await
        .unwrap();

    let ids: Vec<_> = outcome.deliveries.iter().map(|d| d.customer_id).collect();
    assert_eq!(ids, vec![1, 3]);
    assert_eq!(outcome.log.segment_id, Some(segment.id));
    assert_eq!(outcome.log.segment_name, "frequent");
}

/// Refuses every second customer at the transport level.
struct FlakyRelay;

#[async_trait]
impl DeliveryTransport for FlakyRelay {
    fn name(&self) -> &'static str {
        "flaky-relay"
    }

    async fn deliver(&self, envelope: &MessageEnvelope) -> CrmResult<DeliveryStatus> {
        if envelope.customer.id % 2 == 0 {
            return Err(CrmError::TransportError("relay refused connection".into()));
        }
        Ok(DeliveryStatus::Sent)
    }
}

#[tokio::test]
async fn transport_error_still_logs_partial_delivery() {
    let h = harness(
        MemoryStore::seeded(),
        Arc::new(FlakyRelay),
        DispatchConfig::default(),
    );
    let outcome = h.dispatcher.dispatch(&send("all", "Restock alert")).await.unwrap();

    assert_eq!(
        outcome.transport_error.as_deref(),
        Some("relay refused connection")
    );
    assert_eq!(outcome.statuses()[0], "sent");
    assert_eq!(
        outcome.statuses()[1],
        "failed: transport error: relay refused connection"
    );
    assert_eq!(outcome.log.failed, 2);
    assert_eq!(outcome.log.delivered, 3);

    let logs = h.store.fetch_communication_logs().await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].id, outcome.log.id);
    assert_eq!(
        h.store.customer(2).unwrap().delivery_receipt.as_deref(),
        Some("failed: transport error: relay refused connection")
    );
}

/// Never answers for customer 2.
struct HangingTransport;

#[async_trait]
impl DeliveryTransport for HangingTransport {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn deliver(&self, envelope: &MessageEnvelope) -> CrmResult<DeliveryStatus> {
        if envelope.customer.id == 2 {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(DeliveryStatus::Delivered)
    }
}

#[tokio::test]
async fn unresponsive_send_is_recorded_as_timed_out() {
    let config = DispatchConfig {
        send_timeout_ms: 50,
        ..DispatchConfig::default()
    };
    let h = harness(two_customers(), Arc::new(HangingTransport), config);
    let outcome = h.dispatcher.dispatch(&send("all", "Ping")).await.unwrap();

    assert_eq!(outcome.statuses(), vec!["delivered", "failed: timed out"]);
    assert!(outcome.transport_error.is_none());
    assert_eq!(h.store.fetch_communication_logs().await.unwrap().len(), 1);
}

#[tokio::test]
async fn dispatching_twice_overwrites_receipts() {
    let h = harness(two_customers(), Arc::new(FlakyRelay), DispatchConfig::default());
    h.dispatcher.dispatch(&send("all", "First")).await.unwrap();
    h.store.record_delivery_receipt(2, "sent").await.unwrap();
    h.dispatcher.dispatch(&send("all", "Second")).await.unwrap();

    assert_eq!(h.store.fetch_communication_logs().await.unwrap().len(), 2);
    assert!(DeliveryStatus::receipt_is_failure(
        h.store.customer(2).unwrap().delivery_receipt.as_deref().unwrap()
    ));
}

#[tokio::test]
async fn store_outage_fails_before_sending() {
    let h = email_harness(two_customers());
    h.store.set_offline(true);
    let err = h.dispatcher.dispatch(&send("all", "Hi")).await.unwrap_err();
    assert!(matches!(err, CrmError::DataUnavailable(_)));

    h.store.set_offline(false);
    assert!(h.store.fetch_communication_logs().await.unwrap().is_empty());
}

/// Accepts communication logs but refuses every receipt write.
struct ReceiptOutage(Arc<MemoryStore>);

#[async_trait]
impl ReceiptStore for ReceiptOutage {
    async fn record_delivery_receipt(&self, _: u64, _: &str) -> CrmResult<()> {
        Err(CrmError::DataUnavailable("receipt table locked".into()))
    }

    async fn append_communication_log(&self, log: CommunicationLog) -> CrmResult<()> {
        self.0.append_communication_log(log).await
    }

    async fn fetch_communication_logs(&self) -> CrmResult<Vec<CommunicationLog>> {
        self.0.fetch_communication_logs().await
    }
}

#[tokio::test]
async fn unrecorded_receipts_are_reported() {
    let store = Arc::new(two_customers());
    let engine = Arc::new(SegmentationEngine::new(
        store.clone(),
        store.clone(),
        &SegmentationConfig::default(),
    ));
    let config = DispatchConfig::default();
    let dispatcher = MessageDispatcher::new(
        engine,
        Arc::new(ReceiptOutage(store.clone())),
        Arc::new(EmailTransport::new(&config)),
        &config,
    );

    let outcome = dispatcher.dispatch(&send("all", "Hi")).await.unwrap();

    assert_eq!(outcome.statuses(), vec!["queued", "queued"]);
    assert!(!outcome.receipts_complete());
    assert!(outcome.deliveries.iter().all(|d| !d.receipt_recorded));
    assert!(outcome
        .receipt_error
        .as_deref()
        .is_some_and(|e| e.contains("receipt table locked")));
    assert!(store.customer(1).unwrap().delivery_receipt.is_none());
    assert_eq!(store.fetch_communication_logs().await.unwrap().len(), 1);
}
