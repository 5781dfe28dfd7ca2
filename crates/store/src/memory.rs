//! DashMap-backed store implementing every console collaborator contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_core::types::{CommunicationLog, Customer, CustomerId, Order, SegmentId};
use crm_core::{CrmError, CrmResult, CustomerSource, ReceiptStore};
use crm_segmentation::{NewSegment, Segment, SegmentStore};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

pub struct MemoryStore {
    customers: DashMap<CustomerId, Customer>,
    orders: DashMap<CustomerId, Vec<Order>>,
    segments: DashMap<SegmentId, Segment>,
    communication_logs: RwLock<Vec<CommunicationLog>>,
    next_segment_id: AtomicU64,
    /// Serialises the name-uniqueness check with the insert.
    segment_writes: Mutex<()>,
    offline: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            customers: DashMap::new(),
            orders: DashMap::new(),
            segments: DashMap::new(),
            communication_logs: RwLock::new(Vec::new()),
            next_segment_id: AtomicU64::new(1),
            segment_writes: Mutex::new(()),
            offline: AtomicBool::new(false),
        }
    }

    /// Store pre-loaded with the demo dataset.
    pub fn seeded() -> Self {
        let store = Self::new();
        crate::seed::seed_demo_data(&store);
        store
    }

    /// Insert or replace a customer.
    pub fn insert_customer(&self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }

    pub fn insert_order(&self, order: Order) {
        self.orders.entry(order.customer_id).or_default().push(order);
    }

    pub fn customer(&self, id: CustomerId) -> Option<Customer> {
        self.customers.get(&id).map(|c| c.clone())
    }

    /// While offline every read and write fails with `DataUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> CrmResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CrmError::DataUnavailable("backing store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CustomerSource for MemoryStore {
    async fn fetch_customers(&self) -> CrmResult<Vec<Customer>> {
        self.ensure_online()?;
        let mut customers: Vec<Customer> =
            self.customers.iter().map(|c| c.value().clone()).collect();
        customers.sort_by_key(|c| c.id);
        Ok(customers)
    }

    async fn fetch_orders(&self, customer_id: CustomerId) -> CrmResult<Vec<Order>> {
        self.ensure_online()?;
        Ok(self
            .orders
            .get(&customer_id)
            .map(|o| o.clone())
            .unwrap_or_default())
    }

    async fn fetch_customer(&self, customer_id: CustomerId) -> CrmResult<Option<Customer>> {
        self.ensure_online()?;
        Ok(self.customer(customer_id))
    }
}

#[async_trait]
impl ReceiptStore for MemoryStore {
    async fn record_delivery_receipt(
        &self,
        customer_id: CustomerId,
        status: &str,
    ) -> CrmResult<()> {
        self.ensure_online()?;
        match self.customers.get_mut(&customer_id) {
            Some(mut customer) => {
                customer.delivery_receipt = Some(status.to_string());
                Ok(())
            }
            None => Err(CrmError::DataUnavailable(format!(
                "customer {customer_id} not found"
            ))),
        }
    }

    async fn append_communication_log(&self, log: CommunicationLog) -> CrmResult<()> {
        self.ensure_online()?;
        debug!(log_id = %log.id, segment = %log.segment_name, "Communication log appended");
        self.communication_logs.write().push(log);
        Ok(())
    }

    async fn fetch_communication_logs(&self) -> CrmResult<Vec<CommunicationLog>> {
        self.ensure_online()?;
        Ok(self.communication_logs.read().clone())
    }
}

#[async_trait]
impl SegmentStore for MemoryStore {
    async fn fetch_segments(&self) -> CrmResult<Vec<Segment>> {
        self.ensure_online()?;
        let mut segments: Vec<Segment> =
            self.segments.iter().map(|s| s.value().clone()).collect();
        segments.sort_by_key(|s| s.id);
        Ok(segments)
    }

    async fn find_segment(&self, identifier: &str) -> CrmResult<Option<Segment>> {
        self.ensure_online()?;
        let identifier = identifier.trim();
        if let Some(by_name) = self.segments.iter().find(|s| s.name == identifier) {
            return Ok(Some(by_name.value().clone()));
        }
        Ok(identifier
            .parse::<SegmentId>()
            .ok()
            .and_then(|id| self.segments.get(&id).map(|s| s.clone())))
    }

    async fn save_segment(&self, segment: NewSegment) -> CrmResult<Segment> {
        self.ensure_online()?;
        let _guard = self.segment_writes.lock();
        let name = segment.name.trim().to_string();
        if self.segments.iter().any(|s| s.name == name) {
            return Err(CrmError::InvalidSegment(format!(
                "a segment named '{name}' already exists"
            )));
        }

        let id = self.next_segment_id.fetch_add(1, Ordering::SeqCst);
        let saved = Segment {
            id,
            name,
            rules: segment.rules,
            customer_ids: Vec::new(),
            created_at: Utc::now(),
            refreshed_at: None,
        };
        self.segments.insert(id, saved.clone());
        Ok(saved)
    }

    async fn update_segment_members(
        &self,
        id: SegmentId,
        customer_ids: Vec<CustomerId>,
        refreshed_at: DateTime<Utc>,
    ) -> CrmResult<()> {
        self.ensure_online()?;
        match self.segments.get_mut(&id) {
            Some(mut segment) => {
                segment.customer_ids = customer_ids;
                segment.refreshed_at = Some(refreshed_at);
                Ok(())
            }
            None => Err(CrmError::UnknownSegment(id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_segmentation::SegmentBuilder;
    use rust_decimal_macros::dec;

    fn order(id: &str, customer_id: CustomerId) -> Order {
        Order {
            order_id: id.into(),
            customer_id,
            order_date: Utc::now(),
            price: dec!(12.50),
            product_name: "Tea sampler".into(),
        }
    }

    #[tokio::test]
    async fn test_customers_come_back_in_id_order() {
        let store = MemoryStore::new();
        store.insert_customer(Customer::new(9, "Zed", "Last", "z@example.com"));
        store.insert_customer(Customer::new(2, "Amy", "First", "a@example.com"));
        store.insert_customer(Customer::new(5, "Max", "Middle", "m@example.com"));

        let ids: Vec<_> = store
            .fetch_customers()
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[tokio::test]
    async fn test_orders_are_grouped_by_customer() {
        let store = MemoryStore::new();
        store.insert_order(order("o-1", 1));
        store.insert_order(order("o-2", 1));
        store.insert_order(order("o-3", 2));

        assert_eq!(store.fetch_orders(1).await.unwrap().len(), 2);
        assert_eq!(store.fetch_orders(2).await.unwrap().len(), 1);
        assert!(store.fetch_orders(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_receipt_overwrites_previous_status() {
        let store = MemoryStore::new();
        store.insert_customer(Customer::new(1, "Ada", "L", "ada@example.com"));

        store.record_delivery_receipt(1, "queued").await.unwrap();
        store.record_delivery_receipt(1, "failed: timed out").await.unwrap();
        assert_eq!(
            store.customer(1).unwrap().delivery_receipt.as_deref(),
            Some("failed: timed out")
        );
        assert!(store.record_delivery_receipt(42, "sent").await.is_err());
    }

    #[tokio::test]
    async fn test_segment_names_are_unique() {
        let store = MemoryStore::new();
        let vip = SegmentBuilder::new("vip").visits(
            crm_segmentation::ComparisonOperator::GreaterThanOrEqual,
            10,
        );
        let first = store.save_segment(vip.build().unwrap()).await.unwrap();
        assert_eq!(first.id, 1);

        let dup = SegmentBuilder::new("vip").build().unwrap();
        let err = store.save_segment(dup).await.unwrap_err();
        assert!(matches!(err, CrmError::InvalidSegment(_)));

        let by_name = store.find_segment("vip").await.unwrap().unwrap();
        let by_id = store.find_segment("1").await.unwrap().unwrap();
        assert_eq!(by_name.id, by_id.id);
        assert!(store.find_segment("2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_offline_store_reports_data_unavailable() {
        let store = MemoryStore::seeded();
        store.set_offline(true);
        assert!(matches!(
            store.fetch_customers().await,
            Err(CrmError::DataUnavailable(_))
        ));
        assert!(store.fetch_communication_logs().await.is_err());

        store.set_offline(false);
        assert!(!store.fetch_customers().await.unwrap().is_empty());
    }
}
