//! Backing-store contracts consumed by the engines.
//!
//! Implementations report storage or network failures as
//! `CrmError::DataUnavailable`.

use crate::error::CrmResult;
use crate::types::{CommunicationLog, Customer, CustomerId, Order};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use std::collections::HashMap;
use tracing::debug;

/// Read access to customers and their orders.
#[async_trait]
pub trait CustomerSource: Send + Sync {
    /// All customers, in a stable order.
    async fn fetch_customers(&self) -> CrmResult<Vec<Customer>>;

    /// Orders placed by one customer.
    async fn fetch_orders(&self, customer_id: CustomerId) -> CrmResult<Vec<Order>>;

    async fn fetch_customer(&self, customer_id: CustomerId) -> CrmResult<Option<Customer>>;
}

/// Write path for dispatch outcomes.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Overwrite the customer's delivery receipt with `status`.
    async fn record_delivery_receipt(&self, customer_id: CustomerId, status: &str)
        -> CrmResult<()>;

    async fn append_communication_log(&self, log: CommunicationLog) -> CrmResult<()>;

    /// All logs in append order.
    async fn fetch_communication_logs(&self) -> CrmResult<Vec<CommunicationLog>>;
}

/// Request-scoped copy of every customer and their orders.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub customers: Vec<Customer>,
    pub orders_by_customer: HashMap<CustomerId, Vec<Order>>,
    pub loaded_at: DateTime<Utc>,
}

impl Dataset {
    /// Fetch all customers, then every customer's orders concurrently. Any
    /// failed lookup fails the whole load; no customer is silently dropped.
    pub async fn load(source: &dyn CustomerSource) -> CrmResult<Self> {
        let customers = source.fetch_customers().await?;
        let order_lists =
            try_join_all(customers.iter().map(|c| source.fetch_orders(c.id))).await?;
        let orders_by_customer: HashMap<_, _> = customers
            .iter()
            .map(|c| c.id)
            .zip(order_lists)
            .collect();

        debug!(
            customers = customers.len(),
            orders = orders_by_customer.values().map(Vec::len).sum::<usize>(),
            "Dataset loaded"
        );

        Ok(Self {
            customers,
            orders_by_customer,
            loaded_at: Utc::now(),
        })
    }

    pub fn from_parts(customers: Vec<Customer>, orders: Vec<Order>) -> Self {
        let mut orders_by_customer: HashMap<CustomerId, Vec<Order>> = HashMap::new();
        for order in orders {
            orders_by_customer
                .entry(order.customer_id)
                .or_default()
                .push(order);
        }
        Self {
            customers,
            orders_by_customer,
            loaded_at: Utc::now(),
        }
    }

    pub fn orders_for(&self, customer_id: CustomerId) -> &[Order] {
        self.orders_by_customer
            .get(&customer_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all_orders(&self) -> impl Iterator<Item = &Order> {
        self.customers
            .iter()
            .flat_map(move |c| self.orders_for(c.id).iter())
    }
}
