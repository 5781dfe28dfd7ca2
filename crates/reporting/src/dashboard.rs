//! Console dashboard: customer, order and revenue aggregation.
//!
//! The aggregate functions are pure over a [`Dataset`] and tolerate an empty
//! one. Money stays in `Decimal` until [`format_currency`] renders it.

use chrono::{DateTime, Utc};
use crm_core::types::CommunicationLog;
use crm_core::{CrmResult, CustomerSource, Dataset, ReceiptStore};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

/// Number of communication logs shown as recent activity.
const RECENT_ACTIVITY_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardOverview {
    pub total_customers: u64,
    pub total_orders: u64,
    pub total_revenue: Decimal,
    pub total_revenue_display: String,
    /// Display key → order count, for customers with at least one order.
    pub customer_order_histogram: BTreeMap<String, u64>,
    pub messages_sent: u64,
    /// Newest first.
    pub recent_activity: Vec<CommunicationLog>,
    pub generated_at: DateTime<Utc>,
}

pub fn customer_count(dataset: &Dataset) -> u64 {
    dataset.customers.len() as u64
}

pub fn order_count(dataset: &Dataset) -> u64 {
    dataset.all_orders().count() as u64
}

/// Exact sum of every order price.
pub fn total_revenue(dataset: &Dataset) -> Decimal {
    dataset.all_orders().map(|o| o.price).sum()
}

pub fn customer_order_histogram(dataset: &Dataset) -> BTreeMap<String, u64> {
    dataset
        .customers
        .iter()
        .filter_map(|c| {
            let count = dataset.orders_for(c.id).len() as u64;
            (count > 0).then(|| (c.display_key(), count))
        })
        .collect()
}

/// Compact currency display: `$2.4M`, `$12.5K`, `$200.00`.
pub fn format_currency(amount: Decimal) -> String {
    let sign = if amount.is_sign_negative() { "-" } else { "" };
    let abs = amount.abs();
    let million = Decimal::from(1_000_000);
    let thousand = Decimal::from(1_000);

    let (scaled, suffix, places) = if abs >= million {
        (abs / million, "M", 1)
    } else if abs >= thousand {
        (abs / thousand, "K", 1)
    } else {
        (abs, "", 2)
    };
    let rounded = scaled.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    format!("{sign}${rounded:.prec$}{suffix}", prec = places as usize)
}

/// Builds dashboard snapshots from the backing store.
pub struct AggregationEngine {
    customers: Arc<dyn CustomerSource>,
    receipts: Arc<dyn ReceiptStore>,
}

impl AggregationEngine {
    pub fn new(customers: Arc<dyn CustomerSource>, receipts: Arc<dyn ReceiptStore>) -> Self {
        Self {
            customers,
            receipts,
        }
    }

    pub async fn overview(&self) -> CrmResult<DashboardOverview> {
        let dataset = Dataset::load(self.customers.as_ref()).await?;
        let logs = self.receipts.fetch_communication_logs().await?;
        Ok(Self::summarize(&dataset, logs))
    }

    pub fn summarize(dataset: &Dataset, logs: Vec<CommunicationLog>) -> DashboardOverview {
        let revenue = total_revenue(dataset);
        let messages_sent = logs.len() as u64;
        let recent_activity: Vec<_> = logs.into_iter().rev().take(RECENT_ACTIVITY_LIMIT).collect();

        let overview = DashboardOverview {
            total_customers: customer_count(dataset),
            total_orders: order_count(dataset),
            total_revenue: revenue,
            total_revenue_display: format_currency(revenue),
            customer_order_histogram: customer_order_histogram(dataset),
            messages_sent,
            recent_activity,
            generated_at: Utc::now(),
        };

        debug!(
            customers = overview.total_customers,
            orders = overview.total_orders,
            revenue = %overview.total_revenue,
            "Dashboard overview computed"
        );
        overview
    }
}
