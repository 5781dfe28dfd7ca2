//! Computed properties: derived customer attributes recalculated on every
//! evaluation from the customer's orders.

use chrono::{DateTime, Utc};
use crm_core::types::Order;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerFacts {
    pub total_spend: Decimal,
    /// Whole days between the latest order and `now`; `None` without orders.
    pub days_since_last_order: Option<i64>,
    pub product_names: Vec<String>,
}

impl CustomerFacts {
    pub fn compute(orders: &[Order], now: DateTime<Utc>) -> Self {
        let total_spend = orders.iter().map(|o| o.price).sum();
        let days_since_last_order = orders
            .iter()
            .map(|o| o.order_date)
            .max()
            .map(|at| (now - at).num_days().max(0));
        Self {
            total_spend,
            days_since_last_order,
            product_names: orders.iter().map(|o| o.product_name.clone()).collect(),
        }
    }
}
