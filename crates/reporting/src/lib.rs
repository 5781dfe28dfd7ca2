//! Dashboard reporting. Customer, order and revenue aggregates computed
//! from the live customer dataset.

pub mod dashboard;

pub use dashboard::{format_currency, AggregationEngine, DashboardOverview};
