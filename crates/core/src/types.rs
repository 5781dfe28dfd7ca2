use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub type CustomerId = u64;
pub type SegmentId = u64;

/// A customer record as held by the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Customer {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub customer_visits: u32,
    /// Last delivery status sent to this customer. `None` means no message
    /// was ever sent.
    #[serde(default)]
    pub delivery_receipt: Option<String>,
}

impl Customer {
    pub fn new(
        id: CustomerId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            phone: String::new(),
            customer_visits: 0,
            delivery_receipt: None,
        }
    }

    pub fn with_visits(mut self, visits: u32) -> Self {
        self.customer_visits = visits;
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = phone.into();
        self
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Key used on dashboards; unique per customer even when names collide.
    pub fn display_key(&self) -> String {
        format!("{} #{}", self.full_name(), self.id)
    }

    /// Case-insensitive match of `query` against the full name or email.
    /// A blank query matches everyone.
    pub fn matches_search(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        query.is_empty()
            || self.full_name().to_lowercase().contains(&query)
            || self.email.to_lowercase().contains(&query)
    }
}

/// A purchase made by a customer. Read-only from the console's perspective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub order_id: String,
    pub customer_id: CustomerId,
    pub order_date: DateTime<Utc>,
    pub price: Decimal,
    pub product_name: String,
}

/// Append-only record of one message dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommunicationLog {
    pub id: Uuid,
    /// `None` when the target was a built-in segment.
    pub segment_id: Option<SegmentId>,
    pub segment_name: String,
    pub message: String,
    pub recipients: u64,
    pub delivered: u64,
    pub failed: u64,
    pub sent_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_matches_name_or_email() {
        let customer = Customer::new(4, "Tomás", "Ibarra", "tomas@ibarra.mx");
        assert!(customer.matches_search("tomás ib"));
        assert!(customer.matches_search("IBARRA.MX"));
        assert!(customer.matches_search("  "));
        assert!(!customer.matches_search("gmail"));
    }
}
