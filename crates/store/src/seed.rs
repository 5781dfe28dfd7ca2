//! Demo dataset for local runs.

use crate::memory::MemoryStore;
use chrono::{Duration, Utc};
use crm_core::types::{Customer, Order};
use rust_decimal::Decimal;
use tracing::info;

pub fn seed_demo_data(store: &MemoryStore) {
    let customers = [
        Customer::new(1, "John", "Doe", "john@example.com")
            .with_visits(12)
            .with_phone("+1-555-0101"),
        Customer::new(2, "Jane", "Smith", "jane@example.com")
            .with_visits(4)
            .with_phone("+1-555-0102"),
        Customer::new(3, "Priya", "Natarajan", "priya.n@gmail.com").with_visits(7),
        Customer::new(4, "Tomás", "Ibarra", "tomas@ibarra.mx").with_visits(1),
        Customer::new(5, "Mei", "Chen", "mei.chen@example.com"),
    ];

    let now = Utc::now();
    // (order id, customer, days ago, price in cents, product)
    let orders = [
        ("ORD-1001", 1, 3, 12_999, "Espresso machine"),
        ("ORD-1002", 1, 40, 2_450, "Coffee beans 1kg"),
        ("ORD-1003", 2, 12, 8_900, "Tea sampler"),
        ("ORD-1004", 2, 95, 4_599, "Ceramic mug set"),
        ("ORD-1005", 3, 1, 54_000, "Grinder pro"),
        ("ORD-1006", 3, 20, 2_450, "Coffee beans 1kg"),
        ("ORD-1007", 3, 62, 1_999, "Milk frother"),
        ("ORD-1008", 4, 200, 999, "Paper filters"),
    ];

    let customer_count = customers.len();
    for customer in customers {
        store.insert_customer(customer);
    }
    for (order_id, customer_id, days_ago, cents, product) in orders {
        store.insert_order(Order {
            order_id: order_id.to_string(),
            customer_id,
            order_date: now - Duration::days(days_ago),
            price: Decimal::new(cents, 2),
            product_name: product.to_string(),
        });
    }

    info!(
        customers = customer_count,
        orders = orders.len(),
        "Demo data seeded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::{CustomerSource, Dataset};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_demo_data_loads() {
        let store = MemoryStore::seeded();
        let dataset = Dataset::load(&store).await.unwrap();
        assert_eq!(dataset.customers.len(), 5);
        assert_eq!(dataset.all_orders().count(), 8);
        assert!(dataset.orders_for(5).is_empty());

        let spend: Decimal = dataset.orders_for(1).iter().map(|o| o.price).sum();
        assert_eq!(spend, dec!(154.49));
        assert_eq!(
            store.fetch_customer(1).await.unwrap().unwrap().full_name(),
            "John Doe"
        );
    }
}
