//! Segmentation engine: resolves segment membership against live data.
//!
//! Built-in segments (`all`, `email`, `orders`) and stored rule segments are
//! both expressed as a [`MembershipPredicate`] and evaluated through
//! [`resolve_membership`], so callers never branch on the segment kind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_core::config::SegmentationConfig;
use crm_core::event_bus::{make_event, noop_sink, EventSink, EventType};
use crm_core::types::{Customer, CustomerId, Order, SegmentId};
use crm_core::{CrmError, CrmResult, CustomerSource, Dataset};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::computed::CustomerFacts;
use crate::predicates::SegmentRules;

pub const BUILTIN_ALL: &str = "all";
pub const BUILTIN_EMAIL: &str = "email";
pub const BUILTIN_ORDERS: &str = "orders";
pub const BUILTIN_SEGMENTS: [&str; 3] = [BUILTIN_ALL, BUILTIN_EMAIL, BUILTIN_ORDERS];

/// A stored, rule-defined segment.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Segment {
    pub id: SegmentId,
    pub name: String,
    pub rules: SegmentRules,
    /// Membership as of `refreshed_at`. Never trusted for dispatch.
    pub customer_ids: Vec<CustomerId>,
    pub created_at: DateTime<Utc>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// A segment definition that has not been persisted yet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewSegment {
    pub name: String,
    #[serde(default)]
    pub rules: SegmentRules,
}

impl NewSegment {
    pub fn validate(&self) -> CrmResult<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(CrmError::InvalidSegment("segment name must not be empty".into()));
        }
        if BUILTIN_SEGMENTS.contains(&name) {
            return Err(CrmError::InvalidSegment(format!(
                "'{name}' is reserved for a built-in segment"
            )));
        }
        if name.parse::<SegmentId>().is_ok() {
            return Err(CrmError::InvalidSegment(
                "segment name must not be purely numeric".into(),
            ));
        }
        self.rules.validate()
    }
}

/// Persistence for rule segments.
#[async_trait]
pub trait SegmentStore: Send + Sync {
    async fn fetch_segments(&self) -> CrmResult<Vec<Segment>>;

    /// Look up by name, or by numeric id when `identifier` parses as one.
    async fn find_segment(&self, identifier: &str) -> CrmResult<Option<Segment>>;

    /// Persist a new segment. Names are unique; a duplicate is `InvalidSegment`.
    async fn save_segment(&self, segment: NewSegment) -> CrmResult<Segment>;

    async fn update_segment_members(
        &self,
        id: SegmentId,
        customer_ids: Vec<CustomerId>,
        refreshed_at: DateTime<Utc>,
    ) -> CrmResult<()>;
}

/// Segments computed by fixed predicates rather than stored rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixedPredicate {
    All,
    /// Email ends with the configured domain (case-insensitive).
    Email { domain: String },
    /// Customer has a recorded delivery receipt.
    Orders,
}

#[derive(Debug, Clone)]
pub enum MembershipPredicate {
    Fixed(FixedPredicate),
    Rules(Segment),
}

impl MembershipPredicate {
    pub fn name(&self) -> &str {
        match self {
            MembershipPredicate::Fixed(FixedPredicate::All) => BUILTIN_ALL,
            MembershipPredicate::Fixed(FixedPredicate::Email { .. }) => BUILTIN_EMAIL,
            MembershipPredicate::Fixed(FixedPredicate::Orders) => BUILTIN_ORDERS,
            MembershipPredicate::Rules(segment) => &segment.name,
        }
    }

    pub fn segment_id(&self) -> Option<SegmentId> {
        match self {
            MembershipPredicate::Fixed(_) => None,
            MembershipPredicate::Rules(segment) => Some(segment.id),
        }
    }

    fn kind_label(&self) -> &'static str {
        match self {
            MembershipPredicate::Fixed(_) => "builtin",
            MembershipPredicate::Rules(_) => "rules",
        }
    }

    pub fn matches(&self, customer: &Customer, orders: &[Order], now: DateTime<Utc>) -> bool {
        match self {
            MembershipPredicate::Fixed(FixedPredicate::All) => true,
            MembershipPredicate::Fixed(FixedPredicate::Email { domain }) => customer
                .email
                .to_lowercase()
                .ends_with(&domain.to_lowercase()),
            MembershipPredicate::Fixed(FixedPredicate::Orders) => {
                customer.delivery_receipt.is_some()
            }
            MembershipPredicate::Rules(segment) => {
                segment.rules.is_vacuous()
                    || segment
                        .rules
                        .matches_facts(customer, &CustomerFacts::compute(orders, now))
            }
        }
    }
}

/// Customers satisfying `predicate`, in input order. Pure.
pub fn resolve_membership(
    predicate: &MembershipPredicate,
    customers: &[Customer],
    orders_by_customer: &HashMap<CustomerId, Vec<Order>>,
    now: DateTime<Utc>,
) -> Vec<Customer> {
    customers
        .iter()
        .filter(|c| {
            let orders = orders_by_customer
                .get(&c.id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            predicate.matches(c, orders, now)
        })
        .cloned()
        .collect()
}

/// Lower-cased `@domain` suffix, so `example.com` cannot match
/// `x@notexample.com`.
pub fn email_domain_suffix(domain: &str) -> String {
    let domain = domain.trim().to_lowercase();
    if domain.starts_with('@') {
        domain
    } else {
        format!("@{domain}")
    }
}

pub struct SegmentationEngine {
    customers: Arc<dyn CustomerSource>,
    segments: Arc<dyn SegmentStore>,
    allowed_email_domain: String,
    event_sink: Arc<dyn EventSink>,
}

impl SegmentationEngine {
    pub fn new(
        customers: Arc<dyn CustomerSource>,
        segments: Arc<dyn SegmentStore>,
        config: &SegmentationConfig,
    ) -> Self {
        Self {
            customers,
            segments,
            allowed_email_domain: email_domain_suffix(&config.allowed_email_domain),
            event_sink: noop_sink(),
        }
    }

    /// Attach an event sink for segment lifecycle events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn customer_source(&self) -> &Arc<dyn CustomerSource> {
        &self.customers
    }

    pub async fn load_dataset(&self) -> CrmResult<Dataset> {
        Dataset::load(self.customers.as_ref()).await
    }

    /// Map a segment identifier (built-in name, stored name, or stored id)
    /// to its predicate.
    pub async fn predicate_for(&self, identifier: &str) -> CrmResult<MembershipPredicate> {
        let identifier = identifier.trim();
        match identifier {
            BUILTIN_ALL => return Ok(MembershipPredicate::Fixed(FixedPredicate::All)),
            BUILTIN_EMAIL => {
                return Ok(MembershipPredicate::Fixed(FixedPredicate::Email {
                    domain: self.allowed_email_domain.clone(),
                }))
            }
            BUILTIN_ORDERS => return Ok(MembershipPredicate::Fixed(FixedPredicate::Orders)),
            _ => {}
        }

        self.segments
            .find_segment(identifier)
            .await?
            .map(MembershipPredicate::Rules)
            .ok_or_else(|| CrmError::UnknownSegment(identifier.to_string()))
    }

    /// Resolve membership against freshly loaded data.
    pub async fn resolve(&self, predicate: &MembershipPredicate) -> CrmResult<Vec<Customer>> {
        let dataset = self.load_dataset().await?;
        let members = self.resolve_in(predicate, &dataset).await;
        Ok(members)
    }

    /// Current members of the segment named by `identifier`.
    pub async fn members(&self, identifier: &str) -> CrmResult<Vec<Customer>> {
        let predicate = self.predicate_for(identifier).await?;
        self.resolve(&predicate).await
    }

    /// Persist a rule segment and materialise its membership.
    pub async fn create_segment(&self, new_segment: NewSegment) -> CrmResult<Segment> {
        new_segment.validate()?;
        let dataset = self.load_dataset().await?;
        let mut segment = self.segments.save_segment(new_segment).await?;

        let predicate = MembershipPredicate::Rules(segment.clone());
        let members = self.resolve_in(&predicate, &dataset).await;
        segment.customer_ids = members.iter().map(|c| c.id).collect();
        segment.refreshed_at = Some(dataset.loaded_at);

        info!(
            segment_id = segment.id,
            segment = %segment.name,
            members = segment.customer_ids.len(),
            "Segment created"
        );
        self.event_sink.emit(make_event(
            EventType::SegmentSaved,
            &segment.name,
            None,
            Some(format!("{} members", segment.customer_ids.len())),
        ));

        Ok(segment)
    }

    /// All stored segments with membership recomputed against current data.
    pub async fn list_segments(&self) -> CrmResult<Vec<Segment>> {
        let dataset = self.load_dataset().await?;
        let stored = self.segments.fetch_segments().await?;

        let mut refreshed = Vec::with_capacity(stored.len());
        for mut segment in stored {
            let predicate = MembershipPredicate::Rules(segment.clone());
            let members = self.resolve_in(&predicate, &dataset).await;
            segment.customer_ids = members.iter().map(|c| c.id).collect();
            segment.refreshed_at = Some(dataset.loaded_at);
            refreshed.push(segment);
        }
        Ok(refreshed)
    }

    /// Evaluate and, for stored segments, write the fresh id list back.
    async fn resolve_in(&self, predicate: &MembershipPredicate, dataset: &Dataset) -> Vec<Customer> {
        let members = resolve_membership(
            predicate,
            &dataset.customers,
            &dataset.orders_by_customer,
            dataset.loaded_at,
        );

        metrics::counter!("segmentation.resolutions", "kind" => predicate.kind_label())
            .increment(1);
        debug!(
            segment = %predicate.name(),
            candidates = dataset.customers.len(),
            members = members.len(),
            "Membership resolved"
        );

        if let Some(id) = predicate.segment_id() {
            let ids = members.iter().map(|c| c.id).collect();
            if let Err(e) = self
                .segments
                .update_segment_members(id, ids, dataset.loaded_at)
                .await
            {
                warn!(segment_id = id, error = %e, "Failed to refresh cached segment membership");
            }
        }

        members
    }
}
