//! Rule clauses and evaluation logic for segment criteria.
//!
//! A segment is defined by up to four clauses, one per attribute kind. Each
//! clause is an `(attribute, operator, value)` triple; a clause without a
//! value does not constrain membership. Evaluation is pure: clauses see a
//! customer and the facts computed from that customer's orders.

use chrono::{DateTime, Utc};
use crm_core::types::{Customer, Order};
use crm_core::{CrmError, CrmResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::computed::CustomerFacts;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    #[serde(alias = ">=")]
    GreaterThanOrEqual,
    #[serde(alias = "<=")]
    LessThanOrEqual,
    #[serde(alias = "=")]
    Equals,
    Contains,
}

impl ComparisonOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThanOrEqual => ">=",
            ComparisonOperator::LessThanOrEqual => "<=",
            ComparisonOperator::Equals => "=",
            ComparisonOperator::Contains => "contains",
        }
    }

    fn is_ordering(&self) -> bool {
        !matches!(self, ComparisonOperator::Contains)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClauseKind {
    Spend,
    Visits,
    Recency,
    Product,
}

/// One machine-evaluable matching rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Clause {
    /// Total order value.
    Spend {
        operator: ComparisonOperator,
        #[serde(default)]
        value: Option<Decimal>,
    },
    /// `customer_visits`.
    Visits {
        operator: ComparisonOperator,
        #[serde(default)]
        value: Option<u32>,
    },
    /// Whole days since the most recent order.
    Recency {
        operator: ComparisonOperator,
        #[serde(default)]
        value: Option<i64>,
    },
    /// Case-insensitive substring of any ordered product name.
    Product {
        #[serde(default = "contains")]
        operator: ComparisonOperator,
        #[serde(default)]
        value: Option<String>,
    },
}

fn contains() -> ComparisonOperator {
    ComparisonOperator::Contains
}

impl Clause {
    pub fn kind(&self) -> ClauseKind {
        match self {
            Clause::Spend { .. } => ClauseKind::Spend,
            Clause::Visits { .. } => ClauseKind::Visits,
            Clause::Recency { .. } => ClauseKind::Recency,
            Clause::Product { .. } => ClauseKind::Product,
        }
    }

    pub fn operator(&self) -> ComparisonOperator {
        match self {
            Clause::Spend { operator, .. }
            | Clause::Visits { operator, .. }
            | Clause::Recency { operator, .. }
            | Clause::Product { operator, .. } => *operator,
        }
    }

    /// A clause with nothing to compare against matches every customer.
    pub fn is_vacuous(&self) -> bool {
        match self {
            Clause::Spend { value, .. } => value.is_none(),
            Clause::Visits { value, .. } => value.is_none(),
            Clause::Recency { value, .. } => value.is_none(),
            Clause::Product { value, .. } => value.as_deref().map_or(true, |p| p.trim().is_empty()),
        }
    }

    pub fn validate(&self) -> CrmResult<()> {
        let operator = self.operator();
        match self {
            Clause::Product { .. } => {
                if operator != ComparisonOperator::Contains {
                    return Err(CrmError::InvalidSegment(format!(
                        "product clause supports only 'contains', got '{}'",
                        operator.symbol()
                    )));
                }
            }
            _ => {
                if !operator.is_ordering() {
                    return Err(CrmError::InvalidSegment(format!(
                        "{:?} clause does not support 'contains'",
                        self.kind()
                    )));
                }
            }
        }
        match self {
            Clause::Spend {
                value: Some(v), ..
            } if v.is_sign_negative() => Err(CrmError::InvalidSegment(
                "spend threshold must be non-negative".into(),
            )),
            Clause::Recency {
                value: Some(v), ..
            } if *v < 0 => Err(CrmError::InvalidSegment(
                "recency threshold must be non-negative".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Evaluate against precomputed facts.
    pub fn matches_facts(&self, customer: &Customer, facts: &CustomerFacts) -> bool {
        match self {
            Clause::Spend {
                value: Some(threshold),
                operator,
            } => compare(&facts.total_spend, operator, threshold),
            Clause::Visits {
                value: Some(threshold),
                operator,
            } => compare(&customer.customer_visits, operator, threshold),
            Clause::Recency {
                value: Some(threshold),
                operator,
            } => facts
                .days_since_last_order
                .map_or(false, |days| compare(&days, operator, threshold)),
            Clause::Product {
                value: Some(pattern),
                ..
            } if !pattern.trim().is_empty() => {
                let needle = pattern.trim().to_lowercase();
                facts
                    .product_names
                    .iter()
                    .any(|name| name.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }

    pub fn matches(&self, customer: &Customer, orders: &[Order], now: DateTime<Utc>) -> bool {
        self.matches_facts(customer, &CustomerFacts::compute(orders, now))
    }
}

fn compare<T: PartialOrd>(actual: &T, operator: &ComparisonOperator, expected: &T) -> bool {
    match operator {
        ComparisonOperator::GreaterThanOrEqual => actual >= expected,
        ComparisonOperator::LessThanOrEqual => actual <= expected,
        ComparisonOperator::Equals => actual == expected,
        ComparisonOperator::Contains => false,
    }
}

/// A clause plus an optional human-readable note. The note is display-only
/// and never consulted by evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RuleClause {
    pub rule: Clause,
    #[serde(default)]
    pub logic: Option<String>,
}

impl From<Clause> for RuleClause {
    fn from(rule: Clause) -> Self {
        Self { rule, logic: None }
    }
}

/// The full rule set of a segment: at most one clause per kind, combined
/// with logical AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SegmentRules {
    #[serde(default)]
    pub clauses: Vec<RuleClause>,
}

impl SegmentRules {
    pub fn clause(&self, kind: ClauseKind) -> Option<&RuleClause> {
        self.clauses.iter().find(|c| c.rule.kind() == kind)
    }

    /// Insert or replace the clause of the same kind.
    pub fn set(&mut self, clause: RuleClause) {
        let kind = clause.rule.kind();
        match self.clauses.iter_mut().find(|c| c.rule.kind() == kind) {
            Some(existing) => *existing = clause,
            None => self.clauses.push(clause),
        }
    }

    pub fn is_vacuous(&self) -> bool {
        self.clauses.iter().all(|c| c.rule.is_vacuous())
    }

    pub fn validate(&self) -> CrmResult<()> {
        let mut seen = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            let kind = clause.rule.kind();
            if seen.contains(&kind) {
                return Err(CrmError::InvalidSegment(format!(
                    "duplicate {kind:?} clause"
                )));
            }
            seen.push(kind);
            clause.rule.validate()?;
        }
        Ok(())
    }

    pub fn matches_facts(&self, customer: &Customer, facts: &CustomerFacts) -> bool {
        self.clauses
            .iter()
            .all(|c| c.rule.matches_facts(customer, facts))
    }

    pub fn matches(&self, customer: &Customer, orders: &[Order], now: DateTime<Utc>) -> bool {
        self.matches_facts(customer, &CustomerFacts::compute(orders, now))
    }
}
