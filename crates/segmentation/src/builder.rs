//! Fluent builder for segment rules.

use crate::engine::NewSegment;
use crate::predicates::{Clause, ClauseKind, ComparisonOperator, RuleClause, SegmentRules};
use crm_core::CrmResult;
use rust_decimal::Decimal;

pub struct SegmentBuilder {
    name: String,
    rules: SegmentRules,
    last_kind: Option<ClauseKind>,
}

impl SegmentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: SegmentRules::default(),
            last_kind: None,
        }
    }

    fn clause(mut self, rule: Clause) -> Self {
        self.last_kind = Some(rule.kind());
        self.rules.set(RuleClause::from(rule));
        self
    }

    pub fn spend(self, operator: ComparisonOperator, value: Decimal) -> Self {
        self.clause(Clause::Spend {
            operator,
            value: Some(value),
        })
    }

    pub fn visits(self, operator: ComparisonOperator, value: u32) -> Self {
        self.clause(Clause::Visits {
            operator,
            value: Some(value),
        })
    }

    /// Days since the most recent order.
    pub fn recency(self, operator: ComparisonOperator, days: i64) -> Self {
        self.clause(Clause::Recency {
            operator,
            value: Some(days),
        })
    }

    pub fn product_contains(self, pattern: impl Into<String>) -> Self {
        self.clause(Clause::Product {
            operator: ComparisonOperator::Contains,
            value: Some(pattern.into()),
        })
    }

    /// Annotate the most recently added clause.
    pub fn logic(mut self, note: impl Into<String>) -> Self {
        if let Some(kind) = self.last_kind {
            if let Some(clause) = self.rules.clauses.iter_mut().find(|c| c.rule.kind() == kind) {
                clause.logic = Some(note.into());
            }
        }
        self
    }

    pub fn build(self) -> CrmResult<NewSegment> {
        let segment = NewSegment {
            name: self.name.trim().to_string(),
            rules: self.rules,
        };
        segment.validate()?;
        Ok(segment)
    }
}
