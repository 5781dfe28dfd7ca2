//! Rule-based customer segmentation: the clause model, computed customer
//! facts, a segment builder and the membership engine.

pub mod builder;
pub mod computed;
pub mod engine;
pub mod predicates;

pub use builder::SegmentBuilder;
pub use computed::CustomerFacts;
pub use engine::{
    resolve_membership, FixedPredicate, MembershipPredicate, NewSegment, Segment,
    SegmentStore, SegmentationEngine,
};
pub use predicates::{Clause, ClauseKind, ComparisonOperator, RuleClause, SegmentRules};
