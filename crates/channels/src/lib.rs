//! Segment messaging: delivery transports and the dispatcher that sends a
//! message to every member of a segment and records per-customer receipts.

pub mod dispatcher;
pub mod email;
pub mod transport;

pub use dispatcher::{DispatchOutcome, DispatchRequest, MemberDelivery, MessageDispatcher};
pub use email::EmailTransport;
pub use transport::DeliveryTransport;
