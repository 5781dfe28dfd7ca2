//! Console event bus. Engines emit segment and dispatch events through it.
//!
//! Engines accept an `Arc<dyn EventSink>` so the binary can route events to
//! logs or a downstream pipeline while tests capture them in memory.

use crate::types::CustomerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MessageSent,
    MessageFailed,
    DispatchCompleted,
    SegmentSaved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub segment_name: String,
    pub customer_id: Option<CustomerId>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Trait for emitting console events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: CrmEvent);
}

/// No-op sink for modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: CrmEvent) {}
}

/// Sink that writes every event to the tracing pipeline.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: CrmEvent) {
        info!(
            event_id = %event.event_id,
            event_type = ?event.event_type,
            segment = %event.segment_name,
            customer_id = ?event.customer_id,
            detail = ?event.detail,
            "console event"
        );
    }
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<CrmEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<CrmEvent> {
        self.events.lock().expect("event bus mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event bus mutex poisoned").len()
    }

    pub fn count_type(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .expect("event bus mutex poisoned")
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: CrmEvent) {
        self.events.lock().expect("event bus mutex poisoned").push(event);
    }
}

/// Convenience builder for creating a `CrmEvent` with minimal boilerplate.
pub fn make_event(
    event_type: EventType,
    segment_name: impl Into<String>,
    customer_id: Option<CustomerId>,
    detail: Option<String>,
) -> CrmEvent {
    CrmEvent {
        event_id: Uuid::new_v4(),
        event_type,
        segment_name: segment_name.into(),
        customer_id,
        detail,
        timestamp: Utc::now(),
    }
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        assert_eq!(sink.count(), 0);

        sink.emit(make_event(EventType::MessageSent, "vip", Some(1), None));
        sink.emit(make_event(
            EventType::MessageFailed,
            "vip",
            Some(2),
            Some("timed out".into()),
        ));

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.count_type(EventType::MessageSent), 1);
        assert_eq!(sink.count_type(EventType::MessageFailed), 1);

        let events = sink.events();
        assert_eq!(events[0].customer_id, Some(1));
        assert_eq!(events[1].detail.as_deref(), Some("timed out"));
    }

    #[test]
    fn test_noop_sink() {
        let sink = noop_sink();
        sink.emit(make_event(EventType::DispatchCompleted, "all", None, None));
    }
}
