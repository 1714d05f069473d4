// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use amelia_core::test_support::{event, trace_event};
use amelia_core::EventType;
use tempfile::TempDir;

/// Sink that counts offered events.
#[derive(Default)]
struct CountingSink {
    offered: Mutex<Vec<EventRecord>>,
}

impl EventSink for CountingSink {
    fn offer(&self, event: &EventRecord) {
        self.offered.lock().push(event.clone());
    }
}

/// Subscriber that always fails.
struct FailingSubscriber;

impl EventSubscriber for FailingSubscriber {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn on_event(
        &self,
        _event: &EventRecord,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err("boom".into())
    }
}

fn bus_with_sink(dir: &TempDir, trace_persistence: bool) -> (EventBus, Arc<CountingSink>) {
    let store = EventStore::open(&dir.path().join("events.jsonl")).unwrap();
    let sink = Arc::new(CountingSink::default());
    let bus = EventBus::new(
        Arc::new(Mutex::new(store)),
        Arc::clone(&sink) as Arc<dyn EventSink>,
        trace_persistence,
    );
    (bus, sink)
}

#[test]
fn emit_persists_and_offers_to_sink() {
    let dir = TempDir::new().unwrap();
    let (bus, sink) = bus_with_sink(&dir, true);
    bus.register_workflow(&WorkflowId::new("wf-1"));

    bus.emit(&event("wf-1", 1, EventType::WorkflowCreated)).unwrap();

    assert_eq!(bus.store().lock().recent(&WorkflowId::new("wf-1"), 10).len(), 1);
    assert_eq!(sink.offered.lock().len(), 1);
}

#[test]
fn trace_events_skip_store_when_disabled() {
    let dir = TempDir::new().unwrap();
    let (bus, sink) = bus_with_sink(&dir, false);
    bus.register_workflow(&WorkflowId::new("wf-1"));

    bus.emit(&trace_event("wf-1", 1, "Bash")).unwrap();

    assert!(bus.store().lock().recent(&WorkflowId::new("wf-1"), 10).is_empty());
    // Live view still sees it
    assert_eq!(sink.offered.lock().len(), 1);
}

#[test]
fn trace_events_persist_when_enabled() {
    let dir = TempDir::new().unwrap();
    let (bus, _sink) = bus_with_sink(&dir, true);
    bus.register_workflow(&WorkflowId::new("wf-1"));

    bus.emit(&trace_event("wf-1", 1, "Bash")).unwrap();

    assert_eq!(bus.store().lock().recent(&WorkflowId::new("wf-1"), 10).len(), 1);
}

#[test]
fn failing_subscriber_does_not_break_the_pipeline() {
    let dir = TempDir::new().unwrap();
    let (bus, sink) = bus_with_sink(&dir, true);
    bus.register_workflow(&WorkflowId::new("wf-1"));
    bus.subscribe(Arc::new(FailingSubscriber));

    bus.emit(&event("wf-1", 1, EventType::WorkflowCreated)).unwrap();

    // Event still persisted and offered despite the subscriber error
    assert_eq!(bus.store().lock().recent(&WorkflowId::new("wf-1"), 10).len(), 1);
    assert_eq!(sink.offered.lock().len(), 1);
}

#[test]
fn persistence_failure_propagates() {
    let dir = TempDir::new().unwrap();
    let (bus, sink) = bus_with_sink(&dir, true);
    // Workflow never registered: append must fail

    let err = bus.emit(&event("wf-ghost", 1, EventType::WorkflowCreated));
    assert!(err.is_err());
    // Sink not reached on persistence failure
    assert!(sink.offered.lock().is_empty());
}
