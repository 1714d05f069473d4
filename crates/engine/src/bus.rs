// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus: synchronous fan-out with one asynchronous tail.
//!
//! `emit` persists the event to the store (unless it is a trace event
//! and trace persistence is disabled), notifies auxiliary subscribers,
//! and always offers the event to the live sink. A misbehaving
//! subscriber is logged and never breaks the pipeline; persistence
//! failures propagate to the caller, which fails the workflow.

use amelia_core::{EventLevel, EventRecord, WorkflowId};
use amelia_storage::{EventStore, EventStoreError};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

/// Live-view tail of the bus (the WebSocket connection manager in the
/// server). Offers must not block; backpressure is the sink's problem.
pub trait EventSink: Send + Sync {
    fn offer(&self, event: &EventRecord);
}

/// Sink that discards everything (headless runs, tests).
#[derive(Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn offer(&self, _event: &EventRecord) {}
}

/// Auxiliary event consumer. Errors are swallowed and logged.
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &'static str;
    fn on_event(
        &self,
        event: &EventRecord,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// In-process pub/sub routing events to the store, auxiliary
/// subscribers, and the live sink.
#[derive(Clone)]
pub struct EventBus {
    store: Arc<Mutex<EventStore>>,
    subscribers: Arc<Mutex<Vec<Arc<dyn EventSubscriber>>>>,
    sink: Arc<dyn EventSink>,
    trace_persistence: bool,
}

impl EventBus {
    pub fn new(store: Arc<Mutex<EventStore>>, sink: Arc<dyn EventSink>, trace_persistence: bool) -> Self {
        Self {
            store,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            sink,
            trace_persistence,
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.lock().push(subscriber);
    }

    pub fn store(&self) -> Arc<Mutex<EventStore>> {
        Arc::clone(&self.store)
    }

    pub fn trace_persistence(&self) -> bool {
        self.trace_persistence
    }

    pub fn next_sequence(&self, workflow_id: &WorkflowId) -> u64 {
        self.store.lock().next_sequence(workflow_id)
    }

    pub fn register_workflow(&self, workflow_id: &WorkflowId) {
        self.store.lock().register_workflow(workflow_id);
    }

    /// Route one event. Persists unless it is an unpersisted trace;
    /// always reaches the live sink.
    pub fn emit(&self, event: &EventRecord) -> Result<(), EventStoreError> {
        let persist = !(event.level == EventLevel::Trace && !self.trace_persistence);
        if persist {
            self.store.lock().append(event)?;
        }
        self.notify(event);
        Ok(())
    }

    /// Fan out without persistence (live-only trace events).
    pub fn broadcast_only(&self, event: &EventRecord) {
        self.notify(event);
    }

    fn notify(&self, event: &EventRecord) {
        let subscribers: Vec<Arc<dyn EventSubscriber>> = self.subscribers.lock().clone();
        for subscriber in subscribers {
            if let Err(e) = subscriber.on_event(event) {
                warn!(
                    subscriber = subscriber.name(),
                    error = %e,
                    "event subscriber failed; continuing",
                );
            }
        }
        self.sink.offer(event);
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
