// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::bus::{EventSink, NullSink};
use amelia_core::{AgentRole, EventType, FakeClock, SequentialIdGen};
use amelia_storage::EventStore;
use tempfile::TempDir;

fn recorder(dir: &TempDir, trace_persistence: bool) -> EventRecorder<FakeClock, SequentialIdGen> {
    let store = EventStore::open(&dir.path().join("events.jsonl")).unwrap();
    let bus = EventBus::new(
        Arc::new(Mutex::new(store)),
        Arc::new(NullSink),
        trace_persistence,
    );
    EventRecorder::new(bus, FakeClock::new(), SequentialIdGen::new("evt"))
}

fn draft(workflow: &str, event_type: EventType) -> EventDraft {
    EventDraft::new(
        WorkflowId::new(workflow),
        AgentRole::System,
        event_type,
        event_type.name(),
    )
}

#[tokio::test]
async fn sequences_start_at_one_and_increment() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir, true);
    recorder.bus().register_workflow(&WorkflowId::new("wf-1"));

    for expected in 1..=5u64 {
        let record = recorder
            .record(draft("wf-1", EventType::StageStarted))
            .await
            .unwrap();
        assert_eq!(record.sequence, expected);
    }
}

#[tokio::test]
async fn concurrent_records_produce_contiguous_sequences() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir, true);
    recorder.bus().register_workflow(&WorkflowId::new("wf-1"));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let r = recorder.clone();
        handles.push(tokio::spawn(async move {
            r.record(draft("wf-1", EventType::TaskStarted)).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let events = recorder
        .bus()
        .store()
        .lock()
        .recent(&WorkflowId::new("wf-1"), 100);
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (1..=20).collect::<Vec<u64>>());
}

#[tokio::test]
async fn unpersisted_trace_events_carry_sequence_zero() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir, false);
    recorder.bus().register_workflow(&WorkflowId::new("wf-1"));

    recorder
        .record(draft("wf-1", EventType::WorkflowCreated))
        .await
        .unwrap();
    let trace = recorder
        .record(draft("wf-1", EventType::ClaudeThinking))
        .await
        .unwrap();
    let next = recorder
        .record(draft("wf-1", EventType::StageStarted))
        .await
        .unwrap();

    // Trace is live-only; persisted stream stays contiguous
    assert_eq!(trace.sequence, 0);
    assert_eq!(next.sequence, 2);
    let stored = recorder
        .bus()
        .store()
        .lock()
        .recent(&WorkflowId::new("wf-1"), 10);
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn unknown_workflow_record_fails() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir, true);

    let err = recorder
        .record(draft("wf-ghost", EventType::WorkflowCreated))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Persistence(_)));
}

/// Sink recording the order in which events arrive.
struct OrderSink {
    seen: Mutex<Vec<u64>>,
}

impl EventSink for OrderSink {
    fn offer(&self, event: &EventRecord) {
        self.seen.lock().push(event.sequence);
    }
}

#[tokio::test]
async fn sink_sees_events_in_sequence_order() {
    let dir = TempDir::new().unwrap();
    let store = EventStore::open(&dir.path().join("events.jsonl")).unwrap();
    let sink = Arc::new(OrderSink {
        seen: Mutex::new(Vec::new()),
    });
    let bus = EventBus::new(Arc::new(Mutex::new(store)), Arc::clone(&sink) as _, true);
    let recorder = EventRecorder::new(bus, FakeClock::new(), SequentialIdGen::new("evt"));
    recorder.bus().register_workflow(&WorkflowId::new("wf-1"));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let r = recorder.clone();
        handles.push(tokio::spawn(async move {
            r.record(draft("wf-1", EventType::TaskStarted)).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let seen = sink.seen.lock().clone();
    assert_eq!(seen, (1..=10).collect::<Vec<u64>>());
}
