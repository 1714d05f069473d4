// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests.
#![allow(clippy::unwrap_used)]

use crate::bus::{EventBus, NullSink};
use crate::orchestrator::{EngineConfig, Orchestrator, StartWorkflowRequest};
use crate::recorder::EventRecorder;
use amelia_adapters::{FakeDriver, FakeTracker};
use amelia_core::test_support::noop_profile;
use amelia_core::{
    EventRecord, EventType, FakeClock, Profile, SequentialIdGen, WorkflowId, WorkflowStatus,
    WorkflowType,
};
use amelia_storage::{CheckpointStore, EventStore, WorkflowStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub(crate) type TestOrchestrator =
    Orchestrator<FakeDriver, FakeTracker, FakeClock, SequentialIdGen>;

pub(crate) struct Ctx {
    pub orchestrator: TestOrchestrator,
    pub driver: FakeDriver,
    pub tracker: FakeTracker,
    pub clock: FakeClock,
    pub events: Arc<Mutex<EventStore>>,
    pub workflows: Arc<Mutex<WorkflowStore>>,
    pub checkpoints: CheckpointStore,
    pub dir: TempDir,
}

pub(crate) fn setup() -> Ctx {
    setup_with(EngineConfig::default(), true)
}

pub(crate) fn setup_with(config: EngineConfig, trace_persistence: bool) -> Ctx {
    let dir = TempDir::new().unwrap();
    let events = Arc::new(Mutex::new(
        EventStore::open(&dir.path().join("events.jsonl")).unwrap(),
    ));
    let workflows = Arc::new(Mutex::new(
        WorkflowStore::open(&dir.path().join("workflows.jsonl")).unwrap(),
    ));
    let checkpoints = CheckpointStore::new(dir.path().join("checkpoints"));

    let bus = EventBus::new(Arc::clone(&events), Arc::new(NullSink), trace_persistence);
    let clock = FakeClock::new();
    let recorder = EventRecorder::new(bus, clock.clone(), SequentialIdGen::new("evt"));

    let driver = FakeDriver::new();
    let tracker = FakeTracker::new();
    let mut profiles: HashMap<String, Profile> = HashMap::new();
    profiles.insert("default".to_string(), noop_profile("/tmp"));

    let orchestrator = Orchestrator::new(
        driver.clone(),
        tracker.clone(),
        clock.clone(),
        SequentialIdGen::new("wf"),
        recorder,
        Arc::clone(&workflows),
        checkpoints.clone(),
        profiles,
        "default",
        config,
    );

    Ctx {
        orchestrator,
        driver,
        tracker,
        clock,
        events,
        workflows,
        checkpoints,
        dir,
    }
}

/// Create request for an ad-hoc task on the given worktree.
pub(crate) fn start_req(worktree: &Path) -> StartWorkflowRequest {
    StartWorkflowRequest {
        issue_id: "TASK-1".to_string(),
        worktree_path: worktree.to_path_buf(),
        worktree_name: None,
        profile: None,
        driver: None,
        task_title: Some("Add button".to_string()),
        task_description: None,
        workflow_type: WorkflowType::Full,
    }
}

pub(crate) fn plan_json() -> String {
    "{\"goal\": \"add the button\", \"markdown_content\": \"# Plan\\n\\n1. Add it.\\n\", \"key_files\": [\"src/ui.rs\"]}"
        .to_string()
}

pub(crate) fn verdict_json(approved: bool, feedback: Option<&str>) -> String {
    match feedback {
        Some(feedback) => format!(r#"{{"approved": {approved}, "feedback": "{feedback}"}}"#),
        None => format!(r#"{{"approved": {approved}}}"#),
    }
}

/// Script a full happy-path run: plan, develop, approve.
pub(crate) fn script_happy_path(driver: &FakeDriver) {
    driver.push_result(&plan_json());
    driver.push_result("made the changes");
    driver.push_result(&verdict_json(true, None));
}

pub(crate) async fn wait_for_status(ctx: &Ctx, id: &WorkflowId, status: WorkflowStatus) {
    for _ in 0..200 {
        if ctx.orchestrator.workflow(id).map(|w| w.status) == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "workflow {id} never reached {status}; currently {:?}",
        ctx.orchestrator.workflow(id).map(|w| w.status)
    );
}

pub(crate) async fn wait_for_event(ctx: &Ctx, id: &WorkflowId, event_type: EventType) {
    for _ in 0..200 {
        if events_of(ctx, id).iter().any(|e| e.event_type == event_type) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("workflow {id} never emitted {event_type}");
}

pub(crate) fn events_of(ctx: &Ctx, id: &WorkflowId) -> Vec<EventRecord> {
    ctx.events.lock().recent(id, 1000)
}

/// Assert the stored stream is 1..=n with no gaps.
pub(crate) fn assert_contiguous(events: &[EventRecord]) {
    for (i, event) in events.iter().enumerate() {
        assert_eq!(
            event.sequence,
            (i + 1) as u64,
            "sequence gap at index {i}: {:?}",
            events.iter().map(|e| e.sequence).collect::<Vec<_>>()
        );
    }
}
