// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders shared across crates.
#![allow(clippy::unwrap_used)]

use crate::event::{AgentRole, EventDraft, EventRecord, EventType};
use crate::id::{EventId, ProfileId, WorkflowId};
use crate::issue::Issue;
use crate::profile::{DriverSettings, Profile};
use crate::workflow::{Workflow, WorkflowType};
use chrono::Utc;
use std::path::PathBuf;

/// A workflow row in `Pending` with sensible defaults.
pub fn workflow(id: &str, worktree: &str) -> Workflow {
    Workflow::new(
        WorkflowId::new(id),
        format!("ISSUE-{id}"),
        PathBuf::from(worktree),
        worktree.trim_start_matches('/').to_string(),
        ProfileId::new("default"),
        WorkflowType::Full,
        Utc::now(),
    )
}

/// An info-level event record with the given sequence.
pub fn event(workflow_id: &str, sequence: u64, event_type: EventType) -> EventRecord {
    EventDraft::new(
        WorkflowId::new(workflow_id),
        AgentRole::System,
        event_type,
        event_type.name(),
    )
    .into_record(
        EventId::new(format!("evt-{workflow_id}-{sequence}")),
        sequence,
        Utc::now(),
    )
}

/// A trace-level tool-call event record.
pub fn trace_event(workflow_id: &str, sequence: u64, tool: &str) -> EventRecord {
    EventDraft::new(
        WorkflowId::new(workflow_id),
        AgentRole::Developer,
        EventType::ClaudeToolCall,
        tool,
    )
    .with_tool(tool, Some(serde_json::json!({})))
    .into_record(
        EventId::new(format!("evt-{workflow_id}-{sequence}")),
        sequence,
        Utc::now(),
    )
}

pub fn issue(id: &str) -> Issue {
    Issue::new(id, format!("Issue {id}"), "test issue")
}

/// A noop-tracker profile rooted at the given working dir.
pub fn noop_profile(working_dir: &str) -> Profile {
    Profile {
        driver: DriverSettings {
            command: "true".to_string(),
            model: None,
            options: None,
        },
        tracker: "noop".to_string(),
        working_dir: PathBuf::from(working_dir),
        plan_output_dir: PathBuf::from("docs/plans"),
        architect: None,
        developer: None,
        reviewer: None,
    }
}
