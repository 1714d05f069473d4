// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event model for the workflow history.
//!
//! Every observable step of a workflow is an append-only [`EventRecord`].
//! The [`EventType`] enum is closed and maps to exactly one [`EventLevel`]
//! via a fixed table; the mapping is consulted both at emission (to stamp
//! the record) and at retention (to select trace rows for the shorter
//! sweep window).

use crate::id::{EventId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which agent (or the system itself) produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Architect,
    Developer,
    Reviewer,
    System,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentRole::Architect => "architect",
            AgentRole::Developer => "developer",
            AgentRole::Reviewer => "reviewer",
            AgentRole::System => "system",
        };
        write!(f, "{s}")
    }
}

/// Verbosity class of an event. Trace rows live under a separate,
/// shorter retention window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventLevel::Info => "info",
            EventLevel::Debug => "debug",
            EventLevel::Trace => "trace",
        };
        write!(f, "{s}")
    }
}

/// All event types the orchestrator emits.
///
/// Lifecycle events are info, operational detail is debug, and raw
/// LLM/tool activity is trace. The level assignment is total — see
/// [`EventType::level`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // -- workflow lifecycle --
    WorkflowCreated,
    WorkflowStarted,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCancelled,

    // -- stage lifecycle --
    StageStarted,
    StageCompleted,

    // -- approval lifecycle --
    ApprovalRequired,
    ApprovalGranted,
    ApprovalRejected,
    RevisionRequested,

    // -- operational detail --
    TaskStarted,
    TaskCompleted,
    FileOperation,
    SystemWarning,
    SystemError,

    // -- LLM/tool activity --
    ClaudeThinking,
    ClaudeToolCall,
    ClaudeToolResult,
    AgentOutput,
}

impl EventType {
    /// The fixed level table. Every type maps to exactly one level.
    pub fn level(&self) -> EventLevel {
        match self {
            EventType::WorkflowCreated
            | EventType::WorkflowStarted
            | EventType::WorkflowCompleted
            | EventType::WorkflowFailed
            | EventType::WorkflowCancelled
            | EventType::StageStarted
            | EventType::StageCompleted
            | EventType::ApprovalRequired
            | EventType::ApprovalGranted
            | EventType::ApprovalRejected
            | EventType::RevisionRequested => EventLevel::Info,

            EventType::TaskStarted
            | EventType::TaskCompleted
            | EventType::FileOperation
            | EventType::SystemWarning
            | EventType::SystemError => EventLevel::Debug,

            EventType::ClaudeThinking
            | EventType::ClaudeToolCall
            | EventType::ClaudeToolResult
            | EventType::AgentOutput => EventLevel::Trace,
        }
    }

    pub fn is_trace(&self) -> bool {
        self.level() == EventLevel::Trace
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventType::WorkflowCreated => "workflow_created",
            EventType::WorkflowStarted => "workflow_started",
            EventType::WorkflowCompleted => "workflow_completed",
            EventType::WorkflowFailed => "workflow_failed",
            EventType::WorkflowCancelled => "workflow_cancelled",
            EventType::StageStarted => "stage_started",
            EventType::StageCompleted => "stage_completed",
            EventType::ApprovalRequired => "approval_required",
            EventType::ApprovalGranted => "approval_granted",
            EventType::ApprovalRejected => "approval_rejected",
            EventType::RevisionRequested => "revision_requested",
            EventType::TaskStarted => "task_started",
            EventType::TaskCompleted => "task_completed",
            EventType::FileOperation => "file_operation",
            EventType::SystemWarning => "system_warning",
            EventType::SystemError => "system_error",
            EventType::ClaudeThinking => "claude_thinking",
            EventType::ClaudeToolCall => "claude_tool_call",
            EventType::ClaudeToolResult => "claude_tool_result",
            EventType::AgentOutput => "agent_output",
        }
    }

    /// All variants, in declaration order. Used by the level-table tests.
    pub fn all() -> &'static [EventType] {
        &[
            EventType::WorkflowCreated,
            EventType::WorkflowStarted,
            EventType::WorkflowCompleted,
            EventType::WorkflowFailed,
            EventType::WorkflowCancelled,
            EventType::StageStarted,
            EventType::StageCompleted,
            EventType::ApprovalRequired,
            EventType::ApprovalGranted,
            EventType::ApprovalRejected,
            EventType::RevisionRequested,
            EventType::TaskStarted,
            EventType::TaskCompleted,
            EventType::FileOperation,
            EventType::SystemWarning,
            EventType::SystemError,
            EventType::ClaudeThinking,
            EventType::ClaudeToolCall,
            EventType::ClaudeToolResult,
            EventType::AgentOutput,
        ]
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// One append-only record in a workflow's history.
///
/// `(workflow_id, sequence)` is unique; `sequence` starts at 1 and
/// increments by exactly 1 per workflow. Records are never updated and
/// only removed by retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub workflow_id: WorkflowId,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub agent: AgentRole,
    pub event_type: EventType,
    pub level: EventLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    // Trace-only fields: populated for tool_call/tool_result events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl EventRecord {
    pub fn log_summary(&self) -> String {
        let t = self.event_type.name();
        match self.event_type {
            EventType::ClaudeToolCall | EventType::ClaudeToolResult => format!(
                "{t} wf={} seq={} tool={}",
                self.workflow_id.short(8),
                self.sequence,
                self.tool_name.as_deref().unwrap_or("?"),
            ),
            _ => format!(
                "{t} wf={} seq={} agent={}",
                self.workflow_id.short(8),
                self.sequence,
                self.agent,
            ),
        }
    }
}

/// An event before sequence assignment.
///
/// Callers build drafts; the recorder stamps id, sequence, timestamp and
/// the level derived from the event type.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub workflow_id: WorkflowId,
    pub agent: AgentRole,
    pub event_type: EventType,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub correlation_id: Option<String>,
    pub trace_id: Option<String>,
    pub parent_id: Option<String>,
    pub tool_name: Option<String>,
    pub tool_input: Option<serde_json::Value>,
    pub is_error: bool,
}

impl EventDraft {
    pub fn new(
        workflow_id: WorkflowId,
        agent: AgentRole,
        event_type: EventType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id,
            agent,
            event_type,
            message: message.into(),
            data: None,
            correlation_id: None,
            trace_id: None,
            parent_id: None,
            tool_name: None,
            tool_input: None,
            is_error: false,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_tool(mut self, name: impl Into<String>, input: Option<serde_json::Value>) -> Self {
        self.tool_name = Some(name.into());
        self.tool_input = input;
        self
    }

    pub fn with_correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_error(mut self) -> Self {
        self.is_error = true;
        self
    }

    /// Stamp the draft into a full record. The level comes from the
    /// event-type table, never from the caller.
    pub fn into_record(self, id: EventId, sequence: u64, timestamp: DateTime<Utc>) -> EventRecord {
        let level = self.event_type.level();
        EventRecord {
            id,
            workflow_id: self.workflow_id,
            sequence,
            timestamp,
            agent: self.agent,
            event_type: self.event_type,
            level,
            message: self.message,
            data: self.data,
            correlation_id: self.correlation_id,
            trace_id: self.trace_id,
            parent_id: self.parent_id,
            tool_name: self.tool_name,
            tool_input: self.tool_input,
            is_error: self.is_error,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
