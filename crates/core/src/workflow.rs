// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow identity record and status state machine.

use crate::id::{ProfileId, WorkflowId};
use crate::issue::Issue;
use crate::plan::PlanArtifact;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Status of a workflow run.
///
/// `Planning`, `InProgress` and `Blocked` are the active statuses; a
/// worktree admits at most one workflow in an active status at a time.
/// `InProgress` is the only status that locks the worktree for mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Planning,
    InProgress,
    Blocked,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Planning | WorkflowStatus::InProgress | WorkflowStatus::Blocked
        )
    }

    /// The transition table. Edges present are permitted; everything
    /// else is rejected with [`InvalidTransition`].
    pub fn can_transition(&self, to: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self, to),
            (Pending, Planning)
                | (Pending, InProgress)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Planning, Blocked)
                | (Planning, Failed)
                | (Planning, Cancelled)
                | (Blocked, InProgress)
                | (Blocked, Failed)
                | (Blocked, Cancelled)
                | (InProgress, Blocked)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Cancelled)
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Planning => "planning",
            WorkflowStatus::InProgress => "in_progress",
            WorkflowStatus::Blocked => "blocked",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkflowStatus::Pending),
            "planning" => Ok(WorkflowStatus::Planning),
            "in_progress" => Ok(WorkflowStatus::InProgress),
            "blocked" => Ok(WorkflowStatus::Blocked),
            "completed" => Ok(WorkflowStatus::Completed),
            "failed" => Ok(WorkflowStatus::Failed),
            "cancelled" => Ok(WorkflowStatus::Cancelled),
            other => Err(format!("unknown workflow status: {other}")),
        }
    }
}

/// Rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid workflow transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: WorkflowStatus,
    pub to: WorkflowStatus,
}

/// Shape of the run: the full architect/developer/reviewer pipeline, or
/// a review-only pass over existing changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    #[default]
    Full,
    Review,
}

/// A workflow identity record.
///
/// The mutable metadata for one run of the pipeline on one worktree.
/// The event stream is the authoritative history; this record carries
/// the current status and caches for quick display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub issue_id: String,
    /// Absolute path of the git worktree this run targets.
    pub worktree_path: PathBuf,
    pub worktree_name: String,
    pub profile_id: ProfileId,
    #[serde(default)]
    pub workflow_type: WorkflowType,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_cache: Option<PlanArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_cache: Option<Issue>,
}

impl Workflow {
    pub fn new(
        id: WorkflowId,
        issue_id: impl Into<String>,
        worktree_path: PathBuf,
        worktree_name: impl Into<String>,
        profile_id: ProfileId,
        workflow_type: WorkflowType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            issue_id: issue_id.into(),
            worktree_path,
            worktree_name: worktree_name.into(),
            profile_id,
            workflow_type,
            status: WorkflowStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
            failure_reason: None,
            plan_cache: None,
            issue_cache: None,
        }
    }

    /// Apply a status transition, maintaining the timestamp invariants:
    /// `started_at` is set on the first active status, `completed_at` on
    /// the terminal one, and `updated_at` never moves backwards.
    pub fn transition(
        &mut self,
        to: WorkflowStatus,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        if !self.status.can_transition(to) {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = self.updated_at.max(now);
        if to.is_active() && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if to.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
