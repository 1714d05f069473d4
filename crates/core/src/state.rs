// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution state carried through the workflow state machine.
//!
//! Owned exclusively by the single in-flight task driving the workflow;
//! checkpointed at node boundaries for restart recovery. The cancellation
//! signal is a separate token and is never serialized.

use crate::id::WorkflowId;
use crate::issue::Issue;
use crate::plan::{PlanArtifact, TokenUsage};
use serde::{Deserialize, Serialize};

/// Node of the workflow graph. Checkpoints are keyed by the node at
/// which the snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowNode {
    Architect,
    ApprovalGate,
    Developer,
    Reviewer,
    Done,
}

impl std::fmt::Display for WorkflowNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowNode::Architect => "architect",
            WorkflowNode::ApprovalGate => "approval_gate",
            WorkflowNode::Developer => "developer",
            WorkflowNode::Reviewer => "reviewer",
            WorkflowNode::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// In-memory state threaded through the graph nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub workflow_id: WorkflowId,
    pub issue: Issue,
    pub node: WorkflowNode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanArtifact>,
    /// Conversation history so far; reviewer feedback is appended here
    /// for the next developer iteration.
    #[serde(default)]
    pub conversation: Vec<String>,
    /// Last session identifier handed back by the driver, so the next
    /// node can resume the driver's context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_session: Option<String>,
    #[serde(default)]
    pub pending_approval: bool,
    #[serde(default)]
    pub review_iteration: u32,
    #[serde(default)]
    pub token_usage: TokenUsage,
}

impl ExecutionState {
    pub fn new(workflow_id: WorkflowId, issue: Issue) -> Self {
        Self {
            workflow_id,
            issue,
            node: WorkflowNode::Architect,
            plan: None,
            conversation: Vec::new(),
            driver_session: None,
            pending_approval: false,
            review_iteration: 0,
            token_usage: TokenUsage::default(),
        }
    }

    /// Append a conversation turn (plan context, reviewer feedback).
    pub fn push_turn(&mut self, turn: impl Into<String>) {
        self.conversation.push(turn.into());
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
