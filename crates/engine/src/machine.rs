// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The workflow state machine.
//!
//! Graph: architect → approval gate → developer → reviewer, with a loop
//! edge back to developer while the reviewer requests revisions. The
//! gate suspends on a channel receive raced against cancellation; no
//! thread or task blocks on I/O while waiting for a human. Execution
//! state is checkpointed after every node completion and before every
//! suspension, and the cancellation token is polled at each boundary.

use crate::agent::{
    architect_prompt, developer_prompt, parse_plan_output, parse_review_verdict, review_only_prompt,
    reviewer_prompt, run_driver, ARCHITECT_SYSTEM_PROMPT, DEVELOPER_SYSTEM_PROMPT,
    REVIEWER_SYSTEM_PROMPT,
};
use crate::error::OrchestratorError;
use crate::orchestrator::Services;
use amelia_adapters::{Driver, DriverRequest};
use amelia_core::{
    AgentRole, Clock, EventDraft, EventType, ExecutionState, IdGen, PlanArtifact, ReviewVerdict,
    Workflow, WorkflowId, WorkflowNode, WorkflowStatus, WorkflowType,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Human decision routed to a workflow suspended at the approval gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Reject { feedback: String },
}

/// How a run ended.
enum Exit {
    Completed,
    Failed(String),
    Cancelled,
    /// Rejection is settled on the approve/reject path; the machine only
    /// emits the closing events.
    Rejected,
}

enum GateOutcome {
    Approved,
    Rejected,
    Cancelled,
    Failed(String),
}

pub(crate) struct WorkflowMachine<D: Driver, C: Clock, G: IdGen> {
    pub services: Arc<Services<D, C, G>>,
    pub workflow_id: WorkflowId,
    pub workflow_type: WorkflowType,
    pub worktree_path: PathBuf,
    pub profile: amelia_core::Profile,
    pub cancel: CancellationToken,
    pub approval_rx: mpsc::Receiver<ApprovalDecision>,
    /// True when resuming from a checkpoint after restart.
    pub resume: bool,
}

impl<D: Driver, C: Clock, G: IdGen> WorkflowMachine<D, C, G> {
    /// Drive the workflow to a terminal status.
    pub async fn execute(mut self, mut state: ExecutionState) {
        let exit = self.drive(&mut state).await;
        match exit {
            Exit::Completed => {
                if let Err(e) = self.transition(WorkflowStatus::Completed) {
                    warn!(workflow = %self.workflow_id, error = %e, "completed transition failed");
                }
                self.emit_best_effort(
                    AgentRole::System,
                    EventType::WorkflowCompleted,
                    "workflow completed".to_string(),
                    Some(serde_json::json!({ "token_usage": state.token_usage })),
                )
                .await;
                info!(workflow = %self.workflow_id, "workflow completed");
            }
            Exit::Failed(reason) => {
                self.mark_failed(&reason);
                self.emit_best_effort(
                    AgentRole::System,
                    EventType::WorkflowFailed,
                    reason.clone(),
                    None,
                )
                .await;
                info!(workflow = %self.workflow_id, reason = %reason, "workflow failed");
            }
            Exit::Cancelled => {
                if let Err(e) = self.transition(WorkflowStatus::Cancelled) {
                    warn!(workflow = %self.workflow_id, error = %e, "cancelled transition failed");
                }
                self.emit_best_effort(
                    AgentRole::System,
                    EventType::WorkflowCancelled,
                    "workflow cancelled".to_string(),
                    None,
                )
                .await;
                info!(workflow = %self.workflow_id, "workflow cancelled");
            }
            Exit::Rejected => {}
        }
    }

    async fn drive(&mut self, state: &mut ExecutionState) -> Exit {
        if self.cancel.is_cancelled() {
            return Exit::Cancelled;
        }

        if !self.resume {
            let initial = match self.workflow_type {
                WorkflowType::Full => WorkflowStatus::Planning,
                WorkflowType::Review => WorkflowStatus::InProgress,
            };
            if let Err(e) = self.transition(initial) {
                return Exit::Failed(e.to_string());
            }
            if let Err(e) = self
                .emit(
                    AgentRole::System,
                    EventType::WorkflowStarted,
                    format!("workflow started on {}", self.worktree_path.display()),
                    None,
                )
                .await
            {
                return Exit::Failed(e.to_string());
            }
        }

        if self.workflow_type == WorkflowType::Review {
            return self.review_only(state).await;
        }

        if state.node == WorkflowNode::Architect {
            match self.architect_node(state).await {
                Ok(()) => {}
                Err(OrchestratorError::Cancelled) => return Exit::Cancelled,
                Err(e) => return Exit::Failed(e.to_string()),
            }
        }

        if state.node == WorkflowNode::ApprovalGate {
            match self.approval_gate(state).await {
                GateOutcome::Approved => {}
                GateOutcome::Rejected => return Exit::Rejected,
                GateOutcome::Cancelled => return Exit::Cancelled,
                GateOutcome::Failed(reason) => return Exit::Failed(reason),
            }
        }

        // Develop/review loop. `blocked` here is the revision edge, not
        // the approval gate.
        loop {
            if self.cancel.is_cancelled() {
                return Exit::Cancelled;
            }
            if let Err(e) = self.ensure_in_progress() {
                return Exit::Failed(e.to_string());
            }

            if state.node == WorkflowNode::Developer {
                match self.developer_node(state).await {
                    Ok(()) => {}
                    Err(OrchestratorError::Cancelled) => return Exit::Cancelled,
                    Err(e) => return Exit::Failed(e.to_string()),
                }
            }

            if self.cancel.is_cancelled() {
                return Exit::Cancelled;
            }

            let verdict = match self.reviewer_node(state).await {
                Ok(verdict) => verdict,
                Err(OrchestratorError::Cancelled) => return Exit::Cancelled,
                Err(e) => return Exit::Failed(e.to_string()),
            };

            if verdict.approved {
                state.node = WorkflowNode::Done;
                return Exit::Completed;
            }

            let feedback = verdict
                .feedback
                .unwrap_or_else(|| "reviewer requested changes".to_string());
            state.review_iteration += 1;
            if let Err(e) = self
                .emit(
                    AgentRole::Reviewer,
                    EventType::RevisionRequested,
                    feedback.clone(),
                    Some(serde_json::json!({ "iteration": state.review_iteration })),
                )
                .await
            {
                return Exit::Failed(e.to_string());
            }

            if state.review_iteration >= self.services.config.review_limit {
                return Exit::Failed(format!(
                    "review limit exceeded after {} iterations",
                    state.review_iteration
                ));
            }

            state.push_turn(format!("Reviewer feedback: {feedback}"));
            state.node = WorkflowNode::Developer;

            // The loop edge: in_progress -> blocked -> in_progress.
            if let Err(e) = self.transition(WorkflowStatus::Blocked) {
                return Exit::Failed(e.to_string());
            }
            if let Err(e) = self.checkpoint(state) {
                return Exit::Failed(e.to_string());
            }
        }
    }

    // -- nodes --

    async fn architect_node(
        &self,
        state: &mut ExecutionState,
    ) -> Result<(), OrchestratorError> {
        self.emit(
            AgentRole::Architect,
            EventType::StageStarted,
            "architect stage started".to_string(),
            None,
        )
        .await?;

        let request = DriverRequest {
            prompt: architect_prompt(&state.issue, &state.conversation),
            system_prompt: ARCHITECT_SYSTEM_PROMPT.to_string(),
            working_dir: self.worktree_path.clone(),
            prior_session: state.driver_session.clone(),
            settings: self.profile.driver_for(AgentRole::Architect).clone(),
        };
        let outcome = run_driver(
            AgentRole::Architect,
            &self.services.driver,
            &self.services.recorder,
            &self.workflow_id,
            request,
            self.services.config.stream_tool_results,
            &self.cancel,
        )
        .await?;
        state.driver_session = Some(outcome.session_id.clone());
        state.token_usage.add(outcome.usage);

        let plan_output = match parse_plan_output(&outcome.final_text) {
            Ok(plan) => plan,
            Err(reason) => {
                self.emit_error(AgentRole::Architect, reason.clone()).await;
                return Err(OrchestratorError::Driver(reason));
            }
        };

        let plan_path = self.write_plan(&state.issue.id, &plan_output.markdown_content).await?;
        self.emit(
            AgentRole::Architect,
            EventType::FileOperation,
            format!("wrote plan to {}", plan_path.display()),
            Some(serde_json::json!({ "path": plan_path })),
        )
        .await?;

        let artifact = PlanArtifact {
            path: plan_path.clone(),
            content: plan_output.markdown_content.clone(),
        };
        state.plan = Some(artifact.clone());
        self.update_row(|row| row.plan_cache = Some(artifact.clone()))?;

        self.emit(
            AgentRole::Architect,
            EventType::StageCompleted,
            "architect stage completed".to_string(),
            Some(serde_json::json!({
                "goal": plan_output.goal,
                "key_files": plan_output.key_files,
                "plan_path": plan_path,
            })),
        )
        .await?;

        state.node = WorkflowNode::ApprovalGate;
        state.pending_approval = true;
        self.checkpoint(state)?;
        Ok(())
    }

    /// Suspend until a human decision or cancellation. The task holds no
    /// locks and performs no I/O while parked on the channel.
    async fn approval_gate(&mut self, state: &mut ExecutionState) -> GateOutcome {
        let entering = match self.row_status() {
            Ok(status) => status == WorkflowStatus::Planning,
            Err(e) => return GateOutcome::Failed(e.to_string()),
        };

        if entering {
            if let Err(e) = self.transition(WorkflowStatus::Blocked) {
                return GateOutcome::Failed(e.to_string());
            }
            let plan_path = state.plan.as_ref().map(|p| p.path.clone());
            if let Err(e) = self
                .emit(
                    AgentRole::System,
                    EventType::ApprovalRequired,
                    "plan ready for review".to_string(),
                    Some(serde_json::json!({ "plan_path": plan_path })),
                )
                .await
            {
                return GateOutcome::Failed(e.to_string());
            }
            if let Err(e) = self.checkpoint(state) {
                return GateOutcome::Failed(e.to_string());
            }
        }

        let decision = tokio::select! {
            _ = self.cancel.cancelled() => return GateOutcome::Cancelled,
            decision = self.approval_rx.recv() => decision,
        };

        match decision {
            Some(ApprovalDecision::Approve) => {
                if let Err(e) = self
                    .emit(
                        AgentRole::System,
                        EventType::ApprovalGranted,
                        "plan approved".to_string(),
                        None,
                    )
                    .await
                {
                    return GateOutcome::Failed(e.to_string());
                }
                state.pending_approval = false;
                state.node = WorkflowNode::Developer;
                if let Err(e) = self.checkpoint(state) {
                    return GateOutcome::Failed(e.to_string());
                }
                GateOutcome::Approved
            }
            Some(ApprovalDecision::Reject { feedback }) => {
                self.emit_best_effort(
                    AgentRole::System,
                    EventType::ApprovalRejected,
                    feedback.clone(),
                    None,
                )
                .await;
                self.emit_best_effort(
                    AgentRole::System,
                    EventType::WorkflowFailed,
                    feedback,
                    None,
                )
                .await;
                GateOutcome::Rejected
            }
            None => GateOutcome::Failed("approval channel closed".to_string()),
        }
    }

    async fn developer_node(
        &self,
        state: &mut ExecutionState,
    ) -> Result<(), OrchestratorError> {
        self.emit(
            AgentRole::Developer,
            EventType::StageStarted,
            "developer stage started".to_string(),
            None,
        )
        .await?;

        let plan = state
            .plan
            .clone()
            .ok_or_else(|| OrchestratorError::Validation("no plan artifact".to_string()))?;
        let request = DriverRequest {
            prompt: developer_prompt(&state.issue, &plan, &state.conversation),
            system_prompt: DEVELOPER_SYSTEM_PROMPT.to_string(),
            working_dir: self.worktree_path.clone(),
            prior_session: state.driver_session.clone(),
            settings: self.profile.driver_for(AgentRole::Developer).clone(),
        };
        let outcome = run_driver(
            AgentRole::Developer,
            &self.services.driver,
            &self.services.recorder,
            &self.workflow_id,
            request,
            self.services.config.stream_tool_results,
            &self.cancel,
        )
        .await?;
        state.driver_session = Some(outcome.session_id.clone());
        state.token_usage.add(outcome.usage);

        self.emit(
            AgentRole::Developer,
            EventType::StageCompleted,
            outcome.final_text,
            None,
        )
        .await?;

        state.node = WorkflowNode::Reviewer;
        self.checkpoint(state)?;
        Ok(())
    }

    async fn reviewer_node(
        &self,
        state: &mut ExecutionState,
    ) -> Result<ReviewVerdict, OrchestratorError> {
        self.emit(
            AgentRole::Reviewer,
            EventType::StageStarted,
            "reviewer stage started".to_string(),
            None,
        )
        .await?;

        let plan = state
            .plan
            .clone()
            .ok_or_else(|| OrchestratorError::Validation("no plan artifact".to_string()))?;
        let request = DriverRequest {
            prompt: reviewer_prompt(&state.issue, &plan),
            system_prompt: REVIEWER_SYSTEM_PROMPT.to_string(),
            working_dir: self.worktree_path.clone(),
            prior_session: state.driver_session.clone(),
            settings: self.profile.driver_for(AgentRole::Reviewer).clone(),
        };
        let outcome = run_driver(
            AgentRole::Reviewer,
            &self.services.driver,
            &self.services.recorder,
            &self.workflow_id,
            request,
            self.services.config.stream_tool_results,
            &self.cancel,
        )
        .await?;
        state.driver_session = Some(outcome.session_id.clone());
        state.token_usage.add(outcome.usage);

        let verdict = match parse_review_verdict(&outcome.final_text) {
            Ok(verdict) => verdict,
            Err(reason) => {
                self.emit_error(AgentRole::Reviewer, reason.clone()).await;
                return Err(OrchestratorError::Driver(reason));
            }
        };

        self.emit(
            AgentRole::Reviewer,
            EventType::StageCompleted,
            "reviewer stage completed".to_string(),
            Some(serde_json::json!({ "approved": verdict.approved })),
        )
        .await?;

        Ok(verdict)
    }

    /// Review-type workflow: a single reviewer pass over the worktree.
    async fn review_only(&mut self, state: &mut ExecutionState) -> Exit {
        if let Err(e) = self
            .emit(
                AgentRole::Reviewer,
                EventType::StageStarted,
                "reviewer stage started".to_string(),
                None,
            )
            .await
        {
            return Exit::Failed(e.to_string());
        }

        let request = DriverRequest {
            prompt: review_only_prompt(&state.issue),
            system_prompt: REVIEWER_SYSTEM_PROMPT.to_string(),
            working_dir: self.worktree_path.clone(),
            prior_session: state.driver_session.clone(),
            settings: self.profile.driver_for(AgentRole::Reviewer).clone(),
        };
        let outcome = match run_driver(
            AgentRole::Reviewer,
            &self.services.driver,
            &self.services.recorder,
            &self.workflow_id,
            request,
            self.services.config.stream_tool_results,
            &self.cancel,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(OrchestratorError::Cancelled) => return Exit::Cancelled,
            Err(e) => return Exit::Failed(e.to_string()),
        };
        state.driver_session = Some(outcome.session_id.clone());
        state.token_usage.add(outcome.usage);

        let verdict = match parse_review_verdict(&outcome.final_text) {
            Ok(verdict) => verdict,
            Err(reason) => {
                self.emit_error(AgentRole::Reviewer, reason.clone()).await;
                return Exit::Failed(reason);
            }
        };

        if let Err(e) = self
            .emit(
                AgentRole::Reviewer,
                EventType::StageCompleted,
                "reviewer stage completed".to_string(),
                Some(serde_json::json!({ "approved": verdict.approved })),
            )
            .await
        {
            return Exit::Failed(e.to_string());
        }

        if verdict.approved {
            Exit::Completed
        } else {
            Exit::Failed(
                verdict
                    .feedback
                    .unwrap_or_else(|| "review rejected".to_string()),
            )
        }
    }

    // -- helpers --

    async fn write_plan(
        &self,
        issue_id: &str,
        content: &str,
    ) -> Result<PathBuf, OrchestratorError> {
        let dir = if self.profile.plan_output_dir.is_absolute() {
            self.profile.plan_output_dir.clone()
        } else {
            self.worktree_path.join(&self.profile.plan_output_dir)
        };
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| OrchestratorError::Persistence(e.to_string()))?;

        let date = self.services.clock.utc_now().format("%Y-%m-%d");
        let path = dir.join(format!("{date}-{issue_id}.md"));
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| OrchestratorError::Persistence(e.to_string()))?;
        Ok(path)
    }

    fn row_status(&self) -> Result<WorkflowStatus, OrchestratorError> {
        let store = self.services.workflows.lock();
        store
            .get(&self.workflow_id)
            .map(|w| w.status)
            .ok_or_else(|| OrchestratorError::NotFound(self.workflow_id.clone()))
    }

    fn transition(&self, to: WorkflowStatus) -> Result<(), OrchestratorError> {
        let now = self.services.clock.utc_now();
        let mut store = self.services.workflows.lock();
        let mut row = store
            .get(&self.workflow_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(self.workflow_id.clone()))?;
        row.transition(to, now)?;
        store.upsert(&row)?;
        Ok(())
    }

    fn ensure_in_progress(&self) -> Result<(), OrchestratorError> {
        if self.row_status()? == WorkflowStatus::Blocked {
            self.transition(WorkflowStatus::InProgress)?;
        }
        Ok(())
    }

    fn mark_failed(&self, reason: &str) {
        let now = self.services.clock.utc_now();
        let mut store = self.services.workflows.lock();
        let Some(mut row) = store.get(&self.workflow_id).cloned() else {
            return;
        };
        if row.status.is_terminal() {
            return;
        }
        row.failure_reason = Some(reason.to_string());
        if let Err(e) = row.transition(WorkflowStatus::Failed, now) {
            warn!(workflow = %self.workflow_id, error = %e, "failed transition rejected");
            return;
        }
        if let Err(e) = store.upsert(&row) {
            warn!(workflow = %self.workflow_id, error = %e, "failed to persist failure");
        }
    }

    fn update_row(
        &self,
        f: impl FnOnce(&mut Workflow),
    ) -> Result<(), OrchestratorError> {
        let mut store = self.services.workflows.lock();
        let mut row = store
            .get(&self.workflow_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(self.workflow_id.clone()))?;
        f(&mut row);
        row.updated_at = row.updated_at.max(self.services.clock.utc_now());
        store.upsert(&row)?;
        Ok(())
    }

    fn checkpoint(&self, state: &ExecutionState) -> Result<(), OrchestratorError> {
        self.services
            .checkpoints
            .save(state, self.services.clock.utc_now())?;
        Ok(())
    }

    async fn emit(
        &self,
        agent: AgentRole,
        event_type: EventType,
        message: String,
        data: Option<serde_json::Value>,
    ) -> Result<(), OrchestratorError> {
        let mut draft = EventDraft::new(self.workflow_id.clone(), agent, event_type, message);
        if let Some(data) = data {
            draft = draft.with_data(data);
        }
        self.services.recorder.record(draft).await?;
        Ok(())
    }

    async fn emit_best_effort(
        &self,
        agent: AgentRole,
        event_type: EventType,
        message: String,
        data: Option<serde_json::Value>,
    ) {
        if let Err(e) = self.emit(agent, event_type, message, data).await {
            warn!(workflow = %self.workflow_id, error = %e, "best-effort event emission failed");
        }
    }

    /// Emit a `system_error` event with `is_error` set (best-effort).
    /// Used for malformed agent output, which counts as a driver failure.
    async fn emit_error(&self, agent: AgentRole, message: String) {
        let draft = EventDraft::new(
            self.workflow_id.clone(),
            agent,
            EventType::SystemError,
            message,
        )
        .with_error();
        if let Err(e) = self.services.recorder.record(draft).await {
            warn!(workflow = %self.workflow_id, error = %e, "failed to record error event");
        }
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
