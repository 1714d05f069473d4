// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The top-level supervisor.
//!
//! Admits workflow-creation requests under the exclusivity and
//! concurrency invariants, spawns one state-machine task per workflow,
//! mediates approval/rejection/cancellation, and cleans up on terminal
//! transitions. External actions never mutate `ExecutionState`; they
//! set flags, transition the row, and signal the suspended task.

use crate::error::OrchestratorError;
use crate::machine::{ApprovalDecision, WorkflowMachine};
use crate::recorder::EventRecorder;
use amelia_adapters::{Driver, Tracker};
use amelia_core::{
    AgentRole, Clock, EventDraft, EventRecord, EventType, ExecutionState, IdGen, Issue, Profile,
    ProfileId, TokenUsage, Workflow, WorkflowId, WorkflowNode, WorkflowStatus, WorkflowType,
};
use amelia_storage::{CheckpointStore, WorkflowStore};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Engine tunables. Retention windows live in [`crate::RetentionConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Global active-workflow cap.
    pub max_concurrent: usize,
    /// Review iterations before the workflow fails.
    pub review_limit: u32,
    /// Deadline for a new workflow to leave `pending`.
    pub workflow_start_timeout: Duration,
    /// How long shutdown waits for tasks after cancelling them.
    pub shutdown_grace: Duration,
    /// Surface tool results as trace events.
    pub stream_tool_results: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            review_limit: 3,
            workflow_start_timeout: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(10),
            stream_tool_results: true,
        }
    }
}

/// Shared dependencies handed to every state-machine task.
pub(crate) struct Services<D: Driver, C: Clock, G: IdGen> {
    pub driver: D,
    pub clock: C,
    pub recorder: EventRecorder<C, G>,
    pub workflows: Arc<Mutex<WorkflowStore>>,
    pub checkpoints: CheckpointStore,
    pub config: EngineConfig,
}

/// Workflow-creation request (the REST create body, minus transport).
#[derive(Debug, Clone)]
pub struct StartWorkflowRequest {
    pub issue_id: String,
    pub worktree_path: PathBuf,
    pub worktree_name: Option<String>,
    pub profile: Option<String>,
    /// Override the profile's driver command for this run.
    pub driver: Option<String>,
    pub task_title: Option<String>,
    pub task_description: Option<String>,
    pub workflow_type: WorkflowType,
}

/// Result of approve/reject/cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied,
    /// The workflow was already terminal; no side effects.
    AlreadyTerminal(WorkflowStatus),
}

/// Detail view: the row plus usage and recent history.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowDetail {
    #[serde(flatten)]
    pub workflow: Workflow,
    pub token_usage: TokenUsage,
    pub recent_events: Vec<EventRecord>,
}

struct TaskEntry {
    join: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    approval_tx: mpsc::Sender<ApprovalDecision>,
}

#[derive(Default)]
struct Registry {
    /// Workflows in the planning phase (architect + approval gate).
    planning: HashMap<WorkflowId, TaskEntry>,
    /// Workflows executing with the worktree locked.
    active: HashMap<WorkflowId, TaskEntry>,
}

impl Registry {
    fn get(&self, id: &WorkflowId) -> Option<&TaskEntry> {
        self.planning.get(id).or_else(|| self.active.get(id))
    }

    fn remove(&mut self, id: &WorkflowId) -> Option<TaskEntry> {
        self.planning.remove(id).or_else(|| self.active.remove(id))
    }
}

struct Inner<D: Driver, T: Tracker, C: Clock, G: IdGen> {
    services: Arc<Services<D, C, G>>,
    tracker: T,
    id_gen: G,
    profiles: HashMap<String, Profile>,
    default_profile: String,
    semaphore: Arc<Semaphore>,
    registry: Mutex<Registry>,
}

/// The supervisor. Cheap to clone; all state lives behind the `Arc`.
pub struct Orchestrator<D: Driver, T: Tracker, C: Clock + 'static, G: IdGen + 'static> {
    inner: Arc<Inner<D, T, C, G>>,
}

impl<D: Driver, T: Tracker, C: Clock + 'static, G: IdGen + 'static> Clone
    for Orchestrator<D, T, C, G>
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Driver, T: Tracker, C: Clock + 'static, G: IdGen + 'static> Orchestrator<D, T, C, G> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        driver: D,
        tracker: T,
        clock: C,
        id_gen: G,
        recorder: EventRecorder<C, G>,
        workflows: Arc<Mutex<WorkflowStore>>,
        checkpoints: CheckpointStore,
        profiles: HashMap<String, Profile>,
        default_profile: impl Into<String>,
        config: EngineConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        let services = Arc::new(Services {
            driver,
            clock,
            recorder,
            workflows,
            checkpoints,
            config,
        });
        Self {
            inner: Arc::new(Inner {
                services,
                tracker,
                id_gen,
                profiles,
                default_profile: default_profile.into(),
                semaphore,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Create a workflow and spawn its state-machine task.
    pub async fn start_workflow(
        &self,
        req: StartWorkflowRequest,
    ) -> Result<WorkflowId, OrchestratorError> {
        if req.issue_id.trim().is_empty() {
            return Err(OrchestratorError::Validation(
                "issue_id is required".to_string(),
            ));
        }
        if !req.worktree_path.is_absolute() {
            return Err(OrchestratorError::Validation(
                "worktree_path must be absolute".to_string(),
            ));
        }
        if req.task_description.is_some() && req.task_title.is_none() {
            return Err(OrchestratorError::Validation(
                "task_description requires task_title".to_string(),
            ));
        }

        let profile_name = req
            .profile
            .clone()
            .unwrap_or_else(|| self.inner.default_profile.clone());
        let mut profile = self
            .inner
            .profiles
            .get(&profile_name)
            .cloned()
            .ok_or_else(|| {
                OrchestratorError::Validation(format!("unknown profile: {profile_name}"))
            })?;
        if let Some(driver) = &req.driver {
            profile.driver.command = driver.clone();
        }
        if req.task_title.is_some() && !profile.is_noop_tracker() {
            return Err(OrchestratorError::Validation(
                "task_title requires a noop tracker profile".to_string(),
            ));
        }

        let issue = match &req.task_title {
            Some(title) => Issue::new(
                &req.issue_id,
                title,
                req.task_description.clone().unwrap_or_default(),
            ),
            None => self
                .inner
                .tracker
                .fetch(&req.issue_id)
                .await
                .map_err(|e| OrchestratorError::Tracker(e.to_string()))?,
        };

        let workflow_id = WorkflowId::new(self.inner.id_gen.next());
        let worktree_name = req.worktree_name.clone().unwrap_or_else(|| {
            req.worktree_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| req.worktree_path.display().to_string())
        });

        // Admission: exclusivity + cap, then row creation, all under the
        // registry lock so two concurrent creates cannot both pass.
        let (cancel, approval_rx, permit) = {
            let mut registry = self.inner.registry.lock();
            {
                let workflows = self.inner.services.workflows.lock();
                if let Some(existing) = workflows.active_for_worktree(&req.worktree_path) {
                    return Err(OrchestratorError::WorkflowConflict {
                        worktree: req.worktree_path.clone(),
                        existing: existing.id.clone(),
                    });
                }
            }

            let permit = Arc::clone(&self.inner.semaphore)
                .try_acquire_owned()
                .map_err(|_| OrchestratorError::RateLimit {
                    max_concurrent: self.inner.services.config.max_concurrent,
                })?;

            let row = Workflow::new(
                workflow_id.clone(),
                req.issue_id.clone(),
                req.worktree_path.clone(),
                worktree_name,
                ProfileId::new(&profile_name),
                req.workflow_type,
                self.inner.services.clock.utc_now(),
            );
            let mut row = row;
            row.issue_cache = Some(issue.clone());
            {
                let mut workflows = self.inner.services.workflows.lock();
                workflows.upsert(&row)?;
            }
            self.inner.services.recorder.bus().register_workflow(&workflow_id);

            let cancel = CancellationToken::new();
            let (approval_tx, approval_rx) = mpsc::channel(1);
            registry.planning.insert(
                workflow_id.clone(),
                TaskEntry {
                    join: None,
                    cancel: cancel.clone(),
                    approval_tx,
                },
            );
            (cancel, approval_rx, permit)
        };

        let created = self
            .inner
            .services
            .recorder
            .record(
                EventDraft::new(
                    workflow_id.clone(),
                    AgentRole::System,
                    EventType::WorkflowCreated,
                    format!("workflow created for issue {}", req.issue_id),
                )
                .with_data(serde_json::json!({
                    "issue_id": req.issue_id,
                    "worktree_path": req.worktree_path,
                })),
            )
            .await;
        if let Err(e) = created {
            // Roll back admission so the worktree is not wedged.
            self.inner.registry.lock().remove(&workflow_id);
            self.inner
                .fail_row_inner(&workflow_id, "failed to record creation")
                .await;
            return Err(e);
        }

        let machine = WorkflowMachine {
            services: Arc::clone(&self.inner.services),
            workflow_id: workflow_id.clone(),
            workflow_type: req.workflow_type,
            worktree_path: req.worktree_path.clone(),
            profile,
            cancel: cancel.clone(),
            approval_rx,
            resume: false,
        };
        let state = ExecutionState::new(workflow_id.clone(), issue);

        self.spawn_machine(machine, state, permit);
        self.spawn_start_watchdog(workflow_id.clone());

        info!(workflow = %workflow_id, worktree = %req.worktree_path.display(), "workflow started");
        Ok(workflow_id)
    }

    /// Resume non-terminal workflows from their checkpoints. Returns the
    /// number of workflows resumed; rows without a usable checkpoint are
    /// failed.
    pub async fn recover(&self) -> usize {
        let rows = {
            let workflows = self.inner.services.workflows.lock();
            workflows.non_terminal()
        };
        let mut resumed = 0;
        for row in rows {
            match self.resume_workflow(row).await {
                Ok(true) => resumed += 1,
                Ok(false) => {}
                Err(e) => warn!(error = %e, "workflow recovery failed"),
            }
        }
        resumed
    }

    async fn resume_workflow(&self, row: Workflow) -> Result<bool, OrchestratorError> {
        let workflow_id = row.id.clone();
        let checkpoint = self.inner.services.checkpoints.load(&workflow_id)?;
        let Some(checkpoint) = checkpoint else {
            self.fail_row(&workflow_id, "daemon restarted before first checkpoint")
                .await;
            return Ok(false);
        };

        let Some(profile) = self.inner.profiles.get(row.profile_id.as_str()).cloned() else {
            self.fail_row(
                &workflow_id,
                &format!("unknown profile at recovery: {}", row.profile_id),
            )
            .await;
            return Ok(false);
        };

        let Ok(permit) = Arc::clone(&self.inner.semaphore).try_acquire_owned() else {
            self.fail_row(&workflow_id, "concurrency cap exceeded during recovery")
                .await;
            return Ok(false);
        };

        self.inner.services.recorder.bus().register_workflow(&workflow_id);

        let cancel = CancellationToken::new();
        let (approval_tx, approval_rx) = mpsc::channel(1);
        let in_planning_phase =
            row.status == WorkflowStatus::Planning || checkpoint.node == WorkflowNode::ApprovalGate;
        {
            let mut registry = self.inner.registry.lock();
            let entry = TaskEntry {
                join: None,
                cancel: cancel.clone(),
                approval_tx,
            };
            if in_planning_phase {
                registry.planning.insert(workflow_id.clone(), entry);
            } else {
                registry.active.insert(workflow_id.clone(), entry);
            }
        }

        let machine = WorkflowMachine {
            services: Arc::clone(&self.inner.services),
            workflow_id: workflow_id.clone(),
            workflow_type: row.workflow_type,
            worktree_path: row.worktree_path.clone(),
            profile,
            cancel,
            approval_rx,
            resume: true,
        };

        info!(
            workflow = %workflow_id,
            node = %checkpoint.node,
            "resuming workflow from checkpoint"
        );
        self.spawn_machine(machine, checkpoint.state, permit);
        Ok(true)
    }

    /// Approve a blocked workflow: transition to `in_progress` and wake
    /// the suspended task. Idempotent on terminal states.
    pub fn approve(&self, id: &WorkflowId) -> Result<ActionOutcome, OrchestratorError> {
        let registry = self.inner.registry.lock();
        let row = {
            let workflows = self.inner.services.workflows.lock();
            workflows
                .get(id)
                .cloned()
                .ok_or_else(|| OrchestratorError::NotFound(id.clone()))?
        };
        if row.status.is_terminal() {
            return Ok(ActionOutcome::AlreadyTerminal(row.status));
        }
        if row.status != WorkflowStatus::Blocked {
            return Err(OrchestratorError::NotAwaitingApproval {
                id: id.clone(),
                status: row.status,
            });
        }
        if row.plan_cache.is_none() {
            return Err(OrchestratorError::Validation(
                "no plan artifact to approve".to_string(),
            ));
        }
        let approval_tx = registry
            .get(id)
            .map(|entry| entry.approval_tx.clone())
            .ok_or_else(|| {
                OrchestratorError::Persistence(format!("no running task for workflow {id}"))
            })?;

        {
            let mut workflows = self.inner.services.workflows.lock();
            let mut row = row;
            row.transition(WorkflowStatus::InProgress, self.inner.services.clock.utc_now())?;
            workflows.upsert(&row)?;
        }

        // The planning phase ends here; the worktree is now locked.
        drop(registry);
        let mut registry = self.inner.registry.lock();
        if let Some(entry) = registry.planning.remove(id) {
            registry.active.insert(id.clone(), entry);
        }
        let _ = approval_tx.try_send(ApprovalDecision::Approve);

        Ok(ActionOutcome::Applied)
    }

    /// Reject a blocked workflow's plan. Terminal: the workflow fails
    /// with the feedback as its reason.
    pub fn reject(
        &self,
        id: &WorkflowId,
        feedback: impl Into<String>,
    ) -> Result<ActionOutcome, OrchestratorError> {
        let feedback = feedback.into();
        let registry = self.inner.registry.lock();
        let row = {
            let workflows = self.inner.services.workflows.lock();
            workflows
                .get(id)
                .cloned()
                .ok_or_else(|| OrchestratorError::NotFound(id.clone()))?
        };
        if row.status.is_terminal() {
            return Ok(ActionOutcome::AlreadyTerminal(row.status));
        }
        if row.status != WorkflowStatus::Blocked {
            return Err(OrchestratorError::NotAwaitingApproval {
                id: id.clone(),
                status: row.status,
            });
        }

        {
            let mut workflows = self.inner.services.workflows.lock();
            let mut row = row;
            row.failure_reason = Some(feedback.clone());
            row.transition(WorkflowStatus::Failed, self.inner.services.clock.utc_now())?;
            workflows.upsert(&row)?;
        }

        if let Some(entry) = registry.get(id) {
            let _ = entry
                .approval_tx
                .try_send(ApprovalDecision::Reject { feedback });
        }

        Ok(ActionOutcome::Applied)
    }

    /// Request cancellation. Cooperative: the state machine observes the
    /// signal at its next suspension point.
    pub fn cancel(&self, id: &WorkflowId) -> Result<ActionOutcome, OrchestratorError> {
        let registry = self.inner.registry.lock();
        let row = {
            let workflows = self.inner.services.workflows.lock();
            workflows
                .get(id)
                .cloned()
                .ok_or_else(|| OrchestratorError::NotFound(id.clone()))?
        };
        if row.status.is_terminal() {
            return Ok(ActionOutcome::AlreadyTerminal(row.status));
        }

        if let Some(entry) = registry.get(id) {
            entry.cancel.cancel();
            return Ok(ActionOutcome::Applied);
        }

        // No running task (recovery edge): settle the row directly.
        let mut workflows = self.inner.services.workflows.lock();
        let mut row = row;
        row.transition(WorkflowStatus::Cancelled, self.inner.services.clock.utc_now())?;
        workflows.upsert(&row)?;
        Ok(ActionOutcome::Applied)
    }

    /// Graceful shutdown: cancel everything, wait bounded, abort
    /// stragglers. Retention is the caller's next step.
    pub async fn shutdown(&self) {
        let entries: Vec<(WorkflowId, TaskEntry)> = {
            let mut registry = self.inner.registry.lock();
            let planning: Vec<(WorkflowId, TaskEntry)> = registry.planning.drain().collect();
            let active: Vec<(WorkflowId, TaskEntry)> = registry.active.drain().collect();
            planning.into_iter().chain(active).collect()
        };

        for (_, entry) in &entries {
            entry.cancel.cancel();
        }

        let grace = self.inner.services.config.shutdown_grace;
        for (id, mut entry) in entries {
            let Some(mut join) = entry.join.take() else {
                continue;
            };
            if tokio::time::timeout(grace, &mut join).await.is_err() {
                warn!(workflow = %id, "workflow task did not stop within grace; aborting");
                join.abort();
            }
        }
    }

    // -- read side --

    pub fn workflow(&self, id: &WorkflowId) -> Option<Workflow> {
        self.inner.services.workflows.lock().get(id).cloned()
    }

    pub fn list_workflows(&self, statuses: Option<&[WorkflowStatus]>) -> Vec<Workflow> {
        self.inner.services.workflows.lock().list(statuses)
    }

    pub fn detail(&self, id: &WorkflowId, recent: usize) -> Option<WorkflowDetail> {
        let workflow = self.workflow(id)?;
        let token_usage = self
            .inner
            .services
            .checkpoints
            .load(id)
            .ok()
            .flatten()
            .map(|c| c.state.token_usage)
            .unwrap_or_default();
        let recent_events = self
            .inner
            .services
            .recorder
            .bus()
            .store()
            .lock()
            .recent(id, recent);
        Some(WorkflowDetail {
            workflow,
            token_usage,
            recent_events,
        })
    }

    /// Number of workflows with a live task (planning + active).
    pub fn running_count(&self) -> usize {
        let registry = self.inner.registry.lock();
        registry.planning.len() + registry.active.len()
    }

    // -- internals --

    fn spawn_machine(
        &self,
        machine: WorkflowMachine<D, C, G>,
        state: ExecutionState,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let inner = Arc::clone(&self.inner);
        let workflow_id = machine.workflow_id.clone();
        let task_id = workflow_id.clone();
        let join = tokio::spawn(async move {
            let _permit = permit;
            machine.execute(state).await;
            inner.finish(&task_id);
        });

        let mut registry = self.inner.registry.lock();
        if let Some(entry) = registry.planning.get_mut(&workflow_id) {
            entry.join = Some(join);
        } else if let Some(entry) = registry.active.get_mut(&workflow_id) {
            entry.join = Some(join);
        }
    }

    fn spawn_start_watchdog(&self, workflow_id: WorkflowId) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.services.config.workflow_start_timeout).await;
            let status = {
                let workflows = inner.services.workflows.lock();
                workflows.get(&workflow_id).map(|w| w.status)
            };
            if status == Some(WorkflowStatus::Pending) {
                warn!(workflow = %workflow_id, "workflow start timeout");
                if let Some(entry) = inner.registry.lock().get(&workflow_id) {
                    entry.cancel.cancel();
                }
                inner.fail_row_inner(&workflow_id, "workflow start timeout").await;
            }
        });
    }

    async fn fail_row(&self, workflow_id: &WorkflowId, reason: &str) {
        self.inner.fail_row_inner(workflow_id, reason).await;
    }
}

impl<D: Driver, T: Tracker, C: Clock + 'static, G: IdGen + 'static> Inner<D, T, C, G> {
    /// Per-workflow finalization when the machine task ends.
    fn finish(&self, workflow_id: &WorkflowId) {
        {
            let mut registry = self.registry.lock();
            registry.remove(workflow_id);
        }
        self.services.recorder.forget_workflow(workflow_id);
        if let Err(e) = self.services.checkpoints.remove(workflow_id) {
            warn!(workflow = %workflow_id, error = %e, "failed to drop checkpoint");
        }
    }

    /// Fail a row without a running machine (recovery, watchdog).
    async fn fail_row_inner(&self, workflow_id: &WorkflowId, reason: &str) {
        {
            let mut workflows = self.services.workflows.lock();
            let Some(mut row) = workflows.get(workflow_id).cloned() else {
                return;
            };
            if row.status.is_terminal() {
                return;
            }
            row.failure_reason = Some(reason.to_string());
            if let Err(e) = row.transition(WorkflowStatus::Failed, self.services.clock.utc_now()) {
                warn!(workflow = %workflow_id, error = %e, "failed transition rejected");
                return;
            }
            if let Err(e) = workflows.upsert(&row) {
                warn!(workflow = %workflow_id, error = %e, "failed to persist failure");
                return;
            }
        }
        let draft = EventDraft::new(
            workflow_id.clone(),
            AgentRole::System,
            EventType::WorkflowFailed,
            reason.to_string(),
        );
        if let Err(e) = self.services.recorder.record(draft).await {
            warn!(workflow = %workflow_id, error = %e, "failed to record failure event");
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
