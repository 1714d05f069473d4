// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the orchestration engine

use amelia_core::{InvalidTransition, WorkflowId, WorkflowStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the orchestrator and state machine.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("active workflow {existing} already exists for worktree {}", worktree.display())]
    WorkflowConflict {
        worktree: PathBuf,
        existing: WorkflowId,
    },

    #[error("concurrency limit reached ({max_concurrent} active workflows)")]
    RateLimit { max_concurrent: usize },

    #[error("workflow not found: {0}")]
    NotFound(WorkflowId),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("workflow {id} is {status}, expected blocked")]
    NotAwaitingApproval {
        id: WorkflowId,
        status: WorkflowStatus,
    },

    #[error("driver error: {0}")]
    Driver(String),

    #[error("tracker error: {0}")]
    Tracker(String),

    #[error("cancelled")]
    Cancelled,

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl From<amelia_storage::EventStoreError> for OrchestratorError {
    fn from(e: amelia_storage::EventStoreError) -> Self {
        OrchestratorError::Persistence(e.to_string())
    }
}

impl From<amelia_storage::WorkflowStoreError> for OrchestratorError {
    fn from(e: amelia_storage::WorkflowStoreError) -> Self {
        OrchestratorError::Persistence(e.to_string())
    }
}

impl From<amelia_storage::CheckpointError> for OrchestratorError {
    fn from(e: amelia_storage::CheckpointError) -> Self {
        OrchestratorError::Persistence(e.to_string())
    }
}
