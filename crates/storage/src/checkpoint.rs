// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution-state checkpoints with zstd compression and durable fsync.
//!
//! One snapshot file per workflow, latest wins. The write protocol is
//! write-tmp → fsync → atomic rename → fsync directory, so a crash at
//! any point leaves either the old or the new snapshot intact. Corrupt
//! snapshots are rotated to `.bak` and treated as absent.

use crate::event_store::rotate_bak_path;
use amelia_core::{ExecutionState, WorkflowId, WorkflowNode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors from checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("compression error: {0}")]
    Compress(String),
}

/// A snapshot of execution state at a node boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub workflow_id: WorkflowId,
    /// Node at which the snapshot was taken.
    pub node: WorkflowNode,
    pub state: ExecutionState,
    pub created_at: DateTime<Utc>,
}

/// Directory of per-workflow checkpoint files.
#[derive(Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    // zstd level 3 is a good balance of speed and compression
    compression_level: i32,
}

impl CheckpointStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            compression_level: 3,
        }
    }

    fn path_for(&self, workflow_id: &WorkflowId) -> PathBuf {
        self.dir.join(format!("{}.ckpt", workflow_id))
    }

    /// Persist a snapshot. Fully durable (including the directory
    /// rename) before returning.
    pub fn save(&self, state: &ExecutionState, now: DateTime<Utc>) -> Result<(), CheckpointError> {
        std::fs::create_dir_all(&self.dir)?;

        let checkpoint = Checkpoint {
            workflow_id: state.workflow_id.clone(),
            node: state.node,
            state: state.clone(),
            created_at: now,
        };

        let json_bytes = serde_json::to_vec(&checkpoint)?;
        let compressed = zstd::encode_all(json_bytes.as_slice(), self.compression_level)
            .map_err(|e| CheckpointError::Compress(e.to_string()))?;

        let path = self.path_for(&state.workflow_id);
        let tmp_path = path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&compressed)?;
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &path)?;
        let dir = File::open(&self.dir)?;
        dir.sync_all()?;

        Ok(())
    }

    /// Load the latest snapshot for a workflow, if any.
    ///
    /// A corrupt snapshot is rotated to `.bak` and reported as absent so
    /// recovery can proceed without it.
    pub fn load(&self, workflow_id: &WorkflowId) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(workflow_id);
        if !path.exists() {
            return Ok(None);
        }

        match read_checkpoint(&path) {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(e) => {
                let bak_path = rotate_bak_path(&path);
                warn!(
                    error = %e,
                    path = %path.display(),
                    bak = %bak_path.display(),
                    "Corrupt checkpoint, moving to .bak",
                );
                std::fs::rename(&path, &bak_path)?;
                Ok(None)
            }
        }
    }

    /// Remove a workflow's checkpoint (terminal cleanup).
    pub fn remove(&self, workflow_id: &WorkflowId) -> Result<(), CheckpointError> {
        let path = self.path_for(workflow_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Workflow ids that have a checkpoint on disk.
    pub fn list(&self) -> Result<Vec<WorkflowId>, CheckpointError> {
        let mut ids = Vec::new();
        if !self.dir.exists() {
            return Ok(ids);
        }
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("ckpt") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(WorkflowId::new(stem));
                }
            }
        }
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    /// Delete checkpoints older than the cutoff. Returns the count removed.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, CheckpointError> {
        let mut removed = 0;
        for workflow_id in self.list()? {
            let Some(checkpoint) = self.load(&workflow_id)? else {
                continue;
            };
            if checkpoint.created_at < cutoff {
                self.remove(&workflow_id)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn read_checkpoint(path: &Path) -> Result<Checkpoint, CheckpointError> {
    let file = File::open(path)?;
    let decoder = zstd::stream::read::Decoder::new(file)
        .map_err(|e| CheckpointError::Compress(e.to_string()))?;
    Ok(serde_json::from_reader(decoder)?)
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
