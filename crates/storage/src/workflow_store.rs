// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow row store.
//!
//! An upsert log: each write appends the full row, and materialization
//! on open is last-write-wins. `compact()` rewrites the file to one line
//! per live row; retention calls it after sweeps.

use crate::event_store::rotate_bak_path;
use amelia_core::{Workflow, WorkflowId, WorkflowStatus};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors from workflow store operations
#[derive(Debug, Error)]
pub enum WorkflowStoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("workflow not found: {0}")]
    NotFound(WorkflowId),
}

/// Materialized workflow rows backed by an upsert log.
pub struct WorkflowStore {
    file: File,
    path: PathBuf,
    rows: HashMap<WorkflowId, Workflow>,
}

impl WorkflowStore {
    /// Open or create the store, replaying the upsert log.
    pub fn open(path: &Path) -> Result<Self, WorkflowStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let mut rows = HashMap::new();
        let mut reader = BufReader::new(file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;
        let mut line = String::new();
        let mut corrupt = false;

        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    corrupt = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<Workflow>(trimmed) {
                Ok(workflow) => {
                    rows.insert(workflow.id.clone(), workflow);
                }
                Err(_) => {
                    corrupt = true;
                    break;
                }
            }
        }

        let mut store = Self {
            file,
            path: path.to_owned(),
            rows,
        };

        if corrupt {
            let bak_path = rotate_bak_path(path);
            warn!(
                path = %path.display(),
                bak = %bak_path.display(),
                rows = store.rows.len(),
                "Corrupt workflow log detected, rotating to .bak and compacting valid rows",
            );
            std::fs::rename(path, &bak_path)?;
            store.compact()?;
        }

        Ok(store)
    }

    /// Insert or update a row. Durable before returning.
    pub fn upsert(&mut self, workflow: &Workflow) -> Result<(), WorkflowStoreError> {
        let mut line = serde_json::to_vec(workflow)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_data()?;
        self.rows.insert(workflow.id.clone(), workflow.clone());
        Ok(())
    }

    pub fn get(&self, id: &WorkflowId) -> Option<&Workflow> {
        self.rows.get(id)
    }

    /// All rows, newest first, optionally filtered by status.
    pub fn list(&self, statuses: Option<&[WorkflowStatus]>) -> Vec<Workflow> {
        let mut rows: Vec<Workflow> = self
            .rows
            .values()
            .filter(|w| statuses.map_or(true, |s| s.contains(&w.status)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    /// The partial-unique check: the workflow in an active status on this
    /// worktree, if any.
    pub fn active_for_worktree(&self, worktree_path: &Path) -> Option<&Workflow> {
        self.rows
            .values()
            .find(|w| w.status.is_active() && w.worktree_path == worktree_path)
    }

    /// Rows in a non-terminal status (for restart recovery).
    pub fn non_terminal(&self) -> Vec<Workflow> {
        self.rows
            .values()
            .filter(|w| !w.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Delete a row. The caller cascades the event stream.
    pub fn remove(&mut self, id: &WorkflowId) -> Result<Workflow, WorkflowStoreError> {
        let workflow = self
            .rows
            .remove(id)
            .ok_or_else(|| WorkflowStoreError::NotFound(id.clone()))?;
        self.compact()?;
        Ok(workflow)
    }

    /// Rewrite the log to one line per live row (tmp + atomic rename).
    pub fn compact(&mut self) -> Result<(), WorkflowStoreError> {
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            let mut ids: Vec<&WorkflowId> = self.rows.keys().collect();
            ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            for id in ids {
                let line = serde_json::to_vec(&self.rows[id])?;
                tmp.write_all(&line)?;
                tmp.write_all(b"\n")?;
            }
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        self.file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "workflow_store_tests.rs"]
mod tests;
