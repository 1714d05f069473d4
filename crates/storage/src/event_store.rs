// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSONL event log.
//!
//! One line of JSON per [`EventRecord`]. Appends are durable before
//! returning (write + fsync). An in-memory index keyed by workflow
//! serves the cursor and recency queries; it is rebuilt by scanning the
//! log on open. A corrupt tail is rotated to `.bak` and the valid prefix
//! preserved, so a torn write never blocks startup.

use amelia_core::{EventId, EventLevel, EventRecord, WorkflowId};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors from event store operations
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown workflow: {0}")]
    UnknownWorkflow(WorkflowId),
    #[error("sequence conflict for workflow {workflow_id}: expected {expected}, got {got}")]
    SequenceConflict {
        workflow_id: WorkflowId,
        expected: u64,
        got: u64,
    },
    #[error("cursor not found: {0}")]
    CursorNotFound(EventId),
}

/// Which rows a retention sweep targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeScope {
    All,
    Level(EventLevel),
    /// Everything except trace rows (they have their own window).
    NonTrace,
}

impl PurgeScope {
    fn matches(&self, record: &EventRecord) -> bool {
        match self {
            PurgeScope::All => true,
            PurgeScope::Level(level) => record.level == *level,
            PurgeScope::NonTrace => record.level != EventLevel::Trace,
        }
    }
}

/// Append-only event log with a per-workflow sequence index.
pub struct EventStore {
    file: File,
    path: PathBuf,
    /// Events per workflow, ascending by sequence.
    index: HashMap<WorkflowId, Vec<EventRecord>>,
    /// Cursor resolution: event id -> (workflow, sequence).
    by_id: HashMap<EventId, (WorkflowId, u64)>,
    /// Workflows that may receive appends.
    registered: HashSet<WorkflowId>,
}

impl EventStore {
    /// Open or create the event log at the given path.
    ///
    /// Workflows present in the log are auto-registered; freshly created
    /// workflows must be registered via [`EventStore::register_workflow`]
    /// before their first append.
    pub fn open(path: &Path) -> Result<Self, EventStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let (records, corrupt) = scan_log(&file)?;

        let file = if corrupt {
            drop(file);
            let bak_path = rotate_bak_path(path);
            warn!(
                path = %path.display(),
                bak = %bak_path.display(),
                valid_entries = records.len(),
                "Corrupt event log detected, rotating to .bak and preserving valid entries",
            );
            std::fs::rename(path, &bak_path)?;

            let mut new_file = File::create(path)?;
            for record in &records {
                let line = serde_json::to_vec(record)?;
                new_file.write_all(&line)?;
                new_file.write_all(b"\n")?;
            }
            new_file.sync_all()?;
            drop(new_file);

            OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(path)?
        } else {
            file
        };

        let mut store = Self {
            file,
            path: path.to_owned(),
            index: HashMap::new(),
            by_id: HashMap::new(),
            registered: HashSet::new(),
        };
        for record in records {
            store.registered.insert(record.workflow_id.clone());
            store.index_record(record);
        }
        // Replayed lines may interleave across workflows but must end up
        // sequence-ordered within each.
        for events in store.index.values_mut() {
            events.sort_by_key(|e| e.sequence);
        }
        Ok(store)
    }

    /// Allow appends for a workflow.
    pub fn register_workflow(&mut self, workflow_id: &WorkflowId) {
        self.registered.insert(workflow_id.clone());
    }

    /// Next unused sequence for a workflow (starts at 1).
    ///
    /// Callers assigning sequences must hold the per-workflow emit lock
    /// across `next_sequence` and `append`.
    pub fn next_sequence(&self, workflow_id: &WorkflowId) -> u64 {
        self.index
            .get(workflow_id)
            .and_then(|events| events.last())
            .map(|e| e.sequence + 1)
            .unwrap_or(1)
    }

    /// Append one event. Durable before returning.
    ///
    /// Fails if the workflow is unregistered or the sequence is not the
    /// next expected value for that workflow.
    pub fn append(&mut self, record: &EventRecord) -> Result<(), EventStoreError> {
        if !self.registered.contains(&record.workflow_id) {
            return Err(EventStoreError::UnknownWorkflow(record.workflow_id.clone()));
        }
        let expected = self.next_sequence(&record.workflow_id);
        if record.sequence != expected {
            return Err(EventStoreError::SequenceConflict {
                workflow_id: record.workflow_id.clone(),
                expected,
                got: record.sequence,
            });
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_data()?;

        self.index_record(record.clone());
        Ok(())
    }

    /// Resolve a cursor to its `(workflow, sequence)` position.
    pub fn resolve_cursor(
        &self,
        cursor: &EventId,
    ) -> Result<(WorkflowId, u64), EventStoreError> {
        self.by_id
            .get(cursor)
            .cloned()
            .ok_or_else(|| EventStoreError::CursorNotFound(cursor.clone()))
    }

    /// Events of one workflow with a higher sequence than the cursor's,
    /// in strictly ascending sequence order, up to `limit`.
    pub fn list_after(
        &self,
        cursor: &EventId,
        limit: usize,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        let (workflow_id, sequence) = self
            .by_id
            .get(cursor)
            .cloned()
            .ok_or_else(|| EventStoreError::CursorNotFound(cursor.clone()))?;
        Ok(self.after_sequence(&workflow_id, sequence, limit))
    }

    /// Events of one workflow after the given sequence, ascending.
    pub fn after_sequence(
        &self,
        workflow_id: &WorkflowId,
        sequence: u64,
        limit: usize,
    ) -> Vec<EventRecord> {
        let Some(events) = self.index.get(workflow_id) else {
            return Vec::new();
        };
        let start = events.partition_point(|e| e.sequence <= sequence);
        events[start..].iter().take(limit).cloned().collect()
    }

    /// The most recent `limit` events of a workflow, ascending.
    pub fn recent(&self, workflow_id: &WorkflowId, limit: usize) -> Vec<EventRecord> {
        let Some(events) = self.index.get(workflow_id) else {
            return Vec::new();
        };
        let skip = events.len().saturating_sub(limit);
        events[skip..].to_vec()
    }

    /// Total number of events matching a scope (across workflows).
    pub fn count(&self, scope: PurgeScope) -> usize {
        self.index
            .values()
            .flat_map(|events| events.iter())
            .filter(|e| scope.matches(e))
            .count()
    }

    /// Retention sweep: delete scope-matching events older than `cutoff`,
    /// then (if `max_kept` is set) trim the oldest matching rows until at
    /// most `max_kept` remain. Returns the number deleted.
    ///
    /// The log is rewritten through a tmp file and atomically renamed, so
    /// a crash mid-sweep loses nothing.
    pub fn purge_older_than(
        &mut self,
        cutoff: DateTime<Utc>,
        max_kept: Option<usize>,
        scope: PurgeScope,
    ) -> Result<usize, EventStoreError> {
        let mut doomed: HashSet<EventId> = HashSet::new();

        for events in self.index.values() {
            for event in events {
                if scope.matches(event) && event.timestamp < cutoff {
                    doomed.insert(event.id.clone());
                }
            }
        }

        if let Some(max_kept) = max_kept {
            // Oldest-first list of surviving matches, trimmed down to the cap.
            let mut survivors: Vec<(&DateTime<Utc>, &EventId)> = self
                .index
                .values()
                .flat_map(|events| events.iter())
                .filter(|e| scope.matches(e) && !doomed.contains(&e.id))
                .map(|e| (&e.timestamp, &e.id))
                .collect();
            if survivors.len() > max_kept {
                survivors.sort_by_key(|(ts, _)| **ts);
                let excess = survivors.len() - max_kept;
                for (_, id) in survivors.into_iter().take(excess) {
                    doomed.insert(id.clone());
                }
            }
        }

        if doomed.is_empty() {
            return Ok(0);
        }

        let deleted = doomed.len();
        for events in self.index.values_mut() {
            events.retain(|e| !doomed.contains(&e.id));
        }
        self.index.retain(|_, events| !events.is_empty());
        for id in &doomed {
            self.by_id.remove(id);
        }
        self.rewrite()?;
        Ok(deleted)
    }

    /// Cascade delete: remove a workflow's entire event stream and
    /// unregister it. Returns the number of events removed.
    pub fn remove_workflow(&mut self, workflow_id: &WorkflowId) -> Result<usize, EventStoreError> {
        self.registered.remove(workflow_id);
        let Some(events) = self.index.remove(workflow_id) else {
            return Ok(0);
        };
        for event in &events {
            self.by_id.remove(&event.id);
        }
        self.rewrite()?;
        Ok(events.len())
    }

    fn index_record(&mut self, record: EventRecord) {
        self.by_id.insert(
            record.id.clone(),
            (record.workflow_id.clone(), record.sequence),
        );
        self.index
            .entry(record.workflow_id.clone())
            .or_default()
            .push(record);
    }

    /// Rewrite the log from the in-memory index (tmp + atomic rename).
    fn rewrite(&mut self) -> Result<(), EventStoreError> {
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            let mut workflows: Vec<&WorkflowId> = self.index.keys().collect();
            workflows.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            for workflow_id in workflows {
                for record in &self.index[workflow_id] {
                    let line = serde_json::to_vec(record)?;
                    tmp.write_all(&line)?;
                    tmp.write_all(b"\n")?;
                }
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

/// Scan the log, returning all parseable records and whether a corrupt
/// entry was hit (parse failure, not EOF).
fn scan_log(file: &File) -> Result<(Vec<EventRecord>, bool), EventStoreError> {
    let mut reader = BufReader::new(file.try_clone()?);
    reader.seek(SeekFrom::Start(0))?;

    let mut records = Vec::new();
    let mut corrupt = false;
    let mut line = String::new();

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

        match serde_json::from_str::<EventRecord>(trimmed) {
            Ok(record) => records.push(record),
            Err(_) => {
                corrupt = true;
                break;
            }
        }
    }

    Ok((records, corrupt))
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`.
/// The oldest backup is removed when the limit is reached.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = std::fs::remove_file(&oldest);
    }

    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = std::fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
#[path = "event_store_tests.rs"]
mod tests;
