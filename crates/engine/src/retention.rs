// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention sweeps.
//!
//! Two independent windows: non-trace events age out under
//! `log_retention_days` and are then count-trimmed to
//! `log_retention_max_events`; trace events live under the separate,
//! shorter `trace_retention_days` window (`0` disables trace
//! persistence entirely, so the sweep only needs to clear strays).
//! Checkpoints and the workflow log are tidied in the same pass.
//! Every step logs failures and continues; retention never takes the
//! process down.

use amelia_core::Clock;
use amelia_storage::{CheckpointStore, EventStore, PurgeScope, WorkflowStore};
use amelia_core::EventLevel;
use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub log_retention_days: i64,
    pub log_retention_max_events: usize,
    /// `0` disables trace persistence.
    pub trace_retention_days: i64,
    pub checkpoint_retention_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            log_retention_days: 30,
            log_retention_max_events: 100_000,
            trace_retention_days: 7,
            checkpoint_retention_days: 7,
        }
    }
}

impl RetentionConfig {
    pub fn trace_persistence(&self) -> bool {
        self.trace_retention_days != 0
    }
}

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub events_deleted: usize,
    pub traces_deleted: usize,
    pub checkpoints_removed: usize,
}

pub struct RetentionService<C: Clock> {
    events: Arc<Mutex<EventStore>>,
    workflows: Arc<Mutex<WorkflowStore>>,
    checkpoints: CheckpointStore,
    config: RetentionConfig,
    clock: C,
}

impl<C: Clock> RetentionService<C> {
    pub fn new(
        events: Arc<Mutex<EventStore>>,
        workflows: Arc<Mutex<WorkflowStore>>,
        checkpoints: CheckpointStore,
        config: RetentionConfig,
        clock: C,
    ) -> Self {
        Self {
            events,
            workflows,
            checkpoints,
            config,
            clock,
        }
    }

    /// Run one full sweep.
    pub fn run(&self) -> RetentionReport {
        let mut report = RetentionReport::default();
        let now = self.clock.utc_now();

        // Non-trace events: age, then count cap.
        let log_cutoff = now - ChronoDuration::days(self.config.log_retention_days);
        match self.events.lock().purge_older_than(
            log_cutoff,
            Some(self.config.log_retention_max_events),
            PurgeScope::NonTrace,
        ) {
            Ok(deleted) => report.events_deleted = deleted,
            Err(e) => warn!(error = %e, "event retention sweep failed"),
        }

        // Trace events: separate window. With persistence disabled the
        // store should hold none; sweep everything to be sure.
        let trace_cutoff = if self.config.trace_persistence() {
            now - ChronoDuration::days(self.config.trace_retention_days)
        } else {
            now + ChronoDuration::days(1)
        };
        match self.events.lock().purge_older_than(
            trace_cutoff,
            None,
            PurgeScope::Level(EventLevel::Trace),
        ) {
            Ok(deleted) => report.traces_deleted = deleted,
            Err(e) => warn!(error = %e, "trace retention sweep failed"),
        }

        let checkpoint_cutoff = now - ChronoDuration::days(self.config.checkpoint_retention_days);
        match self.checkpoints.prune_older_than(checkpoint_cutoff) {
            Ok(removed) => report.checkpoints_removed = removed,
            Err(e) => warn!(error = %e, "checkpoint prune failed"),
        }

        if let Err(e) = self.workflows.lock().compact() {
            warn!(error = %e, "workflow log compaction failed");
        }

        info!(
            events_deleted = report.events_deleted,
            traces_deleted = report.traces_deleted,
            checkpoints_removed = report.checkpoints_removed,
            "retention sweep complete"
        );
        report
    }
}

#[cfg(test)]
#[path = "retention_tests.rs"]
mod tests;
