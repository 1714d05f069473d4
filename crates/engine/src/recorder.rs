// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sequence assignment and emission.
//!
//! Per workflow, events reach the store and the live sink in
//! monotonically increasing sequence order. The recorder guarantees
//! this by holding a per-workflow async mutex across
//! `next_sequence → append → broadcast`. Across workflows there is no
//! ordering guarantee and no shared lock, so trace fan-out on one
//! workflow never stalls another.

use crate::bus::EventBus;
use crate::error::OrchestratorError;
use amelia_core::{Clock, EventDraft, EventId, EventRecord, IdGen, WorkflowId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct EventRecorder<C: Clock, G: IdGen> {
    bus: EventBus,
    clock: C,
    id_gen: G,
    locks: Arc<Mutex<HashMap<WorkflowId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl<C: Clock, G: IdGen> EventRecorder<C, G> {
    pub fn new(bus: EventBus, clock: C, id_gen: G) -> Self {
        Self {
            bus,
            clock,
            id_gen,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Stamp and emit a draft.
    ///
    /// Unpersisted trace events (trace retention disabled) bypass the
    /// sequence counter entirely: they carry sequence 0 and only reach
    /// the live sink, so the stored stream stays contiguous.
    pub async fn record(&self, draft: EventDraft) -> Result<EventRecord, OrchestratorError> {
        let id = EventId::new(self.id_gen.next());

        if draft.event_type.is_trace() && !self.bus.trace_persistence() {
            let record = draft.into_record(id, 0, self.clock.utc_now());
            self.bus.broadcast_only(&record);
            return Ok(record);
        }

        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(draft.workflow_id.clone()).or_default())
        };
        let _guard = lock.lock().await;

        let sequence = self.bus.next_sequence(&draft.workflow_id);
        let record = draft.into_record(id, sequence, self.clock.utc_now());
        self.bus.emit(&record)?;
        Ok(record)
    }

    /// Drop the per-workflow lock entry once a workflow is terminal.
    pub fn forget_workflow(&self, workflow_id: &WorkflowId) {
        self.locks.lock().remove(workflow_id);
    }
}

#[cfg(test)]
#[path = "recorder_tests.rs"]
mod tests;
