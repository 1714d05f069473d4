//! Behavioral specifications for the Amelia orchestrator.
//!
//! These tests drive the engine and HTTP surface the way the dashboard
//! does: REST requests against the router, fake drivers behind the
//! orchestrator, and direct assertions on the stores.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

// workflow/
#[path = "specs/workflow/happy_path.rs"]
mod workflow_happy_path;
#[path = "specs/workflow/exclusivity.rs"]
mod workflow_exclusivity;
#[path = "specs/workflow/rejection.rs"]
mod workflow_rejection;
#[path = "specs/workflow/review_loop.rs"]
mod workflow_review_loop;
#[path = "specs/workflow/cancellation.rs"]
mod workflow_cancellation;

// events/
#[path = "specs/backfill.rs"]
mod backfill;
#[path = "specs/retention.rs"]
mod retention;
