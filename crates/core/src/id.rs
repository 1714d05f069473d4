// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifiers for the orchestrator's domain objects.
//!
//! Four string-backed IDs cover the domain: [`WorkflowId`] names a run
//! of the pipeline, [`EventId`] one record in its history (and doubles
//! as the WebSocket backfill cursor), [`ProfileId`] the configuration
//! profile a run was created under, and [`CallId`] a tool invocation
//! inside a driver stream. Production IDs come from [`UuidIdGen`];
//! tests substitute [`SequentialIdGen`] for predictable values.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `short()`, `Display`, `From<String>`, `From<&str>`,
/// `PartialEq<str>`, `PartialEq<&str>`, and `Borrow<str>` implementations.
///
/// ```ignore
/// define_id! {
///     /// A run of the architect/developer/reviewer pipeline.
///     pub struct WorkflowId;
/// }
///
/// // With extra derives (e.g. Default):
/// define_id! {
///     #[derive(Default)]
///     pub struct ProfileId;
/// }
/// ```
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns a string slice truncated to at most `n` characters.
            pub fn short(&self, n: usize) -> &str {
                if self.0.len() <= n {
                    &self.0
                } else {
                    &self.0[..n]
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a workflow run.
    ///
    /// One workflow is one run of Architect → Developer → Reviewer for
    /// one issue on one worktree. The ID keys the event stream, the
    /// checkpoint file, and the per-workflow emit lock.
    #[derive(Default)]
    pub struct WorkflowId;
}

define_id! {
    /// Unique identifier for an event record.
    ///
    /// Handed to WebSocket clients as the `?since=` cursor; a purged ID
    /// resolving to nothing is how `backfill_expired` is detected.
    pub struct EventId;
}

define_id! {
    /// Identifier for a configuration profile.
    #[derive(Default)]
    pub struct ProfileId;
}

define_id! {
    /// Identifier for a tool call inside a driver stream.
    ///
    /// Pairs a `tool_call` message with its `tool_result`; surfaces on
    /// trace events as the correlation ID.
    pub struct CallId;
}

/// Trait for truncating identifiers to a short prefix.
///
/// Log summaries print 8-character workflow prefixes rather than full
/// UUIDs; this covers plain strings the same way the ID types' inherent
/// `short()` covers them.
pub trait ShortId {
    /// Returns a string slice truncated to at most `n` characters.
    fn short(&self, n: usize) -> &str;
}

impl ShortId for str {
    fn short(&self, n: usize) -> &str {
        if self.len() <= n {
            self
        } else {
            &self[..n]
        }
    }
}

/// Generates unique identifiers
pub trait IdGen: Clone + Send + Sync {
    fn next(&self) -> String;
}

/// UUID-based ID generator for production use.
///
/// The daemon stamps workflow and event IDs from this one generator.
#[derive(Clone, Default)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn next(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Sequential ID generator for testing
#[derive(Clone)]
pub struct SequentialIdGen {
    prefix: String,
    counter: Arc<AtomicU64>,
}

impl SequentialIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for SequentialIdGen {
    fn default() -> Self {
        Self::new("id")
    }
}

impl IdGen for SequentialIdGen {
    fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
