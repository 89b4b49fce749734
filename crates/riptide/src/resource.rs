//! Engine limits.
//!
//! The engine has no preemption; these are the knobs hosts get instead: a
//! recursion depth bound (fatal on overflow), a per-evaluation deadline the
//! microtask drain loop refuses to run past, and the debug channel's
//! capacity and loss policy.

use std::time::Instant;

use crate::error::{FatalKind, RunError, RunResult};

/// Default interpreter recursion depth.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 256;

/// Default debug channel capacity.
pub const DEFAULT_DEBUG_CAPACITY: usize = 1024;

/// What the debug channel does when full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugLossPolicy {
    /// Evict the oldest queued message (the host sees the newest state).
    #[default]
    DropOldest,
    /// Refuse the new message (the host sees the run-up).
    DropNewest,
}

/// Engine construction options.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interpreter recursion depth before a fatal stack-overflow error.
    pub max_recursion_depth: usize,
    /// Debug channel capacity; the queue is lossy per `debug_loss_policy`.
    pub debug_capacity: usize,
    pub debug_loss_policy: DebugLossPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            debug_capacity: DEFAULT_DEBUG_CAPACITY,
            debug_loss_policy: DebugLossPolicy::default(),
        }
    }
}

/// Per-evaluation deadline handed down from the host call.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// Errs with the fatal deadline condition once elapsed.
    pub fn check(&self) -> RunResult<()> {
        match self.0 {
            Some(instant) if Instant::now() >= instant => Err(RunError::Fatal(FatalKind::Deadline)),
            _ => Ok(()),
        }
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }
}
