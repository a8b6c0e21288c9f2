//! Phase events emitted while a deployment runs.
//!
//! The engine reports discrete named phases to a [`ProgressSink`] and never
//! renders output itself. [`TracingProgress`] forwards events to `tracing`.

use serde::Serialize;
use tracing::{error, info};

/// A named step of a deployment run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Declaration and environment validation.
    Validate,
    /// Destination queue reset.
    DestinationQueue,
    /// Remote function lookup and create/update/replace decision.
    FunctionCheck,
    /// Event-source mapping and function teardown.
    Teardown,
    /// Artifact build.
    Build,
    /// Artifact upload.
    Upload,
    /// Function create or update.
    FunctionApply,
    /// Schedule rule convergence.
    Triggers,
    /// Source queue wiring.
    SourceQueue,
}

impl Phase {
    /// Get the phase name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::DestinationQueue => "destination_queue",
            Self::FunctionCheck => "function_check",
            Self::Teardown => "teardown",
            Self::Build => "build",
            Self::Upload => "upload",
            Self::FunctionApply => "function_apply",
            Self::Triggers => "triggers",
            Self::SourceQueue => "source_queue",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseKind {
    /// The phase started.
    Start,
    /// The phase finished successfully.
    End,
    /// The phase failed.
    Error(String),
}

/// A single progress event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseEvent {
    /// Function the event belongs to.
    pub function: String,
    /// Phase the event refers to.
    pub phase: Phase,
    /// Start, end or error.
    pub kind: PhaseKind,
}

/// Receiver for deployment progress.
pub trait ProgressSink: Send + Sync {
    /// Handle one event.
    fn event(&self, event: PhaseEvent);
}

/// Progress sink that logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn event(&self, event: PhaseEvent) {
        match event.kind {
            PhaseKind::Start => info!(function = %event.function, phase = %event.phase, "phase started"),
            PhaseKind::End => info!(function = %event.function, phase = %event.phase, "phase finished"),
            PhaseKind::Error(message) => error!(
                function = %event.function,
                phase = %event.phase,
                error = %message,
                "phase failed"
            ),
        }
    }
}
