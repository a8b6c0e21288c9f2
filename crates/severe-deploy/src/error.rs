//! Error types for severe-deploy.

use std::time::Duration;

use thiserror::Error;

use crate::progress::Phase;

/// Result type alias using [`DeployError`].
pub type DeployResult<T> = Result<T, DeployError>;

/// Result type alias for platform client calls.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Errors surfaced by a platform client.
///
/// Implementations translate SDK-specific failures into these three
/// cases so the reconcilers never see vendor error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// The named resource does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Resource kind (function, queue, rule, ...).
        kind: &'static str,
        /// Resource name or identifier.
        name: String,
    },

    /// The resource already exists or is in a conflicting state.
    #[error("{operation} conflicted: {message}")]
    Conflict {
        /// Remote operation that failed.
        operation: &'static str,
        /// Platform message.
        message: String,
    },

    /// Any other remote failure.
    #[error("{operation} failed: {message}")]
    Service {
        /// Remote operation that failed.
        operation: &'static str,
        /// Platform message.
        message: String,
    },
}

impl PlatformError {
    /// Create a not-found error.
    #[must_use]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create a conflict error.
    #[must_use]
    pub fn conflict(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Conflict {
            operation,
            message: message.into(),
        }
    }

    /// Create a service error.
    #[must_use]
    pub fn service(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Service {
            operation,
            message: message.into(),
        }
    }

    /// Whether this is a not-found signal.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this is a conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Errors that can occur while deploying a function.
#[derive(Debug, Error)]
pub enum DeployError {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration errors
    // ─────────────────────────────────────────────────────────────────────────
    /// A required environment key is unset or empty.
    #[error("{scope} is missing required key {key}")]
    MissingEnv {
        /// Which environment mapping the key belongs to.
        scope: &'static str,
        /// The missing key.
        key: String,
    },

    /// The runtime tag does not select a packaging strategy.
    #[error("unsupported runtime: {0}")]
    UnsupportedRuntime(String),

    /// A schedule entry is malformed.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// The declaration is structurally invalid.
    #[error("invalid declaration: {0}")]
    InvalidDeclaration(String),

    /// Failed to load tool configuration or the declaration file.
    #[error("configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────────────────
    // Remote errors
    // ─────────────────────────────────────────────────────────────────────────
    /// A platform call failed.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// An asynchronous deletion did not settle in time.
    #[error("timed out after {limit:?} waiting for {what}")]
    Timeout {
        /// What was being waited for.
        what: String,
        /// Timeout limit.
        limit: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Local build errors
    // ─────────────────────────────────────────────────────────────────────────
    /// An external packaging tool failed.
    #[error("`{command}` failed (exit code {exit_code}): {stderr}")]
    Toolchain {
        /// The command line that was run.
        command: String,
        /// Exit code.
        exit_code: i32,
        /// Captured stderr.
        stderr: String,
    },

    /// Writing the archive failed.
    #[error("archive error: {0}")]
    Archive(String),

    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────────────────
    // Context
    // ─────────────────────────────────────────────────────────────────────────
    /// A failure annotated with the function and phase it happened in.
    #[error("deploying {function} failed during {phase}: {source}")]
    Phase {
        /// Function being deployed.
        function: String,
        /// Phase that failed.
        phase: Phase,
        /// Underlying error.
        #[source]
        source: Box<DeployError>,
    },
}

impl DeployError {
    /// Create a missing-env error.
    #[must_use]
    pub fn missing_env(scope: &'static str, key: impl Into<String>) -> Self {
        Self::MissingEnv {
            scope,
            key: key.into(),
        }
    }

    /// Attach function/phase context to this error.
    #[must_use]
    pub fn in_phase(self, function: impl Into<String>, phase: Phase) -> Self {
        match self {
            already @ Self::Phase { .. } => already,
            other => Self::Phase {
                function: function.into(),
                phase,
                source: Box::new(other),
            },
        }
    }

    /// Strip any phase context and return the underlying error.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Phase { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this is a configuration error (always fatal, never remote).
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.root(),
            Self::MissingEnv { .. }
                | Self::UnsupportedRuntime(_)
                | Self::InvalidSchedule(_)
                | Self::InvalidDeclaration(_)
                | Self::Config(_)
        )
    }

    /// The phase this error was raised in, if known.
    #[must_use]
    pub const fn phase(&self) -> Option<Phase> {
        match self {
            Self::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

impl From<figment::Error> for DeployError {
    fn from(e: figment::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<zip::result::ZipError> for DeployError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Archive(e.to_string())
    }
}
