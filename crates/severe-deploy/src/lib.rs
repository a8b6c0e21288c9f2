//! Deployment reconciliation engine for serverless functions.
//!
//! Given a [`Declaration`] of one function, a [`Deployer`] builds a
//! runtime-specific artifact, uploads it, creates, updates or replaces
//! the function so it matches the declaration, and converges the
//! function's schedule rules and queues. Running the same declaration
//! twice leaves the platform unchanged.
//!
//! # Example
//!
//! ```ignore
//! use severe_deploy::{DeclarationFile, DeployConfig, Deployer, ProcessEnv};
//!
//! let config = DeployConfig::load()?;
//! let file = DeclarationFile::load(&config.declarations)?;
//! let decl = file.resolve("mailer", &ProcessEnv)?;
//!
//! let deployer = Deployer::connect(&decl.upload_env, config).await?;
//! let report = deployer.deploy(&decl).await?;
//! println!("{} is live at {}", report.function_name, report.function_arn);
//! ```

#![forbid(unsafe_code)]

pub mod artifact;
pub mod config;
pub mod declaration;
pub mod error;
pub mod function;
pub mod orchestrator;
pub mod platform;
pub mod progress;
pub mod queue;
pub mod remote;
pub mod settle;
pub mod toolchain;
pub mod trigger;

pub use artifact::{Artifact, ArtifactBuilder, BuildPaths};
pub use config::{BuildConfig, DeployConfig, QueueConfig, SettleConfig};
pub use declaration::{
    Cadence, Declaration, DeclarationFile, EnvSource, ProcessEnv, RawDeclaration, RawSchedule,
    Runtime, RuntimeFamily, Schedule, UploadEnv,
};
pub use error::{DeployError, DeployResult, PlatformError, PlatformResult};
pub use function::{FunctionAction, FunctionPlan, FunctionReconciler};
pub use orchestrator::{DeployReport, Deployer, FunctionInfo, RemovalReport};
pub use platform::{MemoryPlatform, PlatformClients};
pub use progress::{Phase, PhaseEvent, PhaseKind, ProgressSink, TracingProgress};
pub use queue::QueueProvisioner;
pub use remote::RemoteFunctionState;
pub use toolchain::{ProcessToolchain, Toolchain};
pub use trigger::{TriggerReconciler, TriggerRule};
