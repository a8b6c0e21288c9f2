//! Function reconciliation.
//!
//! A function is created when absent, updated in place when the live
//! runtime and region match the declaration, and otherwise replaced:
//! its event-source mappings are torn down, it is deleted, and it is
//! created again once the deletion has settled.

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::SettleConfig;
use crate::declaration::Declaration;
use crate::error::{DeployError, DeployResult};
use crate::platform::{CodeLocation, FunctionApi, FunctionSpec};
use crate::queue;
use crate::remote::{read_function_state, require_arn, RemoteFunctionState};
use crate::settle::wait_until;

/// What the reconciler will do to the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionAction {
    /// No function exists; create it.
    Create,
    /// A compatible function exists; update code, then configuration.
    Update,
    /// An incompatible function exists; delete it and create it again.
    Replace,
}

impl FunctionAction {
    /// Choose the action for a declaration given the live state.
    #[must_use]
    pub fn decide(remote: &RemoteFunctionState, decl: &Declaration) -> Self {
        if !remote.exists {
            Self::Create
        } else if remote.is_compatible(
            decl.runtime.as_str(),
            decl.upload_env.artifact_region(),
        ) {
            Self::Update
        } else {
            Self::Replace
        }
    }

    /// Get the action name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
        }
    }
}

impl std::fmt::Display for FunctionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the existence/compatibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionPlan {
    /// Live state at the time of the check.
    pub remote: RemoteFunctionState,
    /// Chosen action.
    pub action: FunctionAction,
}

/// Drives one function resource to its declared state.
pub struct FunctionReconciler<'a> {
    functions: &'a dyn FunctionApi,
    settle: &'a SettleConfig,
}

impl<'a> FunctionReconciler<'a> {
    /// Create a reconciler over a function client.
    #[must_use]
    pub fn new(functions: &'a dyn FunctionApi, settle: &'a SettleConfig) -> Self {
        Self { functions, settle }
    }

    /// Read the live function and decide what to do.
    #[instrument(skip_all, fields(function = %decl.function_name))]
    pub async fn check(&self, decl: &Declaration) -> DeployResult<FunctionPlan> {
        let remote = read_function_state(self.functions, &decl.function_name).await?;
        let action = FunctionAction::decide(&remote, decl);

        if action == FunctionAction::Replace {
            warn!(
                live_runtime = ?remote.runtime,
                live_region = ?remote.region,
                runtime = %decl.runtime,
                region = %decl.upload_env.artifact_region(),
                "live function is incompatible, replacing"
            );
        }
        info!(action = %action, "function check complete");
        Ok(FunctionPlan { remote, action })
    }

    /// Clear the way for [`FunctionReconciler::apply`].
    ///
    /// Any existing function loses all its event-source mappings. A
    /// function being replaced is then deleted, and this returns only
    /// once the platform no longer reports it.
    #[instrument(skip_all, fields(function = %decl.function_name, action = %plan.action))]
    pub async fn teardown(&self, decl: &Declaration, plan: &FunctionPlan) -> DeployResult<()> {
        if !plan.remote.exists {
            return Ok(());
        }

        queue::teardown_mappings(self.functions, &decl.function_name, self.settle).await?;

        if plan.action == FunctionAction::Replace {
            self.delete(&decl.function_name).await?;
        }
        Ok(())
    }

    /// Delete a function and wait for the deletion to settle.
    pub async fn delete(&self, name: &str) -> DeployResult<()> {
        match self.functions.delete_function(name).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }
        wait_until(&format!("deletion of function {name}"), self.settle, || async {
            let live = self.functions.get_function(name).await?;
            Ok::<_, DeployError>(live.is_none())
        })
        .await?;

        info!(function = %name, "function deleted");
        Ok(())
    }

    /// Create or update the function so it runs the uploaded code with the
    /// declared configuration. Returns the freshly read ARN.
    #[instrument(skip_all, fields(function = %decl.function_name, action = %action))]
    pub async fn apply(
        &self,
        decl: &Declaration,
        action: FunctionAction,
        code: &CodeLocation,
    ) -> DeployResult<String> {
        let spec = FunctionSpec::from_declaration(decl);

        match action {
            FunctionAction::Create | FunctionAction::Replace => {
                self.functions.create_function(&spec, code).await?;
            }
            FunctionAction::Update => {
                // Not atomic: a failure here leaves new code with old configuration.
                self.functions
                    .update_function_code(&spec.name, code)
                    .await?;
                self.functions.update_function_configuration(&spec).await?;
            }
        }

        let arn = require_arn(self.functions, &decl.function_name).await?;
        info!(arn = %arn, "function is live");
        Ok(arn)
    }
}
