//! Remote function state.

use serde::Serialize;
use tracing::debug;

use crate::error::{DeployResult, PlatformError};
use crate::platform::{FunctionApi, FunctionConfiguration};

/// What the platform currently holds under a function name.
///
/// Always read fresh; never cached across mutations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoteFunctionState {
    /// Whether a function with this name exists.
    pub exists: bool,
    /// Live runtime tag.
    pub runtime: Option<String>,
    /// Region taken from the live ARN.
    pub region: Option<String>,
    /// Live ARN.
    pub arn: Option<String>,
}

impl RemoteFunctionState {
    /// No function under this name.
    #[must_use]
    pub fn absent() -> Self {
        Self::default()
    }

    /// State of an existing function.
    #[must_use]
    pub fn from_configuration(config: &FunctionConfiguration) -> Self {
        Self {
            exists: true,
            runtime: config.runtime.clone(),
            region: config.region().map(ToOwned::to_owned),
            arn: Some(config.arn.clone()),
        }
    }

    /// Whether the live function can be updated in place for `runtime` in
    /// `region`. Absent functions are never compatible.
    #[must_use]
    pub fn is_compatible(&self, runtime: &str, region: &str) -> bool {
        self.exists
            && self.runtime.as_deref() == Some(runtime)
            && self.region.as_deref() == Some(region)
    }
}

/// Read the current state of `name`. A missing function is not an error.
pub async fn read_function_state(
    functions: &dyn FunctionApi,
    name: &str,
) -> DeployResult<RemoteFunctionState> {
    let state = match functions.get_function(name).await? {
        Some(config) => RemoteFunctionState::from_configuration(&config),
        None => RemoteFunctionState::absent(),
    };
    debug!(
        function = %name,
        exists = state.exists,
        runtime = ?state.runtime,
        region = ?state.region,
        "read remote function state"
    );
    Ok(state)
}

/// Read the ARN of a function that must exist.
pub async fn require_arn(functions: &dyn FunctionApi, name: &str) -> DeployResult<String> {
    read_function_state(functions, name)
        .await?
        .arn
        .filter(|arn| !arn.is_empty())
        .ok_or_else(|| PlatformError::not_found("function", name).into())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn config(arn: &str, runtime: &str) -> FunctionConfiguration {
        FunctionConfiguration {
            name: "mailer".to_owned(),
            arn: arn.to_owned(),
            runtime: Some(runtime.to_owned()),
            handler: None,
            timeout: None,
            memory_size: None,
            role: None,
            layers: Vec::new(),
            environment: BTreeMap::new(),
        }
    }

    #[test]
    fn compatibility_requires_runtime_and_region() {
        let state = RemoteFunctionState::from_configuration(&config(
            "arn:aws:lambda:eu-west-1:1:function:mailer",
            "python3.12",
        ));

        assert!(state.is_compatible("python3.12", "eu-west-1"));
        assert!(!state.is_compatible("python3.9", "eu-west-1"));
        assert!(!state.is_compatible("python3.12", "us-east-1"));
        assert!(!RemoteFunctionState::absent().is_compatible("python3.12", "eu-west-1"));
    }
}
