//! Implementation of the upload, info, remove and invoke actions.

use anyhow::Context;
use serde_json::Value;
use severe_deploy::{DeclarationFile, DeployConfig, Deployer, ProcessEnv};
use tracing::info;

use crate::Action;

pub async fn run(
    file: &DeclarationFile,
    key: &str,
    action: Action,
    payload: Option<&str>,
    config: DeployConfig,
) -> anyhow::Result<()> {
    // Resolve before connecting so missing environment never reaches the network.
    let decl = file.resolve(key, &ProcessEnv)?;
    let payload = payload
        .map(|raw| {
            let value: Value = serde_json::from_str(raw).context("--payload is not valid JSON")?;
            serde_json::to_vec(&value).context("encoding payload")
        })
        .transpose()?;

    let deployer = Deployer::connect(&decl.upload_env, config).await?;
    let name = decl.function_name.as_str();

    match action {
        Action::Upload => {
            let report = deployer.deploy(&decl).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Action::Info => {
            let info = deployer.info(name).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Action::Remove => {
            let report = deployer.remove(name).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Action::Invoke => {
            let outcome = deployer.invoke(name, payload).await?;
            info!(status = outcome.status_code, "invocation returned");
            if let Some(error) = &outcome.function_error {
                eprintln!("Function error: {error}");
            }
            match serde_json::from_slice::<Value>(&outcome.payload) {
                Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                Err(_) => println!("{}", String::from_utf8_lossy(&outcome.payload)),
            }
        }
    }

    Ok(())
}
