//! Command dispatch.

pub mod keys;
pub mod lifecycle;

use anyhow::{bail, Context};
use severe_deploy::{DeclarationFile, DeployConfig};

use crate::{Action, Cli};

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => DeployConfig::from_file(path)?,
        None => DeployConfig::load()?,
    };
    let file = DeclarationFile::load(&config.declarations)
        .with_context(|| format!("loading {}", config.declarations.display()))?;

    let Some(key) = cli.key else {
        keys::list(&file);
        return Ok(());
    };

    let (valid, _) = file.partition();
    if !valid.contains(&key) {
        bail!("{key} is not a valid declaration key; run `severe` to list them");
    }

    let Some(action) = cli.action else {
        keys::actions(&key);
        return Ok(());
    };
    if cli.payload.is_some() && action != Action::Invoke {
        bail!("--payload is only accepted by invoke");
    }

    lifecycle::run(&file, &key, action, cli.payload.as_deref(), config).await
}
