//! Node packaging.
//!
//! Layout of the build directory before it is zipped:
//!
//! ```text
//! package.json          {"type": "module"}
//! lambda/package.json   {}
//! lambda/handler.js     shim importing ../{entry}.js
//! node_modules/...      deps plus the baseline packages
//! {statics}
//! {src_files}.js        transpiled sources
//! ```

use tracing::{debug, info};

use crate::config::BuildConfig;
use crate::declaration::Declaration;
use crate::error::DeployResult;
use crate::toolchain::Toolchain;

use super::{archive, entry_module, statics, BuildPaths};

/// Packages installed into every node artifact after the declared deps.
pub const BASELINE_PACKAGES: [&str; 4] = ["core-js", "dotenv", "fs-extra", "severe"];

/// Entry-point shim forwarding the invocation to the entry module's
/// exported `handler`.
pub(crate) fn handler_shim(entry: &str) -> String {
    format!(
        "exports.handler = async (event, context) => {{\n  \
         const {{ handler }} = await import('../{entry}.js');\n  \
         return await handler(event, context);\n\
         }};\n"
    )
}

pub(super) async fn build(
    toolchain: &dyn Toolchain,
    config: &BuildConfig,
    decl: &Declaration,
    paths: &BuildPaths,
) -> DeployResult<()> {
    let build_dir = &paths.build_dir;
    let lambda_dir = build_dir.join("lambda");
    tokio::fs::create_dir_all(&lambda_dir).await?;

    tokio::fs::write(lambda_dir.join("package.json"), "{}").await?;
    tokio::fs::write(lambda_dir.join("handler.js"), handler_shim(entry_module(decl)?)).await?;
    tokio::fs::write(build_dir.join("package.json"), r#"{"type": "module"}"#).await?;

    let packages = decl
        .deps
        .iter()
        .map(String::as_str)
        .chain(BASELINE_PACKAGES);
    for package in packages {
        debug!(package, "installing node package");
        toolchain.node_install(build_dir, package).await?;
    }

    statics::copy_statics(&decl.statics, build_dir).await?;

    for src in &decl.src_files {
        let source = config.source_dir.join(format!("{src}.js"));
        debug!(source = %source.display(), "transpiling");
        toolchain.node_transpile(&source, build_dir).await?;
    }

    archive::zip_directory(build_dir, &paths.zip_path).await?;
    info!(
        deps = decl.deps.len(),
        sources = decl.src_files.len(),
        "node artifact assembled"
    );
    Ok(())
}
