//! Listing declaration keys and their actions.

use clap::ValueEnum;
use severe_deploy::DeclarationFile;

use crate::Action;

/// Print valid and invalid declaration keys.
pub fn list(file: &DeclarationFile) {
    let (valid, invalid) = file.partition();

    println!("Declarations:");
    if valid.is_empty() {
        println!("  (none)");
    }
    for key in &valid {
        println!("  {key}");
    }

    if !invalid.is_empty() {
        println!();
        println!("Incomplete (need function_name, runtime, src_files, upload_env, exe_env):");
        for key in &invalid {
            println!("  {key}");
        }
    }
}

/// Print the actions available for `key`.
pub fn actions(key: &str) {
    println!("Actions for {key}:");
    for action in Action::value_variants() {
        if let Some(value) = action.to_possible_value() {
            let help = value.get_help().map(ToString::to_string).unwrap_or_default();
            println!("  severe {key} {:<8} {help}", value.get_name());
        }
    }
}
