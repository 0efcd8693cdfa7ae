//! Deps command implementation: copy local packages into the modules path

use anyhow::{Context, Result};
use kiln_core::{Package, ProjectConfig};
use std::fs;
use std::path::Path;

use crate::cli::GlobalArgs;

/// Execute the deps command
pub async fn execute(global: &GlobalArgs) -> Result<()> {
    let root = &global.project_dir;
    let config = ProjectConfig::load_from_dir(root)?;
    if config.packages.is_empty() {
        println!("No packages declared.");
        return Ok(());
    }

    let modules = root.join(&config.modules_path);
    fs::create_dir_all(&modules)
        .with_context(|| format!("Failed to create {}", modules.display()))?;

    for spec in &config.packages {
        let source = root.join(&spec.local);
        let package = Package::load(&source)
            .with_context(|| format!("Failed to load package at {}", source.display()))?;
        let destination = modules.join(&package.name);
        if destination.exists() {
            fs::remove_dir_all(&destination)
                .with_context(|| format!("Failed to remove {}", destination.display()))?;
        }
        let skip = [
            package.config.target_path.as_str(),
            package.config.modules_path.as_str(),
        ];
        copy_dir(&source, &destination, &skip)
            .with_context(|| format!("Failed to install '{}'", package.name))?;
        println!("  Installed {} -> {}", package.name, destination.display());
    }
    Ok(())
}

/// Recursive copy. Top-level entries named in `skip` and hidden entries are
/// left behind.
fn copy_dir(from: &Path, to: &Path, skip: &[&str]) -> std::io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if name_str.starts_with('.') || skip.contains(&name_str.as_ref()) {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            copy_dir(&path, &to.join(&name), &[])?;
        } else {
            fs::copy(&path, to.join(&name))?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "deps_test.rs"]
mod tests;
