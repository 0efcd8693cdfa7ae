//! Clean command implementation

use anyhow::Result;
use kiln_core::Project;
use std::fs;
use std::path::{Component, Path};

use crate::cli::{CleanArgs, GlobalArgs};

/// Execute the clean command
pub async fn execute(args: &CleanArgs, global: &GlobalArgs) -> Result<()> {
    // no graph needed, a project with broken models can still be cleaned
    let project = Project::load(&global.project_dir)?;

    let clean_targets = if project.config.clean_targets.is_empty() {
        vec![project.config.target_path.clone()]
    } else {
        project.config.clean_targets.clone()
    };

    if args.dry_run {
        println!("Dry run - would clean the following directories:");
    } else {
        println!("Cleaning project: {}", project.config.name);
    }

    let mut cleaned_count = 0;
    let mut skipped_count = 0;

    for target in &clean_targets {
        let target_path = project.root.join(target);

        if !inside_project(target) {
            log::warn!("Refusing to clean {} outside the project", target_path.display());
            skipped_count += 1;
            continue;
        }

        if !target_path.exists() {
            if global.verbose {
                println!("  Skipping (not found): {}", target_path.display());
            }
            skipped_count += 1;
            continue;
        }

        if args.dry_run {
            println!("  Would remove: {}", target_path.display());
            cleaned_count += 1;
            continue;
        }

        match fs::remove_dir_all(&target_path) {
            Ok(_) => {
                println!("  Removed: {}", target_path.display());
                cleaned_count += 1;
            }
            Err(e) => {
                eprintln!("  Failed to remove {}: {}", target_path.display(), e);
            }
        }
    }

    println!();
    let noun = if cleaned_count == 1 { "directory" } else { "directories" };
    if args.dry_run {
        println!(
            "Would clean {} {}, {} not found",
            cleaned_count, noun, skipped_count
        );
    } else {
        println!("Cleaned {} {}, {} skipped", cleaned_count, noun, skipped_count);
    }

    Ok(())
}

/// Relative, non-empty and without `..` segments
fn inside_project(target: &str) -> bool {
    let path = Path::new(target);
    !target.trim().is_empty()
        && path.is_relative()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && path.components().any(|c| matches!(c, Component::Normal(_)))
}

#[cfg(test)]
#[path = "clean_test.rs"]
mod tests;
