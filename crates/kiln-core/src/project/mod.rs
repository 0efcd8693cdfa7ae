//! Project discovery and loading

mod loading;

use crate::config::ProjectConfig;
use std::path::{Path, PathBuf};

pub use loading::{MacroFile, DATA_TAG};

/// A project or installed package: a directory with its own project file
#[derive(Debug, Clone)]
pub struct Package {
    /// Package name (the `name` in its project file)
    pub name: String,
    /// Package root directory
    pub root: PathBuf,
    /// Package configuration
    pub config: ProjectConfig,
}

/// Represents a kiln project together with its installed packages
#[derive(Debug)]
pub struct Project {
    /// Project root directory
    pub root: PathBuf,

    /// Root project configuration
    pub config: ProjectConfig,

    /// Root package first, then dependencies sorted by name
    pub packages: Vec<Package>,
}

impl Project {
    /// The root project as a package
    pub fn root_package(&self) -> &Package {
        &self.packages[0]
    }

    /// Find a package by name
    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Names of every loaded package
    pub fn package_names(&self) -> Vec<&str> {
        self.packages.iter().map(|p| p.name.as_str()).collect()
    }

    /// Where artifacts are written
    pub fn target_dir(&self) -> PathBuf {
        self.root.join(&self.config.target_path)
    }

    /// Where compiled SQL for each node is written
    pub fn build_dir(&self) -> PathBuf {
        self.target_dir().join("build")
    }

    /// Location of the serialized graph
    pub fn graph_path(&self) -> PathBuf {
        self.target_dir().join(crate::graph_file::GRAPH_FILE_NAME)
    }

    /// Where installed packages live
    pub fn modules_dir(&self) -> PathBuf {
        self.root.join(&self.config.modules_path)
    }
}

/// Build a fully-qualified name from a package and a path relative to a
/// source directory: `[package, dirs..., file stem]`.
pub fn fqn_for(package: &str, rel_path: &Path) -> Vec<String> {
    let mut fqn = vec![package.to_string()];
    if let Some(parent) = rel_path.parent() {
        fqn.extend(
            parent
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned()),
        );
    }
    if let Some(stem) = rel_path.file_stem() {
        fqn.push(stem.to_string_lossy().into_owned());
    }
    fqn
}

#[cfg(test)]
#[path = "project_test.rs"]
mod tests;
