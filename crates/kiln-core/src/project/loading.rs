//! File discovery for models, tests, analyses, macros, schema documents and seeds

use crate::config::{ProjectConfig, PROJECT_FILE};
use crate::error::{CoreError, CoreResult};
use crate::node::{ArchiveTarget, Node, NodeId, ResourceKind};
use crate::schema_test::parse_schema_tests;
use std::path::{Path, PathBuf};

use super::{fqn_for, Package, Project};

/// Tag carried by data tests
pub const DATA_TAG: &str = "data";

/// A macro source file belonging to a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroFile {
    pub package: String,
    /// Path relative to the package root
    pub path: PathBuf,
    pub contents: String,
}

/// Recursively collect files with one of `extensions` below `dir`, sorted.
/// A missing directory yields nothing.
fn discover_files(dir: &Path, extensions: &[&str], files: &mut Vec<PathBuf>) -> CoreResult<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| CoreError::IoWithPath {
            path: dir.display().to_string(),
            source: e,
        })?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()
        .map_err(|e| CoreError::IoWithPath {
            path: dir.display().to_string(),
            source: e,
        })?;
    entries.sort();

    for path in entries {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            discover_files(&path, extensions, files)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.contains(&e))
        {
            files.push(path);
        }
    }
    Ok(())
}

fn read_file(path: &Path) -> CoreResult<String> {
    std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
        path: path.display().to_string(),
        source: e,
    })
}

fn relative(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base).unwrap_or(path).to_path_buf()
}

impl Package {
    /// Load a package rooted at `root`
    pub fn load(root: &Path) -> CoreResult<Self> {
        let config = ProjectConfig::load_from_dir(root)?;
        Ok(Self {
            name: config.name.clone(),
            root: root.to_path_buf(),
            config,
        })
    }

    /// Every `.sql` file under `dirs`, as nodes of `kind`
    fn sql_nodes(&self, dirs: &[String], kind: ResourceKind) -> CoreResult<Vec<Node>> {
        let mut nodes = Vec::new();
        for dir in dirs {
            let base = self.root.join(dir);
            let mut files = Vec::new();
            discover_files(&base, &["sql"], &mut files)?;
            for file in files {
                let rel = relative(&file, &base);
                let name = rel
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let mut node = Node::new(
                    NodeId::new(kind, &self.name, name),
                    fqn_for(&self.name, &rel),
                    rel.clone(),
                    relative(&file, &self.root),
                    read_file(&file)?,
                );
                if kind == ResourceKind::Test {
                    node.tags.insert(DATA_TAG.to_string());
                }
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    /// Test nodes derived from schema documents under source paths
    fn schema_test_nodes(&self) -> CoreResult<Vec<Node>> {
        let mut nodes = Vec::new();
        for dir in &self.config.source_paths {
            let base = self.root.join(dir);
            let mut files = Vec::new();
            discover_files(&base, &["yml", "yaml"], &mut files)?;
            for file in files {
                let contents = read_file(&file)?;
                nodes.extend(parse_schema_tests(
                    &self.name,
                    &relative(&file, &base),
                    &relative(&file, &self.root),
                    &contents,
                )?);
            }
        }
        Ok(nodes)
    }

    /// One Archive node per declared table
    fn archive_nodes(&self) -> Vec<Node> {
        let mut nodes = Vec::new();
        for archive in &self.config.archive {
            for table in &archive.tables {
                let rel = PathBuf::from(&archive.target_schema).join(format!("{}.sql", table.target_table));
                let mut node = Node::new(
                    NodeId::new(ResourceKind::Archive, &self.name, &table.target_table),
                    fqn_for(&self.name, &Path::new("archive").join(&rel)),
                    rel,
                    PathBuf::from(PROJECT_FILE),
                    "-- noop".to_string(),
                );
                node.archive = Some(ArchiveTarget {
                    source_schema: archive.source_schema.clone(),
                    source_table: table.source_table.clone(),
                    target_schema: archive.target_schema.clone(),
                    target_table: table.target_table.clone(),
                    updated_at: table.updated_at.clone(),
                    unique_key: table.unique_key.clone(),
                });
                nodes.push(node);
            }
        }
        nodes
    }

    /// All unparsed nodes this package contributes
    pub fn load_nodes(&self, include_archives: bool) -> CoreResult<Vec<Node>> {
        let mut nodes = self.sql_nodes(&self.config.source_paths, ResourceKind::Model)?;
        nodes.extend(self.sql_nodes(&self.config.test_paths, ResourceKind::Test)?);
        nodes.extend(self.sql_nodes(&self.config.analysis_paths, ResourceKind::Analysis)?);
        nodes.extend(self.schema_test_nodes()?);
        if include_archives {
            nodes.extend(self.archive_nodes());
        }
        Ok(nodes)
    }

    /// Macro files under the package's macro paths
    pub fn load_macros(&self) -> CoreResult<Vec<MacroFile>> {
        let mut macros = Vec::new();
        for dir in &self.config.macro_paths {
            let mut files = Vec::new();
            discover_files(&self.root.join(dir), &["sql", "jinja"], &mut files)?;
            for file in files {
                macros.push(MacroFile {
                    package: self.name.clone(),
                    path: relative(&file, &self.root),
                    contents: read_file(&file)?,
                });
            }
        }
        Ok(macros)
    }
}

impl Project {
    /// Load a project and every package installed under its modules path
    pub fn load(path: &Path) -> CoreResult<Self> {
        let root = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        if !root.exists() {
            return Err(CoreError::ProjectNotFound {
                path: root.display().to_string(),
            });
        }

        let root_package = Package::load(&root)?;
        let config = root_package.config.clone();
        let mut packages = vec![root_package];

        let modules = root.join(&config.modules_path);
        if modules.is_dir() {
            let mut dirs: Vec<PathBuf> = std::fs::read_dir(&modules)
                .map_err(|e| CoreError::IoWithPath {
                    path: modules.display().to_string(),
                    source: e,
                })?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.join(PROJECT_FILE).is_file())
                .collect();
            dirs.sort();
            for dir in dirs {
                let package = Package::load(&dir)?;
                if packages.iter().any(|p| p.name == package.name) {
                    return Err(CoreError::ConfigInvalid {
                        message: format!(
                            "package '{}' at {} is loaded twice",
                            package.name,
                            dir.display()
                        ),
                    });
                }
                log::debug!("Loaded package '{}' from {}", package.name, dir.display());
                packages.push(package);
            }
        }

        Ok(Self {
            root,
            config,
            packages,
        })
    }

    /// Unparsed nodes from every package. Archives come from the root
    /// project only.
    pub fn load_nodes(&self) -> CoreResult<Vec<Node>> {
        let mut nodes = Vec::new();
        for (i, package) in self.packages.iter().enumerate() {
            nodes.extend(package.load_nodes(i == 0)?);
        }
        Ok(nodes)
    }

    /// Macro files from every package
    pub fn load_macros(&self) -> CoreResult<Vec<MacroFile>> {
        let mut macros = Vec::new();
        for package in &self.packages {
            macros.extend(package.load_macros()?);
        }
        Ok(macros)
    }

    /// Seed CSVs of the root project
    pub fn seed_files(&self) -> CoreResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dir in &self.config.data_paths {
            discover_files(&self.root.join(dir), &["csv"], &mut files)?;
        }
        Ok(files)
    }
}
