//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// kiln - compile, run and test templated SQL against a warehouse
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: PathBuf,

    /// Target to use instead of the project's default
    #[arg(short, long, global = true, env = "KILN_TARGET")]
    pub target: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Link the project, write the graph and compile every node to SQL
    Compile(CompileArgs),

    /// Build models against the target
    Run(RunArgs),

    /// Run data and schema tests
    Test(TestArgs),

    /// Snapshot archived tables
    Archive(ArchiveArgs),

    /// Load CSV files from the data paths
    Seed(SeedArgs),

    /// List selected nodes
    Ls(LsArgs),

    /// Remove build artifacts
    Clean(CleanArgs),

    /// Install local packages into the modules path
    Deps,
}

/// Node selection shared by every graph command
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Nodes to include (name, path, +name, name+, *)
    #[arg(short, long, num_args = 1..)]
    pub models: Vec<String>,

    /// Nodes to leave out
    #[arg(short = 'x', long, num_args = 1..)]
    pub exclude: Vec<String>,
}

/// Arguments for the compile command
#[derive(Args, Debug)]
pub struct CompileArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Worker count, overriding the target's
    #[arg(long)]
    pub threads: Option<usize>,

    /// Rebuild incremental models from scratch
    #[arg(long)]
    pub full_refresh: bool,

    /// Keep existing tables and insert into them instead of rebuilding
    #[arg(long)]
    pub non_destructive: bool,
}

/// Arguments for the test command
#[derive(Args, Debug)]
pub struct TestArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Worker count, overriding the target's
    #[arg(long)]
    pub threads: Option<usize>,

    /// Only run data tests
    #[arg(long)]
    pub data: bool,

    /// Only run schema tests
    #[arg(long)]
    pub schema: bool,
}

/// Arguments for the archive command
#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Worker count, overriding the target's
    #[arg(long)]
    pub threads: Option<usize>,
}

/// Arguments for the seed command
#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Drop and recreate seed tables
    #[arg(long)]
    pub full_refresh: bool,
}

/// Arguments for the ls command
#[derive(Args, Debug)]
pub struct LsArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Only list nodes of this kind
    #[arg(short, long, value_enum)]
    pub resource_type: Option<ResourceArg>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: LsOutput,
}

/// Node kinds accepted on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceArg {
    Model,
    Test,
    Analysis,
    Archive,
}

/// Ls output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsOutput {
    /// Aligned columns
    Table,
    /// Unique ids only, one per line
    Ids,
    /// JSON array of nodes
    Json,
}

/// Arguments for the clean command
#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Show what would be removed
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
