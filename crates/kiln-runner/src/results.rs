//! Per-node results, status lines, and the `run_results.json` artifact

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use kiln_core::{Node, NodeId};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File written under the target directory after every run
pub const RUN_RESULTS_FILE: &str = "run_results.json";

/// Terminal state of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Success,
    /// A test whose query counted failing rows
    Fail,
    Error,
    Skip,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Success => write!(f, "success"),
            NodeStatus::Fail => write!(f, "fail"),
            NodeStatus::Error => write!(f, "error"),
            NodeStatus::Skip => write!(f, "skip"),
        }
    }
}

/// Outcome of one node
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub unique_id: NodeId,
    pub name: String,
    /// Materialization for models, resource kind otherwise
    pub kind: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_path: Option<PathBuf>,
    pub duration_secs: f64,
    /// Failing row count of a test
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures: Option<u64>,
}

impl RunResult {
    pub fn new(node: &Node, status: NodeStatus, elapsed: Duration) -> Self {
        Self {
            unique_id: node.unique_id.clone(),
            name: node.name().to_string(),
            kind: describe(node),
            status,
            message: None,
            build_path: node.build_path.clone(),
            duration_secs: elapsed.as_secs_f64(),
            failures: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_failures(mut self, failures: u64) -> Self {
        self.failures = Some(failures);
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == NodeStatus::Error
    }

    /// The line printed when the node finishes
    pub fn status_line(&self) -> String {
        let millis = (self.duration_secs * 1000.0) as u128;
        match self.status {
            NodeStatus::Success => {
                format!("  \u{2713} {} ({}) [{}ms]", self.name, self.kind, millis)
            }
            NodeStatus::Fail => format!(
                "  \u{2717} {} ({}) - FAIL {} [{}ms]",
                self.name,
                self.kind,
                self.failures.unwrap_or_default(),
                millis
            ),
            NodeStatus::Error => format!(
                "  \u{2717} {} - {} [{}ms]",
                self.name,
                self.message.as_deref().unwrap_or("error"),
                millis
            ),
            NodeStatus::Skip => format!("  - {} ({}) SKIP", self.name, self.kind),
        }
    }
}

fn describe(node: &Node) -> String {
    match node.kind() {
        kiln_core::ResourceKind::Model => node.materialization().to_string(),
        kind => kind.to_string(),
    }
}

/// Counts for the end-of-run summary. Failed tests count as errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub pass: usize,
    pub error: usize,
    pub skip: usize,
    pub total: usize,
}

impl Summary {
    pub fn of(results: &[RunResult]) -> Self {
        let mut summary = Summary {
            total: results.len(),
            ..Summary::default()
        };
        for result in results {
            match result.status {
                NodeStatus::Success => summary.pass += 1,
                NodeStatus::Fail | NodeStatus::Error => summary.error += 1,
                NodeStatus::Skip => summary.skip += 1,
            }
        }
        summary
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Done. PASS={} ERROR={} SKIP={} TOTAL={}",
            self.pass, self.error, self.skip, self.total
        )
    }
}

/// Contents of `run_results.json`
#[derive(Debug, Clone, Serialize)]
pub struct RunResults {
    pub timestamp: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub summary: Summary,
    pub results: Vec<RunResult>,
}

impl RunResults {
    pub fn new(results: Vec<RunResult>, elapsed: Duration) -> Self {
        Self {
            timestamp: Utc::now(),
            elapsed_secs: elapsed.as_secs_f64(),
            summary: Summary::of(&results),
            results,
        }
    }
}

/// Serialize `results` as pretty-printed JSON to `path`, creating parent
/// directories as needed
pub fn write_run_results(path: &Path, results: &RunResults) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(results).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}

/// Prints status lines, above a progress bar when one is shown
#[derive(Debug)]
pub struct Reporter {
    progress: Option<ProgressBar>,
}

impl Reporter {
    /// A reporter for `total` nodes; the bar is only drawn when `show_progress`
    pub fn new(total: usize, show_progress: bool) -> Self {
        let progress = show_progress.then(|| {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({msg})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        });
        Self { progress }
    }

    /// Reporter that only prints lines
    pub fn quiet() -> Self {
        Self { progress: None }
    }

    pub fn started(&self, name: &str) {
        if let Some(pb) = &self.progress {
            pb.set_message(name.to_string());
        }
    }

    pub fn finished(&self, result: &RunResult) {
        let line = result.status_line();
        match &self.progress {
            Some(pb) => {
                pb.println(line);
                pb.inc(1);
            }
            None => println!("{}", line),
        }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }
    }
}

#[cfg(test)]
#[path = "results_test.rs"]
mod tests;
