//! Error types for testgate.
//!
//! Two disjoint kinds of failure exist in the pipeline. A *processing error*
//! means an audit could not do its job at all: its input was missing,
//! unreadable, or malformed. Processing errors halt the run. An audit
//! verdict of FAIL is not an error; it rides inside `AuditResult.status`
//! and is only converted into the single `BuildFailure` by the aggregator
//! at end of build.

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for all testgate operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// I/O failure while reading an input.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A tool report the audit depends on does not exist.
    #[error("Report not found: {0}")]
    MissingReport(PathBuf),

    /// A tool report exists but is not well-formed XML.
    #[error("Failed to parse XML in {path}: {message}")]
    Xml { path: PathBuf, message: String },

    /// Neither `build.gradle` nor `build.gradle.kts` exists for a module
    /// that has test sources.
    #[error("No build file found under {0}")]
    MissingBuildFile(PathBuf),

    /// The test-results directory exists but contains no XML reports.
    #[error("No test result XML found in {} (tasks: {})", .dir.display(), format_tasks(.tasks))]
    EmptyResults { dir: PathBuf, tasks: Vec<String> },

    /// The aggregator could not write the final report.
    #[error("Failed to write report {path}: {source}")]
    WriteReport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file missing a value or unparseable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// One or more audits failed; raised once by the aggregator.
    #[error("{0}")]
    BuildFailure(String),
}

impl GateError {
    /// Create an I/O read error.
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an XML parse error.
    pub fn xml_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Xml {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for the build-gating failure, false for every processing error.
    pub fn is_build_failure(&self) -> bool {
        matches!(self, GateError::BuildFailure(_))
    }
}

fn format_tasks(tasks: &[String]) -> String {
    if tasks.is_empty() {
        "unknown".to_string()
    } else {
        tasks.join(", ")
    }
}

/// Result type alias for testgate operations.
pub type Result<T> = std::result::Result<T, GateError>;
