//! Value types shared by every audit.
//!
//! One `AuditResult` is produced per audit execution and handed to the
//! aggregator exactly once. `Finding` is immutable after construction; the
//! builder methods consume and return the value.

use serde::{Deserialize, Serialize};

/// Two-valued audit verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Fail,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
        }
    }

    /// `Pass` when the predicate holds, `Fail` otherwise.
    pub fn from_pass(pass: bool) -> Self {
        if pass {
            Status::Pass
        } else {
            Status::Fail
        }
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Status::Fail)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One rule violation with location and message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Short machine-readable category, e.g. `"RawQueryUsage"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Path as supplied by the underlying tool; `None` for module-level findings.
    pub file_path: Option<String>,
    /// 1-based line number when the tool reports one.
    pub line: Option<u32>,
    pub severity: Option<String>,
    pub message: String,
    pub stacktrace: Vec<String>,
}

impl Finding {
    /// Module-level finding without a location.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            file_path: None,
            line: None,
            severity: None,
            message: message.into(),
            stacktrace: Vec::new(),
        }
    }

    /// Finding anchored to a file and optional line.
    pub fn at(
        kind: impl Into<String>,
        file_path: impl Into<String>,
        line: Option<u32>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            file_path: Some(file_path.into()),
            line,
            severity: None,
            message: message.into(),
            stacktrace: Vec::new(),
        }
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    pub fn with_stacktrace(mut self, stacktrace: Vec<String>) -> Self {
        self.stacktrace = stacktrace;
        self
    }
}

/// The numeric reported alongside a result's findings.
///
/// Usually the length of the findings list; the coverage audit instead
/// reports its aggregate branch percentage rounded to one decimal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FindingCount {
    Count(usize),
    Percent(f64),
}

impl std::fmt::Display for FindingCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingCount::Count(n) => write!(f, "{}", n),
            FindingCount::Percent(p) => write!(f, "{:.1}", p),
        }
    }
}

/// The single result produced by one audit execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResult {
    /// Module identifier, e.g. `":app"`.
    pub module: String,
    /// Audit name, e.g. `"DetektAudit"`.
    pub name: String,
    pub findings: Vec<Finding>,
    /// Integer percent in `[0, 100]` the pass predicate compares against.
    pub tolerance: u32,
    pub finding_count: FindingCount,
    pub status: Status,
}

impl AuditResult {
    /// Standard result whose finding count is the list length.
    pub fn counted(
        module: impl Into<String>,
        name: impl Into<String>,
        findings: Vec<Finding>,
        tolerance: u32,
        status: Status,
    ) -> Self {
        let finding_count = FindingCount::Count(findings.len());
        Self {
            module: module.into(),
            name: name.into(),
            findings,
            tolerance,
            finding_count,
            status,
        }
    }
}
