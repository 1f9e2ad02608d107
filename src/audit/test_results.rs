//! JUnit XML results gate.
//!
//! Classifies every test case as passed, failed, or skipped, removes
//! whitelisted cases from both sides of the ratio, and fails the build
//! when too large a share of executed tests failed.

use crate::audit::{within_tolerance, Audit};
use crate::config::TestsSection;
use crate::error::{GateError, Result};
use crate::model::{AuditResult, Finding, Status};
use crate::whitelist::WhitelistMatcher;
use crate::xml::{parse_xml, Element};
use std::path::PathBuf;
use tracing::warn;
use walkdir::WalkDir;

/// Gate on unit-test outcomes from a directory of JUnit XML reports.
pub struct TestsAudit {
    module: String,
    results_dir: PathBuf,
    tolerance_percent: u32,
    whitelist: WhitelistMatcher,
    task_names: Vec<String>,
}

impl TestsAudit {
    pub fn new(
        module: impl Into<String>,
        results_dir: impl Into<PathBuf>,
        section: &TestsSection,
    ) -> Self {
        Self {
            module: module.into(),
            results_dir: results_dir.into(),
            tolerance_percent: section.tolerance_percent,
            whitelist: WhitelistMatcher::new(&section.whitelist_patterns),
            task_names: section.task_names.clone(),
        }
    }

    fn xml_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.results_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("xml"))
            .collect();
        files.sort();
        files
    }

    fn whitelisted(&self, class: &str, method: &str) -> bool {
        self.whitelist.matches_fqcn(&format!("{}#{}", class, method))
            || self.whitelist.matches_fqcn(class)
    }
}

impl Audit for TestsAudit {
    fn name(&self) -> &'static str {
        "TestsAudit"
    }

    fn check(&self, emit: &mut dyn FnMut(AuditResult)) -> Result<()> {
        if !self.results_dir.exists() {
            // No test task ran; nothing to gate on.
            warn!(dir = %self.results_dir.display(), "test results directory missing, passing");
            emit(AuditResult::counted(
                self.module.clone(),
                self.name(),
                Vec::new(),
                self.tolerance_percent,
                Status::Pass,
            ));
            return Ok(());
        }

        let files = self.xml_files();
        if files.is_empty() {
            return Err(GateError::EmptyResults {
                dir: self.results_dir.clone(),
                tasks: self.task_names.clone(),
            });
        }

        let mut executed = 0usize;
        let mut failed = 0usize;
        let mut findings = Vec::new();

        for file in &files {
            let report = parse_xml(file)?;
            for case in report.descendants_named("testcase") {
                let class = case.attr("classname").unwrap_or_default();
                let method = case.attr("name").unwrap_or_default();
                match classify(case) {
                    Outcome::Skipped => {}
                    Outcome::Passed => {
                        if !self.whitelisted(class, method) {
                            executed += 1;
                        }
                    }
                    Outcome::Failed(detail) => {
                        if self.whitelisted(class, method) {
                            continue;
                        }
                        executed += 1;
                        failed += 1;
                        findings.push(failure_finding(class, method, detail));
                    }
                }
            }
        }

        let status = Status::from_pass(within_tolerance(failed, executed, self.tolerance_percent));
        emit(AuditResult::counted(
            self.module.clone(),
            self.name(),
            findings,
            self.tolerance_percent,
            status,
        ));
        Ok(())
    }
}

enum Outcome<'a> {
    Passed,
    Skipped,
    Failed(&'a Element),
}

fn classify(case: &Element) -> Outcome<'_> {
    if case.first_child("skipped").is_some() {
        return Outcome::Skipped;
    }
    if let Some(detail) = case.first_child("failure").or_else(|| case.first_child("error")) {
        return Outcome::Failed(detail);
    }
    Outcome::Passed
}

fn failure_finding(class: &str, method: &str, detail: &Element) -> Finding {
    let headline = detail
        .attr("message")
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
        .or_else(|| detail.text.lines().next().map(str::to_string))
        .unwrap_or_default();
    let first_line = headline.lines().next().unwrap_or_default();
    let stacktrace = detail
        .text
        .lines()
        .map(|l| l.trim_end().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    Finding::new(
        "TestFailure",
        format!("{}#{}: {}", class, method, first_line),
    )
    .with_stacktrace(stacktrace)
}
