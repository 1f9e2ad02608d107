//! Static-analysis gate over a Checkstyle-style detekt report.

use crate::audit::{within_tolerance, Audit};
use crate::config::DetektSection;
use crate::error::Result;
use crate::model::{AuditResult, Finding, Status};
use crate::whitelist::WhitelistMatcher;
use crate::xml::parse_xml;
use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::LazyLock;

/// `[RuleId]` embedded in the message.
static BRACKETED_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([A-Za-z][A-Za-z0-9]*)\]").unwrap());

/// `RuleId: message` prefix.
static PREFIXED_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z][A-Za-z0-9]*):").unwrap());

/// Gate on detekt errors. Findings whose rule is in the hard-fail set fail
/// outright; the rest are tolerated up to a percentage of scanned files.
pub struct DetektAudit {
    module: String,
    report_path: PathBuf,
    scanned_files: usize,
    tolerance_percent: u32,
    whitelist: WhitelistMatcher,
    hard_fail_rule_ids: HashSet<String>,
}

impl DetektAudit {
    pub fn new(
        module: impl Into<String>,
        report_path: impl Into<PathBuf>,
        scanned_files: usize,
        section: &DetektSection,
    ) -> Self {
        Self {
            module: module.into(),
            report_path: report_path.into(),
            scanned_files,
            tolerance_percent: section.tolerance_percent,
            whitelist: WhitelistMatcher::new(&section.whitelist_patterns),
            hard_fail_rule_ids: section.hard_fail_rule_ids.iter().cloned().collect(),
        }
    }
}

impl Audit for DetektAudit {
    fn name(&self) -> &'static str {
        "DetektAudit"
    }

    fn check(&self, emit: &mut dyn FnMut(AuditResult)) -> Result<()> {
        let report = parse_xml(&self.report_path)?;

        let mut findings = Vec::new();
        for file in report.children_named("file") {
            let path = file.attr("name").unwrap_or_default();
            if self.whitelist.matches_path(path) {
                continue;
            }
            for error in file.children_named("error") {
                let severity = error.attr("severity").unwrap_or_default();
                if !severity.eq_ignore_ascii_case("error") {
                    continue;
                }
                let message = error.attr("message").unwrap_or_default().to_string();
                let rule = rule_id(error.attr("source"), &message);
                findings.push(
                    Finding::at(
                        rule,
                        path,
                        error.attr("line").and_then(|l| l.parse().ok()),
                        message,
                    )
                    .with_severity(severity.to_lowercase()),
                );
            }
        }

        let hard = findings
            .iter()
            .filter(|f| self.hard_fail_rule_ids.contains(&f.kind))
            .count();
        let soft = findings.len() - hard;
        let status = if hard > 0 {
            Status::Fail
        } else {
            Status::from_pass(within_tolerance(
                soft,
                self.scanned_files,
                self.tolerance_percent,
            ))
        };

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

/// Rule identity: the `source` attribute wins (with the `detekt.` prefix
/// stripped, else its simple name), then a bracketed `[RuleId]` in the
/// message, then a `RuleId:` prefix, then `"Unknown"`.
fn rule_id(source: Option<&str>, message: &str) -> String {
    if let Some(source) = source.filter(|s| !s.trim().is_empty()) {
        if let Some(stripped) = source.strip_prefix("detekt.") {
            return stripped.to_string();
        }
        return source.rsplit('.').next().unwrap_or(source).to_string();
    }
    if let Some(caps) = BRACKETED_RULE.captures(message) {
        return caps[1].to_string();
    }
    if let Some(caps) = PREFIXED_RULE.captures(message) {
        return caps[1].to_string();
    }
    "Unknown".to_string()
}
