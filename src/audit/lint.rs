//! Android Lint gate over a lint-results XML report (format 6).

use crate::audit::{within_tolerance, Audit};
use crate::config::LintSection;
use crate::error::Result;
use crate::model::{AuditResult, Finding, Status};
use crate::whitelist::WhitelistMatcher;
use crate::xml::parse_xml;
use std::path::PathBuf;

/// Gate on lint issues of severity `Error` or `Fatal`. One finding is
/// produced per (issue, location) pair; whitelisting removes locations.
pub struct AndroidLintAudit {
    module: String,
    report_path: PathBuf,
    scanned_files: usize,
    tolerance_percent: u32,
    whitelist: WhitelistMatcher,
}

impl AndroidLintAudit {
    pub fn new(
        module: impl Into<String>,
        report_path: impl Into<PathBuf>,
        scanned_files: usize,
        section: &LintSection,
    ) -> Self {
        Self {
            module: module.into(),
            report_path: report_path.into(),
            scanned_files,
            tolerance_percent: section.tolerance_percent,
            whitelist: WhitelistMatcher::new(&section.whitelist_patterns),
        }
    }
}

impl Audit for AndroidLintAudit {
    fn name(&self) -> &'static str {
        "AndroidLintAudit"
    }

    fn check(&self, emit: &mut dyn FnMut(AuditResult)) -> Result<()> {
        let report = parse_xml(&self.report_path)?;

        let mut findings = Vec::new();
        for issue in report.children_named("issue") {
            let severity = issue.attr("severity").unwrap_or_default();
            if !is_gating_severity(severity) {
                continue;
            }
            let id = issue.attr("id").unwrap_or("Unknown");
            let message = issue.attr("message").unwrap_or_default();
            for location in issue.children_named("location") {
                let file = location.attr("file").unwrap_or_default();
                if self.whitelist.matches_path(file) {
                    continue;
                }
                findings.push(
                    Finding::at(
                        id,
                        file,
                        location.attr("line").and_then(|l| l.parse().ok()),
                        message,
                    )
                    .with_severity(severity),
                );
            }
        }

        let status = Status::from_pass(within_tolerance(
            findings.len(),
            self.scanned_files,
            self.tolerance_percent,
        ));
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

fn is_gating_severity(severity: &str) -> bool {
    severity.eq_ignore_ascii_case("error") || severity.eq_ignore_ascii_case("fatal")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FindingCount;
    use std::fs;
    use tempfile::TempDir;

    fn write_report(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("lint-results-debug.xml");
        fs::write(
            &path,
            format!("<?xml version=\"1.0\"?>\n<issues format=\"6\">{}</issues>", body),
        )
        .unwrap();
        path
    }

    fn run(audit: AndroidLintAudit) -> AuditResult {
        let mut results = Vec::new();
        audit.check(&mut |r| results.push(r)).unwrap();
        results.remove(0)
    }

    #[test]
    fn test_location_unfolding_with_whitelist() {
        let dir = TempDir::new().unwrap();
        let report = write_report(
            &dir,
            r#"<issue id="MissingPermission" severity="Fatal" message="needs permission">
                 <location file="src/main/java/Net.kt" line="10"/>
                 <location file="src/gen/Stub.kt" line="2"/>
               </issue>"#,
        );
        let section = LintSection {
            whitelist_patterns: vec!["src/gen/**".to_string()],
            ..LintSection::default()
        };
        let result = run(AndroidLintAudit::new(":app", report, 10, &section));
        assert_eq!(result.finding_count, FindingCount::Count(1));
        assert_eq!(result.findings[0].kind, "MissingPermission");
        assert_eq!(result.findings[0].severity.as_deref(), Some("Fatal"));
        assert_eq!(result.status, Status::Pass);
    }

    #[test]
    fn test_only_error_and_fatal_counted() {
        let dir = TempDir::new().unwrap();
        let report = write_report(
            &dir,
            r#"<issue id="A" severity="Warning" message="w">
                 <location file="src/A.kt" line="1"/>
               </issue>
               <issue id="B" severity="Informational" message="i">
                 <location file="src/B.kt" line="1"/>
               </issue>
               <issue id="C" severity="error" message="e">
                 <location file="src/C.kt" line="1"/>
               </issue>"#,
        );
        let result = run(AndroidLintAudit::new(":app", report, 10, &LintSection::default()));
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].kind, "C");
    }

    #[test]
    fn test_tolerance_gate() {
        let dir = TempDir::new().unwrap();
        let report = write_report(
            &dir,
            r#"<issue id="A" severity="Error" message="a">
                 <location file="src/A.kt" line="1"/>
                 <location file="src/B.kt" line="2"/>
               </issue>"#,
        );
        let section = LintSection {
            tolerance_percent: 10,
            ..LintSection::default()
        };
        // 2 findings over 10 files is more than 10%.
        let result = run(AndroidLintAudit::new(":app", report.clone(), 10, &section));
        assert_eq!(result.status, Status::Fail);

        // Over 20 files it sits exactly on the boundary.
        let result = run(AndroidLintAudit::new(":app", report, 20, &section));
        assert_eq!(result.status, Status::Pass);
    }

    #[test]
    fn test_missing_report_is_processing_error() {
        let audit = AndroidLintAudit::new(
            ":app",
            "/nonexistent/lint-results-debug.xml",
            10,
            &LintSection::default(),
        );
        assert!(audit.check(&mut |_| {}).is_err());
    }
}
