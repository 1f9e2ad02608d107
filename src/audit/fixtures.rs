//! JSON fixture presence and size window.
//!
//! Modules with JVM tests are expected to ship JSON fixtures under
//! `src/test/resources`. Fixtures far outside the size window are flagged:
//! tiny ones are usually placeholders, oversize ones slow every test run.

use crate::audit::{within_tolerance, Audit};
use crate::config::FixturesSection;
use crate::error::{GateError, Result};
use crate::model::{AuditResult, Finding, Status};
use crate::source::{files_under, module_relative};
use crate::whitelist::WhitelistMatcher;
use std::fs;
use std::path::PathBuf;

/// Gate on test fixture presence and size.
pub struct FixturesAudit {
    module: String,
    module_dir: PathBuf,
    tolerance_percent: u32,
    min_bytes: u64,
    max_bytes: u64,
    whitelist: WhitelistMatcher,
}

impl FixturesAudit {
    pub fn new(
        module: impl Into<String>,
        module_dir: impl Into<PathBuf>,
        section: &FixturesSection,
    ) -> Self {
        Self {
            module: module.into(),
            module_dir: module_dir.into(),
            tolerance_percent: section.tolerance_percent,
            min_bytes: section.min_bytes,
            max_bytes: section.max_bytes,
            whitelist: WhitelistMatcher::new(&section.whitelist_patterns),
        }
    }

    fn module_whitelisted(&self) -> bool {
        self.whitelist
            .matches_path(&self.module_dir.to_string_lossy())
            || self.whitelist.matches_fqcn(&self.module)
    }
}

impl Audit for FixturesAudit {
    fn name(&self) -> &'static str {
        "FixturesAudit"
    }

    fn check(&self, emit: &mut dyn FnMut(AuditResult)) -> Result<()> {
        let resources = self.module_dir.join("src").join("test").join("resources");
        let fixtures = files_under(&resources, &["json"]);

        let mut findings = Vec::new();
        let mut presence_ok = true;

        if fixtures.is_empty() {
            if !self.module_whitelisted() {
                presence_ok = false;
                findings.push(Finding::new(
                    "MissingFixture",
                    "no JSON fixtures under src/test/resources",
                ));
            }
        }

        let total = fixtures.len();
        let mut out_of_window = 0;
        for path in &fixtures {
            let size = fs::metadata(path)
                .map_err(|e| GateError::read_error(path, e))?
                .len();
            let relative = module_relative(path, &self.module_dir);
            if size < self.min_bytes {
                out_of_window += 1;
                findings.push(
                    Finding::at(
                        "FixtureTooSmall",
                        relative,
                        None,
                        format!("fixture is {} bytes, below the {}-byte minimum", size, self.min_bytes),
                    )
                    .with_severity("warning"),
                );
            } else if size > self.max_bytes {
                out_of_window += 1;
                findings.push(
                    Finding::at(
                        "FixtureOversize",
                        relative,
                        None,
                        format!("fixture is {} bytes, above the {}-byte maximum", size, self.max_bytes),
                    )
                    .with_severity("error"),
                );
            }
        }

        let status = Status::from_pass(
            presence_ok && within_tolerance(out_of_window, total, self.tolerance_percent),
        );
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
