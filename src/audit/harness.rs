//! Harness reuse and isolation rules.
//!
//! Rule A: JVM test files living in an area package (`<root>.data`,
//! `<root>.sync`, `<root>.ui`) must import at least one helper from that
//! area's harness set. Cross-layer helpers do not count.
//!
//! Rule B: the simple names of all harness helpers are protected; a
//! top-level declaration outside the harness package that reuses one is a
//! local clone.

use crate::audit::Audit;
use crate::config::HarnessSection;
use crate::error::Result;
use crate::model::{AuditResult, Finding, Status};
use crate::source::{files_under, module_relative, read_header, SourceHeader};
use crate::whitelist::WhitelistMatcher;
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Area {
    Data,
    Sync,
    Ui,
}

impl Area {
    fn as_str(&self) -> &'static str {
        match self {
            Area::Data => "data",
            Area::Sync => "sync",
            Area::Ui => "ui",
        }
    }

    fn all() -> &'static [Area] {
        &[Area::Data, Area::Sync, Area::Ui]
    }
}

/// Gate on harness usage in area tests and helper cloning anywhere.
/// Tolerance is always 0.
pub struct HarnessReuseIsolationAudit {
    module: String,
    module_dir: PathBuf,
    root_package: String,
    harness_package: String,
    data_helpers: Vec<String>,
    sync_helpers: Vec<String>,
    ui_helpers: Vec<String>,
    canonical_simple_names: HashSet<String>,
    whitelist: WhitelistMatcher,
}

impl HarnessReuseIsolationAudit {
    pub fn new(
        module: impl Into<String>,
        module_dir: impl Into<PathBuf>,
        section: &HarnessSection,
    ) -> Self {
        let canonical_simple_names = section
            .data_helpers
            .iter()
            .chain(&section.sync_helpers)
            .chain(&section.ui_helpers)
            .chain(&section.shared_helpers)
            .map(|fqcn| simple_name(fqcn).to_string())
            .collect();
        Self {
            module: module.into(),
            module_dir: module_dir.into(),
            root_package: section.root_package.clone(),
            harness_package: section.harness_package.clone(),
            data_helpers: section.data_helpers.clone(),
            sync_helpers: section.sync_helpers.clone(),
            ui_helpers: section.ui_helpers.clone(),
            canonical_simple_names,
            whitelist: WhitelistMatcher::new(&section.whitelist_patterns),
        }
    }

    fn area_helpers(&self, area: Area) -> &[String] {
        match area {
            Area::Data => &self.data_helpers,
            Area::Sync => &self.sync_helpers,
            Area::Ui => &self.ui_helpers,
        }
    }

    /// Which area a package belongs to, honoring segment boundaries so that
    /// `<root>.database` is not a `data` package.
    fn area_of(&self, package: &str) -> Option<Area> {
        if self.root_package.is_empty() {
            return None;
        }
        for area in Area::all() {
            let prefix = format!("{}.{}", self.root_package, area.as_str());
            if let Some(rest) = package.strip_prefix(&prefix) {
                if rest.is_empty() || rest.starts_with('.') {
                    return Some(*area);
                }
            }
        }
        None
    }

    fn check_area_usage(&self, findings: &mut Vec<Finding>) -> Result<()> {
        let test_root = self.module_dir.join("src").join("test");
        for path in files_under(&test_root, &["kt", "java"]) {
            let header = read_header(&path)?;
            let package = match header.package.as_deref() {
                Some(p) => p,
                None => continue,
            };
            let area = match self.area_of(package) {
                Some(a) => a,
                None => continue,
            };
            let helpers = self.area_helpers(area);
            if helpers.is_empty() {
                continue;
            }
            if header
                .imports
                .iter()
                .any(|i| self.whitelist.matches_fqcn(&i.path))
            {
                continue;
            }
            if helpers.iter().any(|h| satisfied_by(&header, h)) {
                continue;
            }
            findings.push(Finding::at(
                "MissingHarnessImport",
                module_relative(&path, &self.module_dir),
                header.package_line,
                format!(
                    "test file in package {} uses no {} harness helper",
                    package,
                    area.as_str()
                ),
            ));
        }
        Ok(())
    }

    fn check_helper_clones(&self, findings: &mut Vec<Finding>) -> Result<()> {
        if self.canonical_simple_names.is_empty() {
            return Ok(());
        }
        let source_root = self.module_dir.join("src");
        for path in files_under(&source_root, &["kt", "java"]) {
            let header = read_header(&path)?;
            let package = header.package.as_deref().unwrap_or_default();
            if self.in_harness_package(package) {
                continue;
            }
            for declaration in &header.declarations {
                if !self.canonical_simple_names.contains(&declaration.name) {
                    continue;
                }
                let fqcn = if package.is_empty() {
                    declaration.name.clone()
                } else {
                    format!("{}.{}", package, declaration.name)
                };
                if self.whitelist.matches_fqcn(&fqcn) {
                    continue;
                }
                findings.push(Finding::at(
                    "LocalHelperClone",
                    module_relative(&path, &self.module_dir),
                    Some(declaration.line),
                    format!("'{}' clones the harness helper '{}'", fqcn, declaration.name),
                ));
            }
        }
        Ok(())
    }

    fn in_harness_package(&self, package: &str) -> bool {
        if self.harness_package.is_empty() {
            return false;
        }
        match package.strip_prefix(&self.harness_package) {
            Some(rest) => rest.is_empty() || rest.starts_with('.'),
            None => false,
        }
    }
}

fn satisfied_by(header: &SourceHeader, helper: &str) -> bool {
    if header.imports_fqcn(helper) {
        return true;
    }
    // A wildcard import of the helper's package also brings the helper in.
    let helper_package = match helper.rsplit_once('.') {
        Some((package, _)) => package,
        None => return false,
    };
    header
        .imports
        .iter()
        .any(|i| i.path.strip_suffix(".*").is_some_and(|p| p == helper_package))
}

fn simple_name(fqcn: &str) -> &str {
    fqcn.rsplit('.').next().unwrap_or(fqcn)
}

impl Audit for HarnessReuseIsolationAudit {
    fn name(&self) -> &'static str {
        "HarnessReuseIsolationAudit"
    }

    fn check(&self, emit: &mut dyn FnMut(AuditResult)) -> Result<()> {
        let mut findings = Vec::new();
        self.check_area_usage(&mut findings)?;
        self.check_helper_clones(&mut findings)?;

        let status = Status::from_pass(findings.is_empty());
        emit(AuditResult::counted(
            self.module.clone(),
            self.name(),
            findings,
            0,
            status,
        ));
        Ok(())
    }
}
