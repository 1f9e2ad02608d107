//! Module layout rules.
//!
//! Bans `src/sharedTest` outright, keeps JVM tests under
//! `src/test/kotlin`, requires the shared harness project dependency
//! whenever test sources or resources exist, and holds instrumented tests
//! to an import allow-list.

use crate::audit::Audit;
use crate::config::StructureSection;
use crate::error::{GateError, Result};
use crate::model::{AuditResult, Finding, Status};
use crate::source::{files_under, is_source_file, module_relative, read_header};
use crate::whitelist::WhitelistMatcher;
use regex::Regex;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static LINE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"//[^\n]*").unwrap());

/// Gate on module structure. Structural rules are zero-tolerance; the
/// instrumented import scope has its own configurable tolerance.
pub struct StructureAudit {
    module: String,
    module_dir: PathBuf,
    harness_project: String,
    instrumented_root: String,
    instrumented_allow: WhitelistMatcher,
    instrumented_tolerance_percent: u32,
}

impl StructureAudit {
    pub fn new(
        module: impl Into<String>,
        module_dir: impl Into<PathBuf>,
        section: &StructureSection,
    ) -> Self {
        Self {
            module: module.into(),
            module_dir: module_dir.into(),
            harness_project: section.harness_project.clone(),
            instrumented_root: section.instrumented_root.clone(),
            instrumented_allow: WhitelistMatcher::new(&section.instrumented_allow_list),
            instrumented_tolerance_percent: section.instrumented_tolerance_percent,
        }
    }

    fn check_shared_test(&self, findings: &mut Vec<Finding>) {
        for path in files_under(&self.module_dir.join("src").join("sharedTest"), &[]) {
            findings.push(Finding::at(
                "ForbiddenSharedTest",
                module_relative(&path, &self.module_dir),
                None,
                "src/sharedTest is banned; move shared helpers into the harness project",
            ));
        }
    }

    fn check_misplaced_tests(&self, findings: &mut Vec<Finding>) {
        let test_root = self.module_dir.join("src").join("test");
        let kotlin_root = test_root.join("kotlin");
        for path in files_under(&test_root, &["kt", "java"]) {
            let relative = module_relative(&path, &self.module_dir);
            let is_java = path.extension().and_then(|e| e.to_str()) == Some("java");
            if is_java {
                findings.push(Finding::at(
                    "MisplacedTestSource",
                    relative,
                    None,
                    "Java test sources are not allowed under src/test",
                ));
            } else if !path.starts_with(&kotlin_root) {
                findings.push(Finding::at(
                    "MisplacedTestSource",
                    relative,
                    None,
                    "Kotlin test sources must live under src/test/kotlin",
                ));
            }
        }
    }

    fn check_harness_dependency(&self, findings: &mut Vec<Finding>) -> Result<()> {
        let test_root = self.module_dir.join("src").join("test");
        let has_test_sources = files_under(&test_root, &[])
            .iter()
            .any(|p| is_source_file(p));
        let has_resources = !files_under(&test_root.join("resources"), &[]).is_empty();
        if !has_test_sources && !has_resources {
            return Ok(());
        }

        let build_file = self.build_file()?;
        let content =
            fs::read_to_string(&build_file).map_err(|e| GateError::read_error(&build_file, e))?;
        let stripped = strip_comments(&content);
        if !declares_project_dependency(&stripped, &self.harness_project) {
            findings.push(Finding::at(
                "MissingHarnessDependency",
                module_relative(&build_file, &self.module_dir),
                None,
                format!(
                    "modules with test sources must depend on project(\"{}\")",
                    self.harness_project
                ),
            ));
        }
        Ok(())
    }

    fn build_file(&self) -> Result<PathBuf> {
        for name in ["build.gradle", "build.gradle.kts"] {
            let candidate = self.module_dir.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(GateError::MissingBuildFile(self.module_dir.clone()))
    }

    fn check_instrumented_scope(
        &self,
        findings: &mut Vec<Finding>,
    ) -> Result<(usize, usize)> {
        let android_root = self.module_dir.join("src").join("androidTest");
        let files = files_under(&android_root, &["kt", "java"]);
        if self.instrumented_root.is_empty() {
            return Ok((0, files.len()));
        }

        let mut offending_files = 0;
        for path in &files {
            let header = read_header(path)?;
            let relative = module_relative(path, &self.module_dir);
            let mut offending = false;
            for import in &header.imports {
                if !import.path.starts_with(&self.instrumented_root) {
                    continue;
                }
                if self.instrumented_allow.matches_fqcn(&import.path) {
                    continue;
                }
                offending = true;
                findings.push(Finding::at(
                    "ForbiddenInstrumentedImport",
                    relative.clone(),
                    Some(import.line),
                    format!("import {} is not on the instrumented allow-list", import.path),
                ));
            }
            if offending {
                offending_files += 1;
            }
        }
        Ok((offending_files, files.len()))
    }
}

impl Audit for StructureAudit {
    fn name(&self) -> &'static str {
        "StructureAudit"
    }

    fn check(&self, emit: &mut dyn FnMut(AuditResult)) -> Result<()> {
        let mut findings = Vec::new();
        self.check_shared_test(&mut findings);
        self.check_misplaced_tests(&mut findings);
        self.check_harness_dependency(&mut findings)?;
        let structural_count = findings.len();

        let (offending_files, android_files) = self.check_instrumented_scope(&mut findings)?;
        let instrumented_ok = offending_files * 100
            <= self.instrumented_tolerance_percent as usize * android_files.max(1);

        let status = Status::from_pass(structural_count == 0 && instrumented_ok);
        emit(AuditResult::counted(
            self.module.clone(),
            self.name(),
            findings,
            self.instrumented_tolerance_percent,
            status,
        ));
        Ok(())
    }
}

fn strip_comments(content: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(content, " ");
    LINE_COMMENT.replace_all(&without_blocks, "").into_owned()
}

/// Both Groovy and Kotlin dependency syntax, with or without parentheses
/// around the configuration argument.
fn declares_project_dependency(content: &str, coordinate: &str) -> bool {
    let escaped = regex::escape(coordinate);
    let configurations = r"(?:testImplementation|testApi|androidTestImplementation|implementation|api)";
    let parenthesized = Regex::new(&format!(
        r#"{configurations}\s*\(\s*project\s*\(\s*["']{escaped}["']\s*\)\s*\)"#
    ));
    let unparenthesized = Regex::new(&format!(
        r#"{configurations}\s+project\s*\(\s*["']{escaped}["']\s*\)"#
    ));
    match (parenthesized, unparenthesized) {
        (Ok(a), Ok(b)) => a.is_match(content) || b.is_match(content),
        _ => false,
    }
}
