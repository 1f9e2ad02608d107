//! JVM test stack discipline.
//!
//! Keeps unit tests on JUnit 5 and `kotlinx-coroutines-test`: bans the
//! JUnit 4 and device-test imports, ignored tests, blocking waits, and
//! scheduler control outside `runTest`, and requires the Main dispatcher
//! rule wherever `Dispatchers.Main` leaks into a test.

use crate::audit::Audit;
use crate::config::StackSection;
use crate::error::{GateError, Result};
use crate::model::{AuditResult, Finding, Status};
use crate::source::{files_under, module_relative, parse_header};
use crate::whitelist::WhitelistMatcher;
use regex::Regex;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

const BANNED_IMPORT_PREFIXES: &[&str] = &[
    "androidx.test.",
    "org.robolectric.",
    "androidx.test.espresso.",
    "androidx.compose.ui.test.",
];

static BANNED_ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@(?:org\.junit(?:\.\w+)*\.)?(?:Ignore\b|Disabled\w*)").unwrap()
});

const SCHEDULER_TOKENS: &[&str] = &[
    "advanceUntilIdle(",
    "advanceTimeBy(",
    "runCurrent(",
    "TestCoroutineScheduler",
    "StandardTestDispatcher",
    "UnconfinedTestDispatcher",
    "TestScope",
];

/// Gate on JVM test sources under `src/test/kotlin`. Tolerance is always 0;
/// each finding type fires at most once per file, at its first match.
pub struct TestStackAudit {
    module: String,
    module_dir: PathBuf,
    whitelist: WhitelistMatcher,
}

impl TestStackAudit {
    pub fn new(
        module: impl Into<String>,
        module_dir: impl Into<PathBuf>,
        section: &StackSection,
    ) -> Self {
        Self {
            module: module.into(),
            module_dir: module_dir.into(),
            whitelist: WhitelistMatcher::new(&section.whitelist_files),
        }
    }

    fn check_file(&self, relative: &str, content: &str, findings: &mut Vec<Finding>) {
        let header = parse_header(content);

        if let Some(import) = header.imports.iter().find(|i| {
            i.path == "org.junit.Test"
                || BANNED_IMPORT_PREFIXES
                    .iter()
                    .any(|prefix| i.path.starts_with(prefix))
        }) {
            findings.push(Finding::at(
                "BANNED_IMPORT",
                relative,
                Some(import.line),
                format!("import {} is banned in JVM tests", import.path),
            ));
        }

        let has_run_test = content.contains("runTest(") || content.contains("runTest {");
        let has_dispatcher_rule = content.contains("MainDispatcherRule");

        let mut banned_annotation: Option<(u32, String)> = None;
        let mut coroutines_misuse: Option<(u32, String)> = None;
        let mut main_dispatcher: Option<(u32, String)> = None;

        for (index, line) in content.lines().enumerate() {
            let line_number = (index + 1) as u32;

            if banned_annotation.is_none() {
                if let Some(m) = BANNED_ANNOTATION.find(line) {
                    banned_annotation = Some((
                        line_number,
                        format!("{} disables the test permanently", m.as_str()),
                    ));
                }
            }

            if coroutines_misuse.is_none() {
                if line.contains("runBlocking(") || line.contains("runBlocking {") {
                    coroutines_misuse =
                        Some((line_number, "runBlocking stalls the test dispatcher; use runTest".to_string()));
                } else if line.contains("Thread.sleep(") {
                    coroutines_misuse =
                        Some((line_number, "Thread.sleep makes tests slow and flaky; use virtual time".to_string()));
                } else if !has_run_test {
                    if let Some(token) = SCHEDULER_TOKENS.iter().find(|t| line.contains(*t)) {
                        coroutines_misuse = Some((
                            line_number,
                            format!("{} requires a runTest body", token.trim_end_matches('(')),
                        ));
                    }
                }
            }

            if main_dispatcher.is_none()
                && !has_dispatcher_rule
                && (line.contains("Dispatchers.Main") || line.contains("viewModelScope"))
            {
                main_dispatcher = Some((
                    line_number,
                    "tests touching Dispatchers.Main must install MainDispatcherRule".to_string(),
                ));
            }
        }

        if let Some((line, message)) = banned_annotation {
            findings.push(Finding::at("BANNED_ANNOTATION", relative, Some(line), message));
        }
        if let Some((line, message)) = coroutines_misuse {
            findings.push(Finding::at("COROUTINES_MISUSE", relative, Some(line), message));
        }
        if let Some((line, message)) = main_dispatcher {
            findings.push(Finding::at(
                "MISSING_MAIN_DISPATCHER_RULE",
                relative,
                Some(line),
                message,
            ));
        }
    }
}

impl Audit for TestStackAudit {
    fn name(&self) -> &'static str {
        "TestStackAudit"
    }

    fn check(&self, emit: &mut dyn FnMut(AuditResult)) -> Result<()> {
        let root = self.module_dir.join("src").join("test").join("kotlin");
        let mut findings = Vec::new();
        for path in files_under(&root, &["kt"]) {
            let relative = module_relative(&path, &self.module_dir);
            if self.whitelist.matches_path(&relative) {
                continue;
            }
            let content =
                fs::read_to_string(&path).map_err(|e| GateError::read_error(&path, e))?;
            self.check_file(&relative, &content, &mut findings);
        }

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

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, rel: &str, content: &str) {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
    }

    fn run(dir: &TempDir, section: &StackSection) -> AuditResult {
        let audit = TestStackAudit::new(":app", dir.path(), section);
        let mut results = Vec::new();
        audit.check(&mut |r| results.push(r)).unwrap();
        results.remove(0)
    }

    fn kinds(result: &AuditResult) -> Vec<&str> {
        result.findings.iter().map(|f| f.kind.as_str()).collect()
    }

    #[test]
    fn test_junit4_import_banned() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/test/kotlin/FooTest.kt",
            "import org.junit.Test\nclass FooTest\n",
        );
        let result = run(&dir, &StackSection::default());
        assert_eq!(kinds(&result), vec!["BANNED_IMPORT"]);
        assert_eq!(result.findings[0].line, Some(1));
    }

    #[test]
    fn test_junit5_import_allowed() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/test/kotlin/FooTest.kt",
            "import org.junit.jupiter.api.Test\nclass FooTest\n",
        );
        let result = run(&dir, &StackSection::default());
        assert_eq!(result.status, Status::Pass);
    }

    #[test]
    fn test_device_imports_banned() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/test/kotlin/FooTest.kt",
            "import androidx.test.core.app.ApplicationProvider\nclass FooTest\n",
        );
        let result = run(&dir, &StackSection::default());
        assert_eq!(kinds(&result), vec!["BANNED_IMPORT"]);
    }

    #[test]
    fn test_banned_import_fires_once_per_file() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/test/kotlin/FooTest.kt",
            "import org.junit.Test\nimport org.robolectric.Robolectric\nclass FooTest\n",
        );
        let result = run(&dir, &StackSection::default());
        assert_eq!(kinds(&result), vec!["BANNED_IMPORT"]);
    }

    #[test]
    fn test_ignore_annotations_banned() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/test/kotlin/FooTest.kt",
            "class FooTest {\n    @Ignore fun skipped() {}\n}\n",
        );
        let result = run(&dir, &StackSection::default());
        assert_eq!(kinds(&result), vec!["BANNED_ANNOTATION"]);
        assert_eq!(result.findings[0].line, Some(2));

        let dir2 = TempDir::new().unwrap();
        write(
            &dir2,
            "src/test/kotlin/BarTest.kt",
            "@org.junit.jupiter.api.DisabledOnOs\nclass BarTest\n",
        );
        let result = run(&dir2, &StackSection::default());
        assert_eq!(kinds(&result), vec!["BANNED_ANNOTATION"]);
    }

    #[test]
    fn test_run_blocking_flagged() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/test/kotlin/FooTest.kt",
            "fun t() = runBlocking {\n}\n",
        );
        let result = run(&dir, &StackSection::default());
        assert_eq!(kinds(&result), vec!["COROUTINES_MISUSE"]);
    }

    #[test]
    fn test_thread_sleep_flagged() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/test/kotlin/FooTest.kt",
            "fun t() {\n    Thread.sleep(1000)\n}\n",
        );
        let result = run(&dir, &StackSection::default());
        assert_eq!(kinds(&result), vec!["COROUTINES_MISUSE"]);
        assert_eq!(result.findings[0].line, Some(2));
    }

    #[test]
    fn test_scheduler_without_run_test_flagged() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/test/kotlin/FooTest.kt",
            "val dispatcher = StandardTestDispatcher()\nfun t() { advanceUntilIdle() }\n",
        );
        let result = run(&dir, &StackSection::default());
        assert_eq!(kinds(&result), vec!["COROUTINES_MISUSE"]);
        assert_eq!(result.findings[0].line, Some(1));
    }

    #[test]
    fn test_scheduler_with_run_test_allowed() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/test/kotlin/FooTest.kt",
            "fun t() = runTest {\n    advanceUntilIdle()\n}\n",
        );
        let result = run(&dir, &StackSection::default());
        assert_eq!(result.status, Status::Pass);
    }

    #[test]
    fn test_main_dispatcher_rule_required() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/test/kotlin/VmTest.kt",
            "fun t() = runTest {\n    viewModelScope.launch {}\n}\n",
        );
        let result = run(&dir, &StackSection::default());
        assert_eq!(kinds(&result), vec!["MISSING_MAIN_DISPATCHER_RULE"]);
        assert_eq!(result.findings[0].line, Some(2));
    }

    #[test]
    fn test_main_dispatcher_rule_present_passes() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/test/kotlin/VmTest.kt",
            "val mainDispatcherRule = MainDispatcherRule()\nfun t() = runTest { viewModelScope.launch {} }\n",
        );
        let result = run(&dir, &StackSection::default());
        assert_eq!(result.status, Status::Pass);
    }

    #[test]
    fn test_multiple_types_in_one_file() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/test/kotlin/MessyTest.kt",
            "import org.junit.Test\n\
             class MessyTest {\n\
                 @Ignore fun a() = runBlocking {}\n\
                 fun b() { Thread.sleep(5) }\n\
             }\n",
        );
        let result = run(&dir, &StackSection::default());
        let mut found = kinds(&result);
        found.sort_unstable();
        assert_eq!(
            found,
            vec!["BANNED_ANNOTATION", "BANNED_IMPORT", "COROUTINES_MISUSE"]
        );
    }

    #[test]
    fn test_whitelisted_file_skipped() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/test/kotlin/legacy/OldTest.kt",
            "import org.junit.Test\nclass OldTest\n",
        );
        let section = StackSection {
            whitelist_files: vec!["src/test/kotlin/legacy/**".to_string()],
        };
        let result = run(&dir, &section);
        assert_eq!(result.status, Status::Pass);
    }

    #[test]
    fn test_files_outside_scope_ignored() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/main/kotlin/Prod.kt",
            "fun p() = runBlocking {}\n",
        );
        let result = run(&dir, &StackSection::default());
        assert_eq!(result.status, Status::Pass);
    }
}
