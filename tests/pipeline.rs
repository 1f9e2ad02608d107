//! End-to-end pipeline tests over synthetic module trees.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use testgate::aggregator::{ReportAggregator, Sink};
use testgate::audit::compilation::{CompilationAudit, CompilationCapture};
use testgate::audit::coverage::CoverageBranchesAudit;
use testgate::audit::detekt::DetektAudit;
use testgate::audit::lint::AndroidLintAudit;
use testgate::audit::sql_fts::SqlFtsAudit;
use testgate::audit::Audit;
use testgate::config::{CoverageSection, DetektSection, LintSection, SqlFtsSection};
use testgate::model::{AuditResult, FindingCount, Status};
use testgate::uploader::{ReportUploader, UploadError};

fn write(dir: &TempDir, rel: &str, content: &str) -> PathBuf {
    let path = dir.path().join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn run_audit(audit: &dyn Audit) -> AuditResult {
    let mut results = Vec::new();
    audit.check(&mut |r| results.push(r)).unwrap();
    assert_eq!(results.len(), 1, "audit must emit exactly once");
    results.remove(0)
}

/// Detekt soft boundary: one error across 20 files at 5% tolerance passes.
#[test]
fn detekt_soft_boundary_passes() {
    let dir = TempDir::new().unwrap();
    for i in 0..20 {
        write(&dir, &format!("src/main/kotlin/F{i}.kt"), "class F\n");
    }
    let report = write(
        &dir,
        "build/reports/detekt/detekt.xml",
        r#"<?xml version="1.0"?>
<checkstyle version="4.3">
  <file name="src/main/kotlin/F0.kt">
    <error line="3" severity="error" message="boo" source="detekt.Some"/>
  </file>
</checkstyle>"#,
    );
    let section = DetektSection {
        tolerance_percent: 5,
        ..DetektSection::default()
    };
    let result = run_audit(&DetektAudit::new(":app", report, 20, &section));
    assert_eq!(result.status, Status::Pass);
    assert_eq!(result.finding_count, FindingCount::Count(1));
}

/// The same report fails when the rule is in the hard-fail set.
#[test]
fn detekt_hard_fail() {
    let dir = TempDir::new().unwrap();
    let report = write(
        &dir,
        "build/reports/detekt/detekt.xml",
        r#"<?xml version="1.0"?>
<checkstyle version="4.3">
  <file name="src/main/kotlin/F0.kt">
    <error line="3" severity="error" message="[ForbiddenImport] 'java.util.Date'"/>
  </file>
</checkstyle>"#,
    );
    let section = DetektSection {
        tolerance_percent: 5,
        hard_fail_rule_ids: vec!["ForbiddenImport".to_string()],
        ..DetektSection::default()
    };
    let result = run_audit(&DetektAudit::new(":app", report, 20, &section));
    assert_eq!(result.status, Status::Fail);
    assert_eq!(result.findings[0].kind, "ForbiddenImport");
}

/// Lint unfolds one issue into per-location findings, minus the whitelist.
#[test]
fn lint_unfolds_locations() {
    let dir = TempDir::new().unwrap();
    let report = write(
        &dir,
        "build/reports/lint-results-debug.xml",
        r#"<?xml version="1.0"?>
<issues format="6">
  <issue id="MissingPermission" severity="Fatal" message="oops">
    <location file="src/main/java/Net.kt" line="10"/>
    <location file="src/gen/Stub.kt" line="2"/>
  </issue>
</issues>"#,
    );
    let section = LintSection {
        whitelist_patterns: vec!["src/gen/**".to_string()],
        ..LintSection::default()
    };
    let result = run_audit(&AndroidLintAudit::new(":app", report, 10, &section));
    assert_eq!(result.finding_count, FindingCount::Count(1));
    assert_eq!(
        result.findings[0].file_path.as_deref(),
        Some("src/main/java/Net.kt")
    );
}

/// Three compiler-error origins in one captured stream.
#[test]
fn compilation_three_origins() {
    let dir = TempDir::new().unwrap();
    let module_dir = dir.path();
    let capture = Arc::new(CompilationCapture::new());
    capture.register();
    capture.append(&format!(
        "e: {base}/src/main/kotlin/A.kt: (12, 8): unresolved reference\n\
         {base}/src/main/java/B.java:4: error: cannot find symbol\n\
         e: [kapt] processing halted\n",
        base = module_dir.display()
    ));
    capture.unregister();

    let audit = CompilationAudit::new(":app", module_dir, capture);
    let result = run_audit(&audit);
    assert_eq!(result.status, Status::Fail);
    assert_eq!(result.findings.len(), 3);
    assert_eq!(
        result.findings[0].file_path.as_deref(),
        Some("src/main/kotlin/A.kt")
    );
    assert_eq!(result.findings[0].line, Some(12));
    assert_eq!(
        result.findings[1].file_path.as_deref(),
        Some("src/main/java/B.java")
    );
    assert_eq!(result.findings[1].line, Some(4));
    assert_eq!(result.findings[2].file_path, None);
    assert_eq!(result.findings[2].line, None);
}

/// The rail ordering contract: forbidden popularity, missing position, and
/// a compliant query.
#[test]
fn rails_guard_cases() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "src/main/kotlin/RailDao.kt",
        r#"
@Query("SELECT * FROM RailEntry ORDER BY popularity DESC")
fun popular(): List<RailEntry>

@Query("SELECT * FROM RailEntry WHERE x=1")
fun unordered(): List<RailEntry>

@Query("SELECT * FROM RailEntry ORDER BY position ASC")
fun ordered(): List<RailEntry>
"#,
    );
    let audit = SqlFtsAudit::new(":app", dir.path(), &SqlFtsSection::default());
    let result = run_audit(&audit);
    assert_eq!(result.findings.len(), 2);
    assert!(result.findings[0].message.contains("popularity is forbidden"));
    assert!(result.findings[1].message.contains("must ORDER BY position"));
}

/// Coverage totals: Good(9/10) + Bad(3/10) at threshold 80 fail at 60.0.
#[test]
fn coverage_total_and_offenders() {
    let dir = TempDir::new().unwrap();
    let report = write(
        &dir,
        "coverage.xml",
        r#"<?xml version="1.0"?>
<report name="app">
  <package name="com/acme">
    <class name="com/acme/Good">
      <counter type="BRANCH" missed="1" covered="9"/>
    </class>
    <class name="com/acme/Bad">
      <counter type="BRANCH" missed="7" covered="3"/>
    </class>
  </package>
</report>"#,
    );
    let section = CoverageSection {
        min_percent: 80,
        ..CoverageSection::default()
    };
    let result = run_audit(&CoverageBranchesAudit::new(":app", report, &section));
    assert_eq!(result.status, Status::Fail);
    assert_eq!(result.finding_count, FindingCount::Percent(60.0));
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].kind, "ClassBelowThreshold");
    assert!(result.findings[0].message.contains("com/acme/Bad"));
}

struct FixedUploader(&'static str);

impl ReportUploader for FixedUploader {
    fn upload(&self, _pretty_json: &str) -> Result<Option<String>, UploadError> {
        Ok(Some(self.0.to_string()))
    }
}

/// Aggregator failure message lists the failing pair and both locations.
#[test]
fn aggregator_failure_message() {
    let dir = TempDir::new().unwrap();
    let report_path = dir.path().join("build/reports/testgate-results.json");
    let aggregator = ReportAggregator::new(&report_path)
        .with_uploader(Box::new(FixedUploader("http://paste.rs/abc")));

    aggregator.enqueue(AuditResult::counted(
        ":app",
        "ForbiddenImport",
        Vec::new(),
        0,
        Status::Pass,
    ));
    aggregator.enqueue(AuditResult::counted(
        ":lib",
        "ForbiddenMethodCall",
        Vec::new(),
        0,
        Status::Fail,
    ));

    let message = aggregator.close().unwrap_err().to_string();
    assert!(message.contains("Build Failed. The following audits failed: :lib:ForbiddenMethodCall"));
    assert!(message.contains("Online json: http://paste.rs/abc.json"));
    assert!(message.contains(&format!("Local json: {}", report_path.display())));

    // The report itself round-trips.
    let written: Vec<AuditResult> =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(written.len(), 2);
    assert_eq!(written[1].module, ":lib");
    assert_eq!(written[1].status, Status::Fail);
}

/// Running an audit twice over the same inputs yields equal results.
#[test]
fn audits_are_deterministic() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "src/main/kotlin/Dao.kt",
        "@RawQuery\nfun raw(): Cursor\n\
         @Query(\"SELECT * FROM RailEntry WHERE x=1\")\nfun rails(): List<RailEntry>\n",
    );
    let audit = SqlFtsAudit::new(":app", dir.path(), &SqlFtsSection::default());
    let first = run_audit(&audit);
    let second = run_audit(&audit);
    assert_eq!(first, second);
}
