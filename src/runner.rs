//! Audit catalog construction and execution for one module.
//!
//! The runner owns the compilation capture, builds the fixed catalog from
//! the configuration and the conventional artifact locations, and runs the
//! audits as independent parallel tasks. Each audit's emit closure feeds
//! the shared sink; the first processing error aborts the run.

use crate::aggregator::Sink;
use crate::audit::compilation::{CompilationAudit, CompilationCapture};
use crate::audit::coverage::CoverageBranchesAudit;
use crate::audit::detekt::DetektAudit;
use crate::audit::fixtures::FixturesAudit;
use crate::audit::harness::HarnessReuseIsolationAudit;
use crate::audit::lint::AndroidLintAudit;
use crate::audit::sql_fts::SqlFtsAudit;
use crate::audit::structure::StructureAudit;
use crate::audit::test_results::TestsAudit;
use crate::audit::test_stack::TestStackAudit;
use crate::audit::Audit;
use crate::config::GateConfig;
use crate::error::Result;
use crate::source::scan_source_files;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Conventional artifact locations, relative to the module directory.
const DETEKT_REPORT: &str = "build/reports/detekt/detekt.xml";
const LINT_REPORT: &str = "build/reports/lint-results-debug.xml";
const COVERAGE_REPORT: &str =
    "build/reports/jacoco/testDebugUnitTestReport/testDebugUnitTestReport.xml";
const TEST_RESULTS_DIR: &str = "build/test-results/testDebugUnitTest";

/// Runs the audit catalog for one module.
pub struct AuditRunner {
    module: String,
    module_dir: PathBuf,
    config: GateConfig,
    capture: Arc<CompilationCapture>,
}

impl AuditRunner {
    pub fn new(
        module: impl Into<String>,
        module_dir: impl Into<PathBuf>,
        config: GateConfig,
    ) -> Self {
        Self {
            module: module.into(),
            module_dir: module_dir.into(),
            config,
            capture: Arc::new(CompilationCapture::new()),
        }
    }

    /// The stderr capture the host feeds compiler output into.
    pub fn capture(&self) -> Arc<CompilationCapture> {
        Arc::clone(&self.capture)
    }

    /// Run every audit in the catalog, emitting results into `sink`.
    pub fn run(&self, sink: &dyn Sink) -> Result<()> {
        let audits = self.catalog();
        debug!(module = %self.module, audits = audits.len(), "running audit catalog");
        audits.into_par_iter().try_for_each(|audit| {
            debug!(audit = audit.name(), "running audit");
            let mut emit = |result| sink.enqueue(result);
            audit.check(&mut emit)
        })
    }

    fn resolve(&self, configured: Option<&PathBuf>, conventional: &str) -> PathBuf {
        match configured {
            Some(path) => self.module_dir.join(path),
            None => self.module_dir.join(conventional),
        }
    }

    fn catalog(&self) -> Vec<Box<dyn Audit>> {
        let scanned = scan_source_files(&self.module_dir);
        let module = self.module.as_str();
        let dir: &Path = &self.module_dir;
        let config = &self.config;

        let mut audits: Vec<Box<dyn Audit>> = Vec::new();
        audits.push(Box::new(CompilationAudit::new(
            module,
            dir,
            Arc::clone(&self.capture),
        )));
        if config.detekt.enabled {
            audits.push(Box::new(DetektAudit::new(
                module,
                self.resolve(config.detekt.report.as_ref(), DETEKT_REPORT),
                scanned,
                &config.detekt,
            )));
        }
        if config.lint.enabled {
            audits.push(Box::new(AndroidLintAudit::new(
                module,
                self.resolve(config.lint.report.as_ref(), LINT_REPORT),
                scanned,
                &config.lint,
            )));
        }
        audits.push(Box::new(HarnessReuseIsolationAudit::new(
            module,
            dir,
            &config.harness,
        )));
        audits.push(Box::new(SqlFtsAudit::new(module, dir, &config.sql_fts)));
        audits.push(Box::new(StructureAudit::new(module, dir, &config.structure)));
        audits.push(Box::new(TestStackAudit::new(module, dir, &config.stack)));
        audits.push(Box::new(FixturesAudit::new(module, dir, &config.fixtures)));
        if config.tests.enabled {
            audits.push(Box::new(TestsAudit::new(
                module,
                self.resolve(config.tests.results_dir.as_ref(), TEST_RESULTS_DIR),
                &config.tests,
            )));
        }
        if config.coverage.enabled {
            audits.push(Box::new(CoverageBranchesAudit::new(
                module,
                self.resolve(config.coverage.report.as_ref(), COVERAGE_REPORT),
                &config.coverage,
            )));
        }
        audits
    }
}
