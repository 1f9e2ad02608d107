//! Audit gate for multi-module builds.
//!
//! Runs a fixed catalog of independent audits over tool reports and source
//! trees, aggregates their verdicts into one JSON report, and fails the
//! build when any audit fails.

pub mod aggregator;
pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod runner;
pub mod source;
pub mod uploader;
pub mod whitelist;
pub mod xml;

pub use aggregator::{ReportAggregator, Sink};
pub use audit::compilation::{CompilationAudit, CompilationCapture};
pub use audit::coverage::CoverageBranchesAudit;
pub use audit::detekt::DetektAudit;
pub use audit::fixtures::FixturesAudit;
pub use audit::harness::HarnessReuseIsolationAudit;
pub use audit::lint::AndroidLintAudit;
pub use audit::sql_fts::SqlFtsAudit;
pub use audit::structure::StructureAudit;
pub use audit::test_results::TestsAudit;
pub use audit::test_stack::TestStackAudit;
pub use audit::Audit;
pub use cli::Cli;
pub use config::GateConfig;
pub use error::{GateError, Result};
pub use model::{AuditResult, Finding, FindingCount, Status};
pub use runner::AuditRunner;
pub use uploader::{PasteUploader, ReportUploader, UploadError};
pub use whitelist::WhitelistMatcher;
