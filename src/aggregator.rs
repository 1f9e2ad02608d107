//! Result collection, report serialization, and the final gate.
//!
//! Audits push one result each through the [`Sink`]; at end of build the
//! aggregator snapshots the queue in enqueue order, writes the pretty JSON
//! report, dispatches the optional upload, and raises a single
//! `BuildFailure` when any result is FAIL. `close` is idempotent on a
//! given snapshot; enqueueing after `close` is a caller bug.

use crate::error::{GateError, Result};
use crate::model::{AuditResult, Status};
use crate::uploader::ReportUploader;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Where audit results land, one per audit execution.
pub trait Sink: Send + Sync {
    fn enqueue(&self, result: AuditResult);
}

/// Collects results across the run and produces the final verdict.
pub struct ReportAggregator {
    results: Mutex<Vec<AuditResult>>,
    report_path: PathBuf,
    uploader: Option<Box<dyn ReportUploader>>,
}

impl ReportAggregator {
    pub fn new(report_path: impl Into<PathBuf>) -> Self {
        Self {
            results: Mutex::new(Vec::new()),
            report_path: report_path.into(),
            uploader: None,
        }
    }

    /// Attach the upload port. Without one the online location is
    /// "unavailable".
    pub fn with_uploader(mut self, uploader: Box<dyn ReportUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    /// End-of-build routine: snapshot, serialize, write, upload, gate.
    ///
    /// Returns `Ok(())` when nothing was enqueued or every audit passed;
    /// `Err(BuildFailure)` listing every failing `module:name` pair
    /// otherwise. Write failures are processing errors.
    pub fn close(&self) -> Result<()> {
        let snapshot = self
            .results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if snapshot.is_empty() {
            debug!("no audit results enqueued, skipping report");
            return Ok(());
        }

        let json = serde_json::to_string_pretty(&snapshot)?;
        if let Some(parent) = self.report_path.parent() {
            fs::create_dir_all(parent).map_err(|e| GateError::WriteReport {
                path: self.report_path.clone(),
                source: e,
            })?;
        }
        fs::write(&self.report_path, &json).map_err(|e| GateError::WriteReport {
            path: self.report_path.clone(),
            source: e,
        })?;

        let online_url = self.dispatch_upload(&json);

        let failed: Vec<String> = snapshot
            .iter()
            .filter(|r| r.status == Status::Fail)
            .map(|r| format!("{}:{}", r.module, r.name))
            .collect();
        if failed.is_empty() {
            info!(report = %self.report_path.display(), audits = snapshot.len(), "all audits passed");
            return Ok(());
        }
        Err(GateError::BuildFailure(failure_message(
            &failed,
            &self.report_path,
            online_url.as_deref(),
        )))
    }

    fn dispatch_upload(&self, json: &str) -> Option<String> {
        let uploader = self.uploader.as_ref()?;
        match uploader.upload(json) {
            Ok(url) => url,
            Err(error) => {
                warn!(error = %error, "report upload failed");
                None
            }
        }
    }
}

impl Sink for ReportAggregator {
    fn enqueue(&self, result: AuditResult) {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result);
    }
}

fn failure_message(failed: &[String], local: &Path, online: Option<&str>) -> String {
    let online = match online {
        Some(url) if url.ends_with(".json") => url.to_string(),
        Some(url) => format!("{}.json", url),
        None => "unavailable".to_string(),
    };
    format!(
        "Build Failed. The following audits failed: {}\nLocal json: {}\nOnline json: {}",
        failed.join(", "),
        local.display(),
        online
    )
}
