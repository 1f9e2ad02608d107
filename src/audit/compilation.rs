//! Compiler stderr capture and error extraction.
//!
//! The capture is a synchronized buffer the host appends stderr chunks to
//! while a compile task runs. The audit materializes the buffer once and
//! runs a small state machine over its lines, recognizing Kotlin (build
//! tool and CLI), javac, and annotation-processor diagnostics.

use crate::audit::Audit;
use crate::error::Result;
use crate::model::{AuditResult, Finding, Status};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

/// Kotlin via the build tool: `e: /path/File.kt: (12, 8): message`.
static KOTLIN_BUILD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^e:\s*(.+?):\s*\((\d+),\s*\d+\):\s*(.*)$").unwrap());

/// Kotlin CLI: `/path/File.kt:12:8: error: message`.
static KOTLIN_CLI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?):(\d+):\d+:\s*error:\s*(.*)$").unwrap());

/// Javac: `/path/File.java:12: error: message`.
static JAVAC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?):(\d+):\s*error:\s*(.*)$").unwrap());

/// Annotation processor with a location: `[ksp2] /path/File.kt:12:8: message`.
static PROCESSOR_LOCATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[ksp\d*\]\s*(.+?):(\d+):\d+:\s*(.*)$").unwrap());

/// Annotation processor short form: `e: [kapt] message`.
static PROCESSOR_SHORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^e:\s*\[(?:ksp\d*|kapt)\]\s*(.*)$").unwrap());

const FINDING_KIND: &str = "CompilationError";

/// Thread-safe stderr buffer with a capturing window.
///
/// Chunks appended outside `register`/`unregister` are discarded; between
/// them, `append` may be called from multiple threads.
#[derive(Debug, Default)]
pub struct CompilationCapture {
    state: Mutex<CaptureState>,
}

#[derive(Debug, Default)]
struct CaptureState {
    capturing: bool,
    buffer: String,
}

impl CompilationCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the capture window.
    pub fn register(&self) {
        self.lock().capturing = true;
    }

    /// Close the capture window. Later appends are ignored.
    pub fn unregister(&self) {
        self.lock().capturing = false;
    }

    /// Append a stderr chunk if the window is open.
    pub fn append(&self, text: &str) {
        let mut state = self.lock();
        if state.capturing {
            state.buffer.push_str(text);
        }
    }

    /// Copy of everything captured so far.
    pub fn snapshot(&self) -> String {
        self.lock().buffer.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Gate on compiler errors captured from stderr. Tolerance is always 0.
pub struct CompilationAudit {
    module: String,
    module_dir: PathBuf,
    capture: Arc<CompilationCapture>,
}

impl CompilationAudit {
    pub fn new(
        module: impl Into<String>,
        module_dir: impl Into<PathBuf>,
        capture: Arc<CompilationCapture>,
    ) -> Self {
        Self {
            module: module.into(),
            module_dir: module_dir.into(),
            capture,
        }
    }
}

impl Audit for CompilationAudit {
    fn name(&self) -> &'static str {
        "CompilationAudit"
    }

    fn check(&self, emit: &mut dyn FnMut(AuditResult)) -> Result<()> {
        let output = self.capture.snapshot();
        let findings = parse_compiler_output(&output, &self.module_dir);
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

/// How one line moves the parser state machine.
enum LineClass<'a> {
    Start(Finding),
    MessageAppend(&'a str),
    StackAppend(&'a str),
    Flush,
}

/// Extract compiler errors from a raw stderr blob.
pub fn parse_compiler_output(output: &str, module_dir: &Path) -> Vec<Finding> {
    let normalized = output.replace("\r\n", "\n").replace('\r', "\n");
    let mut findings = Vec::new();
    let mut pending: Option<Finding> = None;

    for line in normalized.lines() {
        match classify(line, module_dir) {
            LineClass::Start(finding) => {
                flush(&mut pending, &mut findings);
                pending = Some(finding);
            }
            LineClass::MessageAppend(text) => {
                if let Some(p) = pending.as_mut() {
                    p.message.push(' ');
                    p.message.push_str(text);
                }
            }
            LineClass::StackAppend(text) => {
                if let Some(p) = pending.as_mut() {
                    p.stacktrace.push(text.to_string());
                }
            }
            LineClass::Flush => flush(&mut pending, &mut findings),
        }
    }
    flush(&mut pending, &mut findings);
    findings
}

fn flush(pending: &mut Option<Finding>, findings: &mut Vec<Finding>) {
    if let Some(finding) = pending.take() {
        findings.push(finding);
    }
}

fn classify<'a>(line: &'a str, module_dir: &Path) -> LineClass<'a> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineClass::Flush;
    }
    if let Some(finding) = match_start(line, module_dir) {
        return LineClass::Start(finding);
    }
    if trimmed.starts_with("symbol:") || trimmed.starts_with("location:") {
        return LineClass::MessageAppend(trimmed);
    }
    if line.starts_with("at ")
        || line.starts_with('\t')
        || line.starts_with("    ")
        || line.starts_with('^')
        || line.starts_with("> Task :")
    {
        return LineClass::StackAppend(trimmed);
    }
    // Interleaved build output ends the diagnostic, like a blank line.
    LineClass::Flush
}

fn match_start(line: &str, module_dir: &Path) -> Option<Finding> {
    // Short processor form first: it also begins with `e:` but carries no
    // location.
    if let Some(caps) = PROCESSOR_SHORT.captures(line) {
        return Some(Finding::new(FINDING_KIND, caps[1].trim().to_string()));
    }
    if let Some(caps) = KOTLIN_BUILD.captures(line) {
        return Some(located(&caps[1], &caps[2], &caps[3], module_dir));
    }
    if let Some(caps) = PROCESSOR_LOCATED.captures(line) {
        return Some(located(&caps[1], &caps[2], &caps[3], module_dir));
    }
    if let Some(caps) = KOTLIN_CLI.captures(line) {
        return Some(located(&caps[1], &caps[2], &caps[3], module_dir));
    }
    if let Some(caps) = JAVAC.captures(line) {
        return Some(located(&caps[1], &caps[2], &caps[3], module_dir));
    }
    None
}

fn located(path: &str, line: &str, message: &str, module_dir: &Path) -> Finding {
    Finding::at(
        FINDING_KIND,
        normalize_path(path, module_dir),
        line.parse().ok(),
        message.trim().to_string(),
    )
}

/// Module-relative forward-slash form for paths under the module dir;
/// paths outside it are kept as the compiler printed them.
fn normalize_path(raw: &str, module_dir: &Path) -> String {
    match Path::new(raw).strip_prefix(module_dir) {
        Ok(relative) => relative.to_string_lossy().replace('\\', "/"),
        Err(_) => raw.to_string(),
    }
}
