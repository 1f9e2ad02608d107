//! Source-tree enumeration and fast header reading for Kotlin/Java files.
//!
//! The header reader is deliberately shallow: a bounded line scan that
//! extracts the `package` declaration, the imports, and the top-level type
//! declarations. No real parsing happens here.

use crate::error::{GateError, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

/// Source sets that count toward a module's scanned-file denominator.
pub const SOURCE_SETS: &[&str] = &["main", "debug", "release", "test", "androidTest"];

/// Header reading stops after this many lines.
const HEADER_LINE_LIMIT: usize = 400;

static PACKAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*package\s+([A-Za-z_]\w*(?:\.\w+)*)").unwrap());

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*import\s+(?:static\s+)?([A-Za-z_]\w*(?:\.\w+)*(?:\.\*)?)").unwrap()
});

static DECLARATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:public|protected|private|internal|abstract|final|open|sealed|data|annotation|inner|static|strictfp)\s+)*(?:class|interface|object|enum(?:\s+class)?)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .unwrap()
});

/// Count `.kt`/`.java` files under the module's source sets.
///
/// Returns at least 1 so callers can divide by it.
pub fn scan_source_files(module_dir: &Path) -> usize {
    let mut count = 0;
    for set in SOURCE_SETS {
        let root = module_dir.join("src").join(set);
        if !root.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && is_source_file(entry.path()) {
                count += 1;
            }
        }
    }
    count.max(1)
}

/// True for `.kt` and `.java` files.
pub fn is_source_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("kt") | Some("java")
    )
}

/// All files under `root` with one of `extensions`, sorted by path so that
/// findings are deterministic for a given tree. An empty extension list
/// matches every file.
pub fn files_under(root: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            extensions.is_empty()
                || p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| extensions.contains(&e))
        })
        .collect();
    files.sort();
    files
}

/// Path relative to the module root in forward-slash form; falls back to
/// the full path when the file lives outside the module.
pub fn module_relative(path: &Path, module_dir: &Path) -> String {
    let relative = path.strip_prefix(module_dir).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

/// An import with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub path: String,
    pub line: u32,
}

/// A top-level type declaration with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub line: u32,
}

/// The shallow header of one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceHeader {
    pub package: Option<String>,
    pub package_line: Option<u32>,
    pub imports: Vec<Import>,
    pub declarations: Vec<Declaration>,
}

impl SourceHeader {
    /// True when any import equals `fqcn` exactly.
    pub fn imports_fqcn(&self, fqcn: &str) -> bool {
        self.imports.iter().any(|i| i.path == fqcn)
    }
}

/// Line-based header extraction, bounded by [`HEADER_LINE_LIMIT`] lines.
pub fn read_header(path: &Path) -> Result<SourceHeader> {
    let content = fs::read_to_string(path).map_err(|e| GateError::read_error(path, e))?;
    Ok(parse_header(&content))
}

pub(crate) fn parse_header(content: &str) -> SourceHeader {
    let mut header = SourceHeader::default();
    for (index, line) in content.lines().take(HEADER_LINE_LIMIT).enumerate() {
        let line_number = (index + 1) as u32;
        if header.package.is_none() {
            if let Some(caps) = PACKAGE_RE.captures(line) {
                header.package = Some(caps[1].to_string());
                header.package_line = Some(line_number);
                continue;
            }
        }
        if let Some(caps) = IMPORT_RE.captures(line) {
            header.imports.push(Import {
                path: caps[1].to_string(),
                line: line_number,
            });
            continue;
        }
        if let Some(caps) = DECLARATION_RE.captures(line) {
            header.declarations.push(Declaration {
                name: caps[1].to_string(),
                line: line_number,
            });
        }
    }
    header
}
