//! Configuration for a testgate run.
//!
//! One explicit record per audit, with defaults matching the documented
//! tolerances. A `testgate.yaml` (or `.yml`/`.json`) found at the module
//! directory or any ancestor overrides the defaults; absence of the file
//! means an all-default run.

use crate::error::{GateError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILENAMES: &[&str] = &["testgate.yaml", "testgate.yml", "testgate.json"];

/// Default location of the final JSON report, relative to the module dir.
pub const DEFAULT_REPORT_PATH: &str = "build/reports/testgate-results.json";

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GateConfig {
    /// Where the aggregator writes the final JSON, relative to the module dir.
    pub report_path: PathBuf,
    /// Enable the optional report upload.
    pub upload_enabled: bool,
    /// Endpoint the default uploader POSTs the pretty JSON to.
    pub upload_endpoint: String,
    pub detekt: DetektSection,
    pub lint: LintSection,
    pub sql_fts: SqlFtsSection,
    pub structure: StructureSection,
    pub stack: StackSection,
    pub fixtures: FixturesSection,
    pub tests: TestsSection,
    pub coverage: CoverageSection,
    pub harness: HarnessSection,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
            upload_enabled: true,
            upload_endpoint: "https://paste.rs".to_string(),
            detekt: DetektSection::default(),
            lint: LintSection::default(),
            sql_fts: SqlFtsSection::default(),
            structure: StructureSection::default(),
            stack: StackSection::default(),
            fixtures: FixturesSection::default(),
            tests: TestsSection::default(),
            coverage: CoverageSection::default(),
            harness: HarnessSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetektSection {
    pub enabled: bool,
    pub tolerance_percent: u32,
    pub whitelist_patterns: Vec<String>,
    pub hard_fail_rule_ids: Vec<String>,
    /// Report location override, relative to the module dir.
    pub report: Option<PathBuf>,
}

impl Default for DetektSection {
    fn default() -> Self {
        Self {
            enabled: true,
            tolerance_percent: 10,
            whitelist_patterns: Vec::new(),
            hard_fail_rule_ids: Vec::new(),
            report: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LintSection {
    pub enabled: bool,
    pub tolerance_percent: u32,
    pub whitelist_patterns: Vec<String>,
    pub report: Option<PathBuf>,
}

impl Default for LintSection {
    fn default() -> Self {
        Self {
            enabled: true,
            tolerance_percent: 10,
            whitelist_patterns: Vec::new(),
            report: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SqlFtsSection {
    pub tolerance_percent: u32,
    pub whitelist_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StructureSection {
    /// Project coordinate of the shared test harness, e.g. `":testing"`.
    pub harness_project: String,
    /// Root package instrumented-test imports are collected under.
    pub instrumented_root: String,
    pub instrumented_allow_list: Vec<String>,
    pub instrumented_tolerance_percent: u32,
}

impl Default for StructureSection {
    fn default() -> Self {
        Self {
            harness_project: ":testing".to_string(),
            instrumented_root: String::new(),
            instrumented_allow_list: Vec::new(),
            instrumented_tolerance_percent: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StackSection {
    pub whitelist_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FixturesSection {
    pub tolerance_percent: u32,
    pub min_bytes: u64,
    pub max_bytes: u64,
    pub whitelist_patterns: Vec<String>,
}

impl Default for FixturesSection {
    fn default() -> Self {
        Self {
            tolerance_percent: 10,
            min_bytes: 256,
            max_bytes: 8192,
            whitelist_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TestsSection {
    pub enabled: bool,
    pub tolerance_percent: u32,
    pub whitelist_patterns: Vec<String>,
    /// JUnit XML directory override, relative to the module dir.
    pub results_dir: Option<PathBuf>,
    /// Names of the test tasks that produce the results, used in the
    /// empty-directory error message.
    pub task_names: Vec<String>,
}

impl Default for TestsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            tolerance_percent: 10,
            whitelist_patterns: Vec::new(),
            results_dir: None,
            task_names: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoverageSection {
    pub enabled: bool,
    pub min_percent: u32,
    pub whitelist_patterns: Vec<String>,
    pub report: Option<PathBuf>,
}

impl Default for CoverageSection {
    fn default() -> Self {
        Self {
            enabled: true,
            min_percent: 70,
            whitelist_patterns: Vec::new(),
            report: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HarnessSection {
    /// Application root package, e.g. `"com.acme.app"`. Rule A applies to
    /// test files whose package starts with `<root>.(data|sync|ui)`.
    pub root_package: String,
    /// The harness package itself, whose declarations are never clones.
    pub harness_package: String,
    pub data_helpers: Vec<String>,
    pub sync_helpers: Vec<String>,
    pub ui_helpers: Vec<String>,
    /// Cross-layer helpers; they do not satisfy Rule A but their simple
    /// names are still protected against cloning.
    pub shared_helpers: Vec<String>,
    pub whitelist_patterns: Vec<String>,
}

impl GateConfig {
    /// Load configuration from a specific file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| GateError::read_error(path, e))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        let config: Self = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| {
                GateError::Config(format!("failed to parse {}: {}", path.display(), e))
            })?,
            "json" => serde_json::from_str(&content).map_err(|e| {
                GateError::Config(format!("failed to parse {}: {}", path.display(), e))
            })?,
            other => {
                return Err(GateError::Config(format!(
                    "unsupported config format '{}' for {}",
                    other,
                    path.display()
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Tolerances are percentages; anything above 100 is a config mistake.
    fn validate(&self) -> Result<()> {
        let percents = [
            ("detekt.tolerancePercent", self.detekt.tolerance_percent),
            ("lint.tolerancePercent", self.lint.tolerance_percent),
            ("sqlFts.tolerancePercent", self.sql_fts.tolerance_percent),
            (
                "structure.instrumentedTolerancePercent",
                self.structure.instrumented_tolerance_percent,
            ),
            ("fixtures.tolerancePercent", self.fixtures.tolerance_percent),
            ("tests.tolerancePercent", self.tests.tolerance_percent),
            ("coverage.minPercent", self.coverage.min_percent),
        ];
        for (key, value) in percents {
            if value > 100 {
                return Err(GateError::Config(format!(
                    "{} must be between 0 and 100, got {}",
                    key, value
                )));
            }
        }
        Ok(())
    }

    /// Walk up from `start` looking for a config file.
    pub fn find_config_file(start: &Path) -> Option<PathBuf> {
        let mut current = start;
        loop {
            for filename in CONFIG_FILENAMES {
                let candidate = current.join(filename);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
            match current.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => current = parent,
                _ => return None,
            }
        }
    }

    /// Load the discovered config, or defaults when none exists.
    pub fn load(start: &Path) -> Result<Self> {
        match Self::find_config_file(start) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }
}
