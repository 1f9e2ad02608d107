//! Branch-coverage gate over a JaCoCo-style XML report.
//!
//! Only class-level BRANCH counters participate; the counters nested in
//! `<method>` elements are aggregates of the same data and are ignored.
//! The result's finding count carries the total percentage rounded to one
//! decimal rather than a list length.

use crate::audit::Audit;
use crate::config::CoverageSection;
use crate::error::Result;
use crate::model::{AuditResult, Finding, FindingCount, Status};
use crate::whitelist::WhitelistMatcher;
use crate::xml::{parse_xml, Element};
use std::path::PathBuf;

/// Gate on aggregate branch coverage.
pub struct CoverageBranchesAudit {
    module: String,
    report_path: PathBuf,
    min_percent: u32,
    whitelist: WhitelistMatcher,
}

#[derive(Debug)]
struct ClassCoverage {
    name: String,
    covered: u64,
    missed: u64,
}

impl ClassCoverage {
    fn denominator(&self) -> u64 {
        self.covered + self.missed
    }

    fn percent(&self) -> f64 {
        if self.denominator() == 0 {
            0.0
        } else {
            self.covered as f64 * 100.0 / self.denominator() as f64
        }
    }
}

impl CoverageBranchesAudit {
    pub fn new(
        module: impl Into<String>,
        report_path: impl Into<PathBuf>,
        section: &CoverageSection,
    ) -> Self {
        Self {
            module: module.into(),
            report_path: report_path.into(),
            min_percent: section.min_percent,
            whitelist: WhitelistMatcher::new(&section.whitelist_patterns),
        }
    }
}

impl Audit for CoverageBranchesAudit {
    fn name(&self) -> &'static str {
        "CoverageBranchesAudit"
    }

    fn check(&self, emit: &mut dyn FnMut(AuditResult)) -> Result<()> {
        let report = parse_xml(&self.report_path)?;

        let mut classes = Vec::new();
        for package in report.children_named("package") {
            for class in package.children_named("class") {
                let name = class.attr("name").unwrap_or_default().to_string();
                if self.whitelist.matches_fqcn(&name) {
                    continue;
                }
                let (covered, missed) = branch_counters(class);
                classes.push(ClassCoverage {
                    name,
                    covered,
                    missed,
                });
            }
        }

        let covered: u64 = classes.iter().map(|c| c.covered).sum();
        let missed: u64 = classes.iter().map(|c| c.missed).sum();
        let total_percent = if covered + missed == 0 {
            0.0
        } else {
            round_one_decimal(covered as f64 * 100.0 / (covered + missed) as f64)
        };

        let passed = total_percent >= self.min_percent as f64;
        let mut findings = Vec::new();
        if !passed {
            let mut offenders: Vec<&ClassCoverage> = classes
                .iter()
                .filter(|c| c.denominator() > 0 && c.percent() < self.min_percent as f64)
                .collect();
            offenders.sort_by(|a, b| {
                a.percent()
                    .partial_cmp(&b.percent())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.name.cmp(&b.name))
            });
            for class in offenders {
                findings.push(Finding::new(
                    "ClassBelowThreshold",
                    format!(
                        "{} branch coverage is {:.1}%, below the {}% threshold",
                        class.name,
                        class.percent(),
                        self.min_percent
                    ),
                ));
            }
        }

        emit(AuditResult {
            module: self.module.clone(),
            name: self.name().to_string(),
            findings,
            tolerance: self.min_percent,
            finding_count: FindingCount::Percent(total_percent),
            status: Status::from_pass(passed),
        });
        Ok(())
    }
}

/// Sum the class-level BRANCH counters, skipping `<method>` descendants.
fn branch_counters(class: &Element) -> (u64, u64) {
    let mut covered = 0;
    let mut missed = 0;
    for counter in class.children_named("counter") {
        if counter.attr("type") != Some("BRANCH") {
            continue;
        }
        covered += counter
            .attr("covered")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        missed += counter
            .attr("missed")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
    }
    (covered, missed)
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
