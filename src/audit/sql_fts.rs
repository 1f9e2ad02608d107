//! SQL discipline and FTS schema lock.
//!
//! Scans `@Query` annotations for raw-query escapes and complex SQL, holds
//! rail queries to their ordering contract, and pins the full-text-search
//! schema to FTS4.

use crate::audit::{within_tolerance, Audit};
use crate::config::SqlFtsSection;
use crate::error::{GateError, Result};
use crate::model::{AuditResult, Finding, Status};
use crate::source::{files_under, module_relative};
use crate::whitelist::WhitelistMatcher;
use regex::Regex;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

/// `@Query("...")` and `@Query("""...""")` bodies. The triple-quoted
/// alternative comes first so the single-quoted one cannot eat its opening.
static QUERY_BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)@Query\s*\(\s*(?:"""(.*?)"""|"((?:[^"\\\n]|\\.)*)")"#).unwrap()
});

static RAW_QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*@RawQuery\b").unwrap());

static SUPPORT_QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bSupportSQLiteQuery\b").unwrap());

static COMPLEX_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(JOIN|UNION|WITH|CREATE|ALTER|INSERT|UPDATE|DELETE)\b").unwrap()
});

static RAIL_FROM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bFROM\s+\S*RailEntry").unwrap());

static ORDER_BY_POSITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bORDER\s+BY\s+position\b").unwrap());

static ORDER_BY_POPULARITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bORDER\s+BY\s+popularity\b").unwrap());

static FTS4: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@Fts4\b").unwrap());
static FTS5: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@Fts5\b").unwrap());

/// Gate on SQL usage across the module's source tree.
pub struct SqlFtsAudit {
    module: String,
    module_dir: PathBuf,
    tolerance_percent: u32,
    whitelist: WhitelistMatcher,
}

impl SqlFtsAudit {
    pub fn new(
        module: impl Into<String>,
        module_dir: impl Into<PathBuf>,
        section: &SqlFtsSection,
    ) -> Self {
        Self {
            module: module.into(),
            module_dir: module_dir.into(),
            tolerance_percent: section.tolerance_percent,
            whitelist: WhitelistMatcher::new(&section.whitelist_patterns),
        }
    }
}

impl Audit for SqlFtsAudit {
    fn name(&self) -> &'static str {
        "SqlFtsAudit"
    }

    fn check(&self, emit: &mut dyn FnMut(AuditResult)) -> Result<()> {
        let files = files_under(&self.module_dir.join("src"), &["kt", "java"]);
        let scanned = files.len();

        let mut findings = Vec::new();
        let mut saw_any_fts = false;
        let mut saw_fts4 = false;

        for path in &files {
            let content =
                fs::read_to_string(path).map_err(|e| GateError::read_error(path, e))?;
            let relative = module_relative(path, &self.module_dir);
            let whitelisted = self.whitelist.matches_path(&relative);
            let queries = extract_queries(&content);

            if !whitelisted {
                for m in RAW_QUERY.find_iter(&content) {
                    findings.push(Finding::at(
                        "RawQueryUsage",
                        relative.clone(),
                        Some(line_of(&content, m.start())),
                        "@RawQuery is banned; express the query with @Query",
                    ));
                }
                if let Some(m) = SUPPORT_QUERY.find(&content) {
                    findings.push(Finding::at(
                        "SupportSqliteQueryUsage",
                        relative.clone(),
                        Some(line_of(&content, m.start())),
                        "SupportSQLiteQuery is banned; express the query with @Query",
                    ));
                }
                for (sql, line) in &queries {
                    if let Some(caps) = COMPLEX_KEYWORD.captures(sql) {
                        findings.push(Finding::at(
                            "ComplexSqlQuery",
                            relative.clone(),
                            Some(*line),
                            format!("complex SQL keyword {} is not allowed in @Query", &caps[1].to_uppercase()),
                        ));
                    }
                }
            }

            // The rail guard and the FTS lock apply even to whitelisted files.
            for (sql, line) in &queries {
                if !RAIL_FROM.is_match(sql) {
                    continue;
                }
                if ORDER_BY_POPULARITY.is_match(sql) {
                    findings.push(Finding::at(
                        "RailOrderViolation",
                        relative.clone(),
                        Some(*line),
                        "ORDER BY popularity is forbidden for RailEntry queries",
                    ));
                } else if !ORDER_BY_POSITION.is_match(sql) {
                    findings.push(Finding::at(
                        "RailOrderViolation",
                        relative.clone(),
                        Some(*line),
                        "RailEntry queries must ORDER BY position",
                    ));
                }
            }

            for m in FTS5.find_iter(&content) {
                findings.push(Finding::at(
                    "Fts5Usage",
                    relative.clone(),
                    Some(line_of(&content, m.start())),
                    "@Fts5 is banned; full-text tables must use @Fts4",
                ));
                saw_any_fts = true;
            }
            if FTS4.is_match(&content) {
                saw_any_fts = true;
                saw_fts4 = true;
            }
        }

        if saw_any_fts && !saw_fts4 {
            findings.push(Finding::new(
                "FtsMissingFts4",
                "full-text tables present without any @Fts4 table",
            ));
        }

        let status = Status::from_pass(within_tolerance(
            findings.len(),
            scanned,
            self.tolerance_percent,
        ));
        emit(AuditResult::counted(
            self.module.clone(),
            self.name(),
            findings,
            self.tolerance_percent,
            status,
        ));
        Ok(())
    }
}

/// `(sql, 1-based line of the annotation)` pairs for every `@Query` body.
pub(crate) fn extract_queries(content: &str) -> Vec<(String, u32)> {
    QUERY_BODY
        .captures_iter(content)
        .map(|caps| {
            let sql = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            (sql, line_of(content, start))
        })
        .collect()
}

fn line_of(content: &str, offset: usize) -> u32 {
    (content[..offset].matches('\n').count() + 1) as u32
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

    fn run(dir: &TempDir, section: &SqlFtsSection) -> AuditResult {
        let audit = SqlFtsAudit::new(":app", dir.path(), section);
        let mut results = Vec::new();
        audit.check(&mut |r| results.push(r)).unwrap();
        results.remove(0)
    }

    #[test]
    fn test_extract_single_and_triple_quoted() {
        let content = r#"
@Query("SELECT * FROM users WHERE id = :id")
fun byId(id: Long): User

@Query(
    """
    SELECT * FROM events
    """
)
fun events(): List<Event>
"#;
        let queries = extract_queries(content);
        assert_eq!(queries.len(), 2);
        assert!(queries[0].0.contains("FROM users"));
        assert_eq!(queries[0].1, 2);
        assert!(queries[1].0.contains("FROM events"));
        assert_eq!(queries[1].1, 5);
    }

    #[test]
    fn test_raw_query_banned() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/main/kotlin/Dao.kt",
            "@RawQuery\nfun raw(query: SupportSQLiteQuery): Cursor\n",
        );
        let result = run(&dir, &SqlFtsSection::default());
        assert_eq!(result.status, Status::Fail);
        let kinds: Vec<_> = result.findings.iter().map(|f| f.kind.as_str()).collect();
        assert!(kinds.contains(&"RawQueryUsage"));
        assert!(kinds.contains(&"SupportSqliteQueryUsage"));
    }

    #[test]
    fn test_complex_keywords_banned_case_insensitive() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/main/kotlin/Dao.kt",
            "@Query(\"select u.* from users u join orders o on u.id = o.uid\")\nfun joined(): List<Row>\n",
        );
        let result = run(&dir, &SqlFtsSection::default());
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].kind, "ComplexSqlQuery");
        assert!(result.findings[0].message.contains("JOIN"));
    }

    #[test]
    fn test_plain_select_allowed() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/main/kotlin/Dao.kt",
            "@Query(\"SELECT * FROM users WHERE deleted = 0\")\nfun active(): List<User>\n",
        );
        let result = run(&dir, &SqlFtsSection::default());
        assert_eq!(result.status, Status::Pass);
    }

    #[test]
    fn test_whitelist_skips_bans_but_not_rail_guard() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/legacy/kotlin/OldDao.kt",
            "@RawQuery\nfun raw(): Cursor\n\
             @Query(\"SELECT * FROM RailEntry WHERE x = 1\")\nfun rails(): List<RailEntry>\n",
        );
        let section = SqlFtsSection {
            whitelist_patterns: vec!["src/legacy/**".to_string()],
            ..SqlFtsSection::default()
        };
        let result = run(&dir, &section);
        let kinds: Vec<_> = result.findings.iter().map(|f| f.kind.as_str()).collect();
        assert!(!kinds.contains(&"RawQueryUsage"));
        assert_eq!(kinds, vec!["RailOrderViolation"]);
    }

    #[test]
    fn test_rail_guard_popularity_forbidden() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/main/kotlin/RailDao.kt",
            "@Query(\"SELECT * FROM RailEntry ORDER BY popularity DESC\")\nfun rails(): List<RailEntry>\n",
        );
        let result = run(&dir, &SqlFtsSection::default());
        assert_eq!(result.findings.len(), 1);
        assert!(result.findings[0].message.contains("popularity is forbidden"));
    }

    #[test]
    fn test_rail_guard_requires_position() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/main/kotlin/RailDao.kt",
            "@Query(\"SELECT * FROM RailEntry WHERE x=1\")\nfun rails(): List<RailEntry>\n",
        );
        let result = run(&dir, &SqlFtsSection::default());
        assert_eq!(result.findings.len(), 1);
        assert!(result.findings[0].message.contains("must ORDER BY position"));
    }

    #[test]
    fn test_rail_guard_position_ok() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/main/kotlin/RailDao.kt",
            "@Query(\"SELECT * FROM RailEntry ORDER BY position ASC\")\nfun rails(): List<RailEntry>\n",
        );
        let result = run(&dir, &SqlFtsSection::default());
        assert_eq!(result.status, Status::Pass);
        assert!(result.findings.is_empty());
    }

    #[test]
    fn test_fts5_banned_and_missing_fts4() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/main/kotlin/Search.kt",
            "@Fts5\n@Entity\nclass SearchRow\n",
        );
        let result = run(&dir, &SqlFtsSection::default());
        let kinds: Vec<_> = result.findings.iter().map(|f| f.kind.as_str()).collect();
        assert_eq!(kinds, vec!["Fts5Usage", "FtsMissingFts4"]);
        assert_eq!(result.findings[1].file_path, None);
    }

    #[test]
    fn test_fts4_satisfies_lock() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/main/kotlin/Search.kt",
            "@Fts4\n@Entity\nclass SearchRow\n",
        );
        let result = run(&dir, &SqlFtsSection::default());
        assert_eq!(result.status, Status::Pass);
    }

    #[test]
    fn test_tolerance_allows_ratio() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/main/kotlin/Bad.kt", "@RawQuery\nfun raw(): Cursor\n");
        for i in 0..9 {
            write(
                &dir,
                &format!("src/main/kotlin/Ok{i}.kt"),
                "class Ok\n",
            );
        }
        // 1 finding over 10 files = 10%.
        let section = SqlFtsSection {
            tolerance_percent: 10,
            ..SqlFtsSection::default()
        };
        let result = run(&dir, &section);
        assert_eq!(result.status, Status::Pass);
        assert_eq!(result.findings.len(), 1);
    }
}
