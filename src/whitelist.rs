//! Glob and FQCN whitelist matching.
//!
//! Patterns exclude files, classes, or symbols from scrutiny. A pattern is
//! either a path glob (`*` within a segment, `**` across segments, `?` for
//! one character, leading `/` anchoring to the path start) or an FQCN
//! shorthand where `..*` means "any subpackage" and `.*` means "one
//! segment". Matching always normalizes to forward-slash, leading-`/` form
//! internally; the path as reported by tools is never rewritten.

use regex::Regex;
use tracing::warn;

/// Compiled whitelist. Empty pattern lists match nothing.
#[derive(Debug, Default)]
pub struct WhitelistMatcher {
    patterns: Vec<Regex>,
}

impl WhitelistMatcher {
    /// Matcher that never matches.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile a list of patterns. Blank patterns and patterns that fail to
    /// compile are skipped with a warning.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            push_compiled(&mut compiled, pattern, &glob_regex(pattern));
            // FQCN shorthand: a dotted pattern with no slash also matches
            // its slash-normalized form.
            if pattern.contains('.') && !pattern.contains('/') {
                push_compiled(&mut compiled, pattern, &glob_regex(&slashify_fqcn(pattern)));
            }
        }
        Self { patterns: compiled }
    }

    /// Compile a comma-separated pattern list.
    pub fn from_csv(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Test a file path. Backslashes and a missing leading slash are
    /// normalized before matching.
    pub fn matches_path(&self, path: &str) -> bool {
        if self.patterns.is_empty() || path.trim().is_empty() {
            return false;
        }
        let normalized = normalize(path);
        self.patterns.iter().any(|p| p.is_match(&normalized))
    }

    /// Test a fully qualified class name or `Class#member` symbol. Dotted
    /// and slash-form inputs are equivalent: both are reduced to the
    /// slash-normalized form, where segment wildcards keep their exact
    /// package semantics.
    pub fn matches_fqcn(&self, value: &str) -> bool {
        if self.patterns.is_empty() || value.trim().is_empty() {
            return false;
        }
        let slashed = normalize(&value.replace('.', "/"));
        self.patterns.iter().any(|p| p.is_match(&slashed))
    }
}

fn push_compiled(out: &mut Vec<Regex>, pattern: &str, regex: &str) {
    match Regex::new(regex) {
        Ok(re) => out.push(re),
        Err(error) => warn!(pattern = %pattern, error = %error, "Invalid whitelist pattern"),
    }
}

/// `\` to `/`, ensure a leading `/`.
fn normalize(path: &str) -> String {
    let slashed = path.replace('\\', "/");
    if slashed.starts_with('/') {
        slashed
    } else {
        format!("/{}", slashed)
    }
}

/// `..*` to `/**`, `.*` to `/*`, remaining dots to slashes.
fn slashify_fqcn(pattern: &str) -> String {
    pattern
        .replace("..*", "/**")
        .replace(".*", "/*")
        .replace('.', "/")
}

/// Compile one glob into an anchored regex over normalized paths.
fn glob_regex(pattern: &str) -> String {
    let anchored = pattern.starts_with('/');
    let body = pattern.trim_start_matches('/');

    let mut re = String::from("^/");
    if !anchored {
        // Unanchored patterns may begin after any prefix directory.
        re.push_str("(?:.*/)?");
    }

    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    if chars.peek() == Some(&'/') {
                        // `**/` crosses any depth including zero.
                        chars.next();
                        re.push_str("(?:.*/)?");
                    } else {
                        re.push_str(".*");
                    }
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push_str("[^/]"),
            c if is_regex_meta(c) => {
                re.push('\\');
                re.push(c);
            }
            c => re.push(c),
        }
    }
    re.push('$');
    re
}

fn is_regex_meta(c: char) -> bool {
    matches!(
        c,
        '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$' | '\\'
    )
}
