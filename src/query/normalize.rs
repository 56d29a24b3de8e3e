//! Query text normalization.
//!
//! The exporter owns all limiting and windowing: a caller-supplied `LIMIT`
//! would silently truncate a result the counter believes it is fully
//! counting, so it is removed wherever it appears.

use regex::Regex;
use std::sync::OnceLock;

fn limit_clause() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bLIMIT\s+\d+\b").expect("valid regex"))
}

/// Canonicalizes raw query text.
///
/// Strips one trailing statement terminator (`;`) and removes any `LIMIT <n>`
/// clause (case-insensitive, whole-word). Pure and infallible; normalizing an
/// already-normalized query returns the identical string.
pub fn normalize(raw: &str) -> String {
    let mut query = raw.trim();
    if let Some(stripped) = query.strip_suffix(';') {
        query = stripped.trim_end();
    }

    let without_limit = limit_clause().replace_all(query, "");
    collapse_spaces(without_limit.trim())
}

/// Collapses runs of spaces and tabs left behind by clause removal, keeping
/// line structure intact.
fn collapse_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_blank = false;
    for ch in s.chars() {
        let blank = ch == ' ' || ch == '\t';
        if blank && prev_blank {
            continue;
        }
        out.push(if blank { ' ' } else { ch });
        prev_blank = blank;
    }
    out
}
