use regex::Regex;
use thiserror::Error;

use crate::model::ObjectId;

/// Collapses runs of whitespace and trims, so formatting-only edits to a
/// definition compare equal.
pub fn normalize_sql_whitespace(sql: &str) -> String {
    let re = Regex::new(r"\s+").unwrap();
    re.replace_all(sql.trim(), " ").to_string()
}

/// Removes `/* ... */` and `-- ...` comments from a SQL fragment.
pub fn strip_sql_comments(sql: &str) -> String {
    let block = Regex::new(r"(?s)/\*.*?\*/").unwrap();
    let line = Regex::new(r"(?m)--.*$").unwrap();
    let without_block = block.replace_all(sql, "");
    line.replace_all(&without_block, "").to_string()
}

/// Canonical form used when comparing routine/view bodies across the
/// script folder and live introspection: comments stripped, whitespace
/// collapsed, case preserved (T-SQL identifiers keep their declared case).
pub fn normalize_sql(sql: &str) -> String {
    normalize_sql_whitespace(&strip_sql_comments(&sql.replace("\r\n", "\n")))
}

/// Strips redundant outer parentheses from a default expression. The
/// catalog stores `((0))` where a script writes `(0)` or plain `0`; both
/// sides normalize to `0` before comparison.
pub fn normalize_default(expr: &str) -> String {
    let mut s = expr.trim();
    while is_wrapped(s) {
        s = s[1..s.len() - 1].trim();
    }
    s.to_string()
}

fn is_wrapped(s: &str) -> bool {
    if !(s.starts_with('(') && s.ends_with(')')) {
        return false;
    }
    let mut depth = 0usize;
    for (i, b) in s.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return i == s.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("source unreadable: {path}: {message}")]
    SourceUnreadable { path: String, message: String },

    #[error("parse error in {file}{}: {message}", object_suffix(.object))]
    Parse {
        file: String,
        object: Option<ObjectId>,
        message: String,
    },

    #[error("connection to {server}/{database} failed: {message}")]
    Connection {
        server: String,
        database: String,
        message: String,
    },

    #[error("unresolvable dependency cycle among: {}", format_objects(.objects))]
    UnresolvableDependency { objects: Vec<ObjectId> },

    /// Signal, not a failure: the included difference set is empty.
    #[error("no changes to apply")]
    NoChanges,

    #[error("execution of {action} {object} failed: {message}")]
    Execution {
        object: ObjectId,
        action: String,
        message: String,
    },

    #[error("failed to write sync script to {path}: {message}")]
    ScriptWrite { path: String, message: String },
}

fn object_suffix(object: &Option<ObjectId>) -> String {
    match object {
        Some(id) => format!(" ({id})"),
        None => String::new(),
    }
}

fn format_objects(objects: &[ObjectId]) -> String {
    objects
        .iter()
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, SyncError>;
