//! Named placeholder handling for SQL templates.
//!
//! A placeholder is a colon followed by `[A-Za-z_][A-Za-z0-9_]*`, e.g.
//! `:customer_id`. The scan skips `::` casts, single-quoted string literals
//! and double-quoted identifiers. Colons elsewhere (comments, dollar-quoted
//! bodies) are not recognised as such and may be picked up.

use crate::db::Value;
use crate::params::Combination;
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Matches, in priority order: a string literal, a quoted identifier, a
/// `::` cast, or a named placeholder (capture group 1).
fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|::|:([A-Za-z_][A-Za-z0-9_]*)"#)
            .expect("placeholder pattern is valid")
    })
}

/// A template with placeholders rewritten to positional `$n` markers.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    /// SQL with `$1`, `$2`, ... in place of named placeholders.
    pub sql: String,
    /// One argument per placeholder occurrence, in textual order.
    pub args: Vec<Value>,
}

/// Distinct placeholder names in order of first occurrence.
pub fn extract_parameters(sql: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in placeholder_regex().captures_iter(sql) {
        if let Some(name) = caps.get(1) {
            if !names.iter().any(|n| n == name.as_str()) {
                names.push(name.as_str().to_string());
            }
        }
    }
    names
}

/// Rewrites every placeholder occurrence to a positional marker and collects
/// the bound values.
///
/// A name that appears twice gets two positions bound to the same value. A
/// name missing from the combination binds NULL.
pub fn substitute(sql: &str, combination: &Combination) -> BoundStatement {
    let mut args = Vec::new();
    let rewritten = placeholder_regex().replace_all(sql, |caps: &Captures| match caps.get(1) {
        Some(name) => {
            args.push(combination.get(name.as_str()).cloned().unwrap_or_default());
            format!("${}", args.len())
        }
        None => caps[0].to_string(),
    });

    BoundStatement {
        sql: rewritten.into_owned(),
        args,
    }
}
