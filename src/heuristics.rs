// SPDX-License-Identifier: Apache-2.0

//! Pattern based injection heuristic for raw user input
//!
//! Unlike the dialect checkers this never parses anything: it flags any
//! fragment that looks like a boolean tautology, an inline comment, a
//! script tag, an embedded statement or a function commonly abused for
//! blind or error based injection. Meant for values such as sort keys or
//! search terms that end up concatenated into SQL.

use std::sync::OnceLock;

use regex::Regex;

const INJECTION_PATTERN: &str = concat!(
    r"(?i)\b(and|or)\b.{1,6}?(=|>|<|\bin\b|\blike\b)",
    r"|/\*.+?\*/",
    r"|<\s*script\b",
    r"|\bEXEC\b",
    r"|UNION.+?SELECT",
    r"|UPDATE.+?SET",
    r"|INSERT\s+INTO.+?VALUES",
    r"|(SELECT|DELETE).+?FROM|(CREATE|ALTER|DROP|TRUNCATE)\s+(TABLE|DATABASE)",
    r"|\b(alert\(|confirm\(|expression\(|prompt\(|benchmark\s*?\(.*\)|sleep\s*?\(.*\)|load_file\s*?\()",
    r"|\b(updatexml\s*?\(.*\)|extractvalue\s*?\(.*\)|floor\s*?\(.*\))",
);

fn injection_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(INJECTION_PATTERN).expect("valid injection pattern"))
}

/// Returns `true` when `input` carries no known injection pattern.
pub fn is_valid_sql(input: &str) -> bool {
    !injection_regex().is_match(input)
}
