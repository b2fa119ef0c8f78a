// SPDX-License-Identifier: MIT
//! Pre-flight source scan for the remote path.
//!
//! Remote submissions run as plain Node scripts at the provider, so the
//! browser-runtime isolation doesn't apply. This deny-list catches the
//! obviously hostile patterns before the code ever leaves the process. It is
//! textual and trivially bypassable; the provider's own sandbox is the real
//! boundary, this just keeps honest mistakes cheap.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Reserved id under which sanitizer rejections are reported.
pub const SECURITY_ERROR_ID: &str = "_security_error";

#[derive(Debug, Error)]
#[error("Security violation: {0}")]
pub struct SecurityViolation(pub String);

static FORBIDDEN: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r#"(?i)require\s*\(\s*['"]child_process['"]\s*\)"#).unwrap(),
            "child_process module is not allowed",
        ),
        (
            Regex::new(r#"(?i)require\s*\(\s*['"]fs['"]\s*\)"#).unwrap(),
            "fs module is not allowed",
        ),
        (
            Regex::new(r"(?i)process\.exit").unwrap(),
            "process.exit is not allowed",
        ),
        (
            Regex::new(r"(?i)eval\s*\(").unwrap(),
            "eval() is not allowed for security reasons",
        ),
    ]
});

/// Reject code containing a forbidden pattern. First match wins.
pub fn sanitize(code: &str) -> Result<(), SecurityViolation> {
    for (pattern, message) in FORBIDDEN.iter() {
        if pattern.is_match(code) {
            return Err(SecurityViolation((*message).to_string()));
        }
    }
    Ok(())
}
