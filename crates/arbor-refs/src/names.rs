//! Branch name validation following git-style conventions.
//!
//! A valid branch name is non-empty, contains no whitespace or any of
//! `~ ^ : ? * [ \`, has no `..` or `@{` sequence, no empty or dot-leading
//! `/`-separated component, does not end with `.`, `/` or `.lock`, and is not
//! the reserved name `HEAD`.

use crate::error::{RefError, Result};

const FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

const FORBIDDEN_SEQUENCES: &[(&str, &str)] = &[
    ("..", "must not contain '..'"),
    ("@{", "must not contain '@{'"),
    ("//", "must not contain consecutive slashes"),
];

/// Validate a short branch name (without the `refs/heads/` prefix).
///
/// ```
/// use arbor_refs::validate_branch_name;
///
/// assert!(validate_branch_name("feature/auth").is_ok());
/// assert!(validate_branch_name("bad..name").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> Result<()> {
    let reject = |reason: String| {
        Err(RefError::InvalidBranchName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return reject("branch name must not be empty".into());
    }
    if name == "HEAD" {
        return reject("'HEAD' is reserved".into());
    }
    if let Some(ch) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return reject(format!("contains forbidden character {ch:?}"));
    }
    for (seq, reason) in FORBIDDEN_SEQUENCES {
        if name.contains(seq) {
            return reject((*reason).into());
        }
    }
    if name.ends_with('.') || name.ends_with('/') || name.ends_with(".lock") {
        return reject("must not end with '.', '/' or '.lock'".into());
    }
    for component in name.split('/') {
        if component.is_empty() {
            return reject("path components must not be empty".into());
        }
        if component.starts_with('.') {
            return reject(format!("component {component:?} must not start with '.'"));
        }
    }
    Ok(())
}
