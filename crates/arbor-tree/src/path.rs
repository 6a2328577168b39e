//! Repository path normalization.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("invalid path {path:?}: {reason}")]
    Invalid { path: String, reason: String },
}

/// A validated, non-empty sequence of path segments.
///
/// Separators are `/`. Leading, trailing and repeated separators are
/// dropped; `.` and `..` segments are rejected rather than interpreted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoPath {
    segments: Vec<String>,
}

impl RepoPath {
    /// Normalize a path naming a file or directory inside the repository.
    ///
    /// ```
    /// use arbor_tree::RepoPath;
    ///
    /// let path = RepoPath::parse("//src//lib/mod.rs/").unwrap();
    /// assert_eq!(path.to_string(), "src/lib/mod.rs");
    /// assert!(RepoPath::parse("src/../etc").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        Self::parse_with(raw, "path is empty")
    }

    /// Normalize a path for an operation that targets a directory. The
    /// repository root itself is not an acceptable target.
    pub fn parse_directory(raw: &str) -> Result<Self, PathError> {
        Self::parse_with(raw, "path denotes the repository root")
    }

    fn parse_with(raw: &str, empty_reason: &str) -> Result<Self, PathError> {
        let invalid = |reason: String| PathError::Invalid {
            path: raw.to_string(),
            reason,
        };

        let segments: Vec<String> = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            return Err(invalid(empty_reason.to_string()));
        }
        for segment in &segments {
            check_segment(segment).map_err(|reason| invalid(reason.to_string()))?;
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The final segment.
    pub fn file_name(&self) -> &str {
        // Non-empty by construction.
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Append one segment.
    pub fn join(&self, segment: &str) -> Result<RepoPath, PathError> {
        if segment.is_empty() || segment.contains('/') {
            return Err(PathError::Invalid {
                path: segment.to_string(),
                reason: "segment must be non-empty and contain no '/'".into(),
            });
        }
        check_segment(segment).map_err(|reason| PathError::Invalid {
            path: segment.to_string(),
            reason: reason.to_string(),
        })?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }
}

fn check_segment(segment: &str) -> Result<(), &'static str> {
    match segment {
        "." => Err("'.' segments are not allowed"),
        ".." => Err("'..' segments are not allowed"),
        s if s.contains('\0') => Err("segment contains a NUL byte"),
        _ => Ok(()),
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl FromStr for RepoPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
