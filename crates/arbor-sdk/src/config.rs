use std::path::{Path, PathBuf};

use arbor_refs::validate_branch_name;
use arbor_store::Signature;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Repository settings. Every key is optional in TOML.
///
/// ```toml
/// default_branch = "trunk"
/// author_name = "Build Bot"
/// author_email = "bot@example.com"
/// blob_write_concurrency = 4
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Branch that [`RefSpec::Current`](crate::RefSpec::Current) resolves to.
    pub default_branch: String,
    /// Author used when an operation supplies none.
    pub author_name: String,
    pub author_email: String,
    /// Bytes scanned for a NUL when auto-detecting binary content.
    pub binary_detection_limit: usize,
    /// Upper bound on blob writes in flight for one batch.
    pub blob_write_concurrency: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_branch: "main".into(),
            author_name: "Arbor".into(),
            author_email: "arbor@localhost".into(),
            binary_detection_limit: 8000,
            blob_write_concurrency: 16,
        }
    }
}

impl RepositoryConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_branch_name(&self.default_branch).map_err(|e| ConfigError::Invalid {
            field: "default_branch",
            reason: e.to_string(),
        })?;
        if self.author_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "author_name",
                reason: "must not be empty".into(),
            });
        }
        if self.binary_detection_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "binary_detection_limit",
                reason: "must be at least 1".into(),
            });
        }
        if self.blob_write_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "blob_write_concurrency",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// The configured author, stamped now.
    pub fn signature(&self) -> Signature {
        Signature::now(self.author_name.clone(), self.author_email.clone())
    }
}
