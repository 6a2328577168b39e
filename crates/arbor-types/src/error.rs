use thiserror::Error;

/// Errors produced when parsing identifiers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid object id length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
