use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("model id must not be empty")]
    EmptyModelId,

    #[error("invalid model id {0:?}: must not contain '/' or whitespace")]
    InvalidModelId(String),

    #[error("invalid primary key {0:?}")]
    InvalidPrimaryKey(String),

    #[error("invalid format version {0:?}: expected MAJOR.MINOR.PATCH")]
    InvalidFormatVersion(String),
}
