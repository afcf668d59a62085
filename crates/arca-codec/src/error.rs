use thiserror::Error;

/// Errors from encoding or decoding a field value.
///
/// `field` is a path: nested list items and map entries appear as
/// `tags[2]` or `metadata.owner`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("field {field:?}: expected {expected}, got {type_name}")]
    Mismatch {
        field: String,
        expected: String,
        type_name: String,
    },

    #[error("field {field:?}: unsupported value type {type_name}")]
    Unsupported { field: String, type_name: String },

    #[error("field {field:?}: invalid {expected} value: {reason}")]
    Invalid {
        field: String,
        expected: String,
        reason: String,
    },
}

impl CodecError {
    /// The field path the error refers to.
    pub fn field(&self) -> &str {
        match self {
            Self::Mismatch { field, .. }
            | Self::Unsupported { field, .. }
            | Self::Invalid { field, .. } => field,
        }
    }
}

pub type CodecResult<T> = Result<T, CodecError>;
