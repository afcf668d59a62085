use arca_codec::CodecError;
use arca_types::{ModelId, PrimaryKey};

/// Errors from model registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The model is not known to the registry.
    #[error("unknown model: {0}")]
    UnknownModel(ModelId),

    /// The model has no field with this name, or not of the expected kind.
    #[error("unknown field {model}.{field}")]
    UnknownField { model: ModelId, field: String },

    #[error("record not found: {model}:{pk}")]
    NotFound { model: ModelId, pk: PrimaryKey },

    /// A relation names a target record that does not exist.
    #[error("{model}.{field} references missing {target_model}:{target_pk}")]
    DanglingReference {
        model: ModelId,
        field: String,
        target_model: ModelId,
        target_pk: PrimaryKey,
    },

    /// The backend refused the write (null in a required field, etc.).
    #[error("constraint violation on {model}:{pk}: {reason}")]
    ConstraintViolation {
        model: ModelId,
        pk: PrimaryKey,
        reason: String,
    },

    /// The backend cannot be reached at all.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    /// Whether the error means the registry as a whole is unusable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
