use arca_archive::ArchiveError;
use arca_graph::GraphError;
use arca_registry::RegistryError;
use arca_types::{ModelId, RecordKey};
use thiserror::Error;

/// Structural failures. Any of these aborts the operation before the
/// registry is modified.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("archive does not match the registry: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("{} records already exist in the registry: {}", .0.len(), join_keys(.0))]
    PrimaryKeyCollision(Vec<RecordKey>),

    #[error("selection matches no records")]
    NoSelection,

    #[error("unknown model: {0}")]
    UnknownModel(ModelId),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

fn join_keys(keys: &[RecordKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type EngineResult<T> = Result<T, EngineError>;
