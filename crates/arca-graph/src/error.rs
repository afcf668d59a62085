//! Error types for dependency ordering.

use arca_types::RecordKey;

/// Errors that can occur while ordering records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// The references between these records form one or more cycles, so no
    /// creation order exists.
    #[error("circular dependency among {} records: {}", nodes.len(), display_keys(nodes))]
    CircularDependency {
        /// Records on or between cycles, sorted.
        nodes: Vec<RecordKey>,
    },
}

fn display_keys(keys: &[RecordKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience alias for graph results.
pub type GraphResult<T> = Result<T, GraphError>;
