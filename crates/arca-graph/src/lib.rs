//! Dependency ordering for Arca restores.
//!
//! Records in an archive reference each other through single and array
//! references. A record can only be created once every record it points at
//! exists, so the restorer asks this crate for a creation order over the
//! `(model, pk)` nodes of the archive. Ordering uses Kahn's algorithm; any
//! cycle is reported with the records that form it.

pub mod error;
pub mod graph;

pub use error::{GraphError, GraphResult};
pub use graph::DependencyGraph;
