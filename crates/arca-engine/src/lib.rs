//! Backup and restore engine for Arca.
//!
//! - [`Writer`] / [`IncrementalWriter`] read a [`ModelRegistry`] and produce
//!   an archive.
//! - [`Restorer`] replays an archive into a registry: pre-flight checks,
//!   identifier mapping, creation in dependency order, attachments, then
//!   relation wiring.
//! - [`SelectiveRestorer`] restores a chosen subset of an archive.
//!
//! Structural problems abort before any record is written and surface as
//! [`EngineError`]. Problems with single records never abort; they land in
//! the [`RestoreReport`] or the writer's warning list.
//!
//! [`ModelRegistry`]: arca_registry::ModelRegistry

pub mod error;
pub mod incremental;
pub mod mapping;
pub mod plan;
pub mod report;
pub mod restorer;
pub mod selective;
pub mod writer;

pub use error::{EngineError, EngineResult};
pub use incremental::IncrementalWriter;
pub use mapping::IdMapping;
pub use plan::RestorePlan;
pub use report::{RestoreIssue, RestoreReport};
pub use restorer::{RestoreOptions, Restorer};
pub use selective::{Filtered, Loaded, SelectiveRestorer};
pub use writer::{WriteOptions, WriteOutcome, WriteWarning, Writer};

#[cfg(test)]
mod testing;
