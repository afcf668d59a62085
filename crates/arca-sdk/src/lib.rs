//! High-level Arca API.
//!
//! [`Arca`] bundles a model registry with an [`ArcaConfig`] and exposes the
//! backup, preview, verify and restore operations as single calls over
//! archive bytes.

pub mod arca;
pub mod config;
pub mod error;
pub mod preview;

pub use arca::Arca;
pub use config::{ArcaConfig, BackupConfig, RestoreConfig};
pub use error::{SdkError, SdkResult};
pub use preview::{BackupPreview, VerifyReport};

// Re-export key types
pub use arca_archive::Compression;
pub use arca_engine::{EngineError, RestoreIssue, RestoreReport, WriteOutcome, WriteWarning};
pub use arca_registry::{InMemoryRegistry, ModelRegistry};
pub use arca_types::{Manifest, ModelId, PrimaryKey, RecordKey};
