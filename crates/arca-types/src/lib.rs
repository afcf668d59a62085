//! Foundation types for Arca backup archives.
//!
//! Every other Arca crate depends on `arca-types`. The types here describe
//! *what* is stored in an archive without knowing how it is encoded or where
//! it came from.
//!
//! # Key Types
//!
//! - [`ModelId`]: name of an entity type exposed by a model registry
//! - [`PrimaryKey`]: canonical record identifier (UUID)
//! - [`RecordKey`]: `(model, pk)` pair naming one record in an archive
//! - [`FieldDescriptor`] / [`FieldKind`] / [`ValueKind`]: declared field shapes
//! - [`Schema`]: field descriptors for a set of models
//! - [`ObjectRecord`]: one serialized entity instance
//! - [`AttachmentBlob`]: binary payload owned by a record field
//! - [`Manifest`] / [`FormatVersion`]: archive summary and version contract

pub mod error;
pub mod field;
pub mod identity;
pub mod manifest;
pub mod record;

pub use error::TypeError;
pub use field::{FieldDescriptor, FieldKind, Schema, ValueKind};
pub use identity::{ModelId, PrimaryKey, RecordKey};
pub use manifest::{FormatVersion, Manifest, VersionSupport, SUPPORTED_FORMAT_VERSIONS};
pub use record::{AttachmentBlob, ObjectRecord};
