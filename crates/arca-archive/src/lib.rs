//! Archive container for Arca backups.
//!
//! An archive is a ZIP file with a fixed layout:
//!
//! ```text
//! manifest.json                                   summary and index
//! data.json                                       authoritative object list
//! attachments/<model_id>/<pk>/<field>/<filename>  raw attachment bytes
//! ```
//!
//! [`ArchiveWriter`] assembles an archive from object records and attachment
//! blobs. [`ArchiveReader`] opens one, checking the format version before any
//! object is parsed, verifying the `data.json` checksum and collecting every
//! layout problem into a single [`ArchiveError::Validation`].

pub mod document;
pub mod error;
pub mod layout;
pub mod reader;
pub mod writer;

pub use document::DataDocument;
pub use error::{ArchiveError, ArchiveResult};
pub use reader::ArchiveReader;
pub use writer::{ArchiveWriter, Compression};
