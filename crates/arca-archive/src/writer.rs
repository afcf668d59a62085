use std::io::{Cursor, Seek, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use arca_types::{AttachmentBlob, Manifest, ObjectRecord};

use crate::document::DataDocument;
use crate::error::{ArchiveError, ArchiveResult};
use crate::layout::{self, DATA_ENTRY, MANIFEST_ENTRY};

/// Compression applied to every archive entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    Stored,
    #[default]
    Deflated,
}

impl Compression {
    fn method(self) -> zip::CompressionMethod {
        match self {
            Self::Stored => zip::CompressionMethod::Stored,
            Self::Deflated => zip::CompressionMethod::Deflated,
        }
    }
}

/// Builds an archive from object records and attachment blobs.
pub struct ArchiveWriter {
    manifest: Manifest,
    objects: Vec<ObjectRecord>,
    attachments: Vec<AttachmentBlob>,
    compression: Compression,
}

impl ArchiveWriter {
    /// Start an archive stamped with `created_at`.
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            manifest: Manifest::new(created_at),
            objects: Vec::new(),
            attachments: Vec::new(),
            compression: Compression::default(),
        }
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_origin_tenant(mut self, tenant: Option<String>) -> Self {
        self.manifest.origin_tenant_id = tenant;
        self
    }

    /// Mark the archive as incremental from `since`.
    pub fn with_since(mut self, since: Option<DateTime<Utc>>) -> Self {
        self.manifest.since = since;
        self
    }

    /// Append an object record. Records keep insertion order in `data.json`.
    pub fn add_object(&mut self, record: ObjectRecord) {
        self.manifest.count_object(&record.model_id);
        self.objects.push(record);
    }

    /// Append an attachment blob. Its filename is reduced to the final path
    /// component; a field name that is not a single path component is
    /// refused, since the reader could not place the entry.
    pub fn add_attachment(&mut self, mut blob: AttachmentBlob) -> ArchiveResult<()> {
        layout::check_field_name(&blob.field_name).map_err(|reason| {
            ArchiveError::InvalidAttachment {
                owner: blob.owner().to_string(),
                field: blob.field_name.clone(),
                reason,
            }
        })?;
        blob.filename = layout::sanitize_filename(&blob.filename);
        self.manifest.attachment_count += 1;
        self.attachments.push(blob);
        Ok(())
    }

    /// Number of object records queued.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if no object was added.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Write the archive to `path`.
    pub fn finish(self, path: &Path) -> ArchiveResult<Manifest> {
        let (manifest, bytes) = self.finish_to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(manifest)
    }

    /// Build the archive in memory.
    pub fn finish_to_bytes(self) -> ArchiveResult<(Manifest, Vec<u8>)> {
        let mut manifest = self.manifest;
        let document = DataDocument::new(manifest.created_at, self.objects);
        let data = serde_json::to_vec_pretty(&document)
            .map_err(|e| ArchiveError::json(DATA_ENTRY, e))?;
        manifest.data_checksum = Some(blake3::hash(&data).to_hex().to_string());
        let manifest_json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| ArchiveError::json(MANIFEST_ENTRY, e))?;

        let options = SimpleFileOptions::default().compression_method(self.compression.method());
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        write_entry(&mut zip, MANIFEST_ENTRY, &manifest_json, options)?;
        write_entry(&mut zip, DATA_ENTRY, &data, options)?;
        for blob in &self.attachments {
            write_entry(&mut zip, &layout::attachment_path(blob), &blob.bytes, options)?;
        }
        let bytes = zip.finish()?.into_inner();

        debug!(
            objects = manifest.object_count,
            attachments = manifest.attachment_count,
            bytes = bytes.len(),
            "archive written"
        );
        Ok((manifest, bytes))
    }
}

fn write_entry<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    bytes: &[u8],
    options: SimpleFileOptions,
) -> ArchiveResult<()> {
    zip.start_file(name, options)?;
    zip.write_all(bytes)?;
    Ok(())
}
