use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use serde_json::Value as Json;
use tracing::{debug, warn};
use zip::ZipArchive;

use arca_types::{
    AttachmentBlob, FormatVersion, Manifest, ModelId, ObjectRecord, PrimaryKey, RecordKey,
    VersionSupport,
};

use crate::document::{missing_keys, DATA_KEYS, MANIFEST_KEYS, RECORD_KEYS};
use crate::error::{ArchiveError, ArchiveResult};
use crate::layout::{self, ATTACHMENTS_DIR, DATA_ENTRY, MANIFEST_ENTRY};

/// A decoded, validated archive.
#[derive(Debug)]
pub struct ArchiveReader {
    manifest: Manifest,
    objects: Vec<ObjectRecord>,
    attachments: Vec<AttachmentBlob>,
}

impl ArchiveReader {
    /// Open from raw archive bytes.
    pub fn from_bytes(bytes: &[u8]) -> ArchiveResult<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;

        let manifest = read_manifest_entry(&mut zip)?;
        let data = read_entry(&mut zip, DATA_ENTRY)?;
        if let Some(expected) = &manifest.data_checksum {
            let actual = blake3::hash(&data).to_hex().to_string();
            if *expected != actual {
                return Err(ArchiveError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        let mut problems = Vec::new();
        let objects = parse_objects(&data, &mut problems)?;
        if objects.len() as u64 != manifest.object_count {
            problems.push(format!(
                "{MANIFEST_ENTRY}: object_count is {} but {DATA_ENTRY} holds {} objects",
                manifest.object_count,
                objects.len()
            ));
        }
        let owners: HashSet<RecordKey> = objects.iter().map(ObjectRecord::key).collect();
        let attachments = read_attachments(&mut zip, &owners, &mut problems)?;

        if !problems.is_empty() {
            warn!(problems = problems.len(), "archive failed validation");
            return Err(ArchiveError::Validation(problems));
        }

        debug!(
            objects = objects.len(),
            attachments = attachments.len(),
            incremental = manifest.is_incremental(),
            "archive opened"
        );
        Ok(Self {
            manifest,
            objects,
            attachments,
        })
    }

    /// Open an archive file.
    pub fn open(path: &Path) -> ArchiveResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Read and version-check only the manifest.
    pub fn read_manifest(bytes: &[u8]) -> ArchiveResult<Manifest> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        read_manifest_entry(&mut zip)
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Object records in archive order.
    pub fn objects(&self) -> &[ObjectRecord] {
        &self.objects
    }

    pub fn attachments(&self) -> &[AttachmentBlob] {
        &self.attachments
    }

    /// Attachment stored for one field of one record.
    pub fn attachment(&self, owner: &RecordKey, field: &str) -> Option<&AttachmentBlob> {
        self.attachments
            .iter()
            .find(|b| b.field_name == field && b.owner() == *owner)
    }

    pub fn into_parts(self) -> (Manifest, Vec<ObjectRecord>, Vec<AttachmentBlob>) {
        (self.manifest, self.objects, self.attachments)
    }
}

fn read_entry<R: Read + Seek>(zip: &mut ZipArchive<R>, name: &str) -> ArchiveResult<Vec<u8>> {
    let mut file = match zip.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(ArchiveError::MissingEntry(name.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn parse_json(entry: &str, bytes: &[u8]) -> ArchiveResult<Json> {
    serde_json::from_slice(bytes).map_err(|e| ArchiveError::json(entry, e))
}

/// Reject versions with a different major; warn on unlisted same-major ones.
fn check_version(entry: &str, value: &Json) -> ArchiveResult<()> {
    let raw = value
        .get("format_version")
        .and_then(Json::as_str)
        .unwrap_or_default();
    let unsupported = || ArchiveError::UnsupportedVersion {
        entry: entry.to_string(),
        version: raw.to_string(),
    };
    let version: FormatVersion = raw.parse().map_err(|_| unsupported())?;
    match version.support() {
        VersionSupport::Supported => Ok(()),
        VersionSupport::Compatible => {
            warn!(entry, version = %version, "reading unlisted format version with a known major");
            Ok(())
        }
        VersionSupport::Unsupported => Err(unsupported()),
    }
}

fn read_manifest_entry<R: Read + Seek>(zip: &mut ZipArchive<R>) -> ArchiveResult<Manifest> {
    let bytes = read_entry(zip, MANIFEST_ENTRY)?;
    let value = parse_json(MANIFEST_ENTRY, &bytes)?;
    let missing = missing_keys(MANIFEST_ENTRY, &value, MANIFEST_KEYS);
    if !missing.is_empty() {
        return Err(ArchiveError::Validation(missing));
    }
    check_version(MANIFEST_ENTRY, &value)?;
    serde_json::from_value(value).map_err(|e| ArchiveError::json(MANIFEST_ENTRY, e))
}

/// Parse `data.json`, collecting per-record problems into `problems`.
///
/// The version is checked before `objects` is looked at.
fn parse_objects(bytes: &[u8], problems: &mut Vec<String>) -> ArchiveResult<Vec<ObjectRecord>> {
    let value = parse_json(DATA_ENTRY, bytes)?;
    let missing = missing_keys(DATA_ENTRY, &value, DATA_KEYS);
    if !missing.is_empty() {
        return Err(ArchiveError::Validation(missing));
    }
    check_version(DATA_ENTRY, &value)?;

    let Some(Json::Array(raw_objects)) = value.get("objects") else {
        return Err(ArchiveError::Validation(vec![format!(
            "{DATA_ENTRY}: `objects` must be an array"
        )]));
    };

    let mut objects = Vec::with_capacity(raw_objects.len());
    let mut seen = HashSet::new();
    for (i, raw) in raw_objects.iter().enumerate() {
        let entry = format!("{DATA_ENTRY} objects[{i}]");
        let missing = missing_keys(&entry, raw, RECORD_KEYS);
        if !missing.is_empty() {
            problems.extend(missing);
            continue;
        }
        if let Some(problem) = check_record_identity(&entry, raw) {
            problems.push(problem);
            continue;
        }
        match serde_json::from_value::<ObjectRecord>(raw.clone()) {
            Ok(record) => {
                if !seen.insert(record.key()) {
                    problems.push(format!("{entry}: duplicate record {}", record.key()));
                    continue;
                }
                objects.push(record);
            }
            Err(e) => problems.push(format!("{entry}: {e}")),
        }
    }
    Ok(objects)
}

/// Validate `model_id` and `original_primary_key` separately so the message
/// names the bad field.
fn check_record_identity(entry: &str, raw: &Json) -> Option<String> {
    let model = raw.get("model_id").and_then(Json::as_str);
    match model.map(ModelId::new) {
        None => return Some(format!("{entry}: `model_id` must be a string")),
        Some(Err(e)) => return Some(format!("{entry}: {e}")),
        Some(Ok(_)) => {}
    }
    let pk = raw.get("original_primary_key").and_then(Json::as_str);
    match pk.map(str::parse::<PrimaryKey>) {
        None => Some(format!("{entry}: `original_primary_key` must be a string")),
        Some(Err(e)) => Some(format!("{entry}: {e}")),
        Some(Ok(_)) => None,
    }
}

fn read_attachments<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    owners: &HashSet<RecordKey>,
    problems: &mut Vec<String>,
) -> ArchiveResult<Vec<AttachmentBlob>> {
    let names: Vec<String> = zip
        .file_names()
        .filter(|n| n.starts_with(ATTACHMENTS_DIR) && !n.ends_with('/'))
        .map(String::from)
        .collect();

    let mut fields: HashMap<(RecordKey, String), String> = HashMap::new();
    let mut blobs = Vec::with_capacity(names.len());
    for name in names {
        let location = match layout::parse_attachment_path(&name) {
            Ok(location) => location,
            Err(problem) => {
                problems.push(problem);
                continue;
            }
        };
        if !owners.contains(&location.owner) {
            problems.push(format!("{name}: no record {} in {DATA_ENTRY}", location.owner));
            continue;
        }
        let slot = (location.owner.clone(), location.field_name.clone());
        if let Some(previous) = fields.insert(slot, name.clone()) {
            problems.push(format!("{name}: field already has attachment {previous}"));
            continue;
        }
        let bytes = read_entry(zip, &name)?;
        blobs.push(AttachmentBlob {
            owner_model_id: location.owner.model,
            owner_original_pk: location.owner.pk,
            field_name: location.field_name,
            filename: location.filename,
            bytes,
        });
    }
    Ok(blobs)
}
