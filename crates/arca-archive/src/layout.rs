//! Entry names inside an archive.

use arca_types::{AttachmentBlob, ModelId, PrimaryKey, RecordKey};

pub const MANIFEST_ENTRY: &str = "manifest.json";
pub const DATA_ENTRY: &str = "data.json";
pub const ATTACHMENTS_DIR: &str = "attachments/";

/// Filename used when an attachment's name has no usable final component.
const FALLBACK_FILENAME: &str = "attachment";

/// Where an attachment entry belongs, parsed from its path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentLocation {
    pub owner: RecordKey,
    pub field_name: String,
    pub filename: String,
}

/// Reduce a filename to its final path component.
///
/// Both `/` and `\` count as separators. Empty, `.` and `..` results are
/// replaced with a fixed name.
pub fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match last {
        "" | "." | ".." => FALLBACK_FILENAME.to_string(),
        other => other.to_string(),
    }
}

/// Check that an attachment field name fits in one path component.
pub fn check_field_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("empty field name".to_string());
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(format!("field name {name:?} is not a single path component"));
    }
    Ok(())
}

/// Entry path of an attachment blob.
pub fn attachment_path(blob: &AttachmentBlob) -> String {
    format!(
        "{ATTACHMENTS_DIR}{}/{}/{}/{}",
        blob.owner_model_id,
        blob.owner_original_pk,
        blob.field_name,
        sanitize_filename(&blob.filename)
    )
}

/// Parse an entry path under `attachments/`.
///
/// Returns a human-readable message when the path does not have exactly
/// four components or a component is invalid.
pub fn parse_attachment_path(path: &str) -> Result<AttachmentLocation, String> {
    let rest = path
        .strip_prefix(ATTACHMENTS_DIR)
        .ok_or_else(|| format!("{path}: not under {ATTACHMENTS_DIR}"))?;
    let parts: Vec<&str> = rest.split('/').collect();
    let [model, pk, field, filename] = parts.as_slice() else {
        return Err(format!(
            "{path}: expected {ATTACHMENTS_DIR}<model>/<pk>/<field>/<filename>"
        ));
    };

    let model = ModelId::new(*model).map_err(|e| format!("{path}: {e}"))?;
    let pk: PrimaryKey = pk.parse().map_err(|e| format!("{path}: {e}"))?;
    check_field_name(field).map_err(|e| format!("{path}: {e}"))?;
    if sanitize_filename(filename) != *filename {
        return Err(format!("{path}: filename escapes its directory"));
    }

    Ok(AttachmentLocation {
        owner: RecordKey::new(model, pk),
        field_name: field.to_string(),
        filename: filename.to_string(),
    })
}
