use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use arca_types::{FormatVersion, ObjectRecord};

/// Contents of `data.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataDocument {
    pub format_version: String,
    pub created_at: DateTime<Utc>,
    pub objects: Vec<ObjectRecord>,
}

impl DataDocument {
    pub fn new(created_at: DateTime<Utc>, objects: Vec<ObjectRecord>) -> Self {
        Self {
            format_version: FormatVersion::CURRENT.to_string(),
            created_at,
            objects,
        }
    }
}

/// Top-level keys `manifest.json` must carry.
pub(crate) const MANIFEST_KEYS: &[&str] = &["format_version", "created_at", "object_count"];

/// Top-level keys `data.json` must carry.
pub(crate) const DATA_KEYS: &[&str] = &["format_version", "created_at", "objects"];

/// Keys every object record must carry.
pub(crate) const RECORD_KEYS: &[&str] = &["model_id", "original_primary_key"];

/// Names of `required` keys missing from a JSON object, or a message when
/// the value is not an object at all.
pub(crate) fn missing_keys(entry: &str, value: &serde_json::Value, required: &[&str]) -> Vec<String> {
    let Some(object) = value.as_object() else {
        return vec![format!("{entry}: expected a JSON object")];
    };
    required
        .iter()
        .filter(|key| !object.contains_key(**key))
        .map(|key| format!("{entry}: missing required key `{key}`"))
        .collect()
}
