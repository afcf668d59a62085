use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::identity::{ModelId, PrimaryKey, RecordKey};

/// One serialized entity instance.
///
/// Scalar values are already in their archive-safe encoded form. Relation
/// values are raw primary keys of the *source* database; they are rewritten
/// through the identifier mapping on restore. `array_refs` carries both
/// inline key arrays and many-to-many links; the registry schema says which
/// is which.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub model_id: ModelId,
    pub original_primary_key: PrimaryKey,
    #[serde(default)]
    pub scalar_fields: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub single_refs: BTreeMap<String, Option<PrimaryKey>>,
    #[serde(default)]
    pub array_refs: BTreeMap<String, Vec<PrimaryKey>>,
}

impl ObjectRecord {
    pub fn new(model_id: ModelId, original_primary_key: PrimaryKey) -> Self {
        Self {
            model_id,
            original_primary_key,
            scalar_fields: BTreeMap::new(),
            single_refs: BTreeMap::new(),
            array_refs: BTreeMap::new(),
        }
    }

    /// The `(model, pk)` pair identifying this record.
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.model_id.clone(), self.original_primary_key)
    }

    /// All field names carried by the record, in no particular order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.scalar_fields
            .keys()
            .chain(self.single_refs.keys())
            .chain(self.array_refs.keys())
            .map(String::as_str)
    }
}

/// Binary payload attached to one field of one record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentBlob {
    pub owner_model_id: ModelId,
    pub owner_original_pk: PrimaryKey,
    pub field_name: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl AttachmentBlob {
    pub fn owner(&self) -> RecordKey {
        RecordKey::new(self.owner_model_id.clone(), self.owner_original_pk)
    }
}

impl std::fmt::Debug for AttachmentBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentBlob")
            .field("owner", &self.owner())
            .field("field_name", &self.field_name)
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}
