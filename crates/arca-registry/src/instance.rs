use std::collections::BTreeMap;

use arca_codec::Value;
use arca_types::PrimaryKey;
use chrono::{DateTime, Utc};

/// Binary content held by an attachment field.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// One stored entity, as the registry hands it to the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    pub pk: PrimaryKey,
    pub scalars: BTreeMap<String, Value>,
    pub single_refs: BTreeMap<String, Option<PrimaryKey>>,
    /// Array-of-reference and many-to-many fields.
    pub multi_refs: BTreeMap<String, Vec<PrimaryKey>>,
    pub attachments: BTreeMap<String, Attachment>,
    /// Last modification time; `None` for models without that concept.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Instance {
    pub fn new(pk: PrimaryKey) -> Self {
        Self {
            pk,
            scalars: BTreeMap::new(),
            single_refs: BTreeMap::new(),
            multi_refs: BTreeMap::new(),
            attachments: BTreeMap::new(),
            updated_at: None,
        }
    }

    pub fn with_scalar(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.scalars.insert(field.into(), value.into());
        self
    }

    pub fn with_ref(mut self, field: impl Into<String>, target: Option<PrimaryKey>) -> Self {
        self.single_refs.insert(field.into(), target);
        self
    }

    pub fn with_refs(mut self, field: impl Into<String>, targets: Vec<PrimaryKey>) -> Self {
        self.multi_refs.insert(field.into(), targets);
        self
    }

    pub fn with_attachment(mut self, field: impl Into<String>, attachment: Attachment) -> Self {
        self.attachments.insert(field.into(), attachment);
        self
    }

    pub fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }
}

/// Payload of a `create_or_update` call: scalars plus single references.
///
/// Multi-valued relations and attachments are written separately once every
/// record they point at exists.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceWrite {
    pub pk: PrimaryKey,
    pub scalars: BTreeMap<String, Value>,
    pub single_refs: BTreeMap<String, Option<PrimaryKey>>,
}

impl InstanceWrite {
    pub fn new(pk: PrimaryKey) -> Self {
        Self {
            pk,
            scalars: BTreeMap::new(),
            single_refs: BTreeMap::new(),
        }
    }
}
