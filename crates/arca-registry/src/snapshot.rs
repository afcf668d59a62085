//! JSON snapshots of an [`InMemoryRegistry`].
//!
//! A snapshot holds the declared models and every stored row. Scalars use the
//! archive wire forms from `arca-codec`, attachment content is base64. The
//! CLI uses snapshots as its fixture stores.

use std::collections::BTreeMap;

use arca_codec::{Value, ValueCodec};
use arca_types::{FieldDescriptor, FieldKind, ModelId, PrimaryKey, ValueKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::instance::{Attachment, Instance};
use crate::memory::InMemoryRegistry;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotDoc {
    #[serde(default)]
    models: Vec<SnapshotModel>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotModel {
    id: ModelId,
    #[serde(default = "default_tracks")]
    tracks_modification: bool,
    fields: Vec<FieldDescriptor>,
    #[serde(default)]
    rows: Vec<SnapshotRow>,
}

fn default_tracks() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRow {
    pk: PrimaryKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    scalars: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    single_refs: BTreeMap<String, Option<PrimaryKey>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    multi_refs: BTreeMap<String, Vec<PrimaryKey>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attachments: BTreeMap<String, SnapshotAttachment>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotAttachment {
    filename: String,
    /// Base64 content.
    content: String,
}

impl InMemoryRegistry {
    /// Serialize every model and row to a pretty-printed JSON document.
    pub fn to_json(&self) -> RegistryResult<String> {
        let state = self.read()?;
        let mut doc = SnapshotDoc::default();
        for model in &state.order {
            let Some(table) = state.tables.get(model) else {
                continue;
            };
            let mut rows = Vec::with_capacity(table.rows.len());
            for row in table.rows.values() {
                rows.push(encode_row(model, &table.fields, row)?);
            }
            doc.models.push(SnapshotModel {
                id: model.clone(),
                tracks_modification: table.tracks_modification,
                fields: table.fields.clone(),
                rows,
            });
        }
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Build a registry from a snapshot produced by [`to_json`](Self::to_json)
    /// or written by hand.
    pub fn from_json(json: &str) -> RegistryResult<Self> {
        let doc: SnapshotDoc = serde_json::from_str(json)?;
        let registry = Self::new();
        for model in &doc.models {
            registry.register(model.id.clone(), model.fields.clone(), model.tracks_modification);
        }
        for model in doc.models {
            for row in model.rows {
                let instance = decode_row(&model.id, &model.fields, row)?;
                registry.insert(&model.id, instance)?;
            }
        }
        Ok(registry)
    }
}

fn scalar_kind<'a>(
    model: &ModelId,
    fields: &'a [FieldDescriptor],
    name: &str,
) -> RegistryResult<&'a ValueKind> {
    match fields.iter().find(|f| f.name == name).map(|f| &f.kind) {
        Some(FieldKind::Scalar { value }) => Ok(value),
        Some(other) => Err(RegistryError::Snapshot(format!(
            "{model}.{name} is a {} field, not a scalar",
            other.label()
        ))),
        None => Err(RegistryError::UnknownField {
            model: model.clone(),
            field: name.to_string(),
        }),
    }
}

fn encode_row(
    model: &ModelId,
    fields: &[FieldDescriptor],
    row: &Instance,
) -> RegistryResult<SnapshotRow> {
    let mut scalars = BTreeMap::new();
    for (name, value) in &row.scalars {
        let kind = scalar_kind(model, fields, name)?;
        scalars.insert(name.clone(), ValueCodec::encode_field(name, value, kind)?);
    }
    let mut attachments = BTreeMap::new();
    for (name, attachment) in &row.attachments {
        let content = ValueCodec::encode(&Value::Bytes(attachment.bytes.clone()))?;
        attachments.insert(
            name.clone(),
            SnapshotAttachment {
                filename: attachment.filename.clone(),
                content: content.as_str().unwrap_or_default().to_string(),
            },
        );
    }
    Ok(SnapshotRow {
        pk: row.pk,
        updated_at: row.updated_at,
        scalars,
        single_refs: row.single_refs.clone(),
        multi_refs: row.multi_refs.clone(),
        attachments,
    })
}

fn decode_row(
    model: &ModelId,
    fields: &[FieldDescriptor],
    row: SnapshotRow,
) -> RegistryResult<Instance> {
    let mut instance = Instance::new(row.pk);
    instance.updated_at = row.updated_at;
    for (name, json) in &row.scalars {
        let kind = scalar_kind(model, fields, name)?;
        instance
            .scalars
            .insert(name.clone(), ValueCodec::decode_field(name, json, kind)?);
    }
    instance.single_refs = row.single_refs;
    instance.multi_refs = row.multi_refs;
    for (name, attachment) in row.attachments {
        let content = serde_json::Value::String(attachment.content);
        let Value::Bytes(bytes) = ValueCodec::decode_field(&name, &content, &ValueKind::Bytes)?
        else {
            return Err(RegistryError::Snapshot(format!(
                "{model}.{name}: attachment content is not base64"
            )));
        };
        instance
            .attachments
            .insert(name, Attachment::new(attachment.filename, bytes));
    }
    Ok(instance)
}
